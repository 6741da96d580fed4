use sea_orm::entity::prelude::*;
use serde::Serialize;

use super::payment_distribution::PayoutStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "payment")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub service_id: Option<Uuid>,
    #[sea_orm(unique)]
    pub source_ref: String,
    pub amount_cents: i64,
    pub status: PayoutStatus,
    pub paid_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payment_distribution::Entity")]
    PaymentDistribution,
}

impl Related<super::payment_distribution::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentDistribution.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
