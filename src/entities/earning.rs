use sea_orm::entity::prelude::*;
use serde::Serialize;

use super::payment_distribution::PayoutStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "earning")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub employee_id: Uuid,
    #[sea_orm(unique)]
    pub distribution_id: Uuid,
    pub amount_cents: i64,
    pub status: PayoutStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::payment_distribution::Entity",
        from = "Column::DistributionId",
        to = "super::payment_distribution::Column::Id"
    )]
    Distribution,
}

impl Related<super::payment_distribution::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Distribution.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
