use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    #[sea_orm(string_value = "SCHEDULED")]
    Scheduled,
    #[sea_orm(string_value = "CLAIMED")]
    Claimed,
    #[sea_orm(string_value = "ARRIVED")]
    Arrived,
    #[sea_orm(string_value = "IN_PROGRESS")]
    InProgress,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
    #[sea_orm(string_value = "DELAYED")]
    Delayed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "service")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    pub employee_id: Option<Uuid>,
    pub status: ServiceStatus,
    pub scheduled_date: Date,
    pub scheduled_at: DateTime,
    pub is_locked: bool,
    pub unlocked_at: Option<DateTime>,
    pub claimed_at: Option<DateTime>,
    pub arrival_deadline: Option<DateTime>,
    pub arrived_at: Option<DateTime>,
    pub completed_at: Option<DateTime>,
    pub potential_earnings_cents: i64,
    pub zip_code: String,
    pub is_rated: bool,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::service_photo::Entity")]
    ServicePhoto,
    #[sea_orm(has_one = "super::service_checklist::Entity")]
    ServiceChecklist,
    #[sea_orm(has_one = "super::service_rating::Entity")]
    ServiceRating,
}

impl ActiveModelBehavior for ActiveModel {}
