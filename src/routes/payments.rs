use axum::{Json, extract::State};
use sea_orm::EntityTrait;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::identity::Identity,
    entities::{account::Role, prelude::*},
    error::{ApiError, ApiResult},
    payout::{self, DistributionInput, DistributionOutcome},
    router::AppState,
};

#[derive(Deserialize)]
pub struct DistributeRequest {
    pub source_ref: String,
    pub service_id: Option<Uuid>,
    pub amount_cents: i64,
    pub employee_id: Uuid,
    pub has_referral: bool,
}

/// Manual distribution entry point for payments that do not flow through job
/// completion. Same source_ref, same outcome.
pub async fn distribute_payment(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<DistributeRequest>,
) -> ApiResult<Json<DistributionOutcome>> {
    identity.require_role(Role::Admin)?;
    if req.source_ref.trim().is_empty() {
        return Err(ApiError::InvalidInput("source_ref must not be empty".into()));
    }

    let employee = Account::find_by_id(req.employee_id)
        .one(&*state.db)
        .await?
        .ok_or(ApiError::NotFound("employee"))?;
    if employee.role != Role::Employee {
        return Err(ApiError::InvalidInput(
            "employee_id does not refer to a worker".into(),
        ));
    }

    // The referral fee goes to whoever referred the paying customer.
    let referrer_id = if req.has_referral {
        let service_id = req.service_id.ok_or(ApiError::InvalidInput(
            "has_referral requires a service_id to resolve the referrer".into(),
        ))?;
        let job = Service::find_by_id(service_id)
            .one(&*state.db)
            .await?
            .ok_or(ApiError::NotFound("service"))?;
        payout::pending_referrer(&*state.db, job.customer_id).await?
    } else {
        None
    };

    let outcome = payout::record_distribution(
        &*state.db,
        DistributionInput {
            source_ref: req.source_ref,
            service_id: req.service_id,
            amount_cents: req.amount_cents,
            employee_id: req.employee_id,
            has_referral: req.has_referral,
            referrer_id,
        },
    )
    .await?;

    Ok(Json(outcome))
}
