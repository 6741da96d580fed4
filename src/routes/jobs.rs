use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{Duration, NaiveDateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait, sea_query::Expr,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::{
    auth::identity::Identity,
    coverage::is_valid_zip,
    entities::{
        account::Role,
        prelude::*,
        service::{self, ServiceStatus},
        service_checklist,
        service_photo::{self, PhotoKind},
    },
    error::{ApiError, ApiResult},
    payout::{self, DistributionInput},
    router::AppState,
};

const ARRIVAL_WINDOW_HOURS: i64 = 4;
pub(crate) const MIN_BEFORE_PHOTOS: usize = 4;
pub(crate) const MIN_AFTER_PHOTOS: usize = 4;

async fn fetch_job(state: &AppState, id: Uuid) -> Result<service::Model, ApiError> {
    Service::find_by_id(id)
        .one(&*state.db)
        .await?
        .ok_or(ApiError::NotFound("job"))
}

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub customer_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    pub zip_code: String,
    pub potential_earnings_cents: i64,
}

/// Admin scheduling operation. New jobs start locked; the unlock scheduler
/// releases them so all workers see the pool at the same moment.
pub async fn create_job(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<service::Model>)> {
    identity.require_role(Role::Admin)?;
    if !is_valid_zip(&req.zip_code) {
        return Err(ApiError::InvalidInput(
            "zip_code must be a 5-digit ZIP".into(),
        ));
    }
    if req.potential_earnings_cents <= 0 {
        return Err(ApiError::InvalidInput(
            "potential_earnings_cents must be positive".into(),
        ));
    }
    let customer = Account::find_by_id(req.customer_id)
        .one(&*state.db)
        .await?
        .ok_or(ApiError::NotFound("customer"))?;
    if customer.role != Role::Customer {
        return Err(ApiError::InvalidInput(
            "customer_id does not refer to a customer".into(),
        ));
    }

    let job = service::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(req.customer_id),
        employee_id: Set(None),
        status: Set(ServiceStatus::Scheduled),
        scheduled_date: Set(req.scheduled_at.date()),
        scheduled_at: Set(req.scheduled_at),
        is_locked: Set(true),
        potential_earnings_cents: Set(req.potential_earnings_cents),
        zip_code: Set(req.zip_code),
        is_rated: Set(false),
        ..Default::default()
    }
    .insert(&*state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(job)))
}

/// Unlocked, unassigned jobs inside the caller's coverage.
pub async fn available_jobs(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Json<Vec<service::Model>>> {
    identity.require_role(Role::Employee)?;

    let jobs = Service::find()
        .filter(service::Column::Status.eq(ServiceStatus::Scheduled))
        .filter(service::Column::IsLocked.eq(false))
        .filter(service::Column::EmployeeId.is_null())
        .order_by_asc(service::Column::ScheduledAt)
        .all(&*state.db)
        .await?;

    // One coverage decision per distinct zip.
    let mut covered: HashMap<String, bool> = HashMap::new();
    let mut visible = Vec::new();
    for job in jobs {
        let in_range = match covered.get(&job.zip_code) {
            Some(v) => *v,
            None => {
                let v = state
                    .coverage
                    .worker_covers(&*state.db, identity.account_id, &job.zip_code)
                    .await?;
                covered.insert(job.zip_code.clone(), v);
                v
            }
        };
        if in_range {
            visible.push(job);
        }
    }

    Ok(Json(visible))
}

/// Conditional update guarded on the prior unassigned state. Two concurrent
/// claimers both reach this; only one row update can match.
pub(crate) async fn try_claim<C: ConnectionTrait>(
    conn: &C,
    job_id: Uuid,
    worker_id: Uuid,
    now: NaiveDateTime,
) -> Result<bool, sea_orm::DbErr> {
    let result = Service::update_many()
        .col_expr(service::Column::EmployeeId, Expr::value(worker_id))
        .col_expr(
            service::Column::Status,
            Expr::value(ServiceStatus::Claimed),
        )
        .col_expr(service::Column::ClaimedAt, Expr::value(now))
        .col_expr(
            service::Column::ArrivalDeadline,
            Expr::value(now + Duration::hours(ARRIVAL_WINDOW_HOURS)),
        )
        .filter(service::Column::Id.eq(job_id))
        .filter(service::Column::Status.eq(ServiceStatus::Scheduled))
        .filter(service::Column::IsLocked.eq(false))
        .filter(service::Column::EmployeeId.is_null())
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

pub async fn claim_job(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<service::Model>> {
    identity.require_role(Role::Employee)?;
    if !state.limits.allow(&identity.account_id.to_string()).await {
        return Err(ApiError::RateLimited);
    }

    let job = fetch_job(&state, id).await?;
    match job.status {
        ServiceStatus::Scheduled if !job.is_locked => {}
        ServiceStatus::Scheduled => {
            return Err(ApiError::InvalidState("job is not unlocked yet".into()));
        }
        other => {
            return Err(ApiError::InvalidState(format!(
                "job cannot be claimed from {other:?}"
            )));
        }
    }
    if job.employee_id.is_some() {
        return Err(ApiError::Conflict("job is already claimed".into()));
    }
    if !state
        .coverage
        .worker_covers(&*state.db, identity.account_id, &job.zip_code)
        .await?
    {
        return Err(ApiError::Conflict(
            "job is outside your coverage area".into(),
        ));
    }

    let now = Utc::now().naive_utc();
    let txn = state.db.begin().await?;
    if !try_claim(&txn, id, identity.account_id, now).await? {
        txn.rollback().await?;
        return Err(ApiError::Conflict(
            "job was claimed by another worker".into(),
        ));
    }
    txn.commit().await?;

    let job = fetch_job(&state, id).await?;

    // The claim is committed; a notification failure only logs.
    if let Err(e) = state
        .notifier
        .send(
            &*state.db,
            job.customer_id,
            "worker_assigned",
            format!(
                "A worker has been assigned to your {} visit",
                job.scheduled_date
            ),
        )
        .await
    {
        tracing::error!(job_id = %id, "failed to notify customer of claim: {e}");
    }

    Ok(Json(job))
}

pub async fn arrive_job(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<service::Model>> {
    identity.require_role(Role::Employee)?;
    let job = fetch_job(&state, id).await?;
    if job.employee_id != Some(identity.account_id) {
        return Err(ApiError::Forbidden);
    }

    let now = Utc::now().naive_utc();
    let result = Service::update_many()
        .col_expr(
            service::Column::Status,
            Expr::value(ServiceStatus::Arrived),
        )
        .col_expr(service::Column::ArrivedAt, Expr::value(now))
        .filter(service::Column::Id.eq(id))
        .filter(service::Column::Status.eq(ServiceStatus::Claimed))
        .filter(service::Column::EmployeeId.eq(identity.account_id))
        .exec(&*state.db)
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::InvalidState(
            "arrival can only be recorded on a claimed job".into(),
        ));
    }

    Ok(Json(fetch_job(&state, id).await?))
}

pub async fn start_job(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<service::Model>> {
    identity.require_role(Role::Employee)?;
    let job = fetch_job(&state, id).await?;
    if job.employee_id != Some(identity.account_id) {
        return Err(ApiError::Forbidden);
    }

    let result = Service::update_many()
        .col_expr(
            service::Column::Status,
            Expr::value(ServiceStatus::InProgress),
        )
        .filter(service::Column::Id.eq(id))
        .filter(service::Column::Status.eq(ServiceStatus::Arrived))
        .filter(service::Column::EmployeeId.eq(identity.account_id))
        .exec(&*state.db)
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::InvalidState(
            "work can only start after arrival".into(),
        ));
    }

    Ok(Json(fetch_job(&state, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ChecklistInput {
    pub gate_closed: bool,
    pub corners_checked: bool,
    pub waste_removed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub checklist: ChecklistInput,
    pub before_photo_ids: Vec<Uuid>,
    pub after_photo_ids: Vec<Uuid>,
    pub gate_photo_id: Uuid,
}

/// Every missing evidence item is named so the worker knows what to fix.
pub(crate) fn validate_completion(req: &CompleteRequest) -> Result<(), ApiError> {
    if req.before_photo_ids.len() < MIN_BEFORE_PHOTOS {
        return Err(ApiError::InvalidInput(format!(
            "at least {MIN_BEFORE_PHOTOS} before photos are required"
        )));
    }
    if req.after_photo_ids.len() < MIN_AFTER_PHOTOS {
        return Err(ApiError::InvalidInput(format!(
            "at least {MIN_AFTER_PHOTOS} after photos are required"
        )));
    }

    let mut seen = HashSet::new();
    for id in req
        .before_photo_ids
        .iter()
        .chain(req.after_photo_ids.iter())
        .chain(std::iter::once(&req.gate_photo_id))
    {
        if !seen.insert(*id) {
            return Err(ApiError::InvalidInput(format!(
                "photo {id} is referenced more than once"
            )));
        }
    }

    if !req.checklist.gate_closed {
        return Err(ApiError::InvalidInput(
            "checklist item gate_closed must be confirmed".into(),
        ));
    }
    if !req.checklist.corners_checked {
        return Err(ApiError::InvalidInput(
            "checklist item corners_checked must be confirmed".into(),
        ));
    }
    if !req.checklist.waste_removed {
        return Err(ApiError::InvalidInput(
            "checklist item waste_removed must be confirmed".into(),
        ));
    }

    Ok(())
}

fn check_photo_kind(
    by_id: &HashMap<Uuid, &service_photo::Model>,
    ids: &[Uuid],
    kind: PhotoKind,
    label: &str,
) -> Result<(), ApiError> {
    for photo_id in ids {
        let photo = by_id.get(photo_id).ok_or_else(|| {
            ApiError::InvalidInput(format!("{label} photo {photo_id} is not attached to this job"))
        })?;
        if photo.kind != kind {
            return Err(ApiError::InvalidInput(format!(
                "photo {photo_id} is not tagged as a {label} photo"
            )));
        }
    }
    Ok(())
}

/// Checklist + photo evidence, persisted with the status change as one
/// transaction. Payment distribution and notifications run after the commit.
pub async fn complete_job(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteRequest>,
) -> ApiResult<Json<service::Model>> {
    identity.require_role(Role::Employee)?;
    validate_completion(&req)?;

    let job = fetch_job(&state, id).await?;
    if job.employee_id != Some(identity.account_id) {
        return Err(ApiError::Forbidden);
    }
    if !matches!(
        job.status,
        ServiceStatus::Arrived | ServiceStatus::InProgress
    ) {
        return Err(ApiError::InvalidState(format!(
            "job cannot be completed from {:?}",
            job.status
        )));
    }

    let photos = ServicePhoto::find()
        .filter(service_photo::Column::ServiceId.eq(id))
        .all(&*state.db)
        .await?;
    let by_id: HashMap<Uuid, &service_photo::Model> = photos.iter().map(|p| (p.id, p)).collect();
    check_photo_kind(&by_id, &req.before_photo_ids, PhotoKind::PreClean, "before")?;
    check_photo_kind(&by_id, &req.after_photo_ids, PhotoKind::PostClean, "after")?;
    check_photo_kind(
        &by_id,
        std::slice::from_ref(&req.gate_photo_id),
        PhotoKind::Gate,
        "gate",
    )?;

    let now = Utc::now().naive_utc();
    let txn = state.db.begin().await?;

    service_checklist::ActiveModel {
        id: Set(Uuid::new_v4()),
        service_id: Set(id),
        gate_closed: Set(req.checklist.gate_closed),
        corners_checked: Set(req.checklist.corners_checked),
        waste_removed: Set(req.checklist.waste_removed),
        completed_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let result = Service::update_many()
        .col_expr(
            service::Column::Status,
            Expr::value(ServiceStatus::Completed),
        )
        .col_expr(service::Column::CompletedAt, Expr::value(now))
        .filter(service::Column::Id.eq(id))
        .filter(service::Column::EmployeeId.eq(identity.account_id))
        .filter(service::Column::Status.is_in([
            ServiceStatus::Arrived,
            ServiceStatus::InProgress,
        ]))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        txn.rollback().await?;
        return Err(ApiError::Conflict(
            "job state changed during completion".into(),
        ));
    }

    txn.commit().await?;

    // Soft effects: the completion stands even if these fail.
    let referrer_id = payout::pending_referrer(&*state.db, job.customer_id)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(job_id = %id, "referral lookup failed: {e}");
            None
        });
    let distribution = DistributionInput {
        source_ref: format!("service:{id}"),
        service_id: Some(id),
        amount_cents: job.potential_earnings_cents,
        employee_id: identity.account_id,
        has_referral: referrer_id.is_some(),
        referrer_id,
    };
    if let Err(e) = payout::record_distribution(&*state.db, distribution).await {
        tracing::error!(job_id = %id, "payment distribution after completion failed: {e}");
    }
    if let Err(e) = state
        .notifier
        .send(
            &*state.db,
            job.customer_id,
            "service_completed",
            "Your cleanup visit is complete".to_string(),
        )
        .await
    {
        tracing::error!(job_id = %id, "failed to notify customer of completion: {e}");
    }
    if let Err(e) = state
        .notifier
        .notify_admins(&*state.db, "service_completed", &format!("Job {id} completed"))
        .await
    {
        tracing::error!(job_id = %id, "failed to notify admins of completion: {e}");
    }

    Ok(Json(fetch_job(&state, id).await?))
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

pub async fn cancel_job(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> ApiResult<Json<service::Model>> {
    let job = fetch_job(&state, id).await?;
    identity.require_owner_or_admin(job.customer_id)?;

    let result = Service::update_many()
        .col_expr(
            service::Column::Status,
            Expr::value(ServiceStatus::Cancelled),
        )
        .col_expr(
            service::Column::CancellationReason,
            Expr::value(req.reason),
        )
        .filter(service::Column::Id.eq(id))
        .filter(service::Column::Status.is_not_in([
            ServiceStatus::Completed,
            ServiceStatus::Cancelled,
        ]))
        .exec(&*state.db)
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::InvalidState(
            "job can no longer be cancelled".into(),
        ));
    }

    Ok(Json(fetch_job(&state, id).await?))
}

pub async fn delay_job(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<service::Model>> {
    let job = fetch_job(&state, id).await?;
    let allowed = identity.role == Role::Admin || job.employee_id == Some(identity.account_id);
    if !allowed {
        return Err(ApiError::Forbidden);
    }

    let result = Service::update_many()
        .col_expr(
            service::Column::Status,
            Expr::value(ServiceStatus::Delayed),
        )
        .filter(service::Column::Id.eq(id))
        .filter(service::Column::Status.is_in([
            ServiceStatus::Scheduled,
            ServiceStatus::Claimed,
        ]))
        .exec(&*state.db)
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::InvalidState(
            "only scheduled or claimed jobs can be delayed".into(),
        ));
    }

    Ok(Json(fetch_job(&state, id).await?))
}

#[derive(Deserialize)]
pub struct AddPhotoRequest {
    pub url: String,
    pub kind: PhotoKind,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub expires_at: Option<NaiveDateTime>,
}

/// Registers a photo already uploaded to object storage.
pub async fn add_photo(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(req): Json<AddPhotoRequest>,
) -> ApiResult<(StatusCode, Json<service_photo::Model>)> {
    identity.require_role(Role::Employee)?;
    let job = fetch_job(&state, id).await?;
    if job.employee_id != Some(identity.account_id) {
        return Err(ApiError::Forbidden);
    }
    if !matches!(
        job.status,
        ServiceStatus::Claimed | ServiceStatus::Arrived | ServiceStatus::InProgress
    ) {
        return Err(ApiError::InvalidState(
            "photos can only be attached to an active job".into(),
        ));
    }

    let photo = service_photo::ActiveModel {
        id: Set(Uuid::new_v4()),
        service_id: Set(id),
        url: Set(req.url),
        kind: Set(req.kind),
        latitude: Set(req.latitude),
        longitude: Set(req.longitude),
        expires_at: Set(req.expires_at),
        ..Default::default()
    }
    .insert(&*state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(photo)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn complete_request(before: usize, after: usize) -> CompleteRequest {
        CompleteRequest {
            checklist: ChecklistInput {
                gate_closed: true,
                corners_checked: true,
                waste_removed: true,
            },
            before_photo_ids: (0..before).map(|_| Uuid::new_v4()).collect(),
            after_photo_ids: (0..after).map(|_| Uuid::new_v4()).collect(),
            gate_photo_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn accepts_a_complete_evidence_bundle() {
        assert!(validate_completion(&complete_request(4, 4)).is_ok());
        assert!(validate_completion(&complete_request(6, 5)).is_ok());
    }

    #[test]
    fn rejects_too_few_before_photos() {
        let err = validate_completion(&complete_request(3, 4)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(m) if m.contains("before")));
    }

    #[test]
    fn rejects_too_few_after_photos() {
        let err = validate_completion(&complete_request(4, 3)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(m) if m.contains("after")));
    }

    #[test]
    fn rejects_duplicate_photo_references() {
        let mut req = complete_request(4, 4);
        req.gate_photo_id = req.before_photo_ids[0];
        let err = validate_completion(&req).unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(m) if m.contains("more than once")));
    }

    #[test]
    fn rejects_unconfirmed_checklist_items() {
        let mut req = complete_request(4, 4);
        req.checklist.gate_closed = false;
        let err = validate_completion(&req).unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(m) if m.contains("gate_closed")));

        let mut req = complete_request(4, 4);
        req.checklist.corners_checked = false;
        assert!(validate_completion(&req).is_err());

        let mut req = complete_request(4, 4);
        req.checklist.waste_removed = false;
        assert!(validate_completion(&req).is_err());
    }

    #[tokio::test]
    async fn claim_wins_when_the_row_is_still_unassigned() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let won = try_claim(&db, Uuid::new_v4(), Uuid::new_v4(), Utc::now().naive_utc())
            .await
            .unwrap();
        assert!(won);
    }

    #[tokio::test]
    async fn claim_loses_when_another_worker_got_there_first() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let won = try_claim(&db, Uuid::new_v4(), Uuid::new_v4(), Utc::now().naive_utc())
            .await
            .unwrap();
        assert!(!won);
    }
}
