use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
    sea_query::Expr,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::identity::Identity,
    entities::{
        account::Role,
        prelude::*,
        service::{self, ServiceStatus},
        service_rating,
    },
    error::{ApiError, ApiResult},
    router::AppState,
};

#[derive(Deserialize)]
pub struct RateRequest {
    pub rating: i16,
    pub feedback: Option<String>,
}

pub async fn rate_service(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(req): Json<RateRequest>,
) -> ApiResult<(StatusCode, Json<service_rating::Model>)> {
    identity.require_role(Role::Customer)?;
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::InvalidInput(
            "rating must be between 1 and 5".into(),
        ));
    }

    let job = Service::find_by_id(id)
        .one(&*state.db)
        .await?
        .ok_or(ApiError::NotFound("job"))?;
    if job.customer_id != identity.account_id {
        return Err(ApiError::Forbidden);
    }
    if job.status != ServiceStatus::Completed {
        return Err(ApiError::InvalidState(
            "only completed jobs can be rated".into(),
        ));
    }

    let txn = state.db.begin().await?;

    // Re-rating replaces the previous entry; one rating per job.
    let existing = ServiceRating::find()
        .filter(service_rating::Column::ServiceId.eq(id))
        .one(&txn)
        .await?;
    let replaced = existing.is_some();
    let saved = match existing {
        Some(existing) => {
            let mut model: service_rating::ActiveModel = existing.into();
            model.rating = Set(req.rating);
            model.feedback = Set(req.feedback.clone());
            model.updated_at = Set(Utc::now().naive_utc());
            model.update(&txn).await?
        }
        None => {
            service_rating::ActiveModel {
                id: Set(Uuid::new_v4()),
                service_id: Set(id),
                customer_id: Set(identity.account_id),
                rating: Set(req.rating),
                feedback: Set(req.feedback.clone()),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };

    Service::update_many()
        .col_expr(service::Column::IsRated, Expr::value(true))
        .filter(service::Column::Id.eq(id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    // Feedback routing is best-effort once the rating is stored.
    let body = match &req.feedback {
        Some(text) => format!("Rated {}/5: {text}", req.rating),
        None => format!("Rated {}/5", req.rating),
    };
    if let Err(e) = state
        .notifier
        .notify_admins(&*state.db, "service_rated", &body)
        .await
    {
        tracing::error!(job_id = %id, "failed to notify admins of rating: {e}");
    }
    if let Some(worker_id) = job.employee_id {
        if let Err(e) = state
            .notifier
            .send(&*state.db, worker_id, "service_rated", body)
            .await
        {
            tracing::error!(job_id = %id, "failed to notify worker of rating: {e}");
        }
    }

    let status = if replaced {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(saved)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        coverage::{CoverageResolver, Geocoder},
        limits::RateLimiter,
        notify::Notifier,
    };
    use chrono::NaiveDateTime;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
    use std::sync::Arc;

    struct FixedGeocoder;

    #[async_trait::async_trait]
    impl Geocoder for FixedGeocoder {
        async fn locate(&self, _zip: &str) -> anyhow::Result<(f64, f64)> {
            Ok((44.98, -93.27))
        }
    }

    fn test_state(db: DatabaseConnection) -> AppState {
        AppState {
            db: Arc::new(db),
            config: Config {
                database_url: String::new(),
                rust_log: "debug".into(),
                bind_addr: String::new(),
                unlock_hour: 8,
                geocoder_base_url: String::new(),
                notify_webhook_url: None,
                rate_limit_backend_url: None,
            },
            coverage: CoverageResolver::new(Arc::new(FixedGeocoder)),
            notifier: Notifier::new(None),
            limits: RateLimiter::from_config(None),
        }
    }

    fn completed_job(id: Uuid, customer_id: Uuid) -> service::Model {
        service::Model {
            id,
            customer_id,
            employee_id: None,
            status: ServiceStatus::Completed,
            scheduled_date: NaiveDateTime::default().date(),
            scheduled_at: NaiveDateTime::default(),
            is_locked: false,
            unlocked_at: None,
            claimed_at: None,
            arrival_deadline: None,
            arrived_at: None,
            completed_at: Some(NaiveDateTime::default()),
            potential_earnings_cents: 10_000,
            zip_code: "55401".to_string(),
            is_rated: true,
            cancellation_reason: None,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    fn rating_row(service_id: Uuid, customer_id: Uuid, rating: i16) -> service_rating::Model {
        service_rating::Model {
            id: Uuid::new_v4(),
            service_id,
            customer_id,
            rating,
            feedback: None,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    #[tokio::test]
    async fn re_rating_replaces_and_returns_ok() {
        let job_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();
        let previous = rating_row(job_id, customer_id, 2);
        let mut updated = previous.clone();
        updated.rating = 4;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![completed_job(job_id, customer_id)]])
            .append_query_results([vec![previous]])
            .append_query_results([vec![updated]])
            .append_query_results([Vec::<crate::entities::account::Model>::new()])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let identity = Identity {
            account_id: customer_id,
            role: Role::Customer,
        };
        let (status, Json(saved)) = rate_service(
            State(test_state(db)),
            identity,
            Path(job_id),
            Json(RateRequest {
                rating: 4,
                feedback: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved.rating, 4);
    }
}
