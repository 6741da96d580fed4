//! Operational endpoints driven by an external cron. Each run is safe to
//! repeat; the daily unlock additionally records an audit row per calendar
//! day so retries inside the window are no-ops.

use axum::{Json, extract::State};
use chrono::{Local, NaiveDate, NaiveDateTime, Timelike, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    sea_query::{Expr, OnConflict},
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::identity::Identity,
    entities::{
        account::Role,
        payment_distribution::{self, PayoutStatus, RecipientType},
        prelude::*,
        referral::{self, ReferralStatus},
        service::{self, ServiceStatus},
        service_photo, unlock_run,
    },
    error::ApiResult,
    router::AppState,
};

/// The release fires only during the configured hour. A cron that drifts to
/// 07:59 or 09:00 does nothing rather than unlocking early or late.
pub(crate) fn unlock_window_open(hour: u32, unlock_hour: u32) -> bool {
    hour == unlock_hour
}

#[derive(Debug, Serialize)]
pub struct UnlockReport {
    pub unlocked: u64,
    pub skipped: bool,
    pub message: Option<String>,
}

/// A day counts as done only once a succeeded audit row exists; a failed
/// attempt leaves the day open for retry.
pub(crate) async fn already_unlocked<C: ConnectionTrait>(
    conn: &C,
    day: NaiveDate,
) -> Result<bool, sea_orm::DbErr> {
    Ok(UnlockRun::find()
        .filter(unlock_run::Column::RunDate.eq(day))
        .filter(unlock_run::Column::Succeeded.eq(true))
        .one(conn)
        .await?
        .is_some())
}

/// Flips the day's scheduled jobs visible in one statement, so every worker
/// sees the pool at the same instant.
pub(crate) async fn unlock_scheduled<C: ConnectionTrait>(
    conn: &C,
    day: NaiveDate,
    now: NaiveDateTime,
) -> Result<u64, sea_orm::DbErr> {
    let result = Service::update_many()
        .col_expr(service::Column::IsLocked, Expr::value(false))
        .col_expr(service::Column::UnlockedAt, Expr::value(now))
        .filter(service::Column::Status.eq(ServiceStatus::Scheduled))
        .filter(service::Column::IsLocked.eq(true))
        .filter(service::Column::EmployeeId.is_null())
        .filter(service::Column::ScheduledDate.eq(day))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

/// Upsert keyed on run_date: a retry after a failed attempt replaces the
/// failed row instead of tripping the unique constraint.
async fn record_unlock_run<C: ConnectionTrait>(
    conn: &C,
    run_date: NaiveDate,
    unlocked: u64,
    succeeded: bool,
    message: Option<String>,
) -> Result<(), sea_orm::DbErr> {
    UnlockRun::insert(unlock_run::ActiveModel {
        id: Set(Uuid::new_v4()),
        run_date: Set(run_date),
        unlocked_count: Set(unlocked as i64),
        succeeded: Set(succeeded),
        message: Set(message),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::column(unlock_run::Column::RunDate)
            .update_columns([
                unlock_run::Column::UnlockedCount,
                unlock_run::Column::Succeeded,
                unlock_run::Column::Message,
            ])
            .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;

    Ok(())
}

pub async fn unlock_jobs(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Json<UnlockReport>> {
    identity.require_role(Role::Admin)?;

    let now = Local::now();
    let today = now.date_naive();

    if !unlock_window_open(now.hour(), state.config.unlock_hour) {
        return Ok(Json(UnlockReport {
            unlocked: 0,
            skipped: true,
            message: Some(format!(
                "outside the unlock window (hour {} != {})",
                now.hour(),
                state.config.unlock_hour
            )),
        }));
    }

    if already_unlocked(&*state.db, today).await? {
        return Ok(Json(UnlockReport {
            unlocked: 0,
            skipped: true,
            message: Some("already unlocked today".into()),
        }));
    }

    match unlock_scheduled(&*state.db, today, Utc::now().naive_utc()).await {
        Ok(unlocked) => {
            record_unlock_run(&*state.db, today, unlocked, true, None).await?;
            tracing::info!(unlocked, "daily job unlock complete");
            Ok(Json(UnlockReport {
                unlocked,
                skipped: false,
                message: None,
            }))
        }
        Err(e) => {
            if let Err(audit_err) =
                record_unlock_run(&*state.db, today, 0, false, Some(e.to_string())).await
            {
                tracing::error!("failed to record unlock run audit row: {audit_err}");
            }
            Err(e.into())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReferralReport {
    pub processed: u64,
    pub paid: u64,
}

/// Advances referral state: PENDING becomes PROCESSED once the referred
/// customer has a completed job, PROCESSED becomes PAID once a referral
/// distribution to the referrer has been paid out.
pub async fn process_referrals(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Json<ReferralReport>> {
    identity.require_role(Role::Admin)?;

    let mut processed = 0;
    let pending = Referral::find()
        .filter(referral::Column::Status.eq(ReferralStatus::Pending))
        .all(&*state.db)
        .await?;
    for entry in pending {
        let completed = Service::find()
            .filter(service::Column::CustomerId.eq(entry.referred_id))
            .filter(service::Column::Status.eq(ServiceStatus::Completed))
            .one(&*state.db)
            .await?;
        if completed.is_some() {
            let mut model: referral::ActiveModel = entry.into();
            model.status = Set(ReferralStatus::Processed);
            model.update(&*state.db).await?;
            processed += 1;
        }
    }

    let mut paid = 0;
    let processed_entries = Referral::find()
        .filter(referral::Column::Status.eq(ReferralStatus::Processed))
        .all(&*state.db)
        .await?;
    for entry in processed_entries {
        let payout = PaymentDistribution::find()
            .filter(payment_distribution::Column::RecipientType.eq(RecipientType::Referral))
            .filter(payment_distribution::Column::RecipientId.eq(entry.referrer_id))
            .filter(payment_distribution::Column::Status.eq(PayoutStatus::Paid))
            .one(&*state.db)
            .await?;
        if payout.is_some() {
            let mut model: referral::ActiveModel = entry.into();
            model.status = Set(ReferralStatus::Paid);
            model.update(&*state.db).await?;
            paid += 1;
        }
    }

    Ok(Json(ReferralReport { processed, paid }))
}

#[derive(Debug, Serialize)]
pub struct CleanupReport {
    pub deleted: u64,
}

/// Drops photo records past their retention date.
pub async fn cleanup_photos(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Json<CleanupReport>> {
    identity.require_role(Role::Admin)?;

    let result = ServicePhoto::delete_many()
        .filter(service_photo::Column::ExpiresAt.lte(Utc::now().naive_utc()))
        .exec(&*state.db)
        .await?;

    tracing::info!(deleted = result.rows_affected, "expired photo cleanup");
    Ok(Json(CleanupReport {
        deleted: result.rows_affected,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[test]
    fn unlock_only_fires_during_the_configured_hour() {
        assert!(unlock_window_open(8, 8));
        assert!(!unlock_window_open(7, 8));
        assert!(!unlock_window_open(9, 8));
        assert!(!unlock_window_open(0, 8));
    }

    fn run_row(day: NaiveDate, succeeded: bool) -> unlock_run::Model {
        unlock_run::Model {
            id: Uuid::new_v4(),
            run_date: day,
            unlocked_count: 3,
            succeeded,
            message: None,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 23).unwrap()
    }

    #[tokio::test]
    async fn second_same_day_invocation_is_skipped() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![run_row(day(), true)]])
            .into_connection();

        assert!(already_unlocked(&db, day()).await.unwrap());
    }

    #[tokio::test]
    async fn first_invocation_of_the_day_proceeds() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<unlock_run::Model>::new()])
            .into_connection();

        assert!(!already_unlocked(&db, day()).await.unwrap());
    }

    #[tokio::test]
    async fn unlock_reports_how_many_jobs_were_released() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 5,
            }])
            .into_connection();

        let unlocked = unlock_scheduled(&db, day(), NaiveDateTime::default())
            .await
            .unwrap();
        assert_eq!(unlocked, 5);
    }

    #[tokio::test]
    async fn audit_row_is_upserted_on_run_date() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        record_unlock_run(&db, day(), 5, true, None).await.unwrap();

        // A success row written after a failed attempt must replace it, not
        // trip the unique constraint on run_date.
        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("ON CONFLICT"), "expected an upsert, got: {log}");
    }
}
