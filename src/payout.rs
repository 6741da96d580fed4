//! Payment split policy. The percentages and the referral fee live here and
//! nowhere else.

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, SqlErr, TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{
    earning, payment,
    payment_distribution::{self, PayoutStatus, RecipientType},
    prelude::{Payment, Referral},
    referral::{self, ReferralStatus},
};
use crate::error::ApiError;

pub const REFERRAL_FEE_CENTS: i64 = 500;
pub const WORKER_SHARE_BPS: i64 = 7_500;
const BPS_DENOMINATOR: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub referral_cents: i64,
    pub worker_cents: i64,
    pub company_cents: i64,
}

/// Integer minor-unit split. The worker share floors; the rounding remainder
/// lands on the company, so the parts always sum to `amount_cents`.
pub fn split(amount_cents: i64, has_referral: bool) -> Result<Split, ApiError> {
    if amount_cents <= 0 {
        return Err(ApiError::InvalidInput(
            "payment amount must be positive".into(),
        ));
    }
    let referral_cents = if has_referral { REFERRAL_FEE_CENTS } else { 0 };
    if amount_cents < referral_cents {
        return Err(ApiError::InvalidInput(
            "payment amount is below the referral fee".into(),
        ));
    }

    let net = amount_cents - referral_cents;
    let worker_cents = net * WORKER_SHARE_BPS / BPS_DENOMINATOR;
    let company_cents = net - worker_cents;

    Ok(Split {
        referral_cents,
        worker_cents,
        company_cents,
    })
}

/// A customer's referral earns the fee only while it is still PENDING. Every
/// entry point that decides whether a payment carries a referral fee goes
/// through here, so they cannot disagree.
pub async fn pending_referrer<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
) -> Result<Option<Uuid>, sea_orm::DbErr> {
    Ok(Referral::find()
        .filter(referral::Column::ReferredId.eq(customer_id))
        .filter(referral::Column::Status.eq(ReferralStatus::Pending))
        .one(conn)
        .await?
        .map(|r| r.referrer_id))
}

pub struct DistributionInput {
    /// Idempotency key tying this distribution to its source payment event.
    pub source_ref: String,
    pub service_id: Option<Uuid>,
    pub amount_cents: i64,
    pub employee_id: Uuid,
    pub has_referral: bool,
    pub referrer_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DistributionOutcome {
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub already_recorded: bool,
}

/// Creates the payment, its distributions and the worker's PENDING earning in
/// one transaction. Re-invoking with the same `source_ref` returns the
/// existing payment instead of duplicating rows; the unique constraint on
/// `source_ref` backs the check against concurrent callers.
pub async fn record_distribution(
    db: &DatabaseConnection,
    input: DistributionInput,
) -> Result<DistributionOutcome, ApiError> {
    let split = split(input.amount_cents, input.has_referral)?;

    if let Some(existing) = Payment::find()
        .filter(payment::Column::SourceRef.eq(input.source_ref.as_str()))
        .one(db)
        .await?
    {
        return Ok(DistributionOutcome {
            payment_id: existing.id,
            amount_cents: existing.amount_cents,
            already_recorded: true,
        });
    }

    let txn = db.begin().await?;

    let payment_model = payment::ActiveModel {
        id: Set(Uuid::new_v4()),
        service_id: Set(input.service_id),
        source_ref: Set(input.source_ref.clone()),
        amount_cents: Set(input.amount_cents),
        status: Set(PayoutStatus::Pending),
        paid_at: Set(None),
        ..Default::default()
    };
    let payment = match payment_model.insert(&txn).await {
        Ok(p) => p,
        // Lost a race on source_ref; the other caller's rows stand.
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            txn.rollback().await?;
            let existing = Payment::find()
                .filter(payment::Column::SourceRef.eq(input.source_ref.as_str()))
                .one(db)
                .await?
                .ok_or_else(|| ApiError::Conflict("concurrent distribution".into()))?;
            return Ok(DistributionOutcome {
                payment_id: existing.id,
                amount_cents: existing.amount_cents,
                already_recorded: true,
            });
        }
        Err(e) => return Err(e.into()),
    };

    if split.referral_cents > 0 {
        payment_distribution::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_id: Set(payment.id),
            recipient_type: Set(RecipientType::Referral),
            recipient_id: Set(input.referrer_id),
            amount_cents: Set(split.referral_cents),
            status: Set(PayoutStatus::Pending),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    let worker_distribution = payment_distribution::ActiveModel {
        id: Set(Uuid::new_v4()),
        payment_id: Set(payment.id),
        recipient_type: Set(RecipientType::Employee),
        recipient_id: Set(Some(input.employee_id)),
        amount_cents: Set(split.worker_cents),
        status: Set(PayoutStatus::Pending),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    payment_distribution::ActiveModel {
        id: Set(Uuid::new_v4()),
        payment_id: Set(payment.id),
        recipient_type: Set(RecipientType::Company),
        recipient_id: Set(None),
        amount_cents: Set(split.company_cents),
        status: Set(PayoutStatus::Pending),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    earning::ActiveModel {
        id: Set(Uuid::new_v4()),
        employee_id: Set(input.employee_id),
        distribution_id: Set(worker_distribution.id),
        amount_cents: Set(split.worker_cents),
        status: Set(PayoutStatus::Pending),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    Ok(DistributionOutcome {
        payment_id: payment.id,
        amount_cents: input.amount_cents,
        already_recorded: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn assert_sums(amount: i64, has_referral: bool) {
        let s = split(amount, has_referral).expect("split");
        assert_eq!(
            s.referral_cents + s.worker_cents + s.company_cents,
            amount,
            "split of {amount} (referral: {has_referral}) must sum exactly"
        );
    }

    #[test]
    fn hundred_dollars_no_referral() {
        let s = split(10_000, false).unwrap();
        assert_eq!(s.referral_cents, 0);
        assert_eq!(s.worker_cents, 7_500);
        assert_eq!(s.company_cents, 2_500);
    }

    #[test]
    fn hundred_dollars_with_referral() {
        // $5 off the top, then 75/25 of the $95 remainder
        let s = split(10_000, true).unwrap();
        assert_eq!(s.referral_cents, 500);
        assert_eq!(s.worker_cents, 7_125);
        assert_eq!(s.company_cents, 2_375);
    }

    #[test]
    fn boundary_amounts_sum_exactly() {
        // one cent: worker share floors to zero, remainder to company
        let s = split(1, false).unwrap();
        assert_eq!(s.worker_cents, 0);
        assert_eq!(s.company_cents, 1);

        // exactly the referral fee: nothing left after the deduction
        let s = split(REFERRAL_FEE_CENTS, true).unwrap();
        assert_eq!(s.referral_cents, 500);
        assert_eq!(s.worker_cents, 0);
        assert_eq!(s.company_cents, 0);

        for amount in [1, 3, 7, 99, 501, 1_000_000_001] {
            assert_sums(amount, false);
            if amount >= REFERRAL_FEE_CENTS {
                assert_sums(amount, true);
            }
        }
    }

    #[test]
    fn rejects_non_positive_and_below_fee_amounts() {
        assert!(split(0, false).is_err());
        assert!(split(-100, false).is_err());
        assert!(split(REFERRAL_FEE_CENTS - 1, true).is_err());
    }

    fn payment_row(source_ref: &str, amount: i64) -> payment::Model {
        payment::Model {
            id: Uuid::new_v4(),
            service_id: None,
            source_ref: source_ref.to_string(),
            amount_cents: amount,
            status: PayoutStatus::Pending,
            paid_at: None,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    fn distribution_row(
        payment_id: Uuid,
        recipient_type: RecipientType,
        amount: i64,
    ) -> payment_distribution::Model {
        payment_distribution::Model {
            id: Uuid::new_v4(),
            payment_id,
            recipient_type,
            recipient_id: None,
            amount_cents: amount,
            status: PayoutStatus::Pending,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    fn referral_row(customer_id: Uuid, status: ReferralStatus) -> referral::Model {
        referral::Model {
            id: Uuid::new_v4(),
            referrer_id: Uuid::new_v4(),
            referred_id: customer_id,
            status,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    #[tokio::test]
    async fn referral_fee_requires_a_pending_referral() {
        let customer = Uuid::new_v4();
        let entry = referral_row(customer, ReferralStatus::Pending);
        let referrer = entry.referrer_id;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![entry]])
            .into_connection();
        assert_eq!(
            pending_referrer(&db, customer).await.unwrap(),
            Some(referrer)
        );

        // The lookup must carry the PENDING filter so a processed or paid
        // referral no longer earns a fee.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<referral::Model>::new()])
            .into_connection();
        assert!(pending_referrer(&db, customer).await.unwrap().is_none());
        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("PENDING"), "missing status filter: {log}");
    }

    #[tokio::test]
    async fn repeat_source_ref_short_circuits() {
        let existing = payment_row("service:abc", 10_000);
        let payment_id = existing.id;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing]])
            .into_connection();

        let outcome = record_distribution(
            &db,
            DistributionInput {
                source_ref: "service:abc".to_string(),
                service_id: None,
                amount_cents: 10_000,
                employee_id: Uuid::new_v4(),
                has_referral: false,
                referrer_id: None,
            },
        )
        .await
        .unwrap();

        assert!(outcome.already_recorded);
        assert_eq!(outcome.payment_id, payment_id);
    }

    #[tokio::test]
    async fn creates_payment_distributions_and_earning() {
        let employee_id = Uuid::new_v4();
        let payment = payment_row("service:xyz", 10_000);
        let payment_id = payment.id;
        let worker_dist = distribution_row(payment_id, RecipientType::Employee, 7_500);
        let company_dist = distribution_row(payment_id, RecipientType::Company, 2_500);
        let earning_row = earning::Model {
            id: Uuid::new_v4(),
            employee_id,
            distribution_id: worker_dist.id,
            amount_cents: 7_500,
            status: PayoutStatus::Pending,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        };

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<payment::Model>::new()])
            .append_query_results([vec![payment]])
            .append_query_results([vec![worker_dist]])
            .append_query_results([vec![company_dist]])
            .append_query_results([vec![earning_row]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let outcome = record_distribution(
            &db,
            DistributionInput {
                source_ref: "service:xyz".to_string(),
                service_id: None,
                amount_cents: 10_000,
                employee_id,
                has_referral: false,
                referrer_id: None,
            },
        )
        .await
        .unwrap();

        assert!(!outcome.already_recorded);
        assert_eq!(outcome.payment_id, payment_id);
        assert_eq!(outcome.amount_cents, 10_000);
    }
}
