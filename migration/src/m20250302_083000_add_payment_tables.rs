use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create Payment Table. SourceRef is the idempotency key: repeat
        // distribution calls for the same source must not create a second row.
        let table = table_auto(Payment::Table)
            .col(pk_uuid(Payment::Id))
            .col(uuid_null(Payment::ServiceId))
            .col(string_uniq(Payment::SourceRef))
            .col(big_integer(Payment::AmountCents))
            .col(string(Payment::Status))
            .col(timestamp_null(Payment::PaidAt))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_payment_service")
                    .from(Payment::Table, Payment::ServiceId)
                    .to(Service::Table, Service::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .to_owned();
        manager.create_table(table).await?;

        // Create PaymentDistribution Table
        let table = table_auto(PaymentDistribution::Table)
            .col(pk_uuid(PaymentDistribution::Id))
            .col(uuid(PaymentDistribution::PaymentId))
            .col(string(PaymentDistribution::RecipientType))
            .col(uuid_null(PaymentDistribution::RecipientId))
            .col(big_integer(PaymentDistribution::AmountCents))
            .col(string(PaymentDistribution::Status))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_distribution_payment")
                    .from(PaymentDistribution::Table, PaymentDistribution::PaymentId)
                    .to(Payment::Table, Payment::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        // Create Earning Table (one per employee distribution)
        let table = table_auto(Earning::Table)
            .col(pk_uuid(Earning::Id))
            .col(uuid(Earning::EmployeeId))
            .col(uuid_uniq(Earning::DistributionId))
            .col(big_integer(Earning::AmountCents))
            .col(string(Earning::Status))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_earning_employee")
                    .from(Earning::Table, Earning::EmployeeId)
                    .to(Account::Table, Account::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_earning_distribution")
                    .from(Earning::Table, Earning::DistributionId)
                    .to(PaymentDistribution::Table, PaymentDistribution::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        // Create Referral Table (a customer can be referred at most once)
        let table = table_auto(Referral::Table)
            .col(pk_uuid(Referral::Id))
            .col(uuid(Referral::ReferrerId))
            .col(uuid_uniq(Referral::ReferredId))
            .col(string(Referral::Status))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_referral_referrer")
                    .from(Referral::Table, Referral::ReferrerId)
                    .to(Account::Table, Account::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_referral_referred")
                    .from(Referral::Table, Referral::ReferredId)
                    .to(Account::Table, Account::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        // Create UnlockRun Table (audit record, one per day)
        let table = table_auto(UnlockRun::Table)
            .col(pk_uuid(UnlockRun::Id))
            .col(date_uniq(UnlockRun::RunDate))
            .col(big_integer(UnlockRun::UnlockedCount))
            .col(boolean(UnlockRun::Succeeded))
            .col(string_null(UnlockRun::Message))
            .to_owned();
        manager.create_table(table).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_distribution_payment")
                    .table(PaymentDistribution::Table)
                    .col(PaymentDistribution::PaymentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_earning_employee")
                    .table(Earning::Table)
                    .col(Earning::EmployeeId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UnlockRun::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Referral::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Earning::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(PaymentDistribution::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Payment::Table).to_owned())
            .await?;

        Ok(())
    }
}
