use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create Account Table
        let table = table_auto(Account::Table)
            .col(pk_uuid(Account::Id))
            .col(string(Account::Role))
            .col(string(Account::Name))
            .col(string_uniq(Account::Email))
            .col(string(Account::ZipCode))
            .col(string_uniq(Account::TokenHash))
            .col(string_null(Account::ReferralCode))
            .col(boolean(Account::IsActive).default(true))
            .to_owned();
        manager.create_table(table).await?;

        // Create CoverageArea Table
        let table = table_auto(CoverageArea::Table)
            .col(pk_uuid(CoverageArea::Id))
            .col(uuid(CoverageArea::EmployeeId))
            .col(string(CoverageArea::ZipCode))
            .col(double(CoverageArea::Latitude))
            .col(double(CoverageArea::Longitude))
            .col(double(CoverageArea::RadiusMiles))
            .col(boolean(CoverageArea::IsActive).default(true))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_coverage_area_employee")
                    .from(CoverageArea::Table, CoverageArea::EmployeeId)
                    .to(Account::Table, Account::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        // Create Service Table
        let table = table_auto(Service::Table)
            .col(pk_uuid(Service::Id))
            .col(uuid(Service::CustomerId))
            .col(uuid_null(Service::EmployeeId))
            .col(string(Service::Status))
            .col(date(Service::ScheduledDate))
            .col(timestamp(Service::ScheduledAt))
            .col(boolean(Service::IsLocked).default(true))
            .col(timestamp_null(Service::UnlockedAt))
            .col(timestamp_null(Service::ClaimedAt))
            .col(timestamp_null(Service::ArrivalDeadline))
            .col(timestamp_null(Service::ArrivedAt))
            .col(timestamp_null(Service::CompletedAt))
            .col(big_integer(Service::PotentialEarningsCents))
            .col(string(Service::ZipCode))
            .col(boolean(Service::IsRated).default(false))
            .col(string_null(Service::CancellationReason))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_service_customer")
                    .from(Service::Table, Service::CustomerId)
                    .to(Account::Table, Account::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_service_employee")
                    .from(Service::Table, Service::EmployeeId)
                    .to(Account::Table, Account::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .to_owned();
        manager.create_table(table).await?;

        // Create Notification Table
        let table = table_auto(Notification::Table)
            .col(pk_uuid(Notification::Id))
            .col(uuid(Notification::RecipientId))
            .col(string(Notification::Kind))
            .col(string(Notification::Body))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_notification_recipient")
                    .from(Notification::Table, Notification::RecipientId)
                    .to(Account::Table, Account::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        // Create indices for common lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_service_status")
                    .table(Service::Table)
                    .col(Service::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_service_scheduled_date")
                    .table(Service::Table)
                    .col(Service::ScheduledDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_coverage_area_employee")
                    .table(CoverageArea::Table)
                    .col(CoverageArea::EmployeeId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop all tables in reverse order to avoid foreign key constraints
        manager
            .drop_table(Table::drop().table(Notification::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Service::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(CoverageArea::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Account::Table).to_owned())
            .await?;

        Ok(())
    }
}
