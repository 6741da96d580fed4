use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create ServiceChecklist Table (one per service)
        let table = table_auto(ServiceChecklist::Table)
            .col(pk_uuid(ServiceChecklist::Id))
            .col(uuid_uniq(ServiceChecklist::ServiceId))
            .col(boolean(ServiceChecklist::GateClosed))
            .col(boolean(ServiceChecklist::CornersChecked))
            .col(boolean(ServiceChecklist::WasteRemoved))
            .col(timestamp(ServiceChecklist::CompletedAt))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_checklist_service")
                    .from(ServiceChecklist::Table, ServiceChecklist::ServiceId)
                    .to(Service::Table, Service::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        // Create ServicePhoto Table
        let table = table_auto(ServicePhoto::Table)
            .col(pk_uuid(ServicePhoto::Id))
            .col(uuid(ServicePhoto::ServiceId))
            .col(string(ServicePhoto::Url))
            .col(string(ServicePhoto::Kind))
            .col(double_null(ServicePhoto::Latitude))
            .col(double_null(ServicePhoto::Longitude))
            .col(timestamp_null(ServicePhoto::ExpiresAt))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_photo_service")
                    .from(ServicePhoto::Table, ServicePhoto::ServiceId)
                    .to(Service::Table, Service::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        // Create ServiceRating Table (one per service)
        let table = table_auto(ServiceRating::Table)
            .col(pk_uuid(ServiceRating::Id))
            .col(uuid_uniq(ServiceRating::ServiceId))
            .col(uuid(ServiceRating::CustomerId))
            .col(small_integer(ServiceRating::Rating))
            .col(string_null(ServiceRating::Feedback))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_rating_service")
                    .from(ServiceRating::Table, ServiceRating::ServiceId)
                    .to(Service::Table, Service::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_rating_customer")
                    .from(ServiceRating::Table, ServiceRating::CustomerId)
                    .to(Account::Table, Account::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_photo_service")
                    .table(ServicePhoto::Table)
                    .col(ServicePhoto::ServiceId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ServiceRating::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ServicePhoto::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ServiceChecklist::Table).to_owned())
            .await?;

        Ok(())
    }
}
