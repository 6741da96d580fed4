//! Notification fan-out. The row insert is the primary effect; webhook
//! dispatch is fire-and-forget with its own log path, so a delivery failure
//! never masks the state change that triggered it.

use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use sea_orm::DatabaseConnection;
use std::time::Duration;
use uuid::Uuid;

use crate::entities::{
    account::{self, Role},
    notification,
    prelude::Account,
};
use crate::error::ApiError;

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    /// Persist the notification, then dispatch without blocking the caller.
    /// The persisted row stays visible for the next poll if dispatch fails.
    pub async fn send(
        &self,
        db: &DatabaseConnection,
        recipient_id: Uuid,
        kind: &str,
        body: String,
    ) -> Result<(), ApiError> {
        notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            recipient_id: Set(recipient_id),
            kind: Set(kind.to_string()),
            body: Set(body.clone()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        if let Some(url) = self.webhook_url.clone() {
            let client = self.client.clone();
            let kind = kind.to_string();
            tokio::spawn(async move {
                let payload = serde_json::json!({
                    "recipient_id": recipient_id,
                    "kind": kind,
                    "body": body,
                });
                let result = client
                    .post(&url)
                    .json(&payload)
                    .timeout(DISPATCH_TIMEOUT)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());
                if let Err(e) = result {
                    tracing::error!(recipient_id = %recipient_id, kind, "notification dispatch failed: {e}");
                }
            });
        }

        Ok(())
    }

    /// One notification per active admin.
    pub async fn notify_admins(
        &self,
        db: &DatabaseConnection,
        kind: &str,
        body: &str,
    ) -> Result<(), ApiError> {
        let admins = Account::find()
            .filter(account::Column::Role.eq(Role::Admin))
            .filter(account::Column::IsActive.eq(true))
            .all(db)
            .await?;

        for admin in admins {
            self.send(db, admin.id, kind, body.to_string()).await?;
        }

        Ok(())
    }
}
