//! Conversion-tracking events. Writes are best-effort: a failed event
//! never blocks or fails the user-facing operation that produced it.

use crate::errors::{AppError, ResultExt};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

pub struct TrackingStore {
    pool: PgPool,
}

impl TrackingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn record(
        &self,
        user_id: Uuid,
        event_type: &str,
        application_id: Option<Uuid>,
        metadata: Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO tracking_events (user_id, event_type, application_id, metadata)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(event_type)
        .bind(application_id)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .context("recording tracking event")?;
        Ok(())
    }

    /// Step-completed event, emitted after each successful advance.
    pub async fn step_completed(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        step_index: usize,
        step_name: &str,
        order_code: Option<&str>,
    ) {
        let metadata = serde_json::json!({
            "step": step_index,
            "step_name": step_name,
            "order_code": order_code,
        });
        if let Err(e) = self
            .record(user_id, "application_step_completed", Some(application_id), metadata)
            .await
        {
            tracing::warn!("Failed to record step-completed event: {}", e);
        }
    }

    /// Submitted event, emitted after the final write succeeds.
    pub async fn application_submitted(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        order_code: &str,
        recommended_bank: &str,
    ) {
        let metadata = serde_json::json!({
            "order_code": order_code,
            "recommended_bank": recommended_bank,
        });
        if let Err(e) = self
            .record(user_id, "application_submitted", Some(application_id), metadata)
            .await
        {
            tracing::warn!("Failed to record submitted event: {}", e);
        }
    }
}
