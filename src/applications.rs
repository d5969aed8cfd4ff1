//! Persistence for financing application drafts and submissions.

use crate::errors::{AppError, ResultExt};
use crate::models::{ApplicationSummary, FinancingApplication};
use crate::status::{ApplicationStatus, ACTIVE_STATUSES};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// Store for the `financing_applications` table.
///
/// The wizard mutates drafts through this store only; nothing here
/// hard-deletes a submitted application.
pub struct ApplicationStore {
    pool: PgPool,
}

impl ApplicationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a new draft, optionally seeded with a vehicle snapshot and
    /// initial answers.
    pub async fn create_draft(
        &self,
        user_id: Uuid,
        car_info: Option<&Value>,
        application_data: Option<&Value>,
    ) -> Result<FinancingApplication, AppError> {
        let draft = sqlx::query_as::<_, FinancingApplication>(
            r#"
            INSERT INTO financing_applications (id, user_id, status, car_info, application_data)
            VALUES ($1, $2, 'draft', $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(car_info)
        .bind(application_data)
        .fetch_one(&self.pool)
        .await
        .context("creating draft application")?;

        tracing::info!("Created draft application {} for user {}", draft.id, user_id);
        Ok(draft)
    }

    /// Loads an application by id, scoped to its owner.
    pub async fn get_by_id(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<Option<FinancingApplication>, AppError> {
        let app = sqlx::query_as::<_, FinancingApplication>(
            "SELECT * FROM financing_applications WHERE user_id = $1 AND id = $2",
        )
        .bind(user_id)
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading application by id")?;
        Ok(app)
    }

    /// All applications belonging to a user, newest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ApplicationSummary>, AppError> {
        let rows = sqlx::query_as::<_, ApplicationSummary>(
            r#"
            SELECT id, status, car_info, created_at, updated_at
            FROM financing_applications
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("listing user applications")?;
        Ok(rows)
    }

    /// The user's most recent application, if any.
    pub async fn latest_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ApplicationSummary>, AppError> {
        let row = sqlx::query_as::<_, ApplicationSummary>(
            r#"
            SELECT id, status, car_info, created_at, updated_at
            FROM financing_applications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading latest application")?;
        Ok(row)
    }

    /// True when the user already has a submitted, undecided application.
    /// Drafts do not count as active.
    pub async fn has_active_application(&self, user_id: Uuid) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM financing_applications
                WHERE user_id = $1 AND status = ANY($2)
            )
            "#,
        )
        .bind(user_id)
        .bind(&ACTIVE_STATUSES[..])
        .fetch_one(&self.pool)
        .await
        .context("checking for active applications")?;
        Ok(exists)
    }

    /// Persists a partial draft update (car_info and/or answer snapshot).
    pub async fn save_draft(
        &self,
        application_id: Uuid,
        car_info: Option<&Value>,
        application_data: Option<&Value>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE financing_applications
            SET car_info = COALESCE($2, car_info),
                application_data = COALESCE($3, application_data),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(application_id)
        .bind(car_info)
        .bind(application_data)
        .execute(&self.pool)
        .await
        .context("saving application draft")?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "No encontramos el borrador de tu solicitud.".to_string(),
            ));
        }
        Ok(())
    }

    /// Final submission write: full payload plus the status transition out
    /// of `draft`. A unique-violation from the backend's one-active-per-user
    /// constraint is surfaced as a conflict.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit(
        &self,
        application_id: Uuid,
        personal_info_snapshot: &Value,
        car_info: &Value,
        application_data: &Value,
        selected_banks: &Value,
        status: ApplicationStatus,
    ) -> Result<FinancingApplication, AppError> {
        let result = sqlx::query_as::<_, FinancingApplication>(
            r#"
            UPDATE financing_applications
            SET personal_info_snapshot = $2,
                car_info = $3,
                application_data = $4,
                selected_banks = $5,
                status = $6,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(application_id)
        .bind(personal_info_snapshot)
        .bind(car_info)
        .bind(application_data)
        .bind(selected_banks)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(app) => Ok(app),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict(
                "Ya tienes una solicitud activa. Solo puedes tener una solicitud a la vez."
                    .to_string(),
            )),
            Err(e) => Err(AppError::DatabaseError(e)).context("submitting application"),
        }
    }

    /// Sets the application status, skipping the write when unchanged.
    pub async fn update_status(
        &self,
        application_id: Uuid,
        status: ApplicationStatus,
    ) -> Result<(), AppError> {
        let current = sqlx::query_scalar::<_, String>(
            "SELECT status FROM financing_applications WHERE id = $1",
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await
        .context("reading current application status")?;

        match current {
            None => Ok(()),
            Some(ref s) if s == status.as_str() => Ok(()),
            Some(_) => {
                sqlx::query(
                    "UPDATE financing_applications SET status = $2, updated_at = now() WHERE id = $1",
                )
                .bind(application_id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await
                .context("updating application status")?;
                Ok(())
            }
        }
    }

    /// Owner-scoped deletion, used only for abandoned drafts.
    pub async fn delete(&self, user_id: Uuid, application_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM financing_applications WHERE id = $1 AND user_id = $2")
            .bind(application_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("deleting application")?;
        Ok(())
    }
}
