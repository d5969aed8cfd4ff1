//! Bank-profiling results: one recommended bank per user, produced by an
//! external scoring flow and required before the wizard opens.

use crate::errors::{AppError, ResultExt};
use crate::models::BankProfile;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

pub struct BankProfileStore {
    pool: PgPool,
}

impl BankProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: Uuid) -> Result<Option<BankProfile>, AppError> {
        let profile =
            sqlx::query_as::<_, BankProfile>("SELECT * FROM bank_profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .context("fetching bank profile")?;
        Ok(profile)
    }

    /// Upserts the profiling outcome, marking it complete.
    pub async fn save(
        &self,
        user_id: Uuid,
        answers: &Value,
        recommended_bank: &str,
        second_choice_bank: Option<&str>,
    ) -> Result<BankProfile, AppError> {
        let profile = sqlx::query_as::<_, BankProfile>(
            r#"
            INSERT INTO bank_profiles (user_id, answers, recommended_bank, second_choice_bank, is_complete)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (user_id) DO UPDATE
            SET answers = EXCLUDED.answers,
                recommended_bank = EXCLUDED.recommended_bank,
                second_choice_bank = EXCLUDED.second_choice_bank,
                is_complete = TRUE,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(answers)
        .bind(recommended_bank)
        .bind(second_choice_bank)
        .fetch_one(&self.pool)
        .await
        .context("saving bank profile")?;
        Ok(profile)
    }

    /// Complete means the scoring ran to the end AND produced a
    /// recommendation; either alone is not enough to open the wizard.
    pub async fn completed_recommendation(
        &self,
        user_id: Uuid,
    ) -> Result<Option<String>, AppError> {
        let profile = self.get(user_id).await?;
        Ok(profile
            .filter(|p| p.is_complete)
            .and_then(|p| p.recommended_bank)
            .filter(|b| !b.trim().is_empty()))
    }
}
