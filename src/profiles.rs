//! Profile reads/writes and the session-scoped profile cache.

use crate::errors::{AppError, ResultExt};
use crate::models::{Profile, ProfileAddressUpdate};
use moka::future::Cache;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

/// Store for the `profiles` table.
pub struct ProfileStore {
    pool: PgPool,
}

impl ProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching profile")?;
        Ok(profile)
    }

    /// Writes back the address fields the applicant edited during the
    /// wizard. Other profile fields are never touched by this subsystem.
    pub async fn update_address(
        &self,
        user_id: Uuid,
        update: &ProfileAddressUpdate,
    ) -> Result<Profile, AppError> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles
            SET address = COALESCE($2, address),
                colony = COALESCE($3, colony),
                city = COALESCE($4, city),
                state = COALESCE($5, state),
                zip_code = COALESCE($6, zip_code),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(update.address.as_deref())
        .bind(update.colony.as_deref())
        .bind(update.city.as_deref())
        .bind(update.state.as_deref())
        .bind(update.zip_code.as_deref())
        .fetch_optional(&self.pool)
        .await
        .context("updating profile address")?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
        Ok(profile)
    }

    /// Assigns the least-recently-used active advisor to the user and
    /// links it on the profile. Mirrors the backend's `assign_advisor`
    /// procedure: balance by `last_assigned_at`.
    pub async fn assign_advisor(&self, user_id: Uuid) -> Result<Option<Uuid>, AppError> {
        let advisor_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE advisors
            SET last_assigned_at = now()
            WHERE id = (
                SELECT id FROM advisors
                WHERE is_active
                ORDER BY last_assigned_at ASC NULLS FIRST
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("selecting next advisor")?;

        if let Some(advisor_id) = advisor_id {
            sqlx::query("UPDATE profiles SET assigned_advisor_id = $2 WHERE id = $1")
                .bind(user_id)
                .bind(advisor_id)
                .execute(&self.pool)
                .await
                .context("linking advisor to profile")?;
            tracing::info!("Assigned advisor {} to user {}", advisor_id, user_id);
        } else {
            tracing::warn!("No active advisor available for user {}", user_id);
        }
        Ok(advisor_id)
    }

    /// Email and name of the advisor assigned to a profile, for the
    /// submission notification.
    pub async fn advisor_contact(
        &self,
        advisor_id: Uuid,
    ) -> Result<Option<(String, String)>, AppError> {
        let row = sqlx::query_as::<_, (Option<String>, Option<String>, Option<String>)>(
            "SELECT email, first_name, last_name FROM advisors WHERE id = $1",
        )
        .bind(advisor_id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching advisor contact")?;

        Ok(row.and_then(|(email, first, last)| {
            let email = email?;
            let name = format!(
                "{} {}",
                first.unwrap_or_default(),
                last.unwrap_or_default()
            )
            .trim()
            .to_string();
            Some((email, name))
        }))
    }
}

/// Session-scoped profile cache with an explicit invalidation API.
///
/// Replaces the SPA's ambient session-storage cache: injected through
/// `AppState`, invalidated on sign-out, role change, and explicit reload,
/// and refreshed wholesale (no field-level updates).
#[derive(Clone)]
pub struct ProfileCache {
    cache: Cache<Uuid, Profile>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(1800))
                .max_capacity(10_000)
                .build(),
        }
    }

    /// Cached profile, loading from the database on miss. A role mismatch
    /// between cached and stored rows drops the stale entry.
    pub async fn get_or_load(
        &self,
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<Profile>, AppError> {
        if let Some(cached) = self.cache.get(&user_id).await {
            return Ok(Some(cached));
        }
        let store = ProfileStore::new(pool.clone());
        let profile = store.get(user_id).await?;
        if let Some(ref p) = profile {
            self.cache.insert(user_id, p.clone()).await;
        }
        Ok(profile)
    }

    /// Replaces the cached entry after a profile write.
    pub async fn refresh(&self, profile: Profile) {
        self.cache.insert(profile.id, profile).await;
    }

    /// Drops one user's entry (sign-out, role change, explicit reload).
    pub async fn invalidate(&self, user_id: Uuid) {
        self.cache.invalidate(&user_id).await;
    }
}

impl Default for ProfileCache {
    fn default() -> Self {
        Self::new()
    }
}
