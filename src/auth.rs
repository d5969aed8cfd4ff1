//! Session extraction and role guards.
//!
//! Authentication itself is owned by the hosted auth layer; this service
//! only resolves bearer tokens against the `sessions` table and derives
//! role flags from the cached profile. Guard failures answer 401/403,
//! the API equivalent of the SPA's redirect-only remediation.

use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::Profile;
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// An authenticated caller: resolved session plus the cached profile.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub token: String,
    pub profile: Profile,
}

impl AuthSession {
    pub fn is_admin(&self) -> bool {
        self.profile.is_admin()
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("admin role required".to_string()))
        }
    }

    pub fn require_sales_or_admin(&self) -> Result<(), AppError> {
        if self.is_admin() || self.profile.is_sales() {
            Ok(())
        } else {
            Err(AppError::Forbidden("sales role required".to_string()))
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

async fn resolve_session(pool: &PgPool, token: &str) -> Result<Uuid, AppError> {
    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT user_id, expires_at FROM sessions WHERE token = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Unauthorized("unknown session token".to_string()))?;

    if row.expires_at <= Utc::now() {
        return Err(AppError::Unauthorized("session expired".to_string()));
    }
    Ok(row.user_id)
}

fn bearer_token(parts: &Parts) -> Result<String, AppError> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let user_id = resolve_session(&state.db, &token).await?;

        let profile = state
            .profile_cache
            .get_or_load(&state.db, user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("profile not found for session".to_string()))?;

        Ok(AuthSession {
            user_id,
            token,
            profile,
        })
    }
}

/// Deletes the session row and drops the cached profile. Sign-out is one
/// of the cache's three invalidation triggers.
pub async fn sign_out(state: &AppState, session: &AuthSession) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(&session.token)
        .execute(&state.db)
        .await?;
    state.profile_cache.invalidate(session.user_id).await;
    tracing::info!("Signed out user {}", session.user_id);
    Ok(())
}
