//! Shared state and the applicant-facing HTTP handlers.

use crate::applications::ApplicationStore;
use crate::auth::{sign_out, AuthSession};
use crate::bank_profiling::BankProfileStore;
use crate::config::Config;
use crate::documents::{sign_documents, verify_signature, DocumentStore, SignedDocument};
use crate::errors::AppError;
use crate::models::{
    AdvanceRequest, AdvanceResponse, ApplicationSummary, BankProfile, CarInfo, EnterWizardRequest,
    FinancingApplication, Profile, RecordDocumentRequest, SaveBankProfileRequest,
    SelectVehicleRequest, SubmitRequest, UploadedDocument,
};
use crate::notifications::EmailClient;
use crate::profiles::ProfileCache;
use crate::status::ApplicationStatus;
use crate::wizard::{EnterResponse, SubmitResponse, WizardService};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Shared application state.
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub email_client: Option<EmailClient>,
    pub profile_cache: ProfileCache,
    /// Order codes remembered across the entry-gate remediation detour,
    /// keyed by user. Short-lived by design.
    pub pending_orders: Cache<Uuid, String>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let email_client = EmailClient::from_config(&config);
        Self {
            db,
            config,
            email_client,
            profile_cache: ProfileCache::new(),
            pending_orders: Cache::builder()
                .time_to_live(Duration::from_secs(3600))
                .max_capacity(10_000)
                .build(),
        }
    }
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    Json(json!({
        "status": if db_ok { "healthy" } else { "degraded" },
        "database": db_ok,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============ Session ============

pub async fn get_profile(session: AuthSession) -> Json<Profile> {
    Json(session.profile)
}

pub async fn signout(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<StatusCode, AppError> {
    sign_out(&state, &session).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Wizard ============

pub async fn enter_wizard(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(request): Json<EnterWizardRequest>,
) -> Result<Json<EnterResponse>, AppError> {
    let response = WizardService::from_state(&state)
        .enter(&session.profile, &request)
        .await?;
    Ok(Json(response))
}

pub async fn advance_step(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(application_id): Path<Uuid>,
    Json(request): Json<AdvanceRequest>,
) -> Result<Json<AdvanceResponse>, AppError> {
    let response = WizardService::from_state(&state)
        .advance(&session.profile, application_id, &request)
        .await?;
    Ok(Json(response))
}

pub async fn select_vehicle(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(application_id): Path<Uuid>,
    Json(request): Json<SelectVehicleRequest>,
) -> Result<Json<CarInfo>, AppError> {
    let car_info = WizardService::from_state(&state)
        .select_vehicle(&session.profile, application_id, &request.order_code)
        .await?;
    Ok(Json(car_info))
}

pub async fn submit_application(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(application_id): Path<Uuid>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    let response = WizardService::from_state(&state)
        .submit(&session.profile, application_id, &request)
        .await?;
    Ok(Json(response))
}

// ============ Applications ============

pub async fn list_applications(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<Json<Vec<ApplicationSummary>>, AppError> {
    let apps = ApplicationStore::new(state.db.clone())
        .list_for_user(session.user_id)
        .await?;
    Ok(Json(apps))
}

pub async fn latest_application(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<Json<Option<ApplicationSummary>>, AppError> {
    let app = ApplicationStore::new(state.db.clone())
        .latest_for_user(session.user_id)
        .await?;
    Ok(Json(app))
}

pub async fn get_application(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(application_id): Path<Uuid>,
) -> Result<Json<FinancingApplication>, AppError> {
    let app = ApplicationStore::new(state.db.clone())
        .get_by_id(session.user_id, application_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Solicitud no encontrada.".to_string()))?;
    Ok(Json(app))
}

/// Deletes an abandoned draft. Submitted applications are never deleted
/// through the API.
pub async fn delete_draft(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(application_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let store = ApplicationStore::new(state.db.clone());
    let app = store
        .get_by_id(session.user_id, application_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Solicitud no encontrada.".to_string()))?;
    if app.status != ApplicationStatus::Draft.as_str() {
        return Err(AppError::Conflict(
            "Solo los borradores pueden eliminarse.".to_string(),
        ));
    }
    store.delete(session.user_id, application_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Documents ============

pub async fn list_application_documents(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(application_id): Path<Uuid>,
) -> Result<Json<Vec<SignedDocument>>, AppError> {
    require_application_access(&state, &session, application_id).await?;
    let docs = DocumentStore::new(state.db.clone())
        .list_for_application(application_id)
        .await?;
    let signed = sign_documents(
        docs,
        &state.config.site_base_url,
        &state.config.document_url_secret,
        state.config.document_url_ttl_secs,
    );
    Ok(Json(signed))
}

pub async fn record_document(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(application_id): Path<Uuid>,
    Json(request): Json<RecordDocumentRequest>,
) -> Result<(StatusCode, Json<UploadedDocument>), AppError> {
    require_application_access(&state, &session, application_id).await?;
    let doc = DocumentStore::new(state.db.clone())
        .record_upload(
            application_id,
            session.user_id,
            &request.file_name,
            &request.file_path,
            request.document_type.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub path: String,
    pub expires: i64,
    pub signature: String,
}

/// Validates a signed download link. The storage edge serves the bytes;
/// this endpoint only vouches for the signature.
pub async fn resolve_download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Json<Value>, AppError> {
    verify_signature(
        &query.path,
        query.expires,
        &query.signature,
        &state.config.document_url_secret,
    )?;
    Ok(Json(json!({ "path": query.path })))
}

async fn require_application_access(
    state: &AppState,
    session: &AuthSession,
    application_id: Uuid,
) -> Result<(), AppError> {
    if session.is_admin() {
        return Ok(());
    }
    ApplicationStore::new(state.db.clone())
        .get_by_id(session.user_id, application_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Solicitud no encontrada.".to_string()))?;
    Ok(())
}

// ============ Bank profiling ============

pub async fn get_bank_profile(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<Json<Option<BankProfile>>, AppError> {
    let profile = BankProfileStore::new(state.db.clone())
        .get(session.user_id)
        .await?;
    Ok(Json(profile))
}

pub async fn save_bank_profile(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(request): Json<SaveBankProfileRequest>,
) -> Result<Json<BankProfile>, AppError> {
    if request.recommended_bank.trim().is_empty() {
        return Err(AppError::BadRequest(
            "recommended_bank cannot be empty".to_string(),
        ));
    }
    let profile = BankProfileStore::new(state.db.clone())
        .save(
            session.user_id,
            &request.answers,
            request.recommended_bank.trim(),
            request.second_choice_bank.as_deref(),
        )
        .await?;
    Ok(Json(profile))
}
