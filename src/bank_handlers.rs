//! Bank portal and admin CRM handlers.

use crate::auth::AuthSession;
use crate::banks::{BankPortalService, LeadDetail};
use crate::documents::{sign_documents, DocumentStore, SignedDocument};
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{
    AddFeedbackRequest, ApproveBankRepRequest, AssignLeadRequest, AssignedLead, BankAssignment,
    BankFeedback, BankRepDashboardStats, BankRepProfile, PinRequest, RegisterBankRepRequest,
    UpdateAssignmentStatusRequest,
};
use crate::status::AssignmentStatus;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

fn portal(state: &AppState) -> BankPortalService {
    BankPortalService::new(state.db.clone())
}

// ============ Rep accounts ============

pub async fn register_rep(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(request): Json<RegisterBankRepRequest>,
) -> Result<(StatusCode, Json<BankRepProfile>), AppError> {
    let rep = portal(&state).register_rep(session.user_id, &request).await?;
    Ok((StatusCode::CREATED, Json(rep)))
}

/// The rep's own portal profile. Counts as a portal entry, so the login
/// counter is bumped here.
pub async fn rep_me(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<Json<BankRepProfile>, AppError> {
    let service = portal(&state);
    let rep = service
        .get_rep(session.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Representante no encontrado.".to_string()))?;
    service.record_login(rep.id).await?;
    Ok(Json(rep))
}

pub async fn complete_onboarding(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<StatusCode, AppError> {
    let service = portal(&state);
    let rep = service.require_approved_rep(session.user_id).await?;
    service.complete_onboarding(rep.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Dashboard and leads ============

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<Json<BankRepDashboardStats>, AppError> {
    let service = portal(&state);
    let rep = service.require_approved_rep(session.user_id).await?;
    let stats = service.dashboard_stats(rep.id).await?;
    Ok(Json(stats))
}

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<Json<Vec<AssignedLead>>, AppError> {
    let service = portal(&state);
    let rep = service.require_approved_rep(session.user_id).await?;
    let leads = service.assigned_leads(rep.id).await?;
    Ok(Json(leads))
}

#[derive(Debug, Serialize)]
pub struct LeadDetailResponse {
    #[serde(flatten)]
    pub detail: LeadDetail,
    /// Empty unless the review PIN was supplied and verified.
    pub documents: Vec<SignedDocument>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadDetailQuery {
    /// Review PIN, unlocks signed document URLs in the response.
    pub pin: Option<String>,
}

pub async fn lead_detail(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(assignment_id): Path<Uuid>,
    Query(query): Query<LeadDetailQuery>,
) -> Result<Json<LeadDetailResponse>, AppError> {
    let service = portal(&state);
    let rep = service.require_approved_rep(session.user_id).await?;
    let detail = service.lead_detail(rep.id, assignment_id).await?;

    // Client documents stay locked behind the step-up PIN. A wrong PIN
    // is an error; an absent one just omits the documents.
    let documents = match (&query.pin, detail.assignment.application_id) {
        (Some(pin), Some(app_id)) => {
            service.verify_pin(&rep, pin)?;
            let docs = DocumentStore::new(state.db.clone())
                .list_for_application(app_id)
                .await?;
            sign_documents(
                docs,
                &state.config.site_base_url,
                &state.config.document_url_secret,
                state.config.document_url_ttl_secs,
            )
        }
        _ => Vec::new(),
    };

    Ok(Json(LeadDetailResponse { detail, documents }))
}

/// Status decision on an assignment. Requires the rep's review PIN.
pub async fn update_assignment_status(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(assignment_id): Path<Uuid>,
    Json(request): Json<UpdateAssignmentStatusRequest>,
) -> Result<Json<BankAssignment>, AppError> {
    let service = portal(&state);
    let rep = service.require_approved_rep(session.user_id).await?;
    service.verify_pin(&rep, &request.pin)?;

    let status = AssignmentStatus::parse(&request.status).ok_or_else(|| {
        AppError::BadRequest(format!("Unknown assignment status: {}", request.status))
    })?;

    let updated = service
        .update_assignment_status(
            &rep,
            assignment_id,
            status,
            request.feedback_message.as_deref(),
        )
        .await?;
    Ok(Json(updated))
}

pub async fn add_feedback(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(request): Json<AddFeedbackRequest>,
) -> Result<(StatusCode, Json<BankFeedback>), AppError> {
    let service = portal(&state);
    let rep = service.require_approved_rep(session.user_id).await?;
    let feedback = service
        .add_feedback(&rep, request.lead_id, &request.message, &request.feedback_type)
        .await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

// ============ Review PIN ============

pub async fn set_pin(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(request): Json<PinRequest>,
) -> Result<StatusCode, AppError> {
    let service = portal(&state);
    let rep = service.require_approved_rep(session.user_id).await?;
    service.set_pin(rep.id, &request.pin).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn verify_pin(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(request): Json<PinRequest>,
) -> Result<StatusCode, AppError> {
    let service = portal(&state);
    let rep = service.require_approved_rep(session.user_id).await?;
    service.verify_pin(&rep, &request.pin)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Admin ============

pub async fn pending_reps(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<Json<Vec<BankRepProfile>>, AppError> {
    session.require_admin()?;
    let reps = portal(&state).pending_reps().await?;
    Ok(Json(reps))
}

#[derive(Debug, Deserialize)]
pub struct RepsByBankQuery {
    pub bank: String,
}

pub async fn reps_by_bank(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Query(query): Query<RepsByBankQuery>,
) -> Result<Json<Vec<BankRepProfile>>, AppError> {
    session.require_sales_or_admin()?;
    let reps = portal(&state).reps_by_bank(&query.bank).await?;
    Ok(Json(reps))
}

pub async fn approve_rep(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(rep_id): Path<Uuid>,
    Json(request): Json<ApproveBankRepRequest>,
) -> Result<StatusCode, AppError> {
    session.require_admin()?;
    portal(&state).approve_rep(rep_id, request.approved).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_lead(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(request): Json<AssignLeadRequest>,
) -> Result<(StatusCode, Json<BankAssignment>), AppError> {
    session.require_sales_or_admin()?;
    let assignment = portal(&state).assign_lead(session.user_id, &request).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

pub async fn lead_feedback(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(lead_id): Path<Uuid>,
) -> Result<Json<Vec<BankFeedback>>, AppError> {
    session.require_sales_or_admin()?;
    let feedback = portal(&state).feedback_for_lead(lead_id).await?;
    Ok(Json(feedback))
}

pub async fn mark_feedback_read(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(feedback_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session.require_sales_or_admin()?;
    portal(&state).mark_feedback_read(feedback_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unread_feedback_count(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<Json<serde_json::Value>, AppError> {
    session.require_sales_or_admin()?;
    let count = portal(&state).unread_feedback_count().await?;
    Ok(Json(serde_json::json!({ "unread": count })))
}
