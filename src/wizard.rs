//! The application wizard: entry gating, step navigation and final
//! submission for financing applications.
//!
//! The step machine and the entry gate are pure; all I/O lives in
//! [`WizardService`] so the decision logic can be tested without a
//! database.

use crate::applications::ApplicationStore;
use crate::bank_profiling::BankProfileStore;
use crate::config::Config;
use crate::errors::{AppError, FieldError};
use crate::handlers::AppState;
use crate::models::{
    AdvanceRequest, AdvanceResponse, CarInfo, EnterWizardRequest, FinancingApplication, Profile,
    ProfileAddressUpdate, SubmitRequest,
};
use crate::notifications::{spawn_submission_notifications, SubmissionNotification};
use crate::profiles::{ProfileCache, ProfileStore};
use crate::status::ApplicationStatus;
use crate::tracking::TrackingStore;
use crate::validation::{spouse_used_as_reference, strip_empty_values, validate_step};
use crate::vehicles::VehicleStore;
use moka::future::Cache;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

// ============ Step machine ============

/// The eight wizard steps, in order. `Review` collects no fields of its
/// own and `Complete` is terminal; everything in between owns a
/// validation fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    VehicleFinancing,
    PersonalInfo,
    Employment,
    AdditionalDetails,
    References,
    Consent,
    Review,
    Complete,
}

pub const STEP_ORDER: [WizardStep; 8] = [
    WizardStep::VehicleFinancing,
    WizardStep::PersonalInfo,
    WizardStep::Employment,
    WizardStep::AdditionalDetails,
    WizardStep::References,
    WizardStep::Consent,
    WizardStep::Review,
    WizardStep::Complete,
];

impl WizardStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WizardStep::VehicleFinancing => "vehicle-financing",
            WizardStep::PersonalInfo => "personal-info",
            WizardStep::Employment => "employment",
            WizardStep::AdditionalDetails => "additional-details",
            WizardStep::References => "references",
            WizardStep::Consent => "consent",
            WizardStep::Review => "review",
            WizardStep::Complete => "complete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        STEP_ORDER.iter().copied().find(|s| s.as_str() == value)
    }

    /// Zero-based position in the step order.
    pub fn index(&self) -> usize {
        STEP_ORDER.iter().position(|s| s == self).unwrap_or(0)
    }

    /// The following step; `Complete` stays on itself.
    pub fn next(&self) -> WizardStep {
        STEP_ORDER
            .get(self.index() + 1)
            .copied()
            .unwrap_or(WizardStep::Complete)
    }

    /// Steps the applicant advances through with Next. Review exits via
    /// submit and Complete is terminal.
    pub fn is_form_step(&self) -> bool {
        !matches!(self, WizardStep::Review | WizardStep::Complete)
    }
}

// ============ Entry gate ============

/// Outcome of the wizard entry preflight. Each non-ready state maps to
/// exactly one remediation the caller is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryGate {
    ProfileIncomplete,
    BankProfileIncomplete,
    ActiveApplicationExists,
    Ready,
}

/// Preflight decision, checked in a fixed order: identity profile first,
/// then bank profiling, then the one-active-application rule. Resuming
/// an explicit draft skips the active check (the draft was legitimately
/// created earlier), and admins may always start another application.
pub fn evaluate_entry_gate(
    profile_complete: bool,
    has_bank_recommendation: bool,
    has_active_application: bool,
    is_admin: bool,
    resuming_draft: bool,
) -> EntryGate {
    if !profile_complete {
        return EntryGate::ProfileIncomplete;
    }
    if !has_bank_recommendation {
        return EntryGate::BankProfileIncomplete;
    }
    if has_active_application && !is_admin && !resuming_draft {
        return EntryGate::ActiveApplicationExists;
    }
    EntryGate::Ready
}

// ============ Responses ============

#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EnterResponse {
    ProfileIncomplete {
        missing_fields: Vec<&'static str>,
        action: String,
    },
    BankProfileIncomplete {
        action: String,
    },
    ActiveApplicationExists {
        action: String,
    },
    Ready {
        draft_id: Uuid,
        step: &'static str,
        recommended_bank: String,
        car_info: Option<Value>,
        application_data: Option<Value>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubmitResponse {
    Submitted {
        application_id: Uuid,
        status: &'static str,
        step: &'static str,
        vehicle_title: String,
    },
    /// A business rule failed; the client returns to the named step.
    StepError {
        step: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<&'static str>,
        message: String,
    },
    ActiveApplicationExists {
        message: String,
    },
}

// ============ Service ============

/// Orchestrates the wizard against the stores, the profile cache and the
/// notification fanout.
pub struct WizardService {
    pool: PgPool,
    config: Config,
    email: Option<crate::notifications::EmailClient>,
    profile_cache: ProfileCache,
    pending_orders: Cache<Uuid, String>,
}

impl WizardService {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            pool: state.db.clone(),
            config: state.config.clone(),
            email: state.email_client.clone(),
            profile_cache: state.profile_cache.clone(),
            pending_orders: state.pending_orders.clone(),
        }
    }

    fn applications(&self) -> ApplicationStore {
        ApplicationStore::new(self.pool.clone())
    }

    fn profiles(&self) -> ProfileStore {
        ProfileStore::new(self.pool.clone())
    }

    fn tracking(&self) -> TrackingStore {
        TrackingStore::new(self.pool.clone())
    }

    fn remediation(&self, path: &str) -> String {
        format!("{}{}", self.config.site_base_url, path)
    }

    /// Opens the wizard: runs the entry preflight and, when it passes,
    /// resumes the named draft or creates a fresh one.
    ///
    /// An order code arriving alongside a failed preflight is remembered
    /// so the vehicle is still preselected once the caller comes back
    /// from remediation.
    pub async fn enter(
        &self,
        profile: &Profile,
        request: &EnterWizardRequest,
    ) -> Result<EnterResponse, AppError> {
        let order_code = request
            .order_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if let Some(ref code) = order_code {
            self.pending_orders.insert(profile.id, code.clone()).await;
        }

        let missing = profile.missing_required_fields();
        let recommendation = BankProfileStore::new(self.pool.clone())
            .completed_recommendation(profile.id)
            .await?;
        let has_active = self.applications().has_active_application(profile.id).await?;

        let gate = evaluate_entry_gate(
            missing.is_empty(),
            recommendation.is_some(),
            has_active,
            profile.is_admin(),
            request.draft_id.is_some(),
        );

        let recommended_bank = match gate {
            EntryGate::ProfileIncomplete => {
                return Ok(EnterResponse::ProfileIncomplete {
                    missing_fields: missing,
                    action: self.remediation("/perfil"),
                })
            }
            EntryGate::BankProfileIncomplete => {
                return Ok(EnterResponse::BankProfileIncomplete {
                    action: self.remediation("/perfilamiento-bancario"),
                })
            }
            EntryGate::ActiveApplicationExists => {
                return Ok(EnterResponse::ActiveApplicationExists {
                    action: self.remediation("/solicitudes"),
                })
            }
            // Gate order guarantees a recommendation at this point.
            EntryGate::Ready => recommendation.unwrap_or_default(),
        };

        let draft = match request.draft_id {
            Some(draft_id) => self
                .applications()
                .get_by_id(profile.id, draft_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound("No encontramos el borrador de tu solicitud.".to_string())
                })?,
            None => self.create_draft(profile, order_code).await?,
        };
        self.pending_orders.invalidate(&profile.id).await;

        Ok(EnterResponse::Ready {
            draft_id: draft.id,
            step: WizardStep::VehicleFinancing.as_str(),
            recommended_bank,
            car_info: draft.car_info,
            application_data: draft.application_data,
        })
    }

    async fn create_draft(
        &self,
        profile: &Profile,
        order_code: Option<String>,
    ) -> Result<FinancingApplication, AppError> {
        let order_code = match order_code {
            Some(code) => Some(code),
            None => self.pending_orders.get(&profile.id).await,
        };

        let mut car_info = None;
        let mut seed = Map::new();
        if let Some(ref code) = order_code {
            if let Some(vehicle) = VehicleStore::new(self.pool.clone())
                .get_by_order_code(code)
                .await?
            {
                car_info = Some(to_json(&CarInfo::from_vehicle(&vehicle))?);
            } else {
                tracing::warn!("Order code {} not found in inventory; starting without a vehicle", code);
            }
            seed.insert("order_code".to_string(), Value::String(code.clone()));
        }

        let seed = (!seed.is_empty()).then(|| Value::Object(seed));
        self.applications()
            .create_draft(profile.id, car_info.as_ref(), seed.as_ref())
            .await
    }

    /// Attaches a vehicle snapshot to a draft from the first step.
    pub async fn select_vehicle(
        &self,
        profile: &Profile,
        application_id: Uuid,
        order_code: &str,
    ) -> Result<CarInfo, AppError> {
        let vehicle = VehicleStore::new(self.pool.clone())
            .get_by_order_code(order_code)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("No encontramos el veh\u{ed}culo solicitado.".to_string())
            })?;

        let draft = self.require_draft(profile.id, application_id).await?;
        let car_info = CarInfo::from_vehicle(&vehicle);
        self.applications()
            .save_draft(draft.id, Some(&to_json(&car_info)?), None)
            .await?;
        Ok(car_info)
    }

    /// Completes one step: validates only that step's fragment, strips
    /// empty answers and persists the snapshot. On validation failure
    /// nothing is written and the caller stays on the step.
    pub async fn advance(
        &self,
        profile: &Profile,
        application_id: Uuid,
        request: &AdvanceRequest,
    ) -> Result<AdvanceResponse, AppError> {
        let step = WizardStep::parse(&request.step)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown wizard step: {}", request.step)))?;
        if !step.is_form_step() {
            return Err(AppError::BadRequest(
                "La revisi\u{f3}n se completa enviando la solicitud.".to_string(),
            ));
        }

        validate_step(step, &request.answers).map_err(AppError::Validation)?;

        let draft = self.require_draft(profile.id, application_id).await?;
        let cleaned = strip_empty_values(&request.answers);
        self.applications()
            .save_draft(draft.id, None, Some(&Value::Object(cleaned)))
            .await?;

        self.tracking()
            .step_completed(
                profile.id,
                draft.id,
                step.index() + 1,
                step.as_str(),
                order_code_of(draft.car_info.as_ref()).as_deref(),
            )
            .await;

        Ok(AdvanceResponse {
            next_step: step.next().as_str().to_string(),
            saved: true,
        })
    }

    /// Final submission from the review step.
    ///
    /// Re-validates every form fragment over the merged answer bag,
    /// enforces the vehicle and spouse rules, narrows the duplicate
    /// window with a last active-application check, writes the profile
    /// address back, then flips the draft to pending-documents and fans
    /// out notifications.
    pub async fn submit(
        &self,
        profile: &Profile,
        application_id: Uuid,
        request: &SubmitRequest,
    ) -> Result<SubmitResponse, AppError> {
        let draft = self
            .applications()
            .get_by_id(profile.id, application_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("No encontramos el borrador de tu solicitud.".to_string())
            })?;

        let car_info = draft.car_info.clone().filter(|c| {
            order_code_of(Some(c)).map_or(false, |code| !code.trim().is_empty())
        });
        let Some(car_info) = car_info else {
            return Ok(SubmitResponse::StepError {
                step: WizardStep::VehicleFinancing.as_str(),
                field: None,
                message: "A\u{fa}n no has seleccionado un veh\u{ed}culo para tu solicitud."
                    .to_string(),
            });
        };

        let mut merged: Map<String, Value> = draft
            .application_data
            .as_ref()
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        for (k, v) in &request.answers {
            merged.insert(k.clone(), v.clone());
        }
        let merged = strip_empty_values(&merged);

        let mut errors: Vec<FieldError> = Vec::new();
        for step in STEP_ORDER.iter().filter(|s| s.is_form_step()) {
            if let Err(mut step_errors) = validate_step(*step, &merged) {
                errors.append(&mut step_errors);
            }
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        if let Some(spouse) = profile.spouse_name.as_deref() {
            let friend = merged.get("friend_reference_name").and_then(Value::as_str);
            let family = merged.get("family_reference_name").and_then(Value::as_str);
            if spouse_used_as_reference(spouse, friend, family) {
                let field = if spouse_used_as_reference(spouse, friend, None) {
                    "friend_reference_name"
                } else {
                    "family_reference_name"
                };
                return Ok(SubmitResponse::StepError {
                    step: WizardStep::References.as_str(),
                    field: Some(field),
                    message: "Tu c\u{f3}nyuge no puede ser utilizado como referencia. \
                              Por favor, elige a otra persona."
                        .to_string(),
                });
            }
        }

        // Last look before the write; narrows the two-tab race without
        // claiming to close it. The check also covers submitting the same
        // row twice (its own status is active after the first submit),
        // while terminal applications stay resubmittable after correction.
        if !profile.is_admin() && self.applications().has_active_application(profile.id).await? {
            return Ok(SubmitResponse::ActiveApplicationExists {
                message: "Ya tienes una solicitud activa. Solo puedes tener una solicitud a la vez."
                    .to_string(),
            });
        }

        let recommended_bank = BankProfileStore::new(self.pool.clone())
            .completed_recommendation(profile.id)
            .await?
            .ok_or_else(|| {
                AppError::Conflict("Falta completar tu perfilamiento bancario.".to_string())
            })?;

        let address_update = address_update_from(&merged);
        let updated_profile = self.profiles().update_address(profile.id, &address_update).await?;
        self.profile_cache.refresh(updated_profile.clone()).await;

        let advisor_id = match updated_profile.assigned_advisor_id {
            Some(id) => Some(id),
            None => self.profiles().assign_advisor(profile.id).await?,
        };

        let application_data = Value::Object(merged.clone());
        let snapshot = to_json(&updated_profile)?;
        let selected_banks = Value::Array(vec![Value::String(recommended_bank.clone())]);

        let submitted = self
            .applications()
            .submit(
                draft.id,
                &snapshot,
                &car_info,
                &application_data,
                &selected_banks,
                ApplicationStatus::PendingDocuments,
            )
            .await?;

        let order_code = order_code_of(Some(&car_info)).unwrap_or_default();
        let vehicle_title = car_info
            .get("vehicle_title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        self.notify_submission(
            &updated_profile,
            &submitted,
            advisor_id,
            &recommended_bank,
            &vehicle_title,
            &order_code,
            &merged,
        )
        .await;

        self.tracking()
            .application_submitted(profile.id, submitted.id, &order_code, &recommended_bank)
            .await;

        Ok(SubmitResponse::Submitted {
            application_id: submitted.id,
            status: ApplicationStatus::PendingDocuments.as_str(),
            step: WizardStep::Complete.as_str(),
            vehicle_title,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn notify_submission(
        &self,
        profile: &Profile,
        submitted: &FinancingApplication,
        advisor_id: Option<Uuid>,
        recommended_bank: &str,
        vehicle_title: &str,
        order_code: &str,
        answers: &Map<String, Value>,
    ) {
        let Some(client) = self.email.clone() else {
            tracing::debug!("Email client not configured; skipping submission notifications");
            return;
        };

        let advisor = match advisor_id {
            Some(id) => match self.profiles().advisor_contact(id).await {
                Ok(contact) => contact,
                Err(e) => {
                    tracing::warn!("Failed to load advisor contact for {}: {}", id, e);
                    None
                }
            },
            None => None,
        };

        let survey_invited =
            answers.get("consent_survey").and_then(Value::as_bool) == Some(true);

        spawn_submission_notifications(
            client,
            SubmissionNotification {
                application_id: submitted.id,
                client_email: profile.email.clone(),
                client_name: profile.full_name(),
                vehicle_title: vehicle_title.to_string(),
                order_code: order_code.to_string(),
                recommended_bank: recommended_bank.to_string(),
                advisor,
                admin_emails: self.config.admin_emails.clone(),
                site_base_url: self.config.site_base_url.clone(),
                survey_invited,
            },
        );
    }

    async fn require_draft(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<FinancingApplication, AppError> {
        let app = self
            .applications()
            .get_by_id(user_id, application_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("No encontramos el borrador de tu solicitud.".to_string())
            })?;
        if app.status != ApplicationStatus::Draft.as_str() {
            return Err(AppError::Conflict(
                "Esta solicitud ya fue enviada y no puede modificarse.".to_string(),
            ));
        }
        Ok(app)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::InternalError(format!("Failed to serialize payload: {}", e)))
}

fn order_code_of(car_info: Option<&Value>) -> Option<String> {
    car_info?
        .get("order_code")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Address fields the applicant may have edited during the wizard.
fn address_update_from(answers: &Map<String, Value>) -> ProfileAddressUpdate {
    let field = |key: &str| {
        answers
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    ProfileAddressUpdate {
        address: field("address"),
        colony: field("colony"),
        city: field("city"),
        state: field("state"),
        zip_code: field("zip_code"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order_round_trips() {
        for step in STEP_ORDER {
            assert_eq!(WizardStep::parse(step.as_str()), Some(step));
        }
        assert_eq!(WizardStep::parse("unknown"), None);
    }

    #[test]
    fn test_next_walks_the_order_and_saturates() {
        assert_eq!(WizardStep::VehicleFinancing.next(), WizardStep::PersonalInfo);
        assert_eq!(WizardStep::Consent.next(), WizardStep::Review);
        assert_eq!(WizardStep::Complete.next(), WizardStep::Complete);
    }

    #[test]
    fn test_gate_checks_profile_first() {
        // All failing at once still answers with the profile remediation.
        let gate = evaluate_entry_gate(false, false, true, false, false);
        assert_eq!(gate, EntryGate::ProfileIncomplete);
    }

    #[test]
    fn test_gate_requires_bank_recommendation() {
        let gate = evaluate_entry_gate(true, false, false, false, false);
        assert_eq!(gate, EntryGate::BankProfileIncomplete);
    }

    #[test]
    fn test_gate_blocks_second_application() {
        let gate = evaluate_entry_gate(true, true, true, false, false);
        assert_eq!(gate, EntryGate::ActiveApplicationExists);
    }

    #[test]
    fn test_gate_admin_bypasses_active_check_only() {
        assert_eq!(evaluate_entry_gate(true, true, true, true, false), EntryGate::Ready);
        // Admins still need a complete profile and bank recommendation.
        assert_eq!(
            evaluate_entry_gate(false, true, true, true, false),
            EntryGate::ProfileIncomplete
        );
        assert_eq!(
            evaluate_entry_gate(true, false, true, true, false),
            EntryGate::BankProfileIncomplete
        );
    }

    #[test]
    fn test_gate_draft_resume_bypasses_active_check() {
        assert_eq!(evaluate_entry_gate(true, true, true, false, true), EntryGate::Ready);
    }

    #[test]
    fn test_address_update_ignores_blank_fields() {
        let mut answers = Map::new();
        answers.insert("address".to_string(), Value::String("Av. Juárez 10".into()));
        answers.insert("city".to_string(), Value::String("  ".into()));
        let update = address_update_from(&answers);
        assert_eq!(update.address.as_deref(), Some("Av. Juárez 10"));
        assert!(update.city.is_none());
        assert!(update.zip_code.is_none());
    }
}
