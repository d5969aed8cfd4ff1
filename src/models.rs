use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

// ============ Database Models ============

/// A user profile. Owned by the profile service; the wizard reads it to
/// prefill personal info and writes back only the address fields the
/// applicant edits.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Profile {
    /// Unique identifier (matches the auth user id).
    pub id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Mother's last name (segundo apellido).
    pub mother_last_name: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    /// RFC tax id and its homoclave suffix.
    pub rfc: Option<String>,
    pub homoclave: Option<String>,
    pub fiscal_situation: Option<String>,
    pub civil_status: Option<String>,
    pub spouse_name: Option<String>,
    pub address: Option<String>,
    pub colony: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    /// Role flag: "user", "admin" or "sales".
    pub role: Option<String>,
    /// Advisor responsible for this lead, assigned round-robin.
    pub assigned_advisor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }

    pub fn is_sales(&self) -> bool {
        self.role.as_deref() == Some("sales")
    }

    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }

    /// Identity fields that must be non-blank before the wizard opens.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let checks: [(&'static str, Option<&str>); 8] = [
            ("first_name", self.first_name.as_deref()),
            ("last_name", self.last_name.as_deref()),
            ("mother_last_name", self.mother_last_name.as_deref()),
            ("phone", self.phone.as_deref()),
            ("homoclave", self.homoclave.as_deref()),
            ("fiscal_situation", self.fiscal_situation.as_deref()),
            ("civil_status", self.civil_status.as_deref()),
            ("rfc", self.rfc.as_deref()),
        ];
        for (name, value) in checks {
            if value.map_or(true, |v| v.trim().is_empty()) {
                missing.push(name);
            }
        }
        if self.birth_date.is_none() {
            missing.push("birth_date");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_required_fields().is_empty()
    }
}

/// A financing application row. Non-terminal rows owned by the wizard,
/// terminal rows by the bank workflow.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FinancingApplication {
    pub id: Uuid,
    pub user_id: Uuid,
    /// See [`crate::status::ApplicationStatus`].
    pub status: String,
    /// Vehicle snapshot taken at selection time; catalog edits never
    /// retroactively alter an in-flight application.
    pub car_info: Option<Value>,
    /// Free-form key/value answers collected across steps.
    pub application_data: Option<Value>,
    /// Profile snapshot taken at submission time.
    pub personal_info_snapshot: Option<Value>,
    pub selected_banks: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Listing row for the applicant's own applications.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ApplicationSummary {
    pub id: Uuid,
    pub status: String,
    pub car_info: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Vehicle snapshot copied into `car_info` when a vehicle is selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarInfo {
    pub vehicle_title: String,
    /// Purchase-order code identifying the vehicle in inventory.
    pub order_code: String,
    pub feature_image: Option<String>,
    pub price: BigDecimal,
    pub min_down_payment: Option<BigDecimal>,
    pub recommended_down_payment: Option<BigDecimal>,
    pub recommended_monthly_payment: Option<BigDecimal>,
    pub max_term_months: Option<i32>,
}

/// Bank-profiling outcome for a user. Produced by an external scoring
/// process; the wizard only requires it to be complete with a
/// non-null recommended bank.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BankProfile {
    pub user_id: Uuid,
    pub answers: Option<Value>,
    pub recommended_bank: Option<String>,
    pub second_choice_bank: Option<String>,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Inventory vehicle, identified by its purchase-order code.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Vehicle {
    pub order_code: String,
    pub title: String,
    pub price: BigDecimal,
    pub min_down_payment: Option<BigDecimal>,
    pub recommended_down_payment: Option<BigDecimal>,
    pub recommended_monthly_payment: Option<BigDecimal>,
    pub max_term_months: Option<i32>,
    pub feature_image: Option<String>,
}

/// A bank representative's portal profile.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BankRepProfile {
    /// Matches the auth user id.
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub bank_affiliation: String,
    /// Set by an admin; unapproved reps cannot access assigned leads.
    pub is_approved: bool,
    pub is_active: bool,
    pub login_count: i32,
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub pin_hash: Option<String>,
    #[serde(skip_serializing)]
    pub pin_salt: Option<String>,
    pub pin_set_at: Option<DateTime<Utc>>,
    pub has_completed_onboarding: bool,
    pub created_at: DateTime<Utc>,
}

/// Link between a submitted application and the bank representative
/// reviewing it. Carries its own status, reflected into the
/// application's status on assignment.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BankAssignment {
    pub id: Uuid,
    /// The applicant (lead) the assignment concerns.
    pub lead_id: Uuid,
    pub application_id: Option<Uuid>,
    pub bank_rep_id: Uuid,
    pub bank_name: String,
    pub assigned_by: Option<Uuid>,
    /// See [`crate::status::AssignmentStatus`].
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Feedback a bank rep attaches to a lead, optionally alongside a
/// status change.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BankFeedback {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub bank_rep_id: Uuid,
    pub lead_id: Uuid,
    pub message: String,
    pub feedback_type: String,
    pub visible_to_sales: bool,
    pub visible_to_client: bool,
    pub read_by_sales: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Document uploaded for an application; the file itself lives in
/// object storage, reachable only through signed URLs.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UploadedDocument {
    pub id: Uuid,
    pub application_id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub document_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-rep dashboard aggregates.
#[derive(Debug, Clone, Default, FromRow, Serialize)]
pub struct BankRepDashboardStats {
    pub total_assigned: i64,
    pub pending_review: i64,
    pub approved: i64,
    pub rejected: i64,
    pub feedback_provided: i64,
}

/// Listing row for a rep's assigned leads.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AssignedLead {
    pub assignment_id: Uuid,
    pub lead_id: Uuid,
    pub application_id: Option<Uuid>,
    pub status: String,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub assigned_at: DateTime<Utc>,
}

// ============ API Request/Response Models ============

/// Request to open the wizard: an optional draft id to resume and an
/// optional purchase-order code carried from vehicle browsing.
#[derive(Debug, Default, Deserialize)]
pub struct EnterWizardRequest {
    pub draft_id: Option<Uuid>,
    pub order_code: Option<String>,
}

/// Payload for advancing one step: the step being completed plus the
/// full current form snapshot.
#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub step: String,
    pub answers: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct AdvanceResponse {
    pub next_step: String,
    pub saved: bool,
}

/// Final submission payload from the review step.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub answers: serde_json::Map<String, Value>,
}

/// Applicant-editable address fields written back to the profile at
/// submission time.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileAddressUpdate {
    pub address: Option<String>,
    pub colony: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

/// Vehicle selection from the wizard's first step.
#[derive(Debug, Deserialize)]
pub struct SelectVehicleRequest {
    pub order_code: String,
}

/// Bank-profiling outcome pushed by the scoring flow.
#[derive(Debug, Deserialize)]
pub struct SaveBankProfileRequest {
    pub answers: Value,
    pub recommended_bank: String,
    pub second_choice_bank: Option<String>,
}

/// Metadata recorded after a document landed in object storage.
#[derive(Debug, Deserialize)]
pub struct RecordDocumentRequest {
    pub file_name: String,
    pub file_path: String,
    pub document_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterBankRepRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub bank_affiliation: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignLeadRequest {
    pub lead_id: Uuid,
    pub application_id: Option<Uuid>,
    pub bank_rep_id: Uuid,
    pub bank_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAssignmentStatusRequest {
    pub status: String,
    pub feedback_message: Option<String>,
    /// Step-up PIN, required for status changes.
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct AddFeedbackRequest {
    pub lead_id: Uuid,
    pub message: String,
    #[serde(default = "default_feedback_type")]
    pub feedback_type: String,
}

fn default_feedback_type() -> String {
    "general".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct ApproveBankRepRequest {
    pub approved: bool,
}
