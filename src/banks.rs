//! Bank portal: representative accounts, lead assignments, review
//! decisions and feedback.
//!
//! Assignment writes are deliberately not transactional. The assignment
//! row is the source of truth; reflecting its status into the
//! application and appending history are follow-up writes whose
//! failures are logged and left for reconciliation, never surfaced to
//! the rep mid-review.

use crate::applications::ApplicationStore;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    AssignLeadRequest, AssignedLead, BankAssignment, BankFeedback, BankRepDashboardStats,
    BankRepProfile, FinancingApplication, RegisterBankRepRequest,
};
use crate::status::{ApplicationStatus, AssignmentStatus};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

/// Everything a rep sees when opening one assigned lead.
#[derive(Debug, Serialize)]
pub struct LeadDetail {
    pub assignment: BankAssignment,
    pub application: Option<FinancingApplication>,
}

pub struct BankPortalService {
    pool: PgPool,
}

impl BankPortalService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ============ Rep accounts ============

    pub async fn get_rep(&self, user_id: Uuid) -> Result<Option<BankRepProfile>, AppError> {
        let rep = sqlx::query_as::<_, BankRepProfile>(
            "SELECT * FROM bank_rep_profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching bank rep profile")?;
        Ok(rep)
    }

    /// Loads a rep, requiring the account to exist and be admin-approved.
    pub async fn require_approved_rep(&self, user_id: Uuid) -> Result<BankRepProfile, AppError> {
        let rep = self.get_rep(user_id).await?.ok_or_else(|| {
            AppError::Forbidden("bank representative account required".to_string())
        })?;
        if !rep.is_approved || !rep.is_active {
            return Err(AppError::Forbidden(
                "Tu cuenta a\u{fa}n no ha sido aprobada por un administrador.".to_string(),
            ));
        }
        Ok(rep)
    }

    /// Self-service registration. Accounts start unapproved and gain
    /// access to leads only after an admin approves them.
    pub async fn register_rep(
        &self,
        user_id: Uuid,
        request: &RegisterBankRepRequest,
    ) -> Result<BankRepProfile, AppError> {
        let result = sqlx::query_as::<_, BankRepProfile>(
            r#"
            INSERT INTO bank_rep_profiles
                (id, email, first_name, last_name, phone, bank_affiliation,
                 is_approved, is_active, login_count, has_completed_onboarding)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, TRUE, 0, FALSE)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&request.email)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(request.phone.as_deref())
        .bind(&request.bank_affiliation)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(rep) => {
                tracing::info!("Registered bank rep {} for {}", user_id, rep.bank_affiliation);
                Ok(rep)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict(
                "Ya existe una cuenta de representante para este usuario.".to_string(),
            )),
            Err(e) => Err(AppError::DatabaseError(e)).context("registering bank rep"),
        }
    }

    /// Bumps the login counter and timestamp; called on each portal entry.
    pub async fn record_login(&self, rep_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE bank_rep_profiles
            SET login_count = login_count + 1, last_login_at = now()
            WHERE id = $1
            "#,
        )
        .bind(rep_id)
        .execute(&self.pool)
        .await
        .context("recording bank rep login")?;
        Ok(())
    }

    pub async fn complete_onboarding(&self, rep_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE bank_rep_profiles SET has_completed_onboarding = TRUE WHERE id = $1",
        )
        .bind(rep_id)
        .execute(&self.pool)
        .await
        .context("marking onboarding complete")?;
        Ok(())
    }

    // ============ Dashboard and leads ============

    pub async fn dashboard_stats(&self, rep_id: Uuid) -> Result<BankRepDashboardStats, AppError> {
        let stats = sqlx::query_as::<_, BankRepDashboardStats>(
            r#"
            SELECT
                COUNT(*) AS total_assigned,
                COUNT(*) FILTER (WHERE status IN ('pending', 'reviewing')) AS pending_review,
                COUNT(*) FILTER (WHERE status = 'approved') AS approved,
                COUNT(*) FILTER (WHERE status = 'rejected') AS rejected,
                COUNT(*) FILTER (WHERE status = 'feedback_provided') AS feedback_provided
            FROM bank_assignments
            WHERE bank_rep_id = $1
            "#,
        )
        .bind(rep_id)
        .fetch_one(&self.pool)
        .await
        .context("computing rep dashboard stats")?;
        Ok(stats)
    }

    pub async fn assigned_leads(&self, rep_id: Uuid) -> Result<Vec<AssignedLead>, AppError> {
        let leads = sqlx::query_as::<_, AssignedLead>(
            r#"
            SELECT a.id AS assignment_id,
                   a.lead_id,
                   a.application_id,
                   a.status,
                   NULLIF(TRIM(CONCAT(p.first_name, ' ', p.last_name)), '') AS client_name,
                   p.email AS client_email,
                   a.created_at AS assigned_at
            FROM bank_assignments a
            LEFT JOIN profiles p ON p.id = a.lead_id
            WHERE a.bank_rep_id = $1
            ORDER BY a.created_at DESC
            "#,
        )
        .bind(rep_id)
        .fetch_all(&self.pool)
        .await
        .context("listing assigned leads")?;
        Ok(leads)
    }

    /// One assignment with its application payload, scoped to the rep.
    pub async fn lead_detail(
        &self,
        rep_id: Uuid,
        assignment_id: Uuid,
    ) -> Result<LeadDetail, AppError> {
        let assignment = self.require_assignment(rep_id, assignment_id).await?;

        let application = match assignment.application_id {
            Some(app_id) => sqlx::query_as::<_, FinancingApplication>(
                "SELECT * FROM financing_applications WHERE id = $1",
            )
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await
            .context("loading assigned application")?,
            None => None,
        };

        Ok(LeadDetail {
            assignment,
            application,
        })
    }

    async fn require_assignment(
        &self,
        rep_id: Uuid,
        assignment_id: Uuid,
    ) -> Result<BankAssignment, AppError> {
        sqlx::query_as::<_, BankAssignment>(
            "SELECT * FROM bank_assignments WHERE id = $1 AND bank_rep_id = $2",
        )
        .bind(assignment_id)
        .bind(rep_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading assignment")?
        .ok_or_else(|| AppError::NotFound("Asignaci\u{f3}n no encontrada.".to_string()))
    }

    // ============ Review decisions ============

    /// Applies a rep's status decision to an assignment.
    ///
    /// The assignment update is the only write that can fail the call.
    /// Reflecting into the application, appending history and storing an
    /// optional feedback message are follow-ups logged on failure.
    pub async fn update_assignment_status(
        &self,
        rep: &BankRepProfile,
        assignment_id: Uuid,
        new_status: AssignmentStatus,
        feedback_message: Option<&str>,
    ) -> Result<BankAssignment, AppError> {
        let assignment = self.require_assignment(rep.id, assignment_id).await?;
        let previous_status = assignment.status.clone();

        let updated = sqlx::query_as::<_, BankAssignment>(
            r#"
            UPDATE bank_assignments
            SET status = $2, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(assignment_id)
        .bind(new_status.as_str())
        .fetch_one(&self.pool)
        .await
        .context("updating assignment status")?;

        if let (Some(app_id), Some(app_status)) =
            (updated.application_id, reflect_into_application(new_status))
        {
            if let Err(e) = ApplicationStore::new(self.pool.clone())
                .update_status(app_id, app_status)
                .await
            {
                tracing::error!(
                    "Assignment {} updated but application {} status reflect failed: {}",
                    assignment_id,
                    app_id,
                    e
                );
            }
        }

        if let Err(e) = self
            .append_history(assignment_id, &previous_status, new_status.as_str(), rep.id)
            .await
        {
            tracing::error!(
                "Assignment {} updated but history append failed: {}",
                assignment_id,
                e
            );
        }

        if let Some(message) = feedback_message.map(str::trim).filter(|m| !m.is_empty()) {
            if let Err(e) = self
                .insert_feedback(&updated, rep.id, message, "status_change")
                .await
            {
                tracing::error!(
                    "Assignment {} updated but feedback insert failed: {}",
                    assignment_id,
                    e
                );
            }
        }

        tracing::info!(
            "Rep {} moved assignment {} from {} to {}",
            rep.id,
            assignment_id,
            previous_status,
            new_status.as_str()
        );
        Ok(updated)
    }

    async fn append_history(
        &self,
        assignment_id: Uuid,
        previous_status: &str,
        new_status: &str,
        changed_by: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO assignment_status_history
                (assignment_id, previous_status, new_status, changed_by)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(assignment_id)
        .bind(previous_status)
        .bind(new_status)
        .bind(changed_by)
        .execute(&self.pool)
        .await
        .context("appending assignment history")?;
        Ok(())
    }

    // ============ Feedback ============

    async fn insert_feedback(
        &self,
        assignment: &BankAssignment,
        rep_id: Uuid,
        message: &str,
        feedback_type: &str,
    ) -> Result<BankFeedback, AppError> {
        let feedback = sqlx::query_as::<_, BankFeedback>(
            r#"
            INSERT INTO bank_feedback
                (assignment_id, bank_rep_id, lead_id, message, feedback_type,
                 visible_to_sales, visible_to_client, read_by_sales)
            VALUES ($1, $2, $3, $4, $5, TRUE, FALSE, FALSE)
            RETURNING *
            "#,
        )
        .bind(assignment.id)
        .bind(rep_id)
        .bind(assignment.lead_id)
        .bind(message)
        .bind(feedback_type)
        .fetch_one(&self.pool)
        .await
        .context("inserting bank feedback")?;
        Ok(feedback)
    }

    /// Free-form feedback on one of the rep's leads, without a decision.
    /// Marks the assignment as feedback-provided when it is still pending.
    pub async fn add_feedback(
        &self,
        rep: &BankRepProfile,
        lead_id: Uuid,
        message: &str,
        feedback_type: &str,
    ) -> Result<BankFeedback, AppError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::BadRequest(
                "El mensaje de retroalimentaci\u{f3}n no puede estar vac\u{ed}o.".to_string(),
            ));
        }

        let assignment = sqlx::query_as::<_, BankAssignment>(
            "SELECT * FROM bank_assignments WHERE bank_rep_id = $1 AND lead_id = $2",
        )
        .bind(rep.id)
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading assignment for feedback")?
        .ok_or_else(|| AppError::NotFound("Este cliente no est\u{e1} asignado a ti.".to_string()))?;

        let feedback = self
            .insert_feedback(&assignment, rep.id, message, feedback_type)
            .await?;

        if assignment.status == AssignmentStatus::Pending.as_str() {
            if let Err(e) = sqlx::query(
                "UPDATE bank_assignments SET status = $2, updated_at = now() WHERE id = $1",
            )
            .bind(assignment.id)
            .bind(AssignmentStatus::FeedbackProvided.as_str())
            .execute(&self.pool)
            .await
            {
                tracing::warn!(
                    "Feedback stored but assignment {} marker update failed: {}",
                    assignment.id,
                    e
                );
            }
        }
        Ok(feedback)
    }

    /// Feedback visible to the sales team for one lead, newest first.
    pub async fn feedback_for_lead(&self, lead_id: Uuid) -> Result<Vec<BankFeedback>, AppError> {
        let rows = sqlx::query_as::<_, BankFeedback>(
            r#"
            SELECT * FROM bank_feedback
            WHERE lead_id = $1 AND visible_to_sales
            ORDER BY created_at DESC
            "#,
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await
        .context("listing lead feedback")?;
        Ok(rows)
    }

    pub async fn mark_feedback_read(&self, feedback_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE bank_feedback
            SET read_by_sales = TRUE, read_at = now()
            WHERE id = $1 AND NOT read_by_sales
            "#,
        )
        .bind(feedback_id)
        .execute(&self.pool)
        .await
        .context("marking feedback read")?;
        Ok(())
    }

    pub async fn unread_feedback_count(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bank_feedback WHERE visible_to_sales AND NOT read_by_sales",
        )
        .fetch_one(&self.pool)
        .await
        .context("counting unread feedback")?;
        Ok(count)
    }

    // ============ Admin operations ============

    pub async fn approve_rep(&self, rep_id: Uuid, approved: bool) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE bank_rep_profiles SET is_approved = $2 WHERE id = $1",
        )
        .bind(rep_id)
        .bind(approved)
        .execute(&self.pool)
        .await
        .context("updating rep approval")?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "Representante no encontrado.".to_string(),
            ));
        }
        tracing::info!("Rep {} approval set to {}", rep_id, approved);
        Ok(())
    }

    pub async fn reps_by_bank(&self, bank_name: &str) -> Result<Vec<BankRepProfile>, AppError> {
        let reps = sqlx::query_as::<_, BankRepProfile>(
            r#"
            SELECT * FROM bank_rep_profiles
            WHERE bank_affiliation = $1 AND is_approved AND is_active
            ORDER BY last_name, first_name
            "#,
        )
        .bind(bank_name)
        .fetch_all(&self.pool)
        .await
        .context("listing reps by bank")?;
        Ok(reps)
    }

    pub async fn pending_reps(&self) -> Result<Vec<BankRepProfile>, AppError> {
        let reps = sqlx::query_as::<_, BankRepProfile>(
            "SELECT * FROM bank_rep_profiles WHERE NOT is_approved ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing pending reps")?;
        Ok(reps)
    }

    /// Hands a lead to a bank rep.
    ///
    /// Three writes in sequence: the assignment insert (authoritative,
    /// fails the call), the application status reflect and the history
    /// append (both logged on failure).
    pub async fn assign_lead(
        &self,
        assigned_by: Uuid,
        request: &AssignLeadRequest,
    ) -> Result<BankAssignment, AppError> {
        if let Some(app_id) = request.application_id {
            let status = sqlx::query_scalar::<_, String>(
                "SELECT status FROM financing_applications WHERE id = $1",
            )
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await
            .context("checking application before assignment")?
            .ok_or_else(|| AppError::NotFound("Solicitud no encontrada.".to_string()))?;

            let reviewable = ApplicationStatus::parse(&status)
                .map_or(false, |s| s.is_active());
            if !reviewable {
                return Err(AppError::Conflict(
                    "La solicitud no est\u{e1} en un estado que permita revisi\u{f3}n bancaria."
                        .to_string(),
                ));
            }
        }

        let result = sqlx::query_as::<_, BankAssignment>(
            r#"
            INSERT INTO bank_assignments
                (id, lead_id, application_id, bank_rep_id, bank_name, assigned_by, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.lead_id)
        .bind(request.application_id)
        .bind(request.bank_rep_id)
        .bind(&request.bank_name)
        .bind(assigned_by)
        .fetch_one(&self.pool)
        .await;

        let assignment = match result {
            Ok(a) => a,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::Conflict(
                    "Este cliente ya est\u{e1} asignado a ese representante.".to_string(),
                ))
            }
            Err(e) => return Err(AppError::DatabaseError(e)).context("inserting assignment"),
        };

        if let Some(app_id) = assignment.application_id {
            if let Err(e) = ApplicationStore::new(self.pool.clone())
                .update_status(app_id, ApplicationStatus::Reviewing)
                .await
            {
                tracing::error!(
                    "Lead {} assigned but application {} status reflect failed: {}",
                    request.lead_id,
                    app_id,
                    e
                );
            }
        }

        if let Err(e) = self
            .append_history(assignment.id, "unassigned", "pending", assigned_by)
            .await
        {
            tracing::error!(
                "Lead {} assigned but history append failed: {}",
                request.lead_id,
                e
            );
        }

        tracing::info!(
            "Assigned lead {} to rep {} ({})",
            request.lead_id,
            request.bank_rep_id,
            request.bank_name
        );
        Ok(assignment)
    }

    // ============ Review PIN ============

    /// Stores the rep's review PIN: 4 to 6 digits, salted with the rep id
    /// and hashed.
    pub async fn set_pin(&self, rep_id: Uuid, pin: &str) -> Result<(), AppError> {
        if !pin_format_valid(pin) {
            return Err(AppError::BadRequest(
                "El PIN debe tener entre 4 y 6 d\u{ed}gitos.".to_string(),
            ));
        }
        let salt = rep_id.to_string();
        let hash = hash_pin(pin, &salt);
        sqlx::query(
            r#"
            UPDATE bank_rep_profiles
            SET pin_hash = $2, pin_salt = $3, pin_set_at = now()
            WHERE id = $1
            "#,
        )
        .bind(rep_id)
        .bind(hash)
        .bind(salt)
        .execute(&self.pool)
        .await
        .context("storing review pin")?;
        Ok(())
    }

    /// Step-up check before a status decision is accepted.
    pub fn verify_pin(&self, rep: &BankRepProfile, pin: &str) -> Result<(), AppError> {
        let (Some(hash), Some(salt)) = (rep.pin_hash.as_deref(), rep.pin_salt.as_deref()) else {
            return Err(AppError::Conflict(
                "Debes configurar tu PIN antes de actualizar solicitudes.".to_string(),
            ));
        };
        if !constant_time_compare(&hash_pin(pin, salt), hash) {
            return Err(AppError::Forbidden("PIN incorrecto.".to_string()));
        }
        Ok(())
    }
}

/// Assignment statuses that are mirrored onto the application. Pending
/// and feedback-provided are portal-internal markers.
fn reflect_into_application(status: AssignmentStatus) -> Option<ApplicationStatus> {
    match status {
        AssignmentStatus::Reviewing => Some(ApplicationStatus::Reviewing),
        AssignmentStatus::Approved => Some(ApplicationStatus::Approved),
        AssignmentStatus::Rejected => Some(ApplicationStatus::Rejected),
        AssignmentStatus::Pending | AssignmentStatus::FeedbackProvided => None,
    }
}

fn pin_format_valid(pin: &str) -> bool {
    (4..=6).contains(&pin.len()) && pin.chars().all(|c| c.is_ascii_digit())
}

fn hash_pin(pin: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pin.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Length-safe comparison that does not short-circuit on the first
/// mismatching byte.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_format() {
        assert!(pin_format_valid("1234"));
        assert!(pin_format_valid("123456"));
        assert!(!pin_format_valid("123"));
        assert!(!pin_format_valid("1234567"));
        assert!(!pin_format_valid("12a4"));
    }

    #[test]
    fn test_pin_hash_depends_on_salt() {
        let a = hash_pin("1234", "rep-a");
        let b = hash_pin("1234", "rep-b");
        assert_ne!(a, b);
        assert_eq!(a, hash_pin("1234", "rep-a"));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc123", "abc123"));
        assert!(!constant_time_compare("abc123", "abc124"));
        assert!(!constant_time_compare("abc", "abc123"));
    }

    #[test]
    fn test_only_decisions_reflect_into_application() {
        assert_eq!(
            reflect_into_application(AssignmentStatus::Approved),
            Some(ApplicationStatus::Approved)
        );
        assert_eq!(
            reflect_into_application(AssignmentStatus::Rejected),
            Some(ApplicationStatus::Rejected)
        );
        assert_eq!(
            reflect_into_application(AssignmentStatus::Reviewing),
            Some(ApplicationStatus::Reviewing)
        );
        assert_eq!(reflect_into_application(AssignmentStatus::Pending), None);
        assert_eq!(
            reflect_into_application(AssignmentStatus::FeedbackProvided),
            None
        );
    }
}
