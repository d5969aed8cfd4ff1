use serde::{Deserialize, Serialize};

/// Lifecycle of a financing application.
///
/// Stored as text; the wire values match what the dashboards and the bank
/// portal already display, including the Spanish "Faltan Documentos" label
/// used for submissions that still lack documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    /// Being filled out by the applicant. The only status the wizard mutates.
    #[serde(rename = "draft")]
    Draft,
    /// Submitted, documents still missing.
    #[serde(rename = "Faltan Documentos")]
    PendingDocuments,
    /// Under review by a bank.
    #[serde(rename = "reviewing")]
    Reviewing,
    #[serde(rename = "approved")]
    Approved,
    #[serde(rename = "rejected")]
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::PendingDocuments => "Faltan Documentos",
            ApplicationStatus::Reviewing => "reviewing",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ApplicationStatus::Draft),
            "Faltan Documentos" | "pending_documents" | "pending_docs" => {
                Some(ApplicationStatus::PendingDocuments)
            }
            "reviewing" | "En Revisión" => Some(ApplicationStatus::Reviewing),
            "approved" | "Aprobada" => Some(ApplicationStatus::Approved),
            "rejected" | "Rechazada" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }

    /// Active = submitted but not yet decided. A user may hold at most one
    /// active application; drafts do not count.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::PendingDocuments | ApplicationStatus::Reviewing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Approved | ApplicationStatus::Rejected
        )
    }
}

/// Status strings considered active when querying the applications table.
pub const ACTIVE_STATUSES: [&str; 2] = ["Faltan Documentos", "reviewing"];

/// Lifecycle of a bank assignment, independent of (but reflected into)
/// the underlying application's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Reviewing,
    Approved,
    Rejected,
    /// Out-of-band marker: the rep left feedback without deciding.
    FeedbackProvided,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Reviewing => "reviewing",
            AssignmentStatus::Approved => "approved",
            AssignmentStatus::Rejected => "rejected",
            AssignmentStatus::FeedbackProvided => "feedback_provided",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AssignmentStatus::Pending),
            "reviewing" => Some(AssignmentStatus::Reviewing),
            "approved" => Some(AssignmentStatus::Approved),
            "rejected" => Some(AssignmentStatus::Rejected),
            "feedback_provided" => Some(AssignmentStatus::FeedbackProvided),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ApplicationStatus::Draft,
            ApplicationStatus::PendingDocuments,
            ApplicationStatus::Reviewing,
            ApplicationStatus::Approved,
            ApplicationStatus::Rejected,
        ] {
            assert_eq!(ApplicationStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_active_statuses() {
        assert!(!ApplicationStatus::Draft.is_active());
        assert!(ApplicationStatus::PendingDocuments.is_active());
        assert!(ApplicationStatus::Reviewing.is_active());
        assert!(!ApplicationStatus::Approved.is_active());
        assert!(!ApplicationStatus::Rejected.is_active());
    }

    #[test]
    fn test_legacy_labels_parse() {
        assert_eq!(
            ApplicationStatus::parse("pending_docs"),
            Some(ApplicationStatus::PendingDocuments)
        );
        assert_eq!(
            ApplicationStatus::parse("En Revisión"),
            Some(ApplicationStatus::Reviewing)
        );
        assert_eq!(ApplicationStatus::parse("unknown"), None);
    }
}
