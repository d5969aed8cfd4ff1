//! Uploaded-document metadata and expiring signed download URLs.
//!
//! Files live in object storage under a private bucket; the API never
//! hands out raw paths, only URLs signed with a server secret and an
//! expiry timestamp.

use crate::errors::{AppError, ResultExt};
use crate::models::UploadedDocument;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct SignedDocument {
    pub id: Uuid,
    pub file_name: String,
    pub document_type: Option<String>,
    pub url: String,
    pub expires_at: i64,
}

pub struct DocumentStore {
    pool: PgPool,
}

impl DocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_application(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<UploadedDocument>, AppError> {
        let docs = sqlx::query_as::<_, UploadedDocument>(
            r#"
            SELECT * FROM uploaded_documents
            WHERE application_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await
        .context("listing application documents")?;
        Ok(docs)
    }

    /// Records an upload's metadata after the file landed in storage.
    pub async fn record_upload(
        &self,
        application_id: Uuid,
        user_id: Uuid,
        file_name: &str,
        file_path: &str,
        document_type: Option<&str>,
    ) -> Result<UploadedDocument, AppError> {
        let doc = sqlx::query_as::<_, UploadedDocument>(
            r#"
            INSERT INTO uploaded_documents
                (application_id, user_id, file_name, file_path, document_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(application_id)
        .bind(user_id)
        .bind(file_name)
        .bind(file_path)
        .bind(document_type)
        .fetch_one(&self.pool)
        .await
        .context("recording document upload")?;
        Ok(doc)
    }
}

/// Issues signed download URLs for a set of documents.
pub fn sign_documents(
    docs: Vec<UploadedDocument>,
    base_url: &str,
    secret: &str,
    ttl_secs: i64,
) -> Vec<SignedDocument> {
    let expires_at = Utc::now().timestamp() + ttl_secs;
    docs.into_iter()
        .map(|doc| {
            let signature = sign_path(&doc.file_path, expires_at, secret);
            SignedDocument {
                id: doc.id,
                file_name: doc.file_name,
                document_type: doc.document_type,
                url: format!(
                    "{}/documents/download?path={}&expires={}&signature={}",
                    base_url,
                    urlencode(&doc.file_path),
                    expires_at,
                    signature
                ),
                expires_at,
            }
        })
        .collect()
}

/// Checks a presented signature against the path and expiry. Expired or
/// forged links both answer the same way.
pub fn verify_signature(
    file_path: &str,
    expires_at: i64,
    signature: &str,
    secret: &str,
) -> Result<(), AppError> {
    if expires_at < Utc::now().timestamp() {
        return Err(AppError::Forbidden("document link expired".to_string()));
    }
    let expected = sign_path(file_path, expires_at, secret);
    if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        return Err(AppError::Forbidden("invalid document signature".to_string()));
    }
    Ok(())
}

fn sign_path(file_path: &str, expires_at: i64, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(expires_at.to_string().as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Minimal percent-encoding for storage paths embedded in query strings.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let expires = Utc::now().timestamp() + 600;
        let sig = sign_path("apps/1/ine.pdf", expires, "secret");
        assert!(verify_signature("apps/1/ine.pdf", expires, &sig, "secret").is_ok());
    }

    #[test]
    fn test_signature_rejects_tampered_path() {
        let expires = Utc::now().timestamp() + 600;
        let sig = sign_path("apps/1/ine.pdf", expires, "secret");
        assert!(verify_signature("apps/2/ine.pdf", expires, &sig, "secret").is_err());
    }

    #[test]
    fn test_expired_link_rejected() {
        let expires = Utc::now().timestamp() - 1;
        let sig = sign_path("apps/1/ine.pdf", expires, "secret");
        assert!(verify_signature("apps/1/ine.pdf", expires, &sig, "secret").is_err());
    }

    #[test]
    fn test_urlencode_keeps_path_separators() {
        assert_eq!(urlencode("apps/1/mi archivo.pdf"), "apps/1/mi%20archivo.pdf");
    }
}
