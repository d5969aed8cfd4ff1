//! Transactional email via a Brevo-compatible JSON API.
//!
//! Submission notifications are fanned out from spawned tasks: a failed
//! or slow email never delays or fails the submission itself, it is
//! only logged.

use crate::config::Config;
use crate::errors::AppError;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct EmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailBody {
    sender: EmailAddress,
    to: Vec<EmailAddress>,
    subject: String,
    html_content: String,
}

/// Thin client over the transactional email endpoint.
#[derive(Clone)]
pub struct EmailClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    sender: String,
}

impl EmailClient {
    pub fn new(base_url: &str, api_key: &str, sender: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            sender: sender.to_string(),
        })
    }

    /// Builds the client, or `None` when no API key is configured (local
    /// development runs without outbound email).
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.email_api_key.as_deref()?;
        match Self::new(&config.email_api_base_url, api_key, &config.email_sender) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::error!("Failed to build email client: {}", e);
                None
            }
        }
    }

    pub async fn send(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        subject: &str,
        html: &str,
    ) -> Result<(), AppError> {
        let body = SendEmailBody {
            sender: EmailAddress {
                email: self.sender.clone(),
                name: None,
            },
            to: vec![EmailAddress {
                email: to_email.to_string(),
                name: to_name.map(str::to_string),
            }],
            subject: subject.to_string(),
            html_content: html.to_string(),
        };

        let url = format!("{}/v3/smtp/email", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApiError(format!(
                "Email API returned {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }
        Ok(())
    }
}

/// Everything the post-submission fanout needs, captured before the
/// tasks are spawned.
#[derive(Debug, Clone)]
pub struct SubmissionNotification {
    pub application_id: Uuid,
    pub client_email: Option<String>,
    pub client_name: String,
    pub vehicle_title: String,
    pub order_code: String,
    pub recommended_bank: String,
    pub advisor: Option<(String, String)>,
    pub admin_emails: Vec<String>,
    pub site_base_url: String,
    pub survey_invited: bool,
}

fn client_confirmation_html(n: &SubmissionNotification) -> String {
    format!(
        "<p>Hola {},</p>\
         <p>Recibimos tu solicitud de financiamiento para <strong>{}</strong> \
         (orden {}). Nuestro equipo la revisar\u{e1} y te contactaremos para \
         continuar con tus documentos.</p>\
         <p>Puedes seguir tu solicitud en <a href=\"{}/solicitudes\">{}/solicitudes</a>.</p>",
        n.client_name, n.vehicle_title, n.order_code, n.site_base_url, n.site_base_url
    )
}

fn admin_alert_html(n: &SubmissionNotification) -> String {
    format!(
        "<p>Nueva solicitud de financiamiento.</p>\
         <ul>\
         <li>Cliente: {}</li>\
         <li>Veh\u{ed}culo: {} (orden {})</li>\
         <li>Banco recomendado: {}</li>\
         </ul>\
         <p><a href=\"{}/admin/solicitudes/{}\">Ver en el CRM</a></p>",
        n.client_name,
        n.vehicle_title,
        n.order_code,
        n.recommended_bank,
        n.site_base_url,
        n.application_id
    )
}

fn advisor_alert_html(n: &SubmissionNotification, advisor_name: &str) -> String {
    format!(
        "<p>Hola {},</p>\
         <p>Tu cliente <strong>{}</strong> acaba de enviar su solicitud de \
         financiamiento para {} (orden {}).</p>\
         <p><a href=\"{}/admin/solicitudes/{}\">Ver solicitud</a></p>",
        advisor_name,
        n.client_name,
        n.vehicle_title,
        n.order_code,
        n.site_base_url,
        n.application_id
    )
}

fn survey_invite_html(n: &SubmissionNotification) -> String {
    format!(
        "<p>Hola {},</p>\
         <p>Gracias por completar tu solicitud. Nos encantar\u{ed}a conocer tu \
         experiencia: <a href=\"{}/encuesta?solicitud={}\">responder la encuesta</a> \
         te toma menos de dos minutos.</p>",
        n.client_name, n.site_base_url, n.application_id
    )
}

/// Fans out the post-submission emails as independent spawned tasks.
/// Each recipient fails independently; failures are logged and never
/// propagate to the caller.
pub fn spawn_submission_notifications(client: EmailClient, n: SubmissionNotification) {
    if let Some(to) = n.client_email.clone() {
        let client = client.clone();
        let n = n.clone();
        tokio::spawn(async move {
            let html = client_confirmation_html(&n);
            if let Err(e) = client
                .send(&to, Some(&n.client_name), "Recibimos tu solicitud de financiamiento", &html)
                .await
            {
                tracing::warn!("Failed to send client confirmation for {}: {}", n.application_id, e);
            }
        });
    } else {
        tracing::warn!("Application {} submitted by a user without an email on file", n.application_id);
    }

    for admin in n.admin_emails.clone() {
        let client = client.clone();
        let n = n.clone();
        tokio::spawn(async move {
            let html = admin_alert_html(&n);
            if let Err(e) = client
                .send(&admin, None, "Nueva solicitud de financiamiento", &html)
                .await
            {
                tracing::warn!("Failed to send admin alert to {} for {}: {}", admin, n.application_id, e);
            }
        });
    }

    if let Some((advisor_email, advisor_name)) = n.advisor.clone() {
        let client = client.clone();
        let n = n.clone();
        tokio::spawn(async move {
            let html = advisor_alert_html(&n, &advisor_name);
            if let Err(e) = client
                .send(&advisor_email, Some(&advisor_name), "Tu cliente envi\u{f3} su solicitud", &html)
                .await
            {
                tracing::warn!("Failed to send advisor alert for {}: {}", n.application_id, e);
            }
        });
    }

    if n.survey_invited {
        if let Some(to) = n.client_email.clone() {
            tokio::spawn(async move {
                let html = survey_invite_html(&n);
                if let Err(e) = client
                    .send(&to, Some(&n.client_name), "Cu\u{e9}ntanos c\u{f3}mo te fue", &html)
                    .await
                {
                    tracing::warn!("Failed to send survey invite for {}: {}", n.application_id, e);
                }
            });
        }
    }
}
