use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Public site origin used when building links embedded in emails.
    pub site_base_url: String,
    /// Transactional email API (Brevo-compatible JSON endpoint).
    pub email_api_base_url: String,
    pub email_api_key: Option<String>,
    pub email_sender: String,
    /// Admin addresses fanned out on every new submission.
    pub admin_emails: Vec<String>,
    /// Server secret for signing expiring document URLs.
    pub document_url_secret: String,
    /// Validity of issued document URLs, in seconds.
    pub document_url_ttl_secs: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            site_base_url: std::env::var("SITE_BASE_URL")
                .unwrap_or_else(|_| "https://localhost".to_string())
                .trim_end_matches('/')
                .to_string(),
            email_api_base_url: {
                let url = std::env::var("EMAIL_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.brevo.com".to_string());
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    anyhow::bail!("EMAIL_API_BASE_URL must start with http:// or https://");
                }
                url.trim_end_matches('/').to_string()
            },
            email_api_key: std::env::var("EMAIL_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            email_sender: std::env::var("EMAIL_SENDER")
                .unwrap_or_else(|_| "no-reply@localhost".to_string()),
            admin_emails: std::env::var("ADMIN_EMAILS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            document_url_secret: std::env::var("DOCUMENT_URL_SECRET")
                .map_err(|_| anyhow::anyhow!("DOCUMENT_URL_SECRET environment variable required"))
                .and_then(|s| {
                    if s.trim().is_empty() {
                        anyhow::bail!("DOCUMENT_URL_SECRET cannot be empty");
                    }
                    Ok(s)
                })?,
            document_url_ttl_secs: std::env::var("DOCUMENT_URL_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DOCUMENT_URL_TTL_SECS must be a number"))?,
        };

        if config.email_api_key.is_none() {
            tracing::warn!("EMAIL_API_KEY not set; submission notifications will be skipped");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Site base URL: {}", config.site_base_url);
        tracing::debug!("Email API base URL: {}", config.email_api_base_url);
        tracing::debug!("Admin recipients: {}", config.admin_emails.len());
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
