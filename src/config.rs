use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    /// n8n workflow entry point for lead scoring (N8N_WEBHOOK_A).
    pub lead_processing_webhook_url: Option<String>,
    /// n8n workflow entry point for outreach generation (N8N_WEBHOOK_B).
    pub outreach_webhook_url: Option<String>,
    /// Shared secret expected in X-Webhook-Token on inbound callbacks.
    pub webhook_secret: Option<String>,
    pub n8n_base_url: String,
    pub n8n_api_key: Option<String>,
    pub openai_base_url: String,
    pub frontend_url: String,
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<String>,
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
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable required"))
                .and_then(|secret| {
                    if secret.trim().is_empty() {
                        anyhow::bail!("JWT_SECRET cannot be empty");
                    }
                    Ok(secret)
                })?,
            lead_processing_webhook_url: optional_url("N8N_WEBHOOK_A")?,
            outreach_webhook_url: optional_url("N8N_WEBHOOK_B")?,
            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            n8n_base_url: std::env::var("N8N_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "http://localhost:5678".to_string()),
            n8n_api_key: std::env::var("N8N_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            frontend_url: std::env::var("FRONTEND_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            bootstrap_admin_email: std::env::var("ADMIN_EMAIL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            bootstrap_admin_password: std::env::var("ADMIN_PASSWORD")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Server Port: {}", config.port);
        tracing::debug!("n8n Base URL: {}", config.n8n_base_url);
        match &config.lead_processing_webhook_url {
            Some(url) => tracing::info!("Lead processing webhook configured: {}", url),
            None => tracing::warn!(
                "N8N_WEBHOOK_A not configured - lead processing dispatch will be skipped"
            ),
        }
        match &config.outreach_webhook_url {
            Some(url) => tracing::info!("Outreach webhook configured: {}", url),
            None => {
                tracing::warn!("N8N_WEBHOOK_B not configured - outreach dispatch will be skipped")
            }
        }
        if config.webhook_secret.is_none() {
            tracing::warn!(
                "WEBHOOK_SECRET not configured - inbound webhooks will NOT be authenticated"
            );
        }

        Ok(config)
    }
}

/// Read an optional env var that, when present, must be an http(s) URL.
fn optional_url(name: &str) -> anyhow::Result<Option<String>> {
    match std::env::var(name).ok().filter(|s| !s.trim().is_empty()) {
        Some(url) => {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
            Ok(Some(url))
        }
        None => Ok(None),
    }
}
