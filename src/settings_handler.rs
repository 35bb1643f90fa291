//! Integration settings: persistence, the in-process runtime view, and the
//! admin test endpoints.
//!
//! The settings table keeps history; the latest row by `created_at` is the
//! current configuration. The runtime view is swapped atomically on update
//! so concurrently running requests observe either the old or the new
//! configuration, never a mix.

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{Settings, SettingsUpdate};
use crate::validation::is_valid_email;
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@pulsecapture.io";

pub const DEFAULT_EMAIL_TEMPLATE: &str = "Hi {{name}},

Thank you for your interest in PulseCapture!

Based on your message about {{company}}, I believe our AI-powered lead management platform could be a great fit for your team.

Would you be available for a quick 15-minute demo this week?

Best regards,
Your Sales Team";

/// The subset of settings the running process consults directly.
#[derive(Debug, Clone)]
pub struct IntegrationSettings {
    pub slack_webhook: Option<String>,
    pub openai_api_key: Option<String>,
    pub email_notifications: bool,
    pub instant_alerts: bool,
    pub admin_email: Option<String>,
    pub email_template: Option<String>,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            slack_webhook: None,
            openai_api_key: None,
            email_notifications: true,
            instant_alerts: true,
            admin_email: Some(DEFAULT_ADMIN_EMAIL.to_string()),
            email_template: Some(DEFAULT_EMAIL_TEMPLATE.to_string()),
        }
    }
}

impl From<&Settings> for IntegrationSettings {
    fn from(row: &Settings) -> Self {
        Self {
            slack_webhook: row.slack_webhook.clone(),
            openai_api_key: row.openai_api_key.clone(),
            email_notifications: row.email_notifications,
            instant_alerts: row.instant_alerts,
            admin_email: row.admin_email.clone(),
            email_template: row.email_template.clone(),
        }
    }
}

/// Process-wide settings handle with an atomic snapshot/replace contract.
#[derive(Clone)]
pub struct RuntimeSettings {
    inner: Arc<RwLock<IntegrationSettings>>,
}

impl RuntimeSettings {
    pub fn new(initial: IntegrationSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Build the runtime view from the most recent settings row, falling
    /// back to defaults when none exists yet.
    pub async fn load(pool: &PgPool) -> Result<Self, AppError> {
        let current = latest_settings(pool).await?;
        let initial = current
            .as_ref()
            .map(IntegrationSettings::from)
            .unwrap_or_default();
        Ok(Self::new(initial))
    }

    pub async fn snapshot(&self) -> IntegrationSettings {
        self.inner.read().await.clone()
    }

    pub async fn replace(&self, next: IntegrationSettings) {
        *self.inner.write().await = next;
    }
}

async fn latest_settings(pool: &PgPool) -> Result<Option<Settings>, AppError> {
    let settings = sqlx::query_as::<_, Settings>(
        "SELECT * FROM settings ORDER BY created_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(settings)
}

/// GET /api/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    match latest_settings(&state.db).await? {
        Some(settings) => Ok(Json(serde_json::to_value(settings).map_err(|e| {
            AppError::InternalError(format!("Failed to serialize settings: {}", e))
        })?)),
        // Defaults when nothing has been saved yet
        None => Ok(Json(json!({
            "slack_webhook": "",
            "openai_api_key": "",
            "email_notifications": true,
            "instant_alerts": true,
            "admin_email": DEFAULT_ADMIN_EMAIL,
            "email_template": DEFAULT_EMAIL_TEMPLATE,
        }))),
    }
}

/// PUT /api/settings
///
/// Upsert: update the most recent row when one exists, insert otherwise.
/// The runtime view is swapped after the row is persisted.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(payload): Json<SettingsUpdate>,
) -> Result<Json<Value>, AppError> {
    let existing = latest_settings(&state.db).await?;

    let settings = match existing {
        Some(current) => {
            sqlx::query_as::<_, Settings>(
                r#"
                UPDATE settings SET
                    slack_webhook = $1, openai_api_key = $2, email_notifications = $3,
                    instant_alerts = $4, admin_email = $5, email_template = $6,
                    updated_at = now()
                WHERE id = $7
                RETURNING *
                "#,
            )
            .bind(&payload.slack_webhook)
            .bind(&payload.openai_api_key)
            .bind(payload.email_notifications)
            .bind(payload.instant_alerts)
            .bind(&payload.admin_email)
            .bind(&payload.email_template)
            .bind(current.id)
            .fetch_one(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, Settings>(
                r#"
                INSERT INTO settings (
                    slack_webhook, openai_api_key, email_notifications,
                    instant_alerts, admin_email, email_template
                ) VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(&payload.slack_webhook)
            .bind(&payload.openai_api_key)
            .bind(payload.email_notifications)
            .bind(payload.instant_alerts)
            .bind(&payload.admin_email)
            .bind(&payload.email_template)
            .fetch_one(&state.db)
            .await?
        }
    };

    state
        .runtime_settings
        .replace(IntegrationSettings::from(&settings))
        .await;

    tracing::info!(
        "Settings updated successfully: slack_webhook={}, openai_api_key={}",
        settings.slack_webhook.as_deref().map(|_| "set").unwrap_or("unset"),
        settings.openai_api_key.as_deref().map(|_| "set").unwrap_or("unset"),
    );

    Ok(Json(json!({
        "success": true,
        "message": "Settings updated successfully",
        "settings": settings,
    })))
}

#[derive(Debug, Deserialize)]
pub struct TestSlackRequest {
    pub slack_webhook: Option<String>,
}

/// POST /api/settings/test/slack
pub async fn test_slack(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(payload): Json<TestSlackRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let webhook_url = payload
        .slack_webhook
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Slack webhook URL is required".to_string()))?;

    let outcome = state.workflow_client.test_slack(&webhook_url).await;
    if outcome.success {
        Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Slack integration test successful" })),
        ))
    } else {
        tracing::error!("Slack integration test failed: {:?}", outcome.error);
        Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Slack integration test failed" })),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct TestOpenAiRequest {
    pub openai_api_key: Option<String>,
}

/// POST /api/settings/test/openai
pub async fn test_openai(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(payload): Json<TestOpenAiRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let api_key = payload
        .openai_api_key
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("OpenAI API key is required".to_string()))?;

    let outcome = state.workflow_client.test_openai(&api_key).await;
    if outcome.success {
        Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "message": "OpenAI integration test successful" })),
        ))
    } else {
        tracing::error!("OpenAI integration test failed: {:?}", outcome.error);
        Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "OpenAI integration test failed" })),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub admin_email: Option<String>,
    pub email_template: Option<String>,
}

/// POST /api/settings/test/email
///
/// Configuration validation only - actual sending is owned by the workflow
/// engine.
pub async fn test_email(
    _user: AuthUser,
    Json(payload): Json<TestEmailRequest>,
) -> Result<Json<Value>, AppError> {
    let admin_email = payload
        .admin_email
        .filter(|email| !email.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Admin email is required".to_string()))?;

    if !is_valid_email(&admin_email) {
        return Err(AppError::BadRequest("Invalid email format".to_string()));
    }

    if let Some(template) = &payload.email_template {
        if !template.contains("{{name}}") {
            return Err(AppError::BadRequest(
                "Email template must include {{name}} placeholder".to_string(),
            ));
        }
    }

    Ok(Json(json!({
        "success": true,
        "message": "Email configuration is valid - the workflow engine handles actual sending",
    })))
}

/// POST /api/settings/test/n8n
pub async fn test_n8n(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let outcome = state.workflow_client.test_n8n_connection().await;
    if outcome.success {
        Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "message": "n8n connection successful" })),
        ))
    } else {
        Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": outcome.error.unwrap_or_else(|| "n8n connection test failed".to_string()) })),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_reflects_replace() {
        let runtime = RuntimeSettings::new(IntegrationSettings::default());
        let initial = runtime.snapshot().await;
        assert!(initial.instant_alerts);
        assert!(initial.slack_webhook.is_none());

        runtime
            .replace(IntegrationSettings {
                slack_webhook: Some("https://hooks.slack.com/services/T/B/X".to_string()),
                instant_alerts: false,
                ..IntegrationSettings::default()
            })
            .await;

        let next = runtime.snapshot().await;
        assert!(!next.instant_alerts);
        assert_eq!(
            next.slack_webhook.as_deref(),
            Some("https://hooks.slack.com/services/T/B/X")
        );
    }

    #[test]
    fn default_template_has_required_placeholder() {
        assert!(DEFAULT_EMAIL_TEMPLATE.contains("{{name}}"));
    }
}
