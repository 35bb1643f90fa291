use crate::config::Config;
use crate::errors::AppError;
use crate::models::Lead;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

/// Timeout for workflow-engine dispatch calls (lead processing, outreach).
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for Slack notifications.
pub const SLACK_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = "PulseCapture-Backend/1.0";

/// Result of an outbound call.
///
/// The client never propagates an error past its boundary: network failures,
/// HTTP error statuses and engine-reported failures all come back as a
/// `DispatchOutcome` with `success: false`. No retries, no dead-letter - a
/// failed attempt is terminal.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl DispatchOutcome {
    fn ok(status: u16, data: Option<Value>) -> Self {
        Self {
            success: true,
            status: Some(status),
            error: None,
            data,
        }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            error: Some(error.into()),
            data: None,
        }
    }
}

/// Client for the external workflow engine (n8n) and adjacent integrations.
///
/// All target URLs come from configuration so tests can point the client at
/// a mock server.
#[derive(Clone)]
pub struct WorkflowClient {
    client: reqwest::Client,
    lead_processing_url: Option<String>,
    outreach_url: Option<String>,
    n8n_base_url: String,
    n8n_api_key: Option<String>,
    openai_base_url: String,
    frontend_url: String,
}

impl WorkflowClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create workflow client: {}", e))
            })?;

        Ok(Self {
            client,
            lead_processing_url: config.lead_processing_webhook_url.clone(),
            outreach_url: config.outreach_webhook_url.clone(),
            n8n_base_url: config.n8n_base_url.clone(),
            n8n_api_key: config.n8n_api_key.clone(),
            openai_base_url: config.openai_base_url.clone(),
            frontend_url: config.frontend_url.clone(),
        })
    }

    /// Fire the lead-processing workflow for a freshly captured lead.
    ///
    /// Called from a detached task after submission: the submitter has
    /// already received their response and never learns the outcome.
    pub async fn trigger_lead_processing(&self, lead: &Lead) -> DispatchOutcome {
        let Some(url) = self.lead_processing_url.as_deref() else {
            tracing::warn!("N8N_WEBHOOK_A not configured, skipping webhook call");
            return DispatchOutcome::failure("Webhook URL not configured");
        };

        let payload = json!({
            "lead_id": lead.id,
            "name": lead.name,
            "email": lead.email,
            "company": lead.company,
            "website": lead.website,
            "problem_text": lead.problem_text,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let response = match self
            .client
            .post(url)
            .timeout(DISPATCH_TIMEOUT)
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("Failed to trigger lead processing webhook: {}", e);
                return DispatchOutcome::failure(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                "Lead processing webhook returned {}: {}",
                status,
                body
            );
            return DispatchOutcome::failure(format!(
                "Lead processing webhook failed with status {}",
                status
            ));
        }

        let data = response.json::<Value>().await.ok();
        tracing::info!(
            "Lead processing webhook triggered successfully: lead_id={}, status={}",
            lead.id,
            status
        );
        DispatchOutcome::ok(status.as_u16(), data)
    }

    /// Fire the outreach workflow for a lead.
    ///
    /// Runs synchronously inside the admin request. The engine signals
    /// failure either with an HTTP error status or with `success: false` in
    /// the response body; both count as a failed dispatch.
    pub async fn trigger_outreach(&self, lead_id: Uuid) -> DispatchOutcome {
        let Some(url) = self.outreach_url.as_deref() else {
            tracing::warn!("N8N_WEBHOOK_B not configured, skipping webhook call");
            return DispatchOutcome::failure("Webhook URL not configured");
        };

        let payload = json!({
            "lead_id": lead_id,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let response = match self
            .client
            .post(url)
            .timeout(DISPATCH_TIMEOUT)
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("Failed to trigger outreach webhook: {}", e);
                return DispatchOutcome::failure(e.to_string());
            }
        };

        let status = response.status();
        let data = response.json::<Value>().await.ok();

        let body_reports_failure = data
            .as_ref()
            .and_then(|d| d.get("success"))
            .and_then(|v| v.as_bool())
            == Some(false);

        if !status.is_success() || body_reports_failure {
            let error = data
                .as_ref()
                .and_then(|d| d.get("error"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Workflow failed with status {}", status));
            tracing::error!("Outreach workflow returned error: {}", error);
            return DispatchOutcome {
                success: false,
                status: Some(status.as_u16()),
                error: Some(error),
                data,
            };
        }

        tracing::info!(
            "Outreach webhook triggered successfully: lead_id={}, status={}",
            lead_id,
            status
        );
        DispatchOutcome::ok(status.as_u16(), data)
    }

    /// Post a scored-lead notification to Slack using the block-kit layout
    /// the dashboard links back from.
    pub async fn send_slack_notification(&self, webhook_url: &str, lead: &Lead) -> DispatchOutcome {
        let fit_score = lead
            .fit_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let fit_band = lead
            .fit_band
            .map(|b| format!("{:?}", b))
            .unwrap_or_else(|| "-".to_string());

        let message = json!({
            "text": format!("🎯 New Lead: {}", lead.name),
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": format!("🎯 New Lead: {}", lead.name) }
                },
                {
                    "type": "section",
                    "fields": [
                        { "type": "mrkdwn", "text": format!("*Email:* {}", lead.email) },
                        { "type": "mrkdwn", "text": format!("*Company:* {}", lead.company.as_deref().unwrap_or("Not provided")) },
                        { "type": "mrkdwn", "text": format!("*Score:* {}/100 ({})", fit_score, fit_band) },
                        { "type": "mrkdwn", "text": format!("*Use Case:* {}", lead.use_case_label.as_deref().unwrap_or("-")) }
                    ]
                },
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": format!("*Message:* {}", lead.problem_text) }
                },
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": format!("*AI Rationale:* {}", lead.ai_rationale.as_deref().unwrap_or("-")) }
                },
                {
                    "type": "actions",
                    "elements": [
                        {
                            "type": "button",
                            "text": { "type": "plain_text", "text": "View in Dashboard" },
                            "url": format!("{}/dashboard", self.frontend_url),
                            "style": "primary"
                        }
                    ]
                }
            ]
        });

        match self
            .client
            .post(webhook_url)
            .timeout(SLACK_TIMEOUT)
            .json(&message)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("Slack notification sent successfully: lead_id={}", lead.id);
                DispatchOutcome::ok(resp.status().as_u16(), None)
            }
            Ok(resp) => {
                tracing::error!("Slack notification failed with status {}", resp.status());
                DispatchOutcome::failure(format!(
                    "Slack webhook returned status {}",
                    resp.status()
                ))
            }
            Err(e) => {
                tracing::error!("Failed to send Slack notification: {}", e);
                DispatchOutcome::failure(e.to_string())
            }
        }
    }

    /// Post the settings-page test message to a Slack webhook.
    pub async fn test_slack(&self, webhook_url: &str) -> DispatchOutcome {
        let message = json!({
            "text": "🎉 PulseCapture integration test successful!",
            "attachments": [{
                "color": "good",
                "fields": [{
                    "title": "Test Message",
                    "value": "Your Slack integration is working correctly.",
                    "short": false
                }]
            }]
        });

        match self
            .client
            .post(webhook_url)
            .timeout(SLACK_TIMEOUT)
            .json(&message)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => DispatchOutcome::ok(resp.status().as_u16(), None),
            Ok(resp) => DispatchOutcome::failure(format!(
                "Slack webhook test failed: {}",
                resp.status()
            )),
            Err(e) => DispatchOutcome::failure(e.to_string()),
        }
    }

    /// Verify an OpenAI API key by listing models.
    pub async fn test_openai(&self, api_key: &str) -> DispatchOutcome {
        let url = format!("{}/v1/models", self.openai_base_url);
        match self
            .client
            .get(&url)
            .timeout(SLACK_TIMEOUT)
            .header("Authorization", format!("Bearer {}", api_key))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => DispatchOutcome::ok(resp.status().as_u16(), None),
            Ok(resp) => DispatchOutcome::failure(format!(
                "OpenAI API test failed: {}",
                resp.status()
            )),
            Err(e) => DispatchOutcome::failure(e.to_string()),
        }
    }

    /// Verify connectivity with the n8n instance itself.
    pub async fn test_n8n_connection(&self) -> DispatchOutcome {
        let url = format!("{}/api/credentials", self.n8n_base_url);
        let mut request = self.client.get(&url).timeout(SLACK_TIMEOUT);
        if let Some(key) = &self.n8n_api_key {
            request = request.header("X-N8N-API-KEY", key);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => DispatchOutcome::ok(resp.status().as_u16(), None),
            Ok(resp) => DispatchOutcome::failure(format!(
                "n8n connection test failed: {}",
                resp.status()
            )),
            Err(e) => {
                tracing::error!("n8n connection test failed: {}", e);
                DispatchOutcome::failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_url: "postgresql://test".to_string(),
            port: 3001,
            jwt_secret: "secret".to_string(),
            lead_processing_webhook_url: None,
            outreach_webhook_url: None,
            webhook_secret: None,
            n8n_base_url: "http://localhost:5678".to_string(),
            n8n_api_key: None,
            openai_base_url: "https://api.openai.com".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
        }
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = WorkflowClient::new(&test_config());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn unconfigured_outreach_url_fails_without_calling_out() {
        let client = WorkflowClient::new(&test_config()).unwrap();
        let outcome = client.trigger_outreach(Uuid::new_v4()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Webhook URL not configured"));
    }

    #[test]
    fn outcome_serialization_omits_empty_fields() {
        let outcome = DispatchOutcome::failure("boom");
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "boom");
        assert!(value.get("status").is_none());
        assert!(value.get("data").is_none());
    }
}
