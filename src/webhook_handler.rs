use crate::errors::AppError;
use crate::handlers::{record_event, AppState};
use crate::lifecycle;
use crate::models::{EventType, Lead, LeadStatus, Outreach};
use crate::webhook_models::{OutreachCallback, ScoringCallback};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Length of the lead's outreach preview snippet.
const OUTREACH_PREVIEW_CHARS: usize = 200;

/// How long a delivery id is remembered for deduplication.
const DELIVERY_RETENTION_HOURS: i32 = 24;

// Both inbound endpoints are called by the external workflow engine when a
// workflow completes. Requests are authenticated with the shared webhook
// secret (X-Webhook-Token) when one is configured, and deduplicated by
// delivery id before any side effect is applied.

/// Validate webhook secret from X-Webhook-Token header
fn validate_webhook_secret(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    // If no secret is configured, skip validation (warn was already logged at startup)
    let Some(ref expected_secret) = state.config.webhook_secret else {
        return Ok(());
    };

    let token = headers
        .get("X-Webhook-Token")
        .or_else(|| headers.get("x-webhook-token"))
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-Webhook-Token header".to_string()))?;

    // Constant-time comparison to prevent timing attacks
    if !constant_time_compare(token, expected_secret) {
        tracing::warn!("Invalid webhook token received");
        return Err(AppError::Unauthorized("Invalid webhook token".to_string()));
    }

    Ok(())
}

/// Constant-time string comparison (basic implementation)
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Delivery id from the X-Delivery-Id header, falling back to the payload.
fn delivery_id(headers: &HeaderMap, payload_id: Option<&str>) -> Option<String> {
    headers
        .get("X-Delivery-Id")
        .or_else(|| headers.get("x-delivery-id"))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| payload_id.map(str::to_string))
        .filter(|id| !id.trim().is_empty())
}

/// Claim a delivery id. Returns false when the id was already seen - the
/// caller must skip all side effects for a duplicate. Expired claims are
/// purged on the way in so the table stays bounded.
async fn claim_delivery(db: &PgPool, delivery_id: &str, endpoint: &str) -> Result<bool, AppError> {
    sqlx::query("DELETE FROM webhook_deliveries WHERE received_at < now() - make_interval(hours => $1)")
        .bind(DELIVERY_RETENTION_HOURS)
        .execute(db)
        .await?;

    let result = sqlx::query(
        "INSERT INTO webhook_deliveries (delivery_id, endpoint) VALUES ($1, $2)
         ON CONFLICT (delivery_id) DO NOTHING",
    )
    .bind(delivery_id)
    .bind(endpoint)
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

fn duplicate_ack() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "duplicate": true,
            "message": "Delivery already processed",
        })),
    )
}

/// Truncate an email body into the preview snippet stored on the lead.
/// Char-based so a multi-byte body cannot split a code point; the ellipsis
/// is appended unconditionally.
pub fn outreach_preview(body: &str) -> String {
    let truncated: String = body.chars().take(OUTREACH_PREVIEW_CHARS).collect();
    format!("{}...", truncated)
}

/// POST /api/webhooks/lead-processing
///
/// Scoring results callback. Applies the scoring fields and moves the lead
/// to `scored`, appending a `lead_scored` event carrying the full payload.
/// When instant alerts are enabled a Slack notification is fanned out in a
/// detached task.
pub async fn lead_processing_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ScoringCallback>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    validate_webhook_secret(&state, &headers)?;

    let lead_id = payload
        .lead_id
        .ok_or_else(|| AppError::BadRequest("lead_id is required".to_string()))?;

    if let Some(score) = payload.fit_score {
        if !(0..=100).contains(&score) {
            return Err(AppError::Validation(vec![
                "fit_score must be between 0 and 100".to_string(),
            ]));
        }
    }

    tracing::info!("Lead processing results received: lead_id={}", lead_id);

    if let Some(id) = delivery_id(&headers, payload.delivery_id.as_deref()) {
        if !claim_delivery(&state.db, &id, "lead-processing").await? {
            tracing::info!("⚠️  Duplicate scoring delivery skipped: {}", id);
            return Ok(duplicate_ack());
        }
    }

    let current = lifecycle::current_status(&state.db, lead_id).await?;
    lifecycle::transition(current, LeadStatus::Scored)?;

    let result = sqlx::query(
        r#"
        UPDATE leads SET
            use_case_label = $1, fit_score = $2, fit_band = $3, ai_rationale = $4,
            company_size = $5, industry = $6, location = $7, revenue_range = $8,
            status = 'scored', updated_at = now()
        WHERE id = $9 AND status = $10
        "#,
    )
    .bind(&payload.use_case_label)
    .bind(payload.fit_score)
    .bind(payload.fit_band)
    .bind(&payload.ai_rationale)
    .bind(&payload.company_size)
    .bind(&payload.industry)
    .bind(&payload.location)
    .bind(&payload.revenue_range)
    .bind(lead_id)
    .bind(current)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "Lead status changed concurrently".to_string(),
        ));
    }

    let event_data = serde_json::to_value(&payload)
        .map_err(|e| AppError::InternalError(format!("Failed to serialize payload: {}", e)))?;
    record_event(&state.db, lead_id, EventType::LeadScored, event_data).await?;

    tracing::info!(
        "Lead updated from workflow scoring: lead_id={}, score={:?}",
        lead_id,
        payload.fit_score
    );

    notify_slack_if_enabled(&state, lead_id).await;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Lead processing completed",
        })),
    ))
}

/// Fan out a Slack notification for a freshly scored lead when instant
/// alerts are on. Detached; failures are logged only.
async fn notify_slack_if_enabled(state: &Arc<AppState>, lead_id: Uuid) {
    let settings = state.runtime_settings.snapshot().await;
    if !settings.instant_alerts {
        return;
    }
    let Some(webhook_url) = settings.slack_webhook.filter(|url| !url.is_empty()) else {
        return;
    };

    let lead = match sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
        .bind(lead_id)
        .fetch_optional(&state.db)
        .await
    {
        Ok(Some(lead)) => lead,
        Ok(None) => return,
        Err(e) => {
            tracing::error!("Failed to load lead for Slack notification: {}", e);
            return;
        }
    };

    let client = state.workflow_client.clone();
    tokio::spawn(async move {
        let outcome = client.send_slack_notification(&webhook_url, &lead).await;
        if !outcome.success {
            tracing::warn!(
                "Slack notification failed for lead {}: {:?}",
                lead.id,
                outcome.error
            );
        }
    });
}

/// POST /api/webhooks/send-outreach
///
/// Outreach content callback. Stores the generated email, marks the lead
/// `outreach_sent` with a preview snippet, and appends an `outreach_sent`
/// event.
pub async fn send_outreach_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<OutreachCallback>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    validate_webhook_secret(&state, &headers)?;

    let lead_id = payload
        .lead_id
        .ok_or_else(|| AppError::BadRequest("lead_id is required".to_string()))?;

    tracing::info!("Outreach results received: lead_id={}", lead_id);

    if let Some(id) = delivery_id(&headers, payload.delivery_id.as_deref()) {
        if !claim_delivery(&state.db, &id, "send-outreach").await? {
            tracing::info!("⚠️  Duplicate outreach delivery skipped: {}", id);
            return Ok(duplicate_ack());
        }
    }

    let current = lifecycle::current_status(&state.db, lead_id).await?;
    lifecycle::transition(current, LeadStatus::OutreachSent)?;

    let outreach = sqlx::query_as::<_, Outreach>(
        r#"
        INSERT INTO outreach (lead_id, email_subject, email_body, status)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(lead_id)
    .bind(&payload.email_subject)
    .bind(&payload.email_body)
    .bind(&payload.outreach_status)
    .fetch_one(&state.db)
    .await?;

    let preview = outreach_preview(payload.email_body.as_deref().unwrap_or_default());

    let result = sqlx::query(
        r#"
        UPDATE leads SET
            status = 'outreach_sent', outreach_sent_at = $1, outreach_preview = $2,
            updated_at = now()
        WHERE id = $3 AND status = $4
        "#,
    )
    .bind(Utc::now())
    .bind(&preview)
    .bind(lead_id)
    .bind(current)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "Lead status changed concurrently".to_string(),
        ));
    }

    record_event(
        &state.db,
        lead_id,
        EventType::OutreachSent,
        json!({
            "subject": payload.email_subject,
            "sent_at": outreach.sent_at,
        }),
    )
    .await?;

    tracing::info!(
        "Outreach recorded from workflow: lead_id={}, outreach_id={}",
        lead_id,
        outreach.id
    );

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Outreach processing completed",
            "lead_id": lead_id,
            "outreach": outreach,
        })),
    ))
}

/// GET /api/webhooks/test
pub async fn webhook_test() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Webhook endpoint is working",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_bodies() {
        let body = "x".repeat(500);
        let preview = outreach_preview(&body);
        assert_eq!(preview.chars().count(), OUTREACH_PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
        assert!(preview.starts_with(&"x".repeat(OUTREACH_PREVIEW_CHARS)));
    }

    #[test]
    fn preview_appends_ellipsis_to_short_bodies() {
        assert_eq!(outreach_preview("short body"), "short body...");
        assert_eq!(outreach_preview(""), "...");
    }

    #[test]
    fn preview_is_char_safe() {
        let body = "é".repeat(300);
        let preview = outreach_preview(&body);
        assert_eq!(preview.chars().count(), OUTREACH_PREVIEW_CHARS + 3);
    }

    #[test]
    fn constant_time_compare_basics() {
        assert!(constant_time_compare("secret", "secret"));
        assert!(!constant_time_compare("secret", "secre7"));
        assert!(!constant_time_compare("secret", "secrets"));
        assert!(!constant_time_compare("", "x"));
    }

    #[test]
    fn delivery_id_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Delivery-Id", "header-id".parse().unwrap());
        assert_eq!(
            delivery_id(&headers, Some("payload-id")),
            Some("header-id".to_string())
        );
        assert_eq!(
            delivery_id(&HeaderMap::new(), Some("payload-id")),
            Some("payload-id".to_string())
        );
        assert_eq!(delivery_id(&HeaderMap::new(), None), None);
        assert_eq!(delivery_id(&HeaderMap::new(), Some("  ")), None);
    }
}
