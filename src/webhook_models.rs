use crate::models::FitBand;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Scoring results posted back by the workflow engine.
///
/// Unknown fields are preserved in `raw` so the audit event can carry the
/// full payload exactly as delivered.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringCallback {
    pub lead_id: Option<Uuid>,

    /// Engine delivery id used for idempotency when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,

    pub use_case_label: Option<String>,
    pub fit_score: Option<i32>,
    pub fit_band: Option<FitBand>,
    pub ai_rationale: Option<String>,
    pub company_size: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub revenue_range: Option<String>,

    #[serde(flatten)]
    pub raw: Value,
}

/// Generated outreach email posted back by the workflow engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutreachCallback {
    pub lead_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,

    pub email_subject: Option<String>,
    pub email_body: Option<String>,

    #[serde(default = "default_outreach_status")]
    pub outreach_status: String,

    #[serde(flatten)]
    pub raw: Value,
}

fn default_outreach_status() -> String {
    "sent".to_string()
}
