use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

// ============ Database Models ============

/// Lead lifecycle status. Transitions are validated by `crate::lifecycle`;
/// nothing writes this column without going through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lead_status", rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Scored,
    OutreachSent,
    Responded,
    Converted,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Scored => "scored",
            LeadStatus::OutreachSent => "outreach_sent",
            LeadStatus::Responded => "responded",
            LeadStatus::Converted => "converted",
            LeadStatus::Lost => "lost",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lead quality bucket assigned by the external scoring workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "fit_band")]
pub enum FitBand {
    High,
    Medium,
    Low,
}

/// A prospect captured from the public form.
///
/// Scoring fields stay NULL until the external engine reports back; outreach
/// fields stay NULL until an outreach callback lands.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub website: Option<String>,
    pub problem_text: String,
    pub status: LeadStatus,
    pub use_case_label: Option<String>,
    pub fit_score: Option<i32>,
    pub fit_band: Option<FitBand>,
    pub ai_rationale: Option<String>,
    pub company_size: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub revenue_range: Option<String>,
    pub outreach_sent_at: Option<DateTime<Utc>>,
    pub outreach_preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Lead row as returned by the admin listing: the lead plus activity
/// aggregates from the events join.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LeadWithActivity {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub lead: Lead,
    pub event_count: i64,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Immutable audit record of a state change on a lead.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub event_type: String,
    pub event_data: Value,
    pub created_at: DateTime<Utc>,
}

/// Audit event tags written by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    LeadCaptured,
    LeadScored,
    OutreachSent,
    LeadUpdated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LeadCaptured => "lead_captured",
            EventType::LeadScored => "lead_scored",
            EventType::OutreachSent => "outreach_sent",
            EventType::LeadUpdated => "lead_updated",
        }
    }
}

/// A generated outbound email associated with a lead. Created only by the
/// inbound outreach webhook; never mutated afterwards.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Outreach {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub email_subject: Option<String>,
    pub email_body: Option<String>,
    pub status: String,
    pub sent_at: DateTime<Utc>,
}

/// Admin account. The password hash never serializes.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// User fields safe to return to clients.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            created_at: user.created_at,
        }
    }
}

/// Integration configuration row. The latest row by `created_at` is the
/// current configuration (upsert semantics).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Settings {
    pub id: Uuid,
    pub slack_webhook: Option<String>,
    pub openai_api_key: Option<String>,
    pub email_notifications: bool,
    pub instant_alerts: bool,
    pub admin_email: Option<String>,
    pub email_template: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ============ API Request/Response Models ============

/// Public form submission body.
#[derive(Debug, Clone, Deserialize)]
pub struct LeadSubmission {
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub website: Option<String>,
    pub problem_text: String,
}

/// Query parameters for the admin lead listing.
#[derive(Debug, Default, Deserialize)]
pub struct LeadListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub fit_band: Option<FitBand>,
    pub use_case_label: Option<String>,
    pub status: Option<LeadStatus>,
    /// Free-text search across name, company and email.
    pub search: Option<String>,
}

/// Manual admin edit of a lead. The only producer of the `responded`,
/// `converted` and `lost` statuses.
#[derive(Debug, Default, Deserialize)]
pub struct LeadUpdateRequest {
    pub status: Option<LeadStatus>,
    pub use_case_label: Option<String>,
    pub fit_score: Option<i32>,
    pub fit_band: Option<FitBand>,
    pub ai_rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
    pub email: String,
    pub role: String,
}

/// PUT /api/settings body.
#[derive(Debug, Deserialize)]
pub struct SettingsUpdate {
    pub slack_webhook: Option<String>,
    pub openai_api_key: Option<String>,
    #[serde(default = "default_true")]
    pub email_notifications: bool,
    #[serde(default = "default_true")]
    pub instant_alerts: bool,
    pub admin_email: Option<String>,
    pub email_template: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Dashboard aggregate counters.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LeadStats {
    pub total_leads: i64,
    pub high_priority: i64,
    pub medium_priority: i64,
    pub low_priority: i64,
    pub new_leads: i64,
    pub scored_leads: i64,
    pub outreach_sent: i64,
    pub responded: i64,
    pub converted: i64,
    pub avg_score: Option<f64>,
}

/// Per-company grouping used as the "source" breakdown on the dashboard.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SourceStat {
    pub source: String,
    pub count: i64,
    pub percentage: Option<f64>,
    pub websites: Option<String>,
}

/// Recent event joined with its lead's identity for the activity feed.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecentActivity {
    pub event_type: String,
    pub event_data: Value,
    pub created_at: DateTime<Utc>,
    pub lead_name: String,
    pub lead_email: String,
}
