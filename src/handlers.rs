use crate::auth::AuthUser;
use crate::config::Config;
use crate::errors::AppError;
use crate::lifecycle;
use crate::models::*;
use crate::settings_handler::RuntimeSettings;
use crate::validation::{validate_lead_submission, validate_lead_update};
use crate::workflow_client::WorkflowClient;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Client for the external workflow engine and integrations.
    pub workflow_client: WorkflowClient,
    /// Runtime-mutable integration settings (atomic snapshot/replace).
    pub runtime_settings: RuntimeSettings,
}

/// Default page number for the admin lead listing.
pub const DEFAULT_PAGE: u32 = 1;
/// Default page size for the admin lead listing.
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Upper bound on the requested page size.
pub const MAX_PAGE_SIZE: u32 = 100;

/// `ceil(total / limit)`, matching the dashboard's pagination math.
pub fn total_pages(total: i64, limit: u32) -> i64 {
    if limit == 0 {
        return 0;
    }
    (total + i64::from(limit) - 1) / i64::from(limit)
}

/// Append a row to the audit trail. Events are insert-only.
pub async fn record_event(
    pool: &PgPool,
    lead_id: Uuid,
    event_type: EventType,
    event_data: Value,
) -> Result<(), AppError> {
    sqlx::query("INSERT INTO events (lead_id, event_type, event_data) VALUES ($1, $2, $3)")
        .bind(lead_id)
        .bind(event_type.as_str())
        .bind(event_data)
        .execute(pool)
        .await?;
    Ok(())
}

/// Health check endpoint.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "pulse-capture-api",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

// ============ Public lead endpoints ============

/// POST /api/leads
///
/// Public form submission. Creates the lead in `new`, records the capture
/// event, then hands the lead to the workflow engine from a detached task -
/// the 201 response never waits on dispatch, and a dispatch failure leaves
/// the lead in `new` (logged only, no retry).
pub async fn submit_lead(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LeadSubmission>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    validate_lead_submission(&payload)?;

    let lead_id = Uuid::new_v4();
    let lead = sqlx::query_as::<_, Lead>(
        r#"
        INSERT INTO leads (id, name, email, company, website, problem_text, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'new')
        RETURNING *
        "#,
    )
    .bind(lead_id)
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.company)
    .bind(&payload.website)
    .bind(&payload.problem_text)
    .fetch_one(&state.db)
    .await?;

    record_event(
        &state.db,
        lead_id,
        EventType::LeadCaptured,
        json!({ "source": "website" }),
    )
    .await?;

    tracing::info!(
        "Lead captured successfully: lead_id={}, email={}",
        lead_id,
        lead.email
    );

    let client = state.workflow_client.clone();
    tokio::spawn(async move {
        let outcome = client.trigger_lead_processing(&lead).await;
        if outcome.success {
            tracing::info!("Lead sent to workflow engine for processing: {}", lead.id);
        } else {
            tracing::error!(
                "Failed to trigger lead processing workflow for {}: {:?}",
                lead.id,
                outcome.error
            );
        }
    });

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Lead captured successfully",
            "leadId": lead_id,
        })),
    ))
}

/// Subset of lead fields exposed to the public confirmation view.
#[derive(Debug, sqlx::FromRow, serde::Serialize)]
struct PublicLead {
    id: Uuid,
    name: String,
    email: String,
    company: Option<String>,
    status: LeadStatus,
    created_at: DateTime<Utc>,
}

/// GET /api/leads/:id
///
/// Public lookup backing the thank-you page.
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let lead = sqlx::query_as::<_, PublicLead>(
        "SELECT id, name, email, company, status, created_at FROM leads WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))?;

    Ok(Json(json!({ "success": true, "lead": lead })))
}

// ============ Admin lead endpoints ============

/// Append the listing filters as a WHERE clause. Shared between the page
/// query and the count query so both always agree.
fn apply_lead_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &LeadListQuery) {
    let mut prefix = " WHERE ";

    if let Some(band) = query.fit_band {
        qb.push(prefix).push("l.fit_band = ").push_bind(band);
        prefix = " AND ";
    }
    if let Some(label) = &query.use_case_label {
        qb.push(prefix)
            .push("l.use_case_label = ")
            .push_bind(label.clone());
        prefix = " AND ";
    }
    if let Some(status) = query.status {
        qb.push(prefix).push("l.status = ").push_bind(status);
        prefix = " AND ";
    }
    if let Some(search) = &query.search {
        let term = search.trim();
        if !term.is_empty() {
            let pattern = format!("%{}%", term);
            qb.push(prefix)
                .push("(l.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR l.company ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR l.email ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

/// GET /api/admin/leads
///
/// Filtered, paginated listing ordered by `created_at` descending. Each row
/// carries its event count and last activity timestamp.
///
/// # Arguments
///
/// * `query` - `page`, `limit`, `fit_band`, `use_case_label`, `status`, `search`.
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(query): Query<LeadListQuery>,
) -> Result<Json<Value>, AppError> {
    let page = query.page.unwrap_or(DEFAULT_PAGE).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = i64::from(page - 1) * i64::from(limit);

    let mut qb = QueryBuilder::new(
        r#"
        SELECT l.*,
               COUNT(e.id) AS event_count,
               MAX(e.created_at) AS last_activity_at
        FROM leads l
        LEFT JOIN events e ON l.id = e.lead_id
        "#,
    );
    apply_lead_filters(&mut qb, &query);
    qb.push(" GROUP BY l.id ORDER BY l.created_at DESC LIMIT ")
        .push_bind(i64::from(limit))
        .push(" OFFSET ")
        .push_bind(offset);

    let leads: Vec<LeadWithActivity> = qb.build_query_as().fetch_all(&state.db).await?;

    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM leads l");
    apply_lead_filters(&mut count_qb, &query);
    let total: i64 = count_qb.build_query_scalar().fetch_one(&state.db).await?;

    Ok(Json(json!({
        "leads": leads,
        "total": total,
        "page": page,
        "limit": limit,
        "totalPages": total_pages(total, limit),
    })))
}

/// GET /api/admin/leads/:id
pub async fn get_lead_details(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))?;

    let events = sqlx::query_as::<_, Event>(
        "SELECT * FROM events WHERE lead_id = $1 ORDER BY created_at DESC",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({ "lead": lead, "events": events })))
}

/// PATCH /api/admin/leads/:id
///
/// Manual lead edit. Status changes go through the lifecycle state machine;
/// this is the only producer of `responded`, `converted` and `lost`.
pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<LeadUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    validate_lead_update(&payload)?;

    if payload.status.is_none()
        && payload.use_case_label.is_none()
        && payload.fit_score.is_none()
        && payload.fit_band.is_none()
        && payload.ai_rationale.is_none()
    {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))?;

    if let Some(to) = payload.status {
        lifecycle::transition(lead.status, to)?;
    }

    let mut qb = QueryBuilder::new("UPDATE leads SET updated_at = now()");
    if let Some(status) = payload.status {
        qb.push(", status = ").push_bind(status);
    }
    if let Some(label) = &payload.use_case_label {
        qb.push(", use_case_label = ").push_bind(label.clone());
    }
    if let Some(score) = payload.fit_score {
        qb.push(", fit_score = ").push_bind(score);
    }
    if let Some(band) = payload.fit_band {
        qb.push(", fit_band = ").push_bind(band);
    }
    if let Some(rationale) = &payload.ai_rationale {
        qb.push(", ai_rationale = ").push_bind(rationale.clone());
    }
    qb.push(" WHERE id = ").push_bind(id);
    if payload.status.is_some() {
        // Guard against a concurrent transition
        qb.push(" AND status = ").push_bind(lead.status);
    }
    qb.push(" RETURNING *");

    let updated: Lead = qb
        .build_query_as()
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Conflict("Lead status changed concurrently".to_string()))?;

    record_event(
        &state.db,
        id,
        EventType::LeadUpdated,
        json!({
            "status": payload.status,
            "use_case_label": payload.use_case_label,
            "fit_score": payload.fit_score,
            "fit_band": payload.fit_band,
        }),
    )
    .await?;

    tracing::info!("Lead updated by admin: lead_id={}", id);

    Ok(Json(json!({
        "success": true,
        "message": "Lead updated successfully",
        "lead": updated,
    })))
}

/// POST /api/admin/leads/:id/outreach
///
/// Trigger the outreach workflow for a lead. The lead is only marked
/// `outreach_sent` after the engine reports success - a failed dispatch
/// surfaces as an error and leaves the status untouched.
pub async fn send_outreach(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))?;

    // Reject before calling out, not after
    lifecycle::transition(lead.status, LeadStatus::OutreachSent)?;

    let outcome = state.workflow_client.trigger_outreach(id).await;
    if !outcome.success {
        return Err(AppError::ExternalApiError(
            outcome
                .error
                .unwrap_or_else(|| "Outreach workflow failed".to_string()),
        ));
    }

    lifecycle::apply(&state.db, id, lead.status, LeadStatus::OutreachSent).await?;

    record_event(
        &state.db,
        id,
        EventType::OutreachSent,
        json!({ "message": "Outreach email sent to lead" }),
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Outreach sent successfully",
        "data": {
            "message": "Outreach sent successfully",
            "leadId": id,
        },
    })))
}

/// GET /api/admin/leads/:id/outreach
///
/// Most recent outreach content for a lead.
pub async fn get_outreach(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let outreach = sqlx::query_as::<_, Outreach>(
        "SELECT * FROM outreach WHERE lead_id = $1 ORDER BY sent_at DESC LIMIT 1",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("No outreach data found for this lead".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "email_subject": outreach.email_subject,
            "email_body": outreach.email_body,
            "status": outreach.status,
            "sent_at": outreach.sent_at,
        },
    })))
}

/// GET /api/admin/stats
///
/// Dashboard aggregates: lifecycle/fit-band counters, top companies as a
/// source breakdown, and the latest activity feed.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let stats = sqlx::query_as::<_, LeadStats>(
        r#"
        SELECT
            COUNT(*) AS total_leads,
            COUNT(*) FILTER (WHERE fit_band = 'High') AS high_priority,
            COUNT(*) FILTER (WHERE fit_band = 'Medium') AS medium_priority,
            COUNT(*) FILTER (WHERE fit_band = 'Low') AS low_priority,
            COUNT(*) FILTER (WHERE status = 'new') AS new_leads,
            COUNT(*) FILTER (WHERE status = 'scored') AS scored_leads,
            COUNT(*) FILTER (WHERE status = 'outreach_sent') AS outreach_sent,
            COUNT(*) FILTER (WHERE status = 'responded') AS responded,
            COUNT(*) FILTER (WHERE status = 'converted') AS converted,
            AVG(fit_score)::float8 AS avg_score
        FROM leads
        "#,
    )
    .fetch_one(&state.db)
    .await?;

    let source_stats = sqlx::query_as::<_, SourceStat>(
        r#"
        SELECT
            COALESCE(company, 'Unknown Company') AS source,
            COUNT(*) AS count,
            ROUND(COUNT(*) * 100.0 / (SELECT COUNT(*) FROM leads), 2)::float8 AS percentage,
            STRING_AGG(DISTINCT website, ', ') AS websites
        FROM leads
        WHERE company IS NOT NULL AND company != ''
        GROUP BY company
        ORDER BY count DESC
        LIMIT 10
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    let recent_activity = sqlx::query_as::<_, RecentActivity>(
        r#"
        SELECT
            e.event_type,
            e.event_data,
            e.created_at,
            l.name AS lead_name,
            l.email AS lead_email
        FROM events e
        JOIN leads l ON e.lead_id = l.id
        ORDER BY e.created_at DESC
        LIMIT 10
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "stats": stats,
        "source_stats": source_stats,
        "recent_activity": recent_activity,
    })))
}

// ============ Admin user management ============

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let users = sqlx::query_as::<_, PublicUser>(
        "SELECT id, name, email, role, created_at FROM users ORDER BY created_at DESC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({ "users": users })))
}

/// POST /api/admin/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (Some(name), Some(email), Some(password)) = (
        payload.name.filter(|s| !s.trim().is_empty()),
        payload.email.filter(|s| !s.trim().is_empty()),
        payload.password.filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Name, email, and password are required".to_string(),
        ));
    };

    let email = email.to_lowercase();
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&state.db)
        .await?;
    if exists {
        return Err(AppError::BadRequest(
            "User with this email already exists".to_string(),
        ));
    }

    let hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::InternalError(format!("Failed to hash password: {}", e)))?;

    let user_id = Uuid::new_v4();
    let user = sqlx::query_as::<_, PublicUser>(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, 'admin')
        RETURNING id, name, email, role, created_at
        "#,
    )
    .bind(user_id)
    .bind(&name)
    .bind(&email)
    .bind(&hash)
    .fetch_one(&state.db)
    .await?;

    tracing::info!("New admin user created: user_id={}, email={}", user_id, email);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Admin user created successfully",
            "user": user,
        })),
    ))
}

/// PUT /api/admin/users/:id
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<Value>, AppError> {
    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET name = $1, email = $2, role = $3, updated_at = now()
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(&payload.name)
    .bind(payload.email.to_lowercase())
    .bind(&payload.role)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!("User updated: user_id={}, email={}", id, updated.email);

    Ok(Json(json!({
        "success": true,
        "message": "User updated successfully",
        "user": PublicUser::from(&updated),
    })))
}

/// DELETE /api/admin/users/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!("User deleted: user_id={}", id);

    Ok(Json(json!({
        "success": true,
        "message": "User deleted successfully",
    })))
}
