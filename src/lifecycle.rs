//! Lead lifecycle state machine.
//!
//! The status column is only ever written through [`transition`] plus a
//! guarded update (`UPDATE leads ... WHERE id = $1 AND status = $2`), so a
//! concurrent writer cannot silently clobber another's transition: the loser
//! of the race affects zero rows and the request fails with a conflict.

use crate::errors::AppError;
use crate::models::LeadStatus;
use sqlx::PgPool;
use uuid::Uuid;

/// Position of a status on the forward path. `Lost` sits outside the path.
fn rank(status: LeadStatus) -> Option<u8> {
    match status {
        LeadStatus::New => Some(0),
        LeadStatus::Scored => Some(1),
        LeadStatus::OutreachSent => Some(2),
        LeadStatus::Responded => Some(3),
        LeadStatus::Converted => Some(4),
        LeadStatus::Lost => None,
    }
}

pub fn is_terminal(status: LeadStatus) -> bool {
    matches!(status, LeadStatus::Converted | LeadStatus::Lost)
}

/// Whether `from -> to` is a legal transition.
///
/// Legal moves:
/// - strictly forward along new -> scored -> outreach_sent -> responded ->
///   converted, forward jumps included (outreach may precede scoring);
/// - `lost` from any non-terminal state;
/// - re-applying `scored` or `outreach_sent` (the engine may re-score, an
///   admin may send outreach again).
pub fn is_legal(from: LeadStatus, to: LeadStatus) -> bool {
    if to == LeadStatus::Lost {
        return !is_terminal(from);
    }
    if from == to {
        return matches!(to, LeadStatus::Scored | LeadStatus::OutreachSent);
    }
    match (rank(from), rank(to)) {
        (Some(f), Some(t)) => f < t,
        // Only a move to Lost leaves the forward path, handled above.
        _ => false,
    }
}

/// Validate a transition, returning the target status on success.
pub fn transition(from: LeadStatus, to: LeadStatus) -> Result<LeadStatus, AppError> {
    if is_legal(from, to) {
        Ok(to)
    } else {
        Err(AppError::Conflict(format!(
            "Illegal status transition: {} -> {}",
            from, to
        )))
    }
}

/// Fetch the current status of a lead, or 404.
pub async fn current_status(pool: &PgPool, lead_id: Uuid) -> Result<LeadStatus, AppError> {
    sqlx::query_scalar::<_, LeadStatus>("SELECT status FROM leads WHERE id = $1")
        .bind(lead_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))
}

/// Guarded status-only update. Fails with 409 when a concurrent writer moved
/// the lead away from `from` first.
pub async fn apply(
    pool: &PgPool,
    lead_id: Uuid,
    from: LeadStatus,
    to: LeadStatus,
) -> Result<(), AppError> {
    transition(from, to)?;

    let result = sqlx::query(
        "UPDATE leads SET status = $1, updated_at = now() WHERE id = $2 AND status = $3",
    )
    .bind(to)
    .bind(lead_id)
    .bind(from)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        tracing::warn!(
            "Lost status transition race: lead_id={}, {} -> {}",
            lead_id,
            from,
            to
        );
        return Err(AppError::Conflict(
            "Lead status changed concurrently".to_string(),
        ));
    }

    Ok(())
}
