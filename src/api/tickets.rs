//! Ticket endpoints: CRUD, the status state machine, and aggregate stats.
//!
//! Status lives in the `tickets.status` column as a lowercase string. The
//! allowed transitions are open -> in_progress (technician requested, by the
//! user or by assistant escalation) and open|in_progress -> closed. Closing
//! stamps closed_at/closed_by once and records whether the ticket was
//! resolved without a technician.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    CreateTicketRequest, MessageResponse, Role, Ticket, TicketDetail, TicketOverview,
    TicketStatus, TicketSummary, UpdateTicketSeverityRequest, UpdateTicketStatusRequest, User,
    UserTicketCount,
};
use crate::AppState;

use super::auth::{require_role, require_staff};
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{validate_description, validate_severity, validate_status, validate_uuid};

/// Base SELECT for ticket rows enriched with owner name and message count
const TICKET_SUMMARY_SQL: &str = "\
    SELECT t.id, t.user_id, u.name AS user_name, t.severity, t.description, t.status, \
           t.resolved_by_ai, t.created_at, t.closed_at, \
           (SELECT COUNT(*) FROM messages m WHERE m.ticket_id = t.id) AS message_count \
    FROM tickets t \
    JOIN users u ON u.id = t.user_id";

pub(crate) async fn fetch_ticket(pool: &crate::DbPool, id: &str) -> Result<Ticket, ApiError> {
    sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket not found"))
}

async fn fetch_summary(pool: &crate::DbPool, id: &str) -> Result<TicketSummary, ApiError> {
    let sql = format!("{} WHERE t.id = ?", TICKET_SUMMARY_SQL);
    sqlx::query_as::<_, TicketSummary>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket not found"))
}

/// Owner of the ticket, or a technician/admin
pub(crate) fn ensure_participant(user: &User, ticket_user_id: &str) -> Result<(), ApiError> {
    if user.id == ticket_user_id {
        return Ok(());
    }
    require_staff(user)
}

#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<String>,
}

/// List all tickets, newest first (tech/admin)
///
/// GET /api/tickets
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<ListTicketsQuery>,
) -> Result<Json<ApiResponse<Vec<TicketSummary>>>, ApiError> {
    require_staff(&user)?;

    let tickets = match &query.status {
        Some(status) => {
            let status = validate_status(status)
                .map_err(|e| ApiError::validation_field("status", e))?;
            let sql = format!(
                "{} WHERE t.status = ? ORDER BY t.created_at DESC",
                TICKET_SUMMARY_SQL
            );
            sqlx::query_as::<_, TicketSummary>(&sql)
                .bind(status.to_string())
                .fetch_all(&state.db)
                .await?
        }
        None => {
            let sql = format!("{} ORDER BY t.created_at DESC", TICKET_SUMMARY_SQL);
            sqlx::query_as::<_, TicketSummary>(&sql)
                .fetch_all(&state.db)
                .await?
        }
    };

    Ok(ApiResponse::data(tickets))
}

/// List a user's tickets (the user themselves, or tech/admin)
///
/// GET /api/tickets/user/:user_id
pub async fn list_user_tickets(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<TicketSummary>>>, ApiError> {
    if user.id != user_id {
        require_staff(&user)?;
    }

    let sql = format!(
        "{} WHERE t.user_id = ? ORDER BY t.created_at DESC",
        TICKET_SUMMARY_SQL
    );
    let tickets = sqlx::query_as::<_, TicketSummary>(&sql)
        .bind(&user_id)
        .fetch_all(&state.db)
        .await?;

    Ok(ApiResponse::data(tickets))
}

/// Ticket detail including its message history, ascending
///
/// GET /api/tickets/:id
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<TicketDetail>>, ApiError> {
    if let Err(e) = validate_uuid(&id, "ticket_id") {
        return Err(ApiError::validation_field("ticket_id", e));
    }

    let ticket = fetch_summary(&state.db, &id).await?;
    ensure_participant(&user, &ticket.user_id)?;

    let sql = format!(
        "{} WHERE m.ticket_id = ? ORDER BY m.created_at ASC",
        super::messages::MESSAGE_SELECT_SQL
    );
    let messages = sqlx::query_as::<_, MessageResponse>(&sql)
        .bind(&id)
        .fetch_all(&state.db)
        .await?;

    Ok(ApiResponse::data(TicketDetail { ticket, messages }))
}

/// Open a new ticket owned by the authenticated user
///
/// POST /api/tickets
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TicketSummary>>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let severity = match validate_severity(&req.severity) {
        Ok(severity) => Some(severity),
        Err(e) => {
            errors.add("severity", e);
            None
        }
    };
    if let Err(e) = validate_description(&req.description) {
        errors.add("description", e);
    }
    errors.finish()?;
    let severity = severity.ok_or_else(|| ApiError::internal("severity missing"))?;

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO tickets (id, user_id, severity, description, status, created_at) VALUES (?, ?, ?, ?, 'open', ?)",
    )
    .bind(&id)
    .bind(&user.id)
    .bind(severity.to_string())
    .bind(&req.description)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(ticket_id = %id, user_id = %user.id, severity = %severity, "Ticket created");

    let ticket = fetch_summary(&state.db, &id).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(ticket, "Ticket created"),
    ))
}

/// Apply a status transition
///
/// PUT /api/tickets/:id/status
pub async fn update_ticket_status(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateTicketStatusRequest>,
) -> Result<Json<ApiResponse<TicketSummary>>, ApiError> {
    let target =
        validate_status(&req.status).map_err(|e| ApiError::validation_field("status", e))?;

    let ticket = fetch_ticket(&state.db, &id).await?;
    ensure_participant(&user, &ticket.user_id)?;

    let current = ticket.status_enum();
    if current == TicketStatus::Closed {
        return Err(ApiError::conflict("Ticket is already closed"));
    }

    match (current, target) {
        (TicketStatus::Open, TicketStatus::InProgress) => {
            sqlx::query("UPDATE tickets SET status = ? WHERE id = ?")
                .bind(TicketStatus::InProgress.to_string())
                .bind(&id)
                .execute(&state.db)
                .await?;
            tracing::info!(ticket_id = %id, "Ticket escalated to technician");
        }
        (TicketStatus::Open | TicketStatus::InProgress, TicketStatus::Closed) => {
            close_ticket(&state.db, &ticket, &user.id).await?;
        }
        (from, to) => {
            return Err(ApiError::validation_field(
                "status",
                format!("Unsupported status transition from {} to {}", from, to),
            ));
        }
    }

    let ticket = fetch_summary(&state.db, &id).await?;
    Ok(ApiResponse::with_message(ticket, "Status updated"))
}

/// Close a ticket, stamping closed_at/closed_by exactly once and recording
/// the resolved-by-AI classification: closed straight from `open` (never
/// escalated) with no technician message on the thread.
async fn close_ticket(
    pool: &crate::DbPool,
    ticket: &Ticket,
    closed_by: &str,
) -> Result<(), ApiError> {
    let (tech_messages,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM messages WHERE ticket_id = ? AND sender_role = 'tech'",
    )
    .bind(&ticket.id)
    .fetch_one(pool)
    .await?;

    let resolved_by_ai = ticket.status_enum() == TicketStatus::Open && tech_messages == 0;
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "UPDATE tickets SET status = 'closed', closed_at = COALESCE(closed_at, ?), closed_by = ?, resolved_by_ai = ? WHERE id = ?",
    )
    .bind(&now)
    .bind(closed_by)
    .bind(resolved_by_ai)
    .bind(&ticket.id)
    .execute(pool)
    .await?;

    tracing::info!(ticket_id = %ticket.id, resolved_by_ai, "Ticket closed");
    Ok(())
}

/// Change ticket severity (allowed in any status)
///
/// PUT /api/tickets/:id/severity
pub async fn update_ticket_severity(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateTicketSeverityRequest>,
) -> Result<Json<ApiResponse<TicketSummary>>, ApiError> {
    let severity =
        validate_severity(&req.severity).map_err(|e| ApiError::validation_field("severity", e))?;

    let ticket = fetch_ticket(&state.db, &id).await?;
    ensure_participant(&user, &ticket.user_id)?;

    sqlx::query("UPDATE tickets SET severity = ? WHERE id = ?")
        .bind(severity.to_string())
        .bind(&id)
        .execute(&state.db)
        .await?;

    let ticket = fetch_summary(&state.db, &id).await?;
    Ok(ApiResponse::with_message(ticket, "Severity updated"))
}

/// Delete a ticket and its messages (admin)
///
/// DELETE /api/tickets/:id
pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    require_role(&user, &[Role::Admin])?;

    fetch_ticket(&state.db, &id).await?;

    // Messages cascade via the foreign key
    sqlx::query("DELETE FROM tickets WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    tracing::info!(ticket_id = %id, "Ticket deleted");
    Ok(ApiResponse::message("Ticket deleted"))
}

#[derive(Debug, Serialize)]
pub struct TicketCount {
    pub total: i64,
}

/// Total ticket count (tech/admin)
///
/// GET /api/tickets/count
pub async fn count_tickets(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<ApiResponse<TicketCount>>, ApiError> {
    require_staff(&user)?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tickets")
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::data(TicketCount { total }))
}

/// Ticket counts grouped by severity (admin)
///
/// GET /api/tickets/stats/by-severity
pub async fn stats_by_severity(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<ApiResponse<HashMap<String, i64>>>, ApiError> {
    require_role(&user, &[Role::Admin])?;

    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT severity, COUNT(*) FROM tickets GROUP BY severity")
            .fetch_all(&state.db)
            .await?;

    Ok(ApiResponse::data(rows.into_iter().collect()))
}

/// Ticket counts grouped by status (admin)
///
/// GET /api/tickets/stats/by-status
pub async fn stats_by_status(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<ApiResponse<HashMap<String, i64>>>, ApiError> {
    require_role(&user, &[Role::Admin])?;

    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM tickets GROUP BY status")
            .fetch_all(&state.db)
            .await?;

    Ok(ApiResponse::data(rows.into_iter().collect()))
}

/// Dashboard overview: totals, AI resolution count, per-user counts (admin)
///
/// GET /api/tickets/stats/overview
pub async fn stats_overview(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<ApiResponse<TicketOverview>>, ApiError> {
    require_role(&user, &[Role::Admin])?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tickets")
        .fetch_one(&state.db)
        .await?;
    let (open,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM tickets WHERE status IN ('open', 'in_progress')")
            .fetch_one(&state.db)
            .await?;
    let (closed,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tickets WHERE status = 'closed'")
        .fetch_one(&state.db)
        .await?;
    let (resolved_by_ai,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM tickets WHERE resolved_by_ai = 1")
            .fetch_one(&state.db)
            .await?;

    let by_user: Vec<UserTicketCount> = sqlx::query_as(
        "SELECT u.name AS name, COUNT(*) AS total FROM tickets t JOIN users u ON u.id = t.user_id GROUP BY u.id ORDER BY total DESC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::data(TicketOverview {
        total,
        open,
        closed,
        resolved_by_ai,
        by_user,
    }))
}
