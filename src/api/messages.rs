//! Message endpoints and the assistant hook.
//!
//! Sending a message on an `open` ticket as a regular user triggers a
//! synchronous, best-effort call to the assistant. The assistant reply is
//! persisted as a message from the synthetic AI account, and replies that
//! match the escalation markers flip the ticket to `in_progress`. Assistant
//! failures are logged and never fail the send.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::assistant::needs_technician;
use crate::db::{
    CreateMessageRequest, MessageResponse, Role, SendMessageResponse, Ticket, TicketStatus, User,
};
use crate::AppState;

use super::auth::require_role;
use super::error::ApiError;
use super::response::ApiResponse;
use super::tickets::{ensure_participant, fetch_ticket};
use super::validation::{validate_message_content, validate_uuid};

/// Base SELECT for message rows enriched with the sender's display name
pub(crate) const MESSAGE_SELECT_SQL: &str = "\
    SELECT m.id, m.ticket_id, m.sender_id, u.name AS sender_name, m.sender_role, m.content, \
           m.created_at \
    FROM messages m \
    JOIN users u ON u.id = m.sender_id";

async fn fetch_message(pool: &crate::DbPool, id: &str) -> Result<MessageResponse, ApiError> {
    let sql = format!("{} WHERE m.id = ?", MESSAGE_SELECT_SQL);
    sqlx::query_as::<_, MessageResponse>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))
}

async fn insert_message(
    pool: &crate::DbPool,
    ticket_id: &str,
    sender_id: &str,
    sender_role: &str,
    content: &str,
) -> Result<MessageResponse, ApiError> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO messages (id, ticket_id, sender_id, sender_role, content, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(ticket_id)
    .bind(sender_id)
    .bind(sender_role)
    .bind(content)
    .bind(&now)
    .execute(pool)
    .await?;

    fetch_message(pool, &id).await
}

/// Persist an assistant reply on the ticket and escalate when the reply
/// signals the assistant could not help. Escalation only applies while the
/// ticket is still `open`.
pub(crate) async fn record_assistant_reply(
    pool: &crate::DbPool,
    ticket: &Ticket,
    assistant_user_id: &str,
    reply: &str,
) -> Result<(MessageResponse, bool), ApiError> {
    let message = insert_message(
        pool,
        &ticket.id,
        assistant_user_id,
        &Role::Ai.to_string(),
        reply,
    )
    .await?;

    let escalate = needs_technician(reply) && ticket.status_enum() == TicketStatus::Open;
    if escalate {
        sqlx::query("UPDATE tickets SET status = ? WHERE id = ? AND status = 'open'")
            .bind(TicketStatus::InProgress.to_string())
            .bind(&ticket.id)
            .execute(pool)
            .await?;
        tracing::info!(ticket_id = %ticket.id, "Assistant escalated ticket to technician");
    }

    Ok((message, escalate))
}

/// Post a message on a ticket
///
/// POST /api/messages
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SendMessageResponse>>), ApiError> {
    if let Err(e) = validate_uuid(&req.ticket_id, "ticket_id") {
        return Err(ApiError::validation_field("ticket_id", e));
    }
    if let Err(e) = validate_message_content(&req.content) {
        return Err(ApiError::validation_field("content", e));
    }

    let ticket = fetch_ticket(&state.db, &req.ticket_id).await?;
    ensure_participant(&user, &ticket.user_id)?;

    if ticket.status_enum() == TicketStatus::Closed {
        return Err(ApiError::conflict("Cannot message a closed ticket"));
    }

    let message = insert_message(&state.db, &ticket.id, &user.id, &user.role, &req.content).await?;

    // Assistant hook: only for user-authored messages on still-open tickets,
    // and only when a credential is configured. Soft-fails on any error.
    let mut assistant_message = None;
    let mut escalated = false;
    if user.role_enum() == Role::User
        && ticket.status_enum() == TicketStatus::Open
        && state.assistant.is_enabled()
    {
        match state.assistant.ask(&req.content).await {
            Ok(reply) => {
                match record_assistant_reply(&state.db, &ticket, &state.assistant_user_id, &reply)
                    .await
                {
                    Ok((msg, esc)) => {
                        assistant_message = Some(msg);
                        escalated = esc;
                    }
                    Err(e) => {
                        tracing::warn!(ticket_id = %ticket.id, error = %e, "Failed to record assistant reply");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(ticket_id = %ticket.id, error = %e, "Assistant request failed");
            }
        }
    }

    Ok((
        StatusCode::CREATED,
        ApiResponse::data(SendMessageResponse {
            message,
            assistant_message,
            escalated,
        }),
    ))
}

/// Message history for a ticket, oldest first
///
/// GET /api/messages/ticket/:ticket_id
pub async fn list_ticket_messages(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(ticket_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<MessageResponse>>>, ApiError> {
    let ticket = fetch_ticket(&state.db, &ticket_id).await?;
    ensure_participant(&user, &ticket.user_id)?;

    let sql = format!(
        "{} WHERE m.ticket_id = ? ORDER BY m.created_at ASC",
        MESSAGE_SELECT_SQL
    );
    let messages = sqlx::query_as::<_, MessageResponse>(&sql)
        .bind(&ticket_id)
        .fetch_all(&state.db)
        .await?;

    Ok(ApiResponse::data(messages))
}

/// Fetch a single message
///
/// GET /api/messages/:id
pub async fn get_message(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let message = fetch_message(&state.db, &id).await?;
    let ticket = fetch_ticket(&state.db, &message.ticket_id).await?;
    ensure_participant(&user, &ticket.user_id)?;

    Ok(ApiResponse::data(message))
}

/// Delete a message (admin)
///
/// DELETE /api/messages/:id
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    require_role(&user, &[Role::Admin])?;

    fetch_message(&state.db, &id).await?;

    sqlx::query("DELETE FROM messages WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    tracing::info!(message_id = %id, "Message deleted");
    Ok(ApiResponse::message("Message deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{seed_user, test_state};
    use crate::db::CreateTicketRequest;

    async fn open_ticket(state: &Arc<AppState>, owner: &User) -> Ticket {
        let (_, Json(body)) = crate::api::tickets::create_ticket(
            State(state.clone()),
            owner.clone(),
            Json(CreateTicketRequest {
                severity: "medium".to_string(),
                description: "wifi keeps dropping".to_string(),
            }),
        )
        .await
        .unwrap();
        let summary = body.data.unwrap();
        fetch_ticket(&state.db, &summary.id).await.unwrap()
    }

    async fn send(
        state: &Arc<AppState>,
        sender: &User,
        ticket_id: &str,
        content: &str,
    ) -> Result<SendMessageResponse, ApiError> {
        create_message(
            State(state.clone()),
            sender.clone(),
            Json(CreateMessageRequest {
                ticket_id: ticket_id.to_string(),
                content: content.to_string(),
            }),
        )
        .await
        .map(|(_, Json(body))| body.data.unwrap())
    }

    #[tokio::test]
    async fn test_send_message_persists_sender_role() {
        let state = test_state().await;
        let owner = seed_user(&state.db, "Alice", "alice@example.com", "user").await;
        let ticket = open_ticket(&state, &owner).await;

        let sent = send(&state, &owner, &ticket.id, "it happens every hour").await.unwrap();
        assert_eq!(sent.message.sender_role, "user");
        assert_eq!(sent.message.sender_name, "Alice");
        // The assistant is disabled in tests, so no reply and no escalation
        assert!(sent.assistant_message.is_none());
        assert!(!sent.escalated);
    }

    #[tokio::test]
    async fn test_cannot_message_closed_ticket() {
        let state = test_state().await;
        let owner = seed_user(&state.db, "Alice", "alice@example.com", "user").await;
        let ticket = open_ticket(&state, &owner).await;

        sqlx::query("UPDATE tickets SET status = 'closed' WHERE id = ?")
            .bind(&ticket.id)
            .execute(&state.db)
            .await
            .unwrap();

        let err = send(&state, &owner, &ticket.id, "one more thing").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_message_to_missing_ticket_writes_nothing() {
        let state = test_state().await;
        let owner = seed_user(&state.db, "Alice", "alice@example.com", "user").await;

        let missing = Uuid::new_v4().to_string();
        let err = send(&state, &owner, &missing, "anyone there?").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_non_participant_cannot_message() {
        let state = test_state().await;
        let owner = seed_user(&state.db, "Alice", "alice@example.com", "user").await;
        let other = seed_user(&state.db, "Eve", "eve@example.com", "user").await;
        let ticket = open_ticket(&state, &owner).await;

        let err = send(&state, &other, &ticket.id, "hi").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_tech_can_message_any_ticket() {
        let state = test_state().await;
        let owner = seed_user(&state.db, "Alice", "alice@example.com", "user").await;
        let tech = seed_user(&state.db, "Tina", "tina@example.com", "tech").await;
        let ticket = open_ticket(&state, &owner).await;

        let sent = send(&state, &tech, &ticket.id, "have you tried a cable?").await.unwrap();
        assert_eq!(sent.message.sender_role, "tech");
    }

    #[tokio::test]
    async fn test_assistant_reply_recorded_without_escalation() {
        let state = test_state().await;
        let owner = seed_user(&state.db, "Alice", "alice@example.com", "user").await;
        let ticket = open_ticket(&state, &owner).await;

        let (message, escalated) = record_assistant_reply(
            &state.db,
            &ticket,
            &state.assistant_user_id,
            "Try moving the router away from the microwave.",
        )
        .await
        .unwrap();

        assert_eq!(message.sender_role, "ai");
        assert!(!escalated);

        let after = fetch_ticket(&state.db, &ticket.id).await.unwrap();
        assert_eq!(after.status, "open");
    }

    #[tokio::test]
    async fn test_assistant_escalation_flips_status() {
        let state = test_state().await;
        let owner = seed_user(&state.db, "Alice", "alice@example.com", "user").await;
        let ticket = open_ticket(&state, &owner).await;

        let (message, escalated) = record_assistant_reply(
            &state.db,
            &ticket,
            &state.assistant_user_id,
            "I don't know, this needs a technician.",
        )
        .await
        .unwrap();

        assert_eq!(message.sender_role, "ai");
        assert!(escalated);

        let after = fetch_ticket(&state.db, &ticket.id).await.unwrap();
        assert_eq!(after.status, "in_progress");
    }

    #[tokio::test]
    async fn test_escalation_skipped_when_already_in_progress() {
        let state = test_state().await;
        let owner = seed_user(&state.db, "Alice", "alice@example.com", "user").await;
        let mut ticket = open_ticket(&state, &owner).await;

        sqlx::query("UPDATE tickets SET status = 'in_progress' WHERE id = ?")
            .bind(&ticket.id)
            .execute(&state.db)
            .await
            .unwrap();
        ticket.status = "in_progress".to_string();

        let (_, escalated) = record_assistant_reply(
            &state.db,
            &ticket,
            &state.assistant_user_id,
            "I can't help with that.",
        )
        .await
        .unwrap();
        assert!(!escalated);
    }

    #[tokio::test]
    async fn test_message_history_ascending() {
        let state = test_state().await;
        let owner = seed_user(&state.db, "Alice", "alice@example.com", "user").await;
        let ticket = open_ticket(&state, &owner).await;

        for (i, content) in ["first", "second", "third"].iter().enumerate() {
            // Distinct timestamps so ordering is deterministic
            let at = format!("2026-08-23T10:00:0{}Z", i);
            sqlx::query(
                "INSERT INTO messages (id, ticket_id, sender_id, sender_role, content, created_at) VALUES (?, ?, ?, 'user', ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&ticket.id)
            .bind(&owner.id)
            .bind(content)
            .bind(&at)
            .execute(&state.db)
            .await
            .unwrap();
        }

        let Json(body) = list_ticket_messages(
            State(state.clone()),
            owner,
            Path(ticket.id.clone()),
        )
        .await
        .unwrap();
        let messages = body.data.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_delete_message_is_admin_only() {
        let state = test_state().await;
        let owner = seed_user(&state.db, "Alice", "alice@example.com", "user").await;
        let admin = seed_user(&state.db, "Root", "root@example.com", "admin").await;
        let ticket = open_ticket(&state, &owner).await;

        let sent = send(&state, &owner, &ticket.id, "oops wrong ticket").await.unwrap();

        let err = delete_message(
            State(state.clone()),
            owner,
            Path(sent.message.id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        delete_message(State(state.clone()), admin, Path(sent.message.id.clone()))
            .await
            .unwrap();

        let err = fetch_message(&state.db, &sent.message.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
