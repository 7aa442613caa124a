use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

// User models

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn role_enum(&self) -> Role {
        Role::from_str(&self.role).unwrap_or(Role::User)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

/// Account/sender roles. `ai` is reserved for the synthetic assistant user
/// and cannot be assigned through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Tech,
    Admin,
    Ai,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Tech => write!(f, "tech"),
            Self::Admin => write!(f, "admin"),
            Self::Ai => write!(f, "ai"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "tech" => Ok(Self::Tech),
            "admin" => Ok(Self::Admin),
            "ai" => Ok(Self::Ai),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

// Ticket models

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            // "awaiting technician" is the user-facing name for in_progress
            "in_progress" | "awaiting_technician" => Ok(Self::InProgress),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Unknown ticket status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: String,
    pub user_id: String,
    pub severity: String,
    pub description: String,
    pub status: String,
    pub resolved_by_ai: bool,
    pub created_at: String,
    pub closed_at: Option<String>,
    pub closed_by: Option<String>,
}

impl Ticket {
    pub fn status_enum(&self) -> TicketStatus {
        TicketStatus::from_str(&self.status).unwrap_or(TicketStatus::Open)
    }
}

/// Ticket row enriched with owner name and message count, as returned by
/// the list and detail queries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketSummary {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub severity: String,
    pub description: String,
    pub status: String,
    pub resolved_by_ai: bool,
    pub created_at: String,
    pub closed_at: Option<String>,
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: TicketSummary,
    pub messages: Vec<MessageResponse>,
}

// Message models

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: String,
    pub ticket_id: String,
    pub sender_id: String,
    pub sender_role: String,
    pub content: String,
    pub created_at: String,
}

/// Message row enriched with the sender's display name
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageResponse {
    pub id: String,
    pub ticket_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    pub content: String,
    pub created_at: String,
}

// DTOs for API

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Honored only when the caller is an authenticated admin
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub severity: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketSeverityRequest {
    pub severity: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub ticket_id: String,
    pub content: String,
}

/// Result of sending a message: the persisted message, the assistant's reply
/// (when the AI channel produced one) and whether the ticket was escalated.
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: MessageResponse,
    pub assistant_message: Option<MessageResponse>,
    pub escalated: bool,
}

// Aggregate/statistics types

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserTicketCount {
    pub name: String,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct TicketOverview {
    pub total: i64,
    /// open + in_progress
    pub open: i64,
    pub closed: i64,
    pub resolved_by_ai: i64,
    pub by_user: Vec<UserTicketCount>,
}
