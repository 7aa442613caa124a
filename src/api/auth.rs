//! Registration, login, and session-token authentication.
//!
//! Passwords are stored as salted Argon2 hashes. Bearer tokens are random,
//! stored SHA-256-hashed in the sessions table, and every request derives the
//! caller's identity and role from the verified session row, never from
//! client-supplied headers.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    Json,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;

use crate::db::{
    DbPool, LoginRequest, LoginResponse, RegisterRequest, Role, Session, User, UserResponse,
};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{validate_email, validate_name, validate_role};

/// Session lifetime for issued bearer tokens
const SESSION_TTL_DAYS: i64 = 7;

/// Reserved identity the assistant's replies are attributed to
pub const ASSISTANT_EMAIL: &str = "assistant@ticketr.local";
pub const ASSISTANT_NAME: &str = "Ticketr Assistant";

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random session token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Validate password strength.
/// Returns None if valid, or Some(error_message) if invalid.
pub(crate) fn validate_password_strength(password: &str) -> Option<String> {
    if password.len() < 8 {
        return Some("Password must be at least 8 characters".to_string());
    }

    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_letter {
        return Some("Password must contain at least one letter".to_string());
    }
    if !has_digit {
        return Some("Password must contain at least one digit".to_string());
    }

    None
}

/// Mint a session for a user and return the raw bearer token
async fn create_session(pool: &DbPool, user_id: &str) -> Result<String, ApiError> {
    let token = generate_token();
    let token_hash = hash_token(&token);
    let expires_at = (chrono::Utc::now() + chrono::Duration::days(SESSION_TTL_DAYS)).to_rfc3339();

    let session_id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO sessions (id, user_id, token_hash, expires_at) VALUES (?, ?, ?, ?)")
        .bind(&session_id)
        .bind(user_id)
        .bind(&token_hash)
        .bind(&expires_at)
        .execute(pool)
        .await?;

    Ok(token)
}

/// Register a new account
///
/// POST /api/auth/register
///
/// The `role` field is honored only when the caller is an authenticated
/// admin; anonymous and non-admin registration always produces a `user`.
pub async fn register(
    State(state): State<Arc<AppState>>,
    caller: Option<User>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Some(e) = validate_password_strength(&req.password) {
        errors.add("password", e);
    }

    let caller_is_admin = caller
        .as_ref()
        .map(|u| u.role_enum() == Role::Admin)
        .unwrap_or(false);

    let role = match (&req.role, caller_is_admin) {
        (Some(requested), true) => match validate_role(requested) {
            Ok(role) => role,
            Err(e) => {
                errors.add("role", e);
                Role::User
            }
        },
        _ => Role::User,
    };
    errors.finish()?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&req.name)
    .bind(&req.email)
    .bind(&password_hash)
    .bind(role.to_string())
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(email = %req.email, role = %role, "Registered new user");

    let user = UserResponse {
        id,
        name: req.name,
        email: req.email,
        role: role.to_string(),
        created_at: now,
    };

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(user, "Account created"),
    ))
}

/// Login endpoint
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;

    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = create_session(&state.db, &user.id).await?;

    Ok(ApiResponse::data(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

/// Ensure the bootstrap admin account exists (no-op when unconfigured)
pub async fn ensure_admin_user(
    pool: &DbPool,
    email: Option<&str>,
    password: Option<&str>,
) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (email, password) else {
        return Ok(());
    };

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, 'Admin', ?, ?, 'admin', ?, ?)",
    )
    .bind(&id)
    .bind(email)
    .bind(&password_hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!(email = %email, "Created bootstrap admin user");
    Ok(())
}

/// Ensure the synthetic assistant user exists and return its id.
///
/// The account carries the reserved `ai` role and an empty password hash, so
/// it can never authenticate.
pub async fn ensure_assistant_user(pool: &DbPool) -> anyhow::Result<String> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(ASSISTANT_EMAIL)
        .fetch_optional(pool)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, '', 'ai', ?, ?)",
    )
    .bind(&id)
    .bind(ASSISTANT_NAME)
    .bind(ASSISTANT_EMAIL)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!("Created assistant user");
    Ok(id)
}

/// Extract the bearer token from request headers
fn extract_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Resolve a bearer token to its user via the sessions table
pub async fn get_current_user(pool: &DbPool, token: &str) -> Result<User, ApiError> {
    let token_hash = hash_token(token);
    let session: Option<Session> = sqlx::query_as(
        "SELECT * FROM sessions WHERE token_hash = ? AND expires_at > datetime('now')",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    let session = session.ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&session.user_id)
        .fetch_optional(pool)
        .await?;

    user.ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))
}

/// Extractor for the current authenticated user
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;
        get_current_user(&state.db, &token).await
    }
}

/// Require that the user's role is one of the allowed set
pub fn require_role(user: &User, allowed: &[Role]) -> Result<(), ApiError> {
    let role = Role::from_str(&user.role)
        .map_err(|_| ApiError::forbidden("Access denied"))?;
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Access denied"))
    }
}

/// Require a technician or admin
pub fn require_staff(user: &User) -> Result<(), ApiError> {
    require_role(user, &[Role::Tech, Role::Admin])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;
    use crate::db::test_pool;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert_ne!(hash, "hunter2hunter2");
        assert!(verify_password("hunter2hunter2", &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn test_verify_password_bad_hash() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("short1").is_some());
        assert!(validate_password_strength("alllettersonly").is_some());
        assert!(validate_password_strength("12345678901").is_some());
        assert!(validate_password_strength("correct horse 1").is_none());
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let state = test_state().await;

        let (status, _) = register(
            State(state.clone()),
            None,
            Json(RegisterRequest {
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                password: "password1".to_string(),
                role: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(body) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "alice@example.com".to_string(),
                password: "password1".to_string(),
            }),
        )
        .await
        .unwrap();

        let login_data = body.data.unwrap();
        assert_eq!(login_data.user.role, "user");
        assert!(!login_data.token.is_empty());

        // The token resolves back to the user
        let user = get_current_user(&state.db, &login_data.token).await.unwrap();
        assert_eq!(user.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let state = test_state().await;

        register(
            State(state.clone()),
            None,
            Json(RegisterRequest {
                name: "Bob".to_string(),
                email: "bob@example.com".to_string(),
                password: "password1".to_string(),
                role: None,
            }),
        )
        .await
        .unwrap();

        let err = login(
            State(state),
            Json(LoginRequest {
                email: "bob@example.com".to_string(),
                password: "wrong-password1".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let state = test_state().await;

        let req = || RegisterRequest {
            name: "Carol".to_string(),
            email: "carol@example.com".to_string(),
            password: "password1".to_string(),
            role: None,
        };

        register(State(state.clone()), None, Json(req())).await.unwrap();
        let err = register(State(state), None, Json(req())).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_anonymous_register_cannot_pick_role() {
        let state = test_state().await;

        let (_, Json(body)) = register(
            State(state),
            None,
            Json(RegisterRequest {
                name: "Mallory".to_string(),
                email: "mallory@example.com".to_string(),
                password: "password1".to_string(),
                role: Some("admin".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(body.data.unwrap().role, "user");
    }

    #[tokio::test]
    async fn test_assistant_user_seed_is_idempotent() {
        let pool = test_pool().await;
        let first = ensure_assistant_user(&pool).await.unwrap();
        let second = ensure_assistant_user(&pool).await.unwrap();
        assert_eq!(first, second);

        // The assistant account can never authenticate
        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&first)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(user.role, "ai");
        assert!(!verify_password("", &user.password_hash));
    }
}
