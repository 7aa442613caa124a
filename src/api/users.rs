//! User management endpoints.
//!
//! Regular users can read and update their own account. Role changes and
//! deletion are admin operations. Deleting a user is refused while they
//! still own tickets so the ticket history stays attributable.

use axum::{
    extract::{Path, State},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{Role, UpdateUserRequest, User, UserResponse};
use crate::AppState;

use super::auth::{
    hash_password, require_role, require_staff, validate_password_strength, ASSISTANT_EMAIL,
};
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{validate_email, validate_name, validate_role};

async fn fetch_user(pool: &crate::DbPool, id: &str) -> Result<User, ApiError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// List all accounts (tech/admin)
///
/// GET /api/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, ApiError> {
    require_staff(&user)?;

    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at ASC")
        .fetch_all(&state.db)
        .await?;

    Ok(ApiResponse::data(
        users.into_iter().map(UserResponse::from).collect(),
    ))
}

/// Fetch a single account (the user themselves, or tech/admin)
///
/// GET /api/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    if user.id != id {
        require_staff(&user)?;
    }

    let target = fetch_user(&state.db, &id).await?;
    Ok(ApiResponse::data(target.into()))
}

/// Update an account. Users may change their own name, email and password;
/// role changes require an admin.
///
/// PUT /api/users/:id
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let is_admin = user.role_enum() == Role::Admin;
    if user.id != id && !is_admin {
        return Err(ApiError::forbidden(
            "You can only update your own account",
        ));
    }

    let target = fetch_user(&state.db, &id).await?;
    if target.email == ASSISTANT_EMAIL {
        return Err(ApiError::forbidden("The assistant account cannot be modified"));
    }

    let mut errors = ValidationErrorBuilder::new();

    let name = match &req.name {
        Some(name) => {
            if let Err(e) = validate_name(name) {
                errors.add("name", e);
            }
            name.clone()
        }
        None => target.name.clone(),
    };

    let email = match &req.email {
        Some(email) => {
            if let Err(e) = validate_email(email) {
                errors.add("email", e);
            }
            email.clone()
        }
        None => target.email.clone(),
    };

    let role = match &req.role {
        Some(requested) => {
            if !is_admin {
                return Err(ApiError::forbidden("Only admins can change roles"));
            }
            match validate_role(requested) {
                Ok(role) => role.to_string(),
                Err(e) => {
                    errors.add("role", e);
                    target.role.clone()
                }
            }
        }
        None => target.role.clone(),
    };

    let password_hash = match &req.password {
        Some(password) => {
            if let Some(e) = validate_password_strength(password) {
                errors.add("password", e);
                target.password_hash.clone()
            } else {
                hash_password(password)
                    .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?
            }
        }
        None => target.password_hash.clone(),
    };

    errors.finish()?;

    if email != target.email {
        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&state.db)
            .await?;
        if existing.is_some() {
            return Err(ApiError::conflict("An account with this email already exists"));
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "UPDATE users SET name = ?, email = ?, password_hash = ?, role = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(&email)
    .bind(&password_hash)
    .bind(&role)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %id, "User updated");

    let updated = fetch_user(&state.db, &id).await?;
    Ok(ApiResponse::with_message(updated.into(), "User updated"))
}

/// Delete an account (admin). Refused while the user still owns tickets or
/// has messages in any thread, so history stays attributable.
///
/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    require_role(&user, &[Role::Admin])?;

    if user.id == id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    let target = fetch_user(&state.db, &id).await?;
    if target.email == ASSISTANT_EMAIL {
        return Err(ApiError::forbidden("The assistant account cannot be deleted"));
    }

    let (owned,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tickets WHERE user_id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;
    if owned > 0 {
        return Err(ApiError::conflict(
            "Cannot delete a user who still owns tickets",
        ));
    }

    let (authored,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE sender_id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;
    if authored > 0 {
        return Err(ApiError::conflict(
            "Cannot delete a user who has authored messages",
        ));
    }

    // Sessions cascade via the foreign key
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %id, "User deleted");
    Ok(ApiResponse::message("User deleted"))
}

/// Account counts grouped by role (admin)
///
/// GET /api/users/stats/by-role
pub async fn stats_by_role(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<ApiResponse<HashMap<String, i64>>>, ApiError> {
    require_role(&user, &[Role::Admin])?;

    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role")
            .fetch_all(&state.db)
            .await?;

    Ok(ApiResponse::data(rows.into_iter().collect()))
}
