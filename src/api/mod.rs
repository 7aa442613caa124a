pub mod auth;
mod error;
mod messages;
mod response;
mod tickets;
mod users;
mod validation;

pub use error::ApiError;
pub use response::ApiResponse;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register));

    // Everything below authenticates via the bearer-token User extractor
    let api_routes = Router::new()
        // Tickets
        .route(
            "/tickets",
            get(tickets::list_tickets).post(tickets::create_ticket),
        )
        .route("/tickets/count", get(tickets::count_tickets))
        .route("/tickets/stats/by-severity", get(tickets::stats_by_severity))
        .route("/tickets/stats/by-status", get(tickets::stats_by_status))
        .route("/tickets/stats/overview", get(tickets::stats_overview))
        .route("/tickets/user/:user_id", get(tickets::list_user_tickets))
        .route(
            "/tickets/:id",
            get(tickets::get_ticket).delete(tickets::delete_ticket),
        )
        .route("/tickets/:id/status", put(tickets::update_ticket_status))
        .route("/tickets/:id/severity", put(tickets::update_ticket_severity))
        // Messages
        .route("/messages", post(messages::create_message))
        .route(
            "/messages/ticket/:ticket_id",
            get(messages::list_ticket_messages),
        )
        .route(
            "/messages/:id",
            get(messages::get_message).delete(messages::delete_message),
        )
        // Users
        .route("/users", get(users::list_users))
        .route("/users/stats/by-role", get(users::stats_by_role))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
pub(crate) async fn test_state() -> Arc<AppState> {
    use crate::assistant::AssistantClient;
    use crate::config::Config;

    let config = Config::default();
    let db = crate::db::test_pool().await;
    let assistant = AssistantClient::new(config.assistant.clone()).expect("assistant client");
    let assistant_user_id = auth::ensure_assistant_user(&db)
        .await
        .expect("assistant user");
    Arc::new(AppState::new(config, db, assistant, assistant_user_id))
}

/// Insert a user directly, bypassing registration, for handler tests
#[cfg(test)]
pub(crate) async fn seed_user(
    pool: &crate::DbPool,
    name: &str,
    email: &str,
    role: &str,
) -> crate::db::User {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, '', ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(email)
    .bind(role)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("seed user");

    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await
        .expect("fetch seeded user")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(test_state().await);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let app = create_router(test_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/tickets")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = create_router(test_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
