use axum::{
    Json, Router, middleware,
    routing::{delete, get, patch, post},
};

use chatkeep_types::api::HealthResponse;

use crate::auth::{self, AppState};
use crate::conversations;
use crate::middleware::require_auth;
use crate::users;

pub const API_PREFIX: &str = "/api/v1";

/// Full HTTP surface: `/health` plus the versioned API.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/conversations", post(conversations::create_conversation))
        .route("/conversations/{conversation_id}", delete(conversations::delete_conversation))
        .route("/conversations/{conversation_id}/messages", post(conversations::add_message))
        .route("/conversations/{conversation_id}/history", get(conversations::get_history))
        .route("/conversations/{conversation_id}/pin", patch(conversations::toggle_pin))
        .route("/users/{user_id}/conversations", get(conversations::list_conversations))
        .route(
            "/users/{user_id}",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api = Router::new().merge(public_routes).merge(protected_routes);

    Router::new()
        .route("/health", get(health))
        .nest(API_PREFIX, api)
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        message: "Service is running".into(),
    })
}
