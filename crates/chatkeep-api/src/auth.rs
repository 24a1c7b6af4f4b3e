use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use chatkeep_db::Database;
use chatkeep_types::api::{AuthResponse, LoginRequest, RegisterRequest};

use crate::accounts::{AccountService, Session};
use crate::aggregate::ConversationAggregate;
use crate::blocking;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::password::CredentialHasher;
use crate::token::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub accounts: AccountService,
    pub conversations: ConversationAggregate,
    pub tokens: TokenService,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, tokens: TokenService, hasher: CredentialHasher) -> AppState {
        Arc::new(Self {
            accounts: AccountService::new(db.clone(), hasher, tokens.clone()),
            conversations: ConversationAggregate::new(db),
            tokens,
        })
    }
}

fn auth_response(session: Session) -> AuthResponse {
    AuthResponse {
        token: session.token,
        user: session.user.into(),
    }
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Argon2 runs on the blocking pool.
    let accounts = state.accounts.clone();
    let session = blocking(move || accounts.register(&req)).await?;

    Ok((StatusCode::CREATED, Json(auth_response(session))))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let accounts = state.accounts.clone();
    let session = blocking(move || accounts.login(&req)).await?;

    Ok(Json(auth_response(session)))
}
