use axum::{Extension, Json, extract::State};
use uuid::Uuid;

use chatkeep_types::api::{Claims, StatusMessage, UpdateUserRequest, UserResponse};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};

pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<UserResponse>, ApiError> {
    let accounts = state.accounts.clone();
    let user = blocking(move || accounts.get_user(user_id)).await?;
    Ok(Json(user.into()))
}

pub async fn update_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let accounts = state.accounts.clone();
    let user = blocking(move || accounts.update_user(claims.sub, user_id, &req)).await?;
    Ok(Json(user.into()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<StatusMessage>, ApiError> {
    let accounts = state.accounts.clone();
    blocking(move || accounts.delete_user(claims.sub, user_id)).await?;
    Ok(Json(StatusMessage {
        message: "User deleted successfully".into(),
    }))
}
