use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::warn;
use uuid::Uuid;

use chatkeep_types::api::{
    AddMessageRequest, AddMessageResponse, Claims, ConversationListItem,
    ConversationListResponse, ConversationResponse, CreateConversationRequest, HistoryResponse,
    MessageHistoryItem, PinConversationRequest, PinConversationResponse, StatusMessage,
};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::guard::{Access, authorize};

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = state.conversations.clone();
    let conversation = blocking(move || {
        conversations.create_conversation(claims.sub, &req.title, req.model_used.as_deref())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ConversationResponse::from(conversation))))
}

/// Any authenticated caller may append to any existing conversation.
pub async fn add_message(
    State(state): State<AppState>,
    ApiPath(conversation_id): ApiPath<Uuid>,
    Extension(_claims): Extension<Claims>,
    ApiJson(req): ApiJson<AddMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = state.conversations.clone();
    let message = blocking(move || {
        conversations.add_message(
            conversation_id,
            &req.sender,
            &req.message,
            req.parent_message_id,
            req.metadata,
        )
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(AddMessageResponse {
            message_id: message.id,
            message: "Message added successfully".into(),
        }),
    ))
}

pub async fn get_history(
    State(state): State<AppState>,
    ApiPath(conversation_id): ApiPath<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let conversations = state.conversations.clone();
    let messages = blocking(move || conversations.get_history(conversation_id)).await?;

    Ok(Json(HistoryResponse {
        messages: messages.into_iter().map(MessageHistoryItem::from).collect(),
    }))
}

/// Only the user themselves may list their conversations.
pub async fn list_conversations(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ConversationListResponse>, ApiError> {
    if authorize(claims.sub, user_id) == Access::Forbidden {
        warn!("User {} denied listing conversations of {}", claims.sub, user_id);
        return Err(ApiError::Authorization("Access denied".into()));
    }

    let conversations = state.conversations.clone();
    let list = blocking(move || conversations.list_for_owner(user_id)).await?;

    Ok(Json(ConversationListResponse {
        conversations: list.into_iter().map(ConversationListItem::from).collect(),
    }))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    ApiPath(conversation_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<StatusMessage>, ApiError> {
    let conversations = state.conversations.clone();
    blocking(move || conversations.delete(conversation_id, claims.sub)).await?;

    Ok(Json(StatusMessage {
        message: "Conversation deleted successfully".into(),
    }))
}

pub async fn toggle_pin(
    State(state): State<AppState>,
    ApiPath(conversation_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<PinConversationRequest>,
) -> Result<Json<PinConversationResponse>, ApiError> {
    let conversations = state.conversations.clone();
    let pin = blocking(move || conversations.toggle_pin(conversation_id, claims.sub, req.is_pinned))
        .await?;

    let message = if pin.is_pinned {
        "Conversation pinned successfully"
    } else {
        "Conversation unpinned successfully"
    };
    Ok(Json(PinConversationResponse {
        conversation_id: pin.conversation_id,
        is_pinned: pin.is_pinned,
        message: message.into(),
    }))
}
