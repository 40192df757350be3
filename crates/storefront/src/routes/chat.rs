//! Shopping assistant handler.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::routes::ApiResponse;
use crate::state::AppState;

const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub response: String,
}

fn validate_message(message: &str) -> Result<&str> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("message is required".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::BadRequest(format!(
            "message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(message)
}

/// Answer a shopper's question with catalog recommendations.
#[instrument(skip(state, request))]
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ApiResponse<ChatReply>>> {
    let message = validate_message(&request.message)?;
    let assistant = state
        .assistant()
        .ok_or_else(|| AppError::NotFound("The shopping assistant is not enabled".to_string()))?;

    let response = assistant.reply(state.pool(), message).await?;
    Ok(ApiResponse::ok(ChatReply { response }))
}
