use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::QuizError,
    extractors::AppJson,
    models::{CreateQuizSessionRequest, SubmitAnswerRequest, UpdateCurrentWordRequest},
    services::AppState,
};

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateQuizSessionRequest>,
) -> Result<impl IntoResponse, QuizError> {
    tracing::info!("Creating quiz session: {}", req.name);
    let session = state.quiz_service().create_session(req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, QuizError> {
    let sessions = state.quiz_service().list_sessions().await?;
    Ok(Json(sessions))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, QuizError> {
    let session = state.quiz_service().get_session(&session_id).await?;
    Ok(Json(session))
}

pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, QuizError> {
    tracing::info!("Starting quiz session: {}", session_id);
    let session = state.quiz_service().start_session(&session_id).await?;
    Ok(Json(session))
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, QuizError> {
    let response = state
        .quiz_service()
        .submit_answer(&session_id, req)
        .await?;
    Ok(Json(response))
}

pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, QuizError> {
    let session = state.quiz_service().end_session(&session_id).await?;
    Ok(Json(session))
}

pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, QuizError> {
    let session = state.quiz_service().cancel_session(&session_id).await?;
    Ok(Json(session))
}

/// GET /{id}/current-word - contestant view, no answer
pub async fn get_current_word(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, QuizError> {
    let view = state.quiz_service().current_word(&session_id).await?;
    Ok(Json(view))
}

/// GET /{id}/current-word/operator - includes the answer
pub async fn get_operator_word(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, QuizError> {
    let view = state.quiz_service().operator_word(&session_id).await?;
    Ok(Json(view))
}

pub async fn update_current_word(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<UpdateCurrentWordRequest>,
) -> Result<impl IntoResponse, QuizError> {
    let session = state
        .quiz_service()
        .update_current_word(&session_id, req)
        .await?;
    Ok(Json(session))
}

pub async fn list_attempts(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, QuizError> {
    let attempts = state.quiz_service().attempts(&session_id).await?;
    Ok(Json(attempts))
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, QuizError> {
    let stats = state.quiz_service().stats(&session_id).await?;
    Ok(Json(stats))
}
