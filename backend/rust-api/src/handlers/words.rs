use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::QuizError,
    extractors::{AppJson, AppQuery},
    models::{
        BulkDeleteRequest, CreateWordRequest, ImportWordsRequest, ListWordsQuery,
        RandomWordQuery, UpdateWordRequest,
    },
    services::AppState,
};

/// POST /api/v1/words
pub async fn create_word(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateWordRequest>,
) -> Result<impl IntoResponse, QuizError> {
    let word = state.word_service().create_word(req).await?;
    Ok((StatusCode::CREATED, Json(word)))
}

/// GET /api/v1/words?active_only=true
pub async fn list_words(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<ListWordsQuery>,
) -> Result<impl IntoResponse, QuizError> {
    let words = state.word_service().list_words(query).await?;
    Ok(Json(words))
}

pub async fn get_word(
    State(state): State<Arc<AppState>>,
    Path(word_id): Path<String>,
) -> Result<impl IntoResponse, QuizError> {
    let word = state.word_service().get_word(&word_id).await?;
    Ok(Json(word))
}

pub async fn update_word(
    State(state): State<Arc<AppState>>,
    Path(word_id): Path<String>,
    AppJson(req): AppJson<UpdateWordRequest>,
) -> Result<impl IntoResponse, QuizError> {
    let word = state.word_service().update_word(&word_id, req).await?;
    Ok(Json(word))
}

pub async fn delete_word(
    State(state): State<Arc<AppState>>,
    Path(word_id): Path<String>,
) -> Result<impl IntoResponse, QuizError> {
    state.word_service().delete_word(&word_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/words/random?exclude=id1,id2
pub async fn random_word(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<RandomWordQuery>,
) -> Result<impl IntoResponse, QuizError> {
    let picked = state.word_service().random_word(query).await?;
    Ok(Json(picked))
}

pub async fn bulk_delete_words(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<BulkDeleteRequest>,
) -> Result<impl IntoResponse, QuizError> {
    let response = state.word_service().delete_words(req).await?;
    Ok(Json(response))
}

/// POST /api/v1/words/{id}/usage - best effort, always 204
pub async fn record_word_usage(
    State(state): State<Arc<AppState>>,
    Path(word_id): Path<String>,
) -> StatusCode {
    state.word_service().record_usage(&word_id).await;
    StatusCode::NO_CONTENT
}

pub async fn import_words(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ImportWordsRequest>,
) -> Result<impl IntoResponse, QuizError> {
    tracing::info!("Importing {} word rows", req.rows.len());
    let report = state.word_service().import_words(req).await?;
    Ok(Json(report))
}
