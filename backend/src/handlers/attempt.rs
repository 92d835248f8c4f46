// src/handlers/attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::attempt::{BulkAnswerRequest, SubmitAnswerRequest},
    services::attempt,
    utils::jwt::Claims,
};

pub async fn get_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let detail = attempt::attempt_detail(&pool, &claims, id).await?;
    Ok(Json(detail))
}

/// Submits (or resubmits) one answer. Scored immediately.
pub async fn submit_answer(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut saved = attempt::record_answers(&pool, claims.user_id()?, id, &[payload]).await?;
    let response = saved
        .pop()
        .ok_or(AppError::InternalServerError("Answer was not recorded".to_string()))?;

    Ok(Json(response))
}

/// Submits several answers in one transaction.
pub async fn submit_answers_bulk(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<BulkAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let saved = attempt::record_answers(&pool, claims.user_id()?, id, &payload.answers).await?;
    Ok(Json(saved))
}

/// Completes the attempt (IN_PROGRESS -> COMPLETED).
pub async fn finish_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = attempt::finish_attempt(&pool, claims.user_id()?, id).await?;
    Ok(Json(result))
}
