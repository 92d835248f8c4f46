// src/handlers/quiz.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        question::{PublicQuestion, Question},
        quiz::{Quiz, QuizView},
    },
    services::{
        attempt::{self, QUESTION_COLUMNS, QUIZ_COLUMNS},
        enrollment,
    },
    utils::jwt::Claims,
};

/// Serves a quiz to a taker without correct answers.
///
/// Questions come back in authoring order, or shuffled when the quiz has `randomize` set.
pub async fn get_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = sqlx::query_as::<_, Quiz>(&format!("SELECT {} FROM quizzes WHERE id = $1", QUIZ_COLUMNS))
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    if !claims.is_admin() {
        enrollment::require_access(&pool, claims.user_id()?, quiz.course_id).await?;
    }

    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questions WHERE quiz_id = $1
         ORDER BY CASE WHEN $2 THEN RANDOM() ELSE 0 END, position, id",
        QUESTION_COLUMNS
    ))
    .bind(id)
    .bind(quiz.randomize)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch questions for quiz {}: {:?}", id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    let total_points: i64 = questions.iter().map(|q| i64::from(q.points)).sum();
    let questions: Vec<PublicQuestion> = questions.into_iter().map(PublicQuestion::from).collect();

    Ok(Json(QuizView {
        quiz,
        total_points,
        questions,
    }))
}

/// Starts a new attempt (NOT_STARTED -> IN_PROGRESS).
pub async fn start_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let started = attempt::start_attempt(&pool, claims.user_id()?, quiz_id).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// Lists the current user's attempts on a quiz.
pub async fn list_attempts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let list = attempt::list_attempts(&pool, claims.user_id()?, quiz_id).await?;
    Ok(Json(list))
}

/// Top scores on a quiz.
pub async fn get_leaderboard(
    State(pool): State<PgPool>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let entries = attempt::leaderboard(&pool, quiz_id).await?;
    Ok(Json(entries))
}
