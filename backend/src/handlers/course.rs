// src/handlers/course.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        course::{Course, CourseDetail},
        lesson::{Lesson, LessonSummary},
        quiz::QuizSummary,
    },
    services::enrollment,
    utils::jwt::Claims,
};

pub(crate) const COURSE_COLUMNS: &str =
    "id, title, description, is_published, created_at, updated_at";

pub(crate) const LESSON_COLUMNS: &str =
    "id, course_id, title, content, video_url, position, duration_minutes, created_at";

/// Lists published courses, newest first.
pub async fn list_courses(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let courses = sqlx::query_as::<_, Course>(&format!(
        "SELECT {} FROM courses WHERE is_published = TRUE ORDER BY created_at DESC, id DESC",
        COURSE_COLUMNS
    ))
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list courses: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(courses))
}

/// Course page: lesson outline and quiz list.
pub async fn get_course(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let course = sqlx::query_as::<_, Course>(&format!(
        "SELECT {} FROM courses WHERE id = $1 AND is_published = TRUE",
        COURSE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Course not found".to_string()))?;

    let lessons = sqlx::query_as::<_, LessonSummary>(
        "SELECT id, title, position, duration_minutes FROM lessons WHERE course_id = $1 ORDER BY position, id",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let quizzes = sqlx::query_as::<_, QuizSummary>(
        "SELECT id, lesson_id, title, passing_score, max_attempts FROM quizzes WHERE course_id = $1 ORDER BY id",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(CourseDetail {
        course,
        lessons,
        quizzes,
    }))
}

/// Full lesson body. Requires an active enrollment (admins bypass).
pub async fn get_lesson(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let lesson = sqlx::query_as::<_, Lesson>(&format!(
        "SELECT {} FROM lessons WHERE id = $1",
        LESSON_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Lesson not found".to_string()))?;

    if !claims.is_admin() {
        enrollment::require_access(&pool, claims.user_id()?, lesson.course_id).await?;
    }

    Ok(Json(lesson))
}

/// Marks a lesson complete and returns the updated enrollment.
pub async fn complete_lesson(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let updated = enrollment::complete_lesson(&pool, claims.user_id()?, id).await?;
    Ok(Json(updated))
}
