// src/handlers/enrollment.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError, models::enrollment::MyEnrollment, services::enrollment, utils::jwt::Claims,
};

pub async fn enroll(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let created = enrollment::enroll(&pool, claims.user_id()?, course_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn unenroll(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    enrollment::drop_enrollment(&pool, claims.user_id()?, course_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Current user's enrollments with course titles.
pub async fn my_enrollments(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let rows = sqlx::query_as::<_, MyEnrollment>(
        r#"
        SELECT e.course_id, c.title AS course_title, e.status, e.progress, e.enrolled_at, e.completed_at
        FROM enrollments e
        JOIN courses c ON e.course_id = c.id
        WHERE e.user_id = $1
        ORDER BY e.enrolled_at DESC
        "#,
    )
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await?;

    Ok(Json(rows))
}
