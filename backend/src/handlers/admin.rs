// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgConnection, PgPool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    config::{DEFAULT_MAX_ATTEMPTS, DEFAULT_PASSING_SCORE},
    error::AppError,
    handlers::course::{COURSE_COLUMNS, LESSON_COLUMNS},
    models::{
        course::{Course, CreateCourseRequest, UpdateCourseRequest},
        lesson::{CreateLessonRequest, Lesson, UpdateLessonRequest},
        question::{CreateQuestionRequest, Question},
        quiz::{CreateQuizRequest, Quiz, UpdateQuizRequest},
        user::User,
    },
    services::attempt::{QUESTION_COLUMNS, QUIZ_COLUMNS},
    utils::html::clean_html,
};

/// Lists all users in the system.
pub async fn list_users(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, username, password, role, created_at FROM users ORDER BY id DESC",
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

// ---------------------------------------------------------------------------
// Courses
// ---------------------------------------------------------------------------

/// All courses including unpublished drafts.
pub async fn list_all_courses(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let courses = sqlx::query_as::<_, Course>(&format!(
        "SELECT {} FROM courses ORDER BY id DESC",
        COURSE_COLUMNS
    ))
    .fetch_all(&pool)
    .await?;

    Ok(Json(courses))
}

pub async fn create_course(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let course = sqlx::query_as::<_, Course>(&format!(
        "INSERT INTO courses (title, description, is_published) VALUES ($1, $2, $3) RETURNING {}",
        COURSE_COLUMNS
    ))
    .bind(&payload.title)
    .bind(payload.description.as_deref().unwrap_or_default())
    .bind(payload.is_published.unwrap_or(false))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create course: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!("Course {} created", course.id);
    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn update_course(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let course = sqlx::query_as::<_, Course>(&format!(
        r#"
        UPDATE courses SET
            title = COALESCE($1, title),
            description = COALESCE($2, description),
            is_published = COALESCE($3, is_published),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $4
        RETURNING {}
        "#,
        COURSE_COLUMNS
    ))
    .bind(payload.title)
    .bind(payload.description)
    .bind(payload.is_published)
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Course not found".to_string()))?;

    Ok(Json(course))
}

/// Deletes a course with its lessons, quizzes and attempt history.
pub async fn delete_course(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    tracing::info!("Course {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Lessons
// ---------------------------------------------------------------------------

pub async fn create_lesson(
    State(pool): State<PgPool>,
    Path(course_id): Path<i64>,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let position = match payload.position {
        Some(p) => p,
        None => {
            sqlx::query_scalar::<_, i32>(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM lessons WHERE course_id = $1",
            )
            .bind(course_id)
            .fetch_one(&pool)
            .await?
        }
    };

    let lesson = sqlx::query_as::<_, Lesson>(&format!(
        r#"
        INSERT INTO lessons (course_id, title, content, video_url, position, duration_minutes)
        SELECT id, $2, $3, $4, $5, $6 FROM courses WHERE id = $1
        RETURNING {}
        "#,
        LESSON_COLUMNS
    ))
    .bind(course_id)
    .bind(&payload.title)
    .bind(clean_html(&payload.content))
    .bind(&payload.video_url)
    .bind(position)
    .bind(payload.duration_minutes.unwrap_or(0))
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Course not found".to_string()))?;

    Ok((StatusCode::CREATED, Json(lesson)))
}

pub async fn update_lesson(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let lesson = sqlx::query_as::<_, Lesson>(&format!(
        r#"
        UPDATE lessons SET
            title = COALESCE($1, title),
            content = COALESCE($2, content),
            video_url = COALESCE($3, video_url),
            position = COALESCE($4, position),
            duration_minutes = COALESCE($5, duration_minutes)
        WHERE id = $6
        RETURNING {}
        "#,
        LESSON_COLUMNS
    ))
    .bind(payload.title)
    .bind(payload.content.as_deref().map(clean_html))
    .bind(payload.video_url)
    .bind(payload.position)
    .bind(payload.duration_minutes)
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Lesson not found".to_string()))?;

    Ok(Json(lesson))
}

pub async fn delete_lesson(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM lessons WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Lesson not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Quizzes & questions
// ---------------------------------------------------------------------------

/// Authoring view of a quiz, correct answers included.
pub async fn get_quiz_full(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = sqlx::query_as::<_, Quiz>(&format!("SELECT {} FROM quizzes WHERE id = $1", QUIZ_COLUMNS))
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questions WHERE quiz_id = $1 ORDER BY position, id",
        QUESTION_COLUMNS
    ))
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(serde_json::json!({
        "quiz": quiz,
        "questions": questions,
    })))
}

/// Creates a quiz in a course together with its initial questions.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Path(course_id): Path<i64>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    for question in &payload.questions {
        question.check_shape()?;
    }

    let mut tx = pool.begin().await?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    if let Some(lesson_id) = payload.lesson_id {
        let lesson_course: Option<i64> =
            sqlx::query_scalar("SELECT course_id FROM lessons WHERE id = $1")
                .bind(lesson_id)
                .fetch_optional(&mut *tx)
                .await?;
        if lesson_course != Some(course_id) {
            return Err(AppError::BadRequest(
                "Lesson does not belong to this course".to_string(),
            ));
        }
    }

    let quiz = sqlx::query_as::<_, Quiz>(&format!(
        r#"
        INSERT INTO quizzes
        (course_id, lesson_id, title, description, passing_score, max_attempts, randomize, time_limit_minutes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        QUIZ_COLUMNS
    ))
    .bind(course_id)
    .bind(payload.lesson_id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.passing_score.unwrap_or(DEFAULT_PASSING_SCORE))
    .bind(payload.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS))
    .bind(payload.randomize.unwrap_or(false))
    .bind(payload.time_limit_minutes)
    .fetch_one(&mut *tx)
    .await?;

    let mut questions = Vec::with_capacity(payload.questions.len());
    for (index, question) in payload.questions.iter().enumerate() {
        let position = question.position.unwrap_or(index as i32);
        questions.push(insert_question(&mut tx, quiz.id, question, position).await?);
    }

    tx.commit().await?;

    tracing::info!(
        "Quiz {} created in course {} with {} question(s)",
        quiz.id,
        course_id,
        questions.len()
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "quiz": quiz,
            "questions": questions,
        })),
    ))
}

pub async fn update_quiz(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let quiz = sqlx::query_as::<_, Quiz>(&format!(
        r#"
        UPDATE quizzes SET
            title = COALESCE($1, title),
            description = COALESCE($2, description),
            passing_score = COALESCE($3, passing_score),
            max_attempts = COALESCE($4, max_attempts),
            randomize = COALESCE($5, randomize),
            time_limit_minutes = COALESCE($6, time_limit_minutes)
        WHERE id = $7
        RETURNING {}
        "#,
        QUIZ_COLUMNS
    ))
    .bind(payload.title)
    .bind(payload.description)
    .bind(payload.passing_score)
    .bind(payload.max_attempts)
    .bind(payload.randomize)
    .bind(payload.time_limit_minutes)
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    Ok(Json(quiz))
}

pub async fn delete_quiz(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM quizzes WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    tracing::info!("Quiz {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Adds a question to a quiz that has no attempts yet.
pub async fn add_question(
    State(pool): State<PgPool>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    payload.check_shape()?;

    let mut tx = pool.begin().await?;

    lock_quiz_without_attempts(&mut tx, quiz_id).await?;

    let position = match payload.position {
        Some(p) => p,
        None => {
            sqlx::query_scalar::<_, i32>(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM questions WHERE quiz_id = $1",
            )
            .bind(quiz_id)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    let question = insert_question(&mut tx, quiz_id, &payload, position).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Removes a question from a quiz that has no attempts yet.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let quiz_id: i64 = sqlx::query_scalar("SELECT quiz_id FROM questions WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    lock_quiz_without_attempts(&mut tx, quiz_id).await?;

    sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Locks the quiz row and rejects edits once anyone has attempted it,
/// since attempts carry a `max_score` fixed at start.
async fn lock_quiz_without_attempts(conn: &mut PgConnection, quiz_id: i64) -> Result<(), AppError> {
    let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM quizzes WHERE id = $1 FOR UPDATE")
        .bind(quiz_id)
        .fetch_optional(&mut *conn)
        .await?;
    if locked.is_none() {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    let has_attempts: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM quiz_attempts WHERE quiz_id = $1)")
            .bind(quiz_id)
            .fetch_one(&mut *conn)
            .await?;
    if has_attempts {
        return Err(AppError::Conflict(
            "Quiz already has attempts; questions can no longer change".to_string(),
        ));
    }

    Ok(())
}

async fn insert_question(
    conn: &mut PgConnection,
    quiz_id: i64,
    req: &CreateQuestionRequest,
    position: i32,
) -> Result<Question, AppError> {
    let options = if req.question_type.has_options() {
        req.options.as_ref().map(SqlJson)
    } else {
        None
    };

    let question = sqlx::query_as::<_, Question>(&format!(
        r#"
        INSERT INTO questions (quiz_id, type, content, options, correct_answer, points, position, explanation)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        QUESTION_COLUMNS
    ))
    .bind(quiz_id)
    .bind(req.question_type.as_str())
    .bind(&req.content)
    .bind(options)
    .bind(SqlJson(&req.correct_answer))
    .bind(req.points)
    .bind(position)
    .bind(&req.explanation)
    .fetch_one(conn)
    .await?;

    Ok(question)
}
