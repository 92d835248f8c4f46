// src/services/enrollment.rs

use sqlx::{PgExecutor, PgPool};

use crate::{
    error::AppError,
    models::enrollment::{Enrollment, EnrollmentStatus},
};

const ENROLLMENT_COLUMNS: &str =
    "id, user_id, course_id, status, progress, enrolled_at, completed_at";

/// Looks up a user's enrollment in a course.
/// With `lock` set the row is locked for the rest of the enclosing transaction.
pub async fn find_enrollment<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: i64,
    course_id: i64,
    lock: bool,
) -> Result<Option<Enrollment>, AppError> {
    let sql = format!(
        "SELECT {} FROM enrollments WHERE user_id = $1 AND course_id = $2{}",
        ENROLLMENT_COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    );

    let enrollment = sqlx::query_as::<_, Enrollment>(&sql)
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(executor)
        .await?;

    Ok(enrollment)
}

/// Access guard for course content.
pub fn ensure_access(enrollment: Option<&Enrollment>) -> Result<(), AppError> {
    match enrollment {
        Some(e) if e.grants_access() => Ok(()),
        _ => Err(AppError::Forbidden(
            "You must be enrolled in this course".to_string(),
        )),
    }
}

/// Fails with 403 unless the user holds an active enrollment in the course.
pub async fn require_access(pool: &PgPool, user_id: i64, course_id: i64) -> Result<(), AppError> {
    let enrollment = find_enrollment(pool, user_id, course_id, false).await?;
    ensure_access(enrollment.as_ref())
}

/// Enrolls a user in a published course. Dropped enrollments are reactivated
/// with their progress reset.
pub async fn enroll(pool: &PgPool, user_id: i64, course_id: i64) -> Result<Enrollment, AppError> {
    let mut tx = pool.begin().await?;

    let published: Option<bool> =
        sqlx::query_scalar("SELECT is_published FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(&mut *tx)
            .await?;

    if published != Some(true) {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    let enrollment = match find_enrollment(&mut *tx, user_id, course_id, true).await? {
        Some(existing) if existing.grants_access() => {
            return Err(AppError::Conflict(
                "Already enrolled in this course".to_string(),
            ));
        }
        Some(existing) => {
            // Re-enrolling restarts the course: lesson progress is cleared.
            sqlx::query(
                "DELETE FROM lesson_completions lc USING lessons l
                 WHERE lc.lesson_id = l.id AND lc.user_id = $1 AND l.course_id = $2",
            )
            .bind(user_id)
            .bind(course_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query_as::<_, Enrollment>(&format!(
                "UPDATE enrollments
                    SET status = $1, progress = 0, completed_at = NULL,
                        enrolled_at = CURRENT_TIMESTAMP
                  WHERE id = $2 RETURNING {}",
                ENROLLMENT_COLUMNS
            ))
            .bind(EnrollmentStatus::Active.as_str())
            .bind(existing.id)
            .fetch_one(&mut *tx)
            .await?
        }
        None => {
            sqlx::query_as::<_, Enrollment>(&format!(
                "INSERT INTO enrollments (user_id, course_id, status)
                 VALUES ($1, $2, $3) RETURNING {}",
                ENROLLMENT_COLUMNS
            ))
            .bind(user_id)
            .bind(course_id)
            .bind(EnrollmentStatus::Active.as_str())
            .fetch_one(&mut *tx)
            .await?
        }
    };

    tx.commit().await?;

    tracing::info!("User {} enrolled in course {}", user_id, course_id);
    Ok(enrollment)
}

/// Marks an enrollment as dropped. Attempt history is kept.
pub async fn drop_enrollment(pool: &PgPool, user_id: i64, course_id: i64) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE enrollments SET status = $1 WHERE user_id = $2 AND course_id = $3 AND status <> $1",
    )
    .bind(EnrollmentStatus::Dropped.as_str())
    .bind(user_id)
    .bind(course_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Enrollment not found".to_string()));
    }

    tracing::info!("User {} dropped course {}", user_id, course_id);
    Ok(())
}

/// Records a completed lesson and recomputes course progress.
pub async fn complete_lesson(
    pool: &PgPool,
    user_id: i64,
    lesson_id: i64,
) -> Result<Enrollment, AppError> {
    let mut tx = pool.begin().await?;

    let course_id: i64 = sqlx::query_scalar("SELECT course_id FROM lessons WHERE id = $1")
        .bind(lesson_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Lesson not found".to_string()))?;

    let enrollment = find_enrollment(&mut *tx, user_id, course_id, true).await?;
    ensure_access(enrollment.as_ref())?;

    sqlx::query(
        "INSERT INTO lesson_completions (user_id, lesson_id) VALUES ($1, $2)
         ON CONFLICT (user_id, lesson_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(lesson_id)
    .execute(&mut *tx)
    .await?;

    let (completed, total): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM lesson_completions lc
               JOIN lessons l ON lc.lesson_id = l.id
              WHERE lc.user_id = $1 AND l.course_id = $2),
            (SELECT COUNT(*) FROM lessons WHERE course_id = $2)
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_one(&mut *tx)
    .await?;

    let progress = progress_percent(completed, total);
    let status = if progress >= 100 {
        EnrollmentStatus::Completed
    } else {
        EnrollmentStatus::Active
    };

    let updated = sqlx::query_as::<_, Enrollment>(&format!(
        "UPDATE enrollments
            SET progress = $1,
                status = $2,
                completed_at = CASE WHEN $2 = 'completed' THEN COALESCE(completed_at, CURRENT_TIMESTAMP) ELSE NULL END
          WHERE user_id = $3 AND course_id = $4
        RETURNING {}",
        ENROLLMENT_COLUMNS
    ))
    .bind(progress)
    .bind(status.as_str())
    .bind(user_id)
    .bind(course_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(updated)
}

/// Whole-percent progress, rounded down and capped at 100.
pub fn progress_percent(completed: i64, total: i64) -> i32 {
    if total <= 0 {
        return 0;
    }
    ((completed.max(0) * 100) / total).min(100) as i32
}
