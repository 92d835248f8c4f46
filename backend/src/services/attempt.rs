// src/services/attempt.rs

//! Quiz attempt lifecycle: NOT_STARTED -> IN_PROGRESS -> COMPLETED.
//!
//! Every mutation runs in a transaction holding a row lock (the quiz and
//! enrollment rows for `start_attempt`, the attempt row for answers and
//! finish), so `max_score`, the attempt ceiling and post-completion
//! immutability hold under concurrent requests.

use std::collections::HashMap;

use sqlx::{PgConnection, PgPool};

use crate::{
    config::LEADERBOARD_SIZE,
    error::AppError,
    models::{
        attempt::{
            AttemptDetail, AttemptList, AttemptStatus, FinishResponse, LeaderboardEntry,
            QuizAttempt, QuizResponse, ResponseReviewRow, ResponseView, SubmitAnswerRequest,
        },
        enrollment::Enrollment,
        question::Question,
        quiz::Quiz,
    },
    services::{enrollment, scoring},
    utils::jwt::Claims,
};

const ATTEMPT_COLUMNS: &str =
    "id, user_id, quiz_id, attempt_number, score, max_score, passed, started_at, completed_at";

pub(crate) const QUIZ_COLUMNS: &str = "id, course_id, lesson_id, title, description, passing_score, \
     max_attempts, randomize, time_limit_minutes, created_at";

pub(crate) const QUESTION_COLUMNS: &str =
    "id, quiz_id, type, content, options, correct_answer, points, position, explanation";

/// Final tally of an attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptOutcome {
    pub score: i32,
    pub percentage: f64,
    pub passed: bool,
}

/// Start guard. Returns the attempt number the new attempt gets.
///
/// `attempts_used` is the highest attempt number so far (0 when none).
pub fn next_attempt_number(
    enrollment: Option<&Enrollment>,
    attempts_used: i32,
    max_attempts: i32,
    question_count: i64,
) -> Result<i32, AppError> {
    enrollment::ensure_access(enrollment)?;

    if attempts_used >= max_attempts {
        return Err(AppError::Forbidden(format!(
            "Attempt limit reached ({} of {})",
            attempts_used, max_attempts
        )));
    }

    if question_count == 0 {
        return Err(AppError::BadRequest("Quiz has no questions".to_string()));
    }

    Ok(attempts_used + 1)
}

/// Fails unless the attempt is still in progress.
pub fn ensure_in_progress(status: AttemptStatus) -> Result<(), AppError> {
    match status {
        AttemptStatus::InProgress => Ok(()),
        AttemptStatus::Completed => Err(AppError::BadRequest(
            "Attempt is already completed".to_string(),
        )),
        AttemptStatus::NotStarted => Err(AppError::BadRequest(
            "Attempt has not been started".to_string(),
        )),
    }
}

pub fn ensure_owner(attempt: &QuizAttempt, user_id: i64) -> Result<(), AppError> {
    if attempt.user_id != user_id {
        return Err(AppError::Forbidden("Not your attempt".to_string()));
    }
    Ok(())
}

/// Percentage of `max_score`, 0 when the quiz is worth nothing.
pub fn percentage(score: i32, max_score: i32) -> f64 {
    if max_score <= 0 {
        return 0.0;
    }
    score as f64 * 100.0 / max_score as f64
}

/// Sums earned points and applies the passing threshold.
/// The threshold comparison is done in integers so 70% of 10 passes at exactly 7.
pub fn summarize(points_earned: &[i32], max_score: i32, passing_score: i32) -> AttemptOutcome {
    let score: i32 = points_earned.iter().sum();
    let passed = i64::from(score) * 100 >= i64::from(passing_score) * i64::from(max_score);

    AttemptOutcome {
        score,
        percentage: percentage(score, max_score),
        passed,
    }
}

/// With `lock` set the quiz row is share-locked, which waits out any admin
/// transaction editing its questions and blocks new ones until commit.
async fn fetch_quiz(conn: &mut PgConnection, quiz_id: i64, lock: bool) -> Result<Quiz, AppError> {
    let sql = format!(
        "SELECT {} FROM quizzes WHERE id = $1{}",
        QUIZ_COLUMNS,
        if lock { " FOR SHARE" } else { "" }
    );

    sqlx::query_as::<_, Quiz>(&sql)
        .bind(quiz_id)
        .fetch_optional(conn)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))
}

async fn lock_attempt(conn: &mut PgConnection, attempt_id: i64) -> Result<QuizAttempt, AppError> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {} FROM quiz_attempts WHERE id = $1 FOR UPDATE",
        ATTEMPT_COLUMNS
    ))
    .bind(attempt_id)
    .fetch_optional(conn)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))
}

/// Starts a new attempt for `user_id` on `quiz_id`.
pub async fn start_attempt(pool: &PgPool, user_id: i64, quiz_id: i64) -> Result<QuizAttempt, AppError> {
    let mut tx = pool.begin().await?;

    // Questions cannot change between here and commit, so max_score stays exact.
    let quiz = fetch_quiz(&mut tx, quiz_id, true).await?;

    // Locking the enrollment serializes concurrent starts by the same user.
    let enrollment = enrollment::find_enrollment(&mut *tx, user_id, quiz.course_id, true).await?;

    let attempts_used: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(attempt_number), 0) FROM quiz_attempts WHERE user_id = $1 AND quiz_id = $2",
    )
    .bind(user_id)
    .bind(quiz_id)
    .fetch_one(&mut *tx)
    .await?;

    let (question_count, max_score): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(points), 0) FROM questions WHERE quiz_id = $1",
    )
    .bind(quiz_id)
    .fetch_one(&mut *tx)
    .await?;

    let attempt_number = next_attempt_number(
        enrollment.as_ref(),
        attempts_used,
        quiz.max_attempts,
        question_count,
    )?;

    let max_score = i32::try_from(max_score)
        .map_err(|_| AppError::InternalServerError("Quiz max score overflow".to_string()))?;

    let attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
        "INSERT INTO quiz_attempts (user_id, quiz_id, attempt_number, max_score)
         VALUES ($1, $2, $3, $4) RETURNING {}",
        ATTEMPT_COLUMNS
    ))
    .bind(user_id)
    .bind(quiz_id)
    .bind(attempt_number)
    .bind(max_score)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if crate::error::is_unique_violation(&e) {
            AppError::Conflict("Attempt already started".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    tx.commit().await?;

    tracing::info!(
        "User {} started attempt {} (#{}) on quiz {}",
        user_id,
        attempt.id,
        attempt.attempt_number,
        quiz_id
    );
    Ok(attempt)
}

/// Scores and upserts answers for an in-progress attempt.
/// All answers are applied in one transaction; any invalid answer rolls back the batch.
pub async fn record_answers(
    pool: &PgPool,
    user_id: i64,
    attempt_id: i64,
    answers: &[SubmitAnswerRequest],
) -> Result<Vec<QuizResponse>, AppError> {
    let mut tx = pool.begin().await?;

    let attempt = lock_attempt(&mut tx, attempt_id).await?;
    ensure_owner(&attempt, user_id)?;
    ensure_in_progress(attempt.status())?;

    let questions: HashMap<i64, Question> = sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questions WHERE quiz_id = $1",
        QUESTION_COLUMNS
    ))
    .bind(attempt.quiz_id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(|q| (q.id, q))
    .collect();

    let mut saved = Vec::with_capacity(answers.len());
    for submitted in answers {
        let question = questions.get(&submitted.question_id).ok_or_else(|| {
            AppError::NotFound(format!(
                "Question {} is not part of this quiz",
                submitted.question_id
            ))
        })?;

        let is_correct = scoring::check_answer(
            &question.question_type,
            &question.correct_answer.0,
            &submitted.answer,
        );
        let points_earned = scoring::points_for(is_correct, question.points);

        let response = sqlx::query_as::<_, QuizResponse>(
            r#"
            INSERT INTO quiz_responses (attempt_id, question_id, answer, is_correct, points_earned, time_spent)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (attempt_id, question_id) DO UPDATE SET
                answer = EXCLUDED.answer,
                is_correct = EXCLUDED.is_correct,
                points_earned = EXCLUDED.points_earned,
                time_spent = EXCLUDED.time_spent,
                answered_at = CURRENT_TIMESTAMP
            RETURNING id, attempt_id, question_id, answer, is_correct, points_earned, time_spent, answered_at
            "#,
        )
        .bind(attempt.id)
        .bind(question.id)
        .bind(sqlx::types::Json(&submitted.answer))
        .bind(is_correct)
        .bind(points_earned)
        .bind(submitted.time_spent.unwrap_or(0))
        .fetch_one(&mut *tx)
        .await?;

        saved.push(response);
    }

    tx.commit().await?;

    tracing::debug!(
        "Recorded {} answer(s) for attempt {}",
        saved.len(),
        attempt_id
    );
    Ok(saved)
}

/// Completes an attempt: totals earned points and applies the passing threshold.
/// Finishing twice is rejected and leaves the stored score untouched.
pub async fn finish_attempt(
    pool: &PgPool,
    user_id: i64,
    attempt_id: i64,
) -> Result<FinishResponse, AppError> {
    let mut tx = pool.begin().await?;

    let attempt = lock_attempt(&mut tx, attempt_id).await?;
    ensure_owner(&attempt, user_id)?;
    ensure_in_progress(attempt.status())?;

    let quiz = fetch_quiz(&mut tx, attempt.quiz_id, false).await?;

    let rows: Vec<(i32, bool)> =
        sqlx::query_as("SELECT points_earned, is_correct FROM quiz_responses WHERE attempt_id = $1")
            .bind(attempt.id)
            .fetch_all(&mut *tx)
            .await?;

    let points: Vec<i32> = rows.iter().map(|(p, _)| *p).collect();
    let correct_count = rows.iter().filter(|(_, c)| *c).count();
    let outcome = summarize(&points, attempt.max_score, quiz.passing_score);

    let finished = sqlx::query_as::<_, QuizAttempt>(&format!(
        "UPDATE quiz_attempts
            SET score = $1, passed = $2, completed_at = CURRENT_TIMESTAMP
          WHERE id = $3
        RETURNING {}",
        ATTEMPT_COLUMNS
    ))
    .bind(outcome.score)
    .bind(outcome.passed)
    .bind(attempt.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "User {} finished attempt {} on quiz {}: {}/{} ({:.1}%), passed={}",
        user_id,
        attempt.id,
        quiz.id,
        outcome.score,
        attempt.max_score,
        outcome.percentage,
        outcome.passed
    );

    Ok(FinishResponse {
        attempt: finished,
        percentage: outcome.percentage,
        passing_score: quiz.passing_score,
        correct_count,
        answered_count: rows.len(),
    })
}

/// Attempt with its responses. Owners and admins only.
pub async fn attempt_detail(
    pool: &PgPool,
    claims: &Claims,
    attempt_id: i64,
) -> Result<AttemptDetail, AppError> {
    let attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {} FROM quiz_attempts WHERE id = $1",
        ATTEMPT_COLUMNS
    ))
    .bind(attempt_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if !claims.is_admin() {
        ensure_owner(&attempt, claims.user_id()?)?;
    }

    let rows = sqlx::query_as::<_, ResponseReviewRow>(
        r#"
        SELECT r.question_id, r.answer, r.is_correct, r.points_earned, r.time_spent,
               q.correct_answer, q.explanation
        FROM quiz_responses r
        JOIN questions q ON r.question_id = q.id
        WHERE r.attempt_id = $1
        ORDER BY q.position, q.id
        "#,
    )
    .bind(attempt.id)
    .fetch_all(pool)
    .await?;

    let status = attempt.status();
    let responses = review(rows, status);
    let percentage = attempt.score.map(|s| percentage(s, attempt.max_score));

    Ok(AttemptDetail {
        attempt,
        status,
        percentage,
        responses,
    })
}

/// Builds review rows, revealing correct answers only after completion.
pub fn review(rows: Vec<ResponseReviewRow>, status: AttemptStatus) -> Vec<ResponseView> {
    let reveal = status == AttemptStatus::Completed;
    rows.into_iter()
        .map(|row| ResponseView {
            question_id: row.question_id,
            answer: row.answer.0,
            is_correct: row.is_correct,
            points_earned: row.points_earned,
            time_spent: row.time_spent,
            correct_answer: reveal.then_some(row.correct_answer.0),
            explanation: if reveal { row.explanation } else { None },
        })
        .collect()
}

/// A user's attempts on a quiz, newest first.
pub async fn list_attempts(pool: &PgPool, user_id: i64, quiz_id: i64) -> Result<AttemptList, AppError> {
    let mut conn = pool.acquire().await?;
    let quiz = fetch_quiz(&mut conn, quiz_id, false).await?;

    let attempts = sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {} FROM quiz_attempts WHERE user_id = $1 AND quiz_id = $2 ORDER BY attempt_number DESC",
        ATTEMPT_COLUMNS
    ))
    .bind(user_id)
    .bind(quiz_id)
    .fetch_all(&mut *conn)
    .await?;

    let attempts_used = attempts.first().map(|a| a.attempt_number).unwrap_or(0);

    Ok(AttemptList {
        quiz_id,
        max_attempts: quiz.max_attempts,
        attempts_used,
        attempts_remaining: (quiz.max_attempts - attempts_used).max(0),
        attempts,
    })
}

/// Best completed attempt per user, highest percentage first; ties go to the earlier finisher.
/// Quizzes in unpublished courses have an empty board.
pub async fn leaderboard(pool: &PgPool, quiz_id: i64) -> Result<Vec<LeaderboardEntry>, AppError> {
    let entries = sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT u.username, best.score, best.max_score, best.attempt_number, best.completed_at
        FROM (
            SELECT DISTINCT ON (a.user_id)
                a.user_id, COALESCE(a.score, 0) AS score, a.max_score, a.attempt_number, a.completed_at
            FROM quiz_attempts a
            JOIN quizzes qz ON qz.id = a.quiz_id
            JOIN courses c ON c.id = qz.course_id
            WHERE a.quiz_id = $1 AND a.completed_at IS NOT NULL AND c.is_published
            ORDER BY a.user_id,
                     COALESCE(a.score, 0)::float8 / NULLIF(a.max_score, 0) DESC NULLS LAST,
                     a.completed_at ASC
        ) best
        JOIN users u ON u.id = best.user_id
        ORDER BY best.score::float8 / NULLIF(best.max_score, 0) DESC NULLS LAST,
                 best.completed_at ASC
        LIMIT $2
        "#,
    )
    .bind(quiz_id)
    .bind(LEADERBOARD_SIZE)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch leaderboard: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::Answer;
    use sqlx::types::Json;

    fn enrollment(status: &str) -> Enrollment {
        Enrollment {
            id: 1,
            user_id: 7,
            course_id: 3,
            status: status.to_string(),
            progress: 0,
            enrolled_at: None,
            completed_at: None,
        }
    }

    fn attempt(completed: bool) -> QuizAttempt {
        QuizAttempt {
            id: 11,
            user_id: 7,
            quiz_id: 5,
            attempt_number: 1,
            score: completed.then_some(15),
            max_score: 15,
            passed: completed,
            started_at: chrono::Utc::now(),
            completed_at: completed.then(chrono::Utc::now),
        }
    }

    #[test]
    fn test_first_attempt_is_number_one() {
        let e = enrollment("active");
        assert_eq!(next_attempt_number(Some(&e), 0, 3, 2).unwrap(), 1);
        assert_eq!(next_attempt_number(Some(&e), 2, 3, 2).unwrap(), 3);
    }

    #[test]
    fn test_fourth_attempt_rejected_with_limit_error() {
        let e = enrollment("active");
        match next_attempt_number(Some(&e), 3, 3, 2) {
            Err(AppError::Forbidden(msg)) => assert!(msg.contains("limit")),
            other => panic!("expected limit error, got {:?}", other),
        }
    }

    #[test]
    fn test_start_requires_enrollment() {
        assert!(matches!(
            next_attempt_number(None, 0, 3, 2),
            Err(AppError::Forbidden(_))
        ));
        let dropped = enrollment("dropped");
        assert!(matches!(
            next_attempt_number(Some(&dropped), 0, 3, 2),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_empty_quiz_is_bad_request() {
        let e = enrollment("completed");
        assert!(matches!(
            next_attempt_number(Some(&e), 0, 3, 0),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_two_questions_all_correct_passes() {
        let outcome = summarize(&[5, 10], 15, 70);
        assert_eq!(outcome.score, 15);
        assert_eq!(outcome.percentage, 100.0);
        assert!(outcome.passed);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(summarize(&[7], 10, 70).passed);
        assert!(!summarize(&[6], 10, 70).passed);
        assert!(!summarize(&[], 15, 70).passed);
        assert_eq!(summarize(&[], 15, 70).score, 0);
    }

    #[test]
    fn test_score_equals_sum_of_points() {
        let points = [5, 0, 10, 3];
        let outcome = summarize(&points, 30, 50);
        assert_eq!(outcome.score, points.iter().sum::<i32>());
    }

    #[test]
    fn test_completed_attempt_is_immutable() {
        assert!(ensure_in_progress(attempt(false).status()).is_ok());
        assert!(matches!(
            ensure_in_progress(attempt(true).status()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_only_in_progress_attempts_accept_changes() {
        assert!(ensure_in_progress(AttemptStatus::InProgress).is_ok());
        assert!(matches!(
            ensure_in_progress(AttemptStatus::NotStarted),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_only_owner_may_mutate() {
        let a = attempt(false);
        assert!(ensure_owner(&a, 7).is_ok());
        assert!(matches!(ensure_owner(&a, 8), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_review_hides_answers_until_completed() {
        let row = ResponseReviewRow {
            question_id: 1,
            answer: Json(Answer::Text("A".to_string())),
            is_correct: false,
            points_earned: 0,
            time_spent: 12,
            correct_answer: Json(Answer::Text("B".to_string())),
            explanation: Some("B is the idempotent one".to_string()),
        };

        let hidden = review(vec![row.clone()], AttemptStatus::InProgress);
        assert!(hidden[0].correct_answer.is_none());
        assert!(hidden[0].explanation.is_none());

        let shown = review(vec![row], AttemptStatus::Completed);
        assert_eq!(shown[0].correct_answer, Some(Answer::Text("B".to_string())));
        assert!(shown[0].explanation.is_some());
    }
}
