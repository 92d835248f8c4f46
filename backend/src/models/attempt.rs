// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

use crate::models::question::Answer;

/// Lifecycle state of an attempt, derived from `completed_at`.
/// `NotStarted` is never persisted: it is the absence of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// Represents the 'quiz_attempts' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,

    /// 1-based, unique per (user, quiz).
    pub attempt_number: i32,

    /// Null until the attempt is finished.
    pub score: Option<i32>,

    /// Sum of question points, fixed when the attempt starts.
    pub max_score: i32,

    pub passed: bool,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl QuizAttempt {
    pub fn status(&self) -> AttemptStatus {
        if self.completed_at.is_some() {
            AttemptStatus::Completed
        } else {
            AttemptStatus::InProgress
        }
    }
}

/// Represents the 'quiz_responses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuizResponse {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub answer: Json<Answer>,
    pub is_correct: bool,
    pub points_earned: i32,

    /// Seconds the user spent on the question, as reported by the client.
    pub time_spent: i32,

    pub answered_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Response row joined with its question, for attempt review.
#[derive(Debug, Clone, FromRow)]
pub struct ResponseReviewRow {
    pub question_id: i64,
    pub answer: Json<Answer>,
    pub is_correct: bool,
    pub points_earned: i32,
    pub time_spent: i32,
    pub correct_answer: Json<Answer>,
    pub explanation: Option<String>,
}

/// One response in an attempt review.
/// `correct_answer` and `explanation` are only revealed once the attempt is completed.
#[derive(Debug, Serialize)]
pub struct ResponseView {
    pub question_id: i64,
    pub answer: Answer,
    pub is_correct: bool,
    pub points_earned: i32,
    pub time_spent: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<Answer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AttemptDetail {
    #[serde(flatten)]
    pub attempt: QuizAttempt,
    pub status: AttemptStatus,
    pub percentage: Option<f64>,
    pub responses: Vec<ResponseView>,
}

#[derive(Debug, Serialize)]
pub struct AttemptList {
    pub quiz_id: i64,
    pub max_attempts: i32,
    pub attempts_used: i32,
    pub attempts_remaining: i32,
    pub attempts: Vec<QuizAttempt>,
}

/// Result of finishing an attempt.
#[derive(Debug, Serialize)]
pub struct FinishResponse {
    #[serde(flatten)]
    pub attempt: QuizAttempt,
    pub percentage: f64,
    pub passing_score: i32,
    pub correct_count: usize,
    pub answered_count: usize,
}

/// DTO for submitting one answer.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    pub question_id: i64,
    pub answer: Answer,
    #[validate(range(min = 0, max = 86400))]
    pub time_spent: Option<i32>,
}

/// DTO for submitting several answers at once.
#[derive(Debug, Deserialize, Validate)]
pub struct BulkAnswerRequest {
    #[validate(length(min = 1, max = 500))]
    #[validate(nested)]
    pub answers: Vec<SubmitAnswerRequest>,
}

/// Aggregated row for a quiz leaderboard (each user's best completed attempt).
#[derive(Debug, Serialize, FromRow)]
pub struct LeaderboardEntry {
    pub username: String,
    pub score: i32,
    pub max_score: i32,
    pub attempt_number: i32,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}
