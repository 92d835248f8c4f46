// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::question::{CreateQuestionRequest, PublicQuestion};

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub course_id: i64,
    pub lesson_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,

    /// Minimum percentage (0-100) needed to pass.
    pub passing_score: i32,

    /// Attempt ceiling per user.
    pub max_attempts: i32,

    /// Serve questions in random order.
    pub randomize: bool,

    pub time_limit_minutes: Option<i32>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Quiz listing entry on a course page.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuizSummary {
    pub id: i64,
    pub lesson_id: Option<i64>,
    pub title: String,
    pub passing_score: i32,
    pub max_attempts: i32,
}

/// Quiz as served to a taker: no correct answers.
#[derive(Debug, Serialize)]
pub struct QuizView {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub total_points: i64,
    pub questions: Vec<PublicQuestion>,
}

/// DTO for creating a quiz together with its initial questions.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub lesson_id: Option<i64>,
    #[validate(range(min = 0, max = 100))]
    pub passing_score: Option<i32>,
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: Option<i32>,
    pub randomize: Option<bool>,
    #[validate(range(min = 1, max = 600))]
    pub time_limit_minutes: Option<i32>,
    #[validate(nested)]
    #[serde(default)]
    pub questions: Vec<CreateQuestionRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 0, max = 100))]
    pub passing_score: Option<i32>,
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: Option<i32>,
    pub randomize: Option<bool>,
    #[validate(range(min = 1, max = 600))]
    pub time_limit_minutes: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_question_validation() {
        let req: CreateQuizRequest = serde_json::from_value(serde_json::json!({
            "title": "System design basics",
            "passing_score": 70,
            "questions": [
                { "type": "short_answer", "content": "", "correct_answer": "cache", "points": 5 }
            ]
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_passing_score_range() {
        let req: CreateQuizRequest = serde_json::from_value(serde_json::json!({
            "title": "Quiz",
            "passing_score": 120
        }))
        .unwrap();
        assert!(req.validate().is_err());
        assert!(req.questions.is_empty());
    }
}
