// src/models/lesson.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use validator::Validate;

/// Represents the 'lessons' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub course_id: i64,
    pub title: String,

    /// Sanitized HTML body.
    pub content: String,

    pub video_url: Option<String>,
    pub position: i32,
    pub duration_minutes: i32,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Outline entry for a course page.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LessonSummary {
    pub id: i64,
    pub title: String,
    pub position: i32,
    pub duration_minutes: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLessonRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 100000))]
    pub content: String,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub video_url: Option<String>,
    pub position: Option<i32>,
    #[validate(range(min = 0, max = 1440))]
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLessonRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 100000))]
    pub content: Option<String>,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub video_url: Option<String>,
    pub position: Option<i32>,
    #[validate(range(min = 0, max = 1440))]
    pub duration_minutes: Option<i32>,
}

/// Validates that a string is a correctly formatted URL.
fn validate_url_string(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}
