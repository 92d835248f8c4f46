// src/models/enrollment.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Enrollment status as stored in `enrollments.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Dropped => "dropped",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(EnrollmentStatus::Active),
            "completed" => Some(EnrollmentStatus::Completed),
            "dropped" => Some(EnrollmentStatus::Dropped),
            _ => None,
        }
    }
}

/// Represents the 'enrollments' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub status: String,

    /// Percentage of the course's lessons completed (0-100).
    pub progress: i32,

    pub enrolled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Enrollment {
    /// Active and completed enrollments both grant access to course content.
    pub fn grants_access(&self) -> bool {
        matches!(
            EnrollmentStatus::parse(&self.status),
            Some(EnrollmentStatus::Active | EnrollmentStatus::Completed)
        )
    }
}

/// Enrollment row joined with its course title, for "my courses".
#[derive(Debug, Serialize, FromRow)]
pub struct MyEnrollment {
    pub course_id: i64,
    pub course_title: String,
    pub status: String,
    pub progress: i32,
    pub enrolled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}
