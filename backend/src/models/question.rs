// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::error::AppError;

/// Supported question kinds.
/// Stored as snake_case text in `questions.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultiSelect,
    TrueFalse,
    ShortAnswer,
    FillInBlank,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultiSelect => "multi_select",
            QuestionType::TrueFalse => "true_false",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::FillInBlank => "fill_in_blank",
        }
    }

    /// Returns `None` for anything not in the enumeration.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "single_choice" => Some(QuestionType::SingleChoice),
            "multi_select" => Some(QuestionType::MultiSelect),
            "true_false" => Some(QuestionType::TrueFalse),
            "short_answer" => Some(QuestionType::ShortAnswer),
            "fill_in_blank" => Some(QuestionType::FillInBlank),
            _ => None,
        }
    }

    pub fn has_options(&self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::MultiSelect)
    }
}

/// An answer value: a single string, a list of strings, or a JSON boolean
/// (accepted for true/false questions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Flag(bool),
    Text(String),
    List(Vec<String>),
}

impl Answer {
    /// Scalar view of the answer. A one-element list collapses to its element.
    pub fn as_single(&self) -> Option<String> {
        match self {
            Answer::Flag(b) => Some(b.to_string()),
            Answer::Text(s) => Some(s.clone()),
            Answer::List(items) if items.len() == 1 => Some(items[0].clone()),
            Answer::List(_) => None,
        }
    }

    /// Set view of the answer: trimmed, sorted and deduplicated.
    pub fn as_set(&self) -> Option<Vec<String>> {
        let mut items: Vec<String> = match self {
            Answer::Flag(_) => return None,
            Answer::Text(s) => vec![s.trim().to_string()],
            Answer::List(items) => items.iter().map(|s| s.trim().to_string()).collect(),
        };
        items.sort();
        items.dedup();
        Some(items)
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,

    /// Mapped from the database column 'type' since `type` is a reserved keyword in Rust.
    /// Kept as raw text so an unknown value scores as incorrect instead of failing the row.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub question_type: String,

    pub content: String,

    /// Choices for single-choice and multi-select questions.
    pub options: Option<Json<Vec<String>>>,

    pub correct_answer: Json<Answer>,
    pub points: i32,
    pub position: i32,
    pub explanation: Option<String>,
}

/// DTO for sending a question to a quiz taker (excludes answer and explanation).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: String,
    pub content: String,
    pub options: Option<Vec<String>>,
    pub points: i32,
    pub position: i32,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            question_type: q.question_type,
            content: q.content,
            options: q.options.map(|o| o.0),
            points: q.points,
            position: q.position,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    #[validate(custom(function = validate_options))]
    pub options: Option<Vec<String>>,
    pub correct_answer: Answer,
    #[validate(range(min = 1, max = 1000))]
    pub points: i32,
    pub position: Option<i32>,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
}

impl CreateQuestionRequest {
    /// Checks that `options` and `correct_answer` have the shape the type requires.
    pub fn check_shape(&self) -> Result<(), AppError> {
        let bad = |msg: &str| Err(AppError::BadRequest(msg.to_string()));

        let options = self.options.as_deref().unwrap_or_default();
        if self.question_type.has_options() && options.len() < 2 {
            return bad("Choice questions need at least two options");
        }

        match (self.question_type, &self.correct_answer) {
            (QuestionType::SingleChoice, answer) => match answer.as_single() {
                Some(choice) if options.iter().any(|o| o.trim() == choice.trim()) => Ok(()),
                _ => bad("Single-choice answer must be one of the options"),
            },
            (QuestionType::MultiSelect, Answer::List(items)) => {
                if items.is_empty() {
                    return bad("Multi-select answer cannot be empty");
                }
                if items
                    .iter()
                    .all(|item| options.iter().any(|o| o.trim() == item.trim()))
                {
                    Ok(())
                } else {
                    bad("Multi-select answers must all be options")
                }
            }
            (QuestionType::MultiSelect, _) => bad("Multi-select answer must be a list"),
            (QuestionType::TrueFalse, answer) => match answer.as_single() {
                Some(v) if matches!(v.trim().to_lowercase().as_str(), "true" | "false") => Ok(()),
                _ => bad("True/false answer must be true or false"),
            },
            (QuestionType::ShortAnswer, Answer::Text(text)) if !text.trim().is_empty() => Ok(()),
            (QuestionType::ShortAnswer, _) => bad("Short answer must be a non-empty string"),
            (QuestionType::FillInBlank, Answer::Text(text)) if !text.trim().is_empty() => Ok(()),
            (QuestionType::FillInBlank, Answer::List(items))
                if !items.is_empty() && items.iter().all(|i| !i.trim().is_empty()) =>
            {
                Ok(())
            }
            (QuestionType::FillInBlank, _) => {
                bad("Fill-in-blank answer must be a string or a list of strings")
            }
        }
    }
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    for opt in options {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}
