// src/services/scoring.rs

use crate::models::question::{Answer, QuestionType};

/// Checks a candidate answer against a question's stored correct answer.
///
/// `question_type` is the raw column value; unknown types and shape
/// mismatches score as incorrect.
pub fn check_answer(question_type: &str, correct: &Answer, candidate: &Answer) -> bool {
    let Some(kind) = QuestionType::parse(question_type) else {
        return false;
    };

    match kind {
        QuestionType::SingleChoice => match (correct.as_single(), candidate.as_single()) {
            (Some(expected), Some(given)) => expected.trim() == given.trim(),
            _ => false,
        },
        QuestionType::TrueFalse => match (correct.as_single(), candidate.as_single()) {
            (Some(expected), Some(given)) => text_matches(&expected, &given),
            _ => false,
        },
        QuestionType::MultiSelect => match (correct.as_set(), candidate.as_set()) {
            (Some(expected), Some(given)) => !expected.is_empty() && expected == given,
            _ => false,
        },
        QuestionType::ShortAnswer => match (correct, candidate) {
            (Answer::Text(expected), Answer::Text(given)) => text_matches(expected, given),
            _ => false,
        },
        QuestionType::FillInBlank => match (correct, candidate) {
            (Answer::List(expected), Answer::List(given)) => {
                expected.len() == given.len()
                    && expected
                        .iter()
                        .zip(given)
                        .all(|(e, g)| text_matches(e, g))
            }
            (Answer::List(_), _) => false,
            _ => match (correct.as_single(), candidate.as_single()) {
                (Some(expected), Some(given)) => text_matches(&expected, &given),
                _ => false,
            },
        },
    }
}

/// Questions are all-or-nothing.
pub fn points_for(is_correct: bool, points: i32) -> i32 {
    if is_correct { points } else { 0 }
}

/// Case-insensitive, whitespace-trimmed exact match.
fn text_matches(expected: &str, given: &str) -> bool {
    expected.trim().to_lowercase() == given.trim().to_lowercase()
}
