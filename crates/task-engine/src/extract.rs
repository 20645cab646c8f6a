//! Boundary to the natural-language extraction service.
//!
//! The language model that turns free text into task fields lives outside
//! this crate behind [`TaskExtractor`]. This module decodes what such a
//! service returns and resolves the due dates it produced, yielding
//! candidates the caller can accept (persist through the store) or reject
//! (drop).

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Result, TaskError};
use crate::resolver::ResolveOptions;
use crate::task::ParsedTaskCandidate;

/// Turns free text into zero or more task candidates.
pub trait TaskExtractor {
    /// Extract candidates from `text`. `reference` is the caller's "now",
    /// for extractors that resolve relative dates themselves.
    fn extract(&self, text: &str, reference: DateTime<Utc>) -> Result<Vec<ParsedTaskCandidate>>;
}

/// An extractor whose input is already the model's JSON response.
///
/// Lets an external tool do the language-model call and pipe its output in.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResponseExtractor;

impl TaskExtractor for JsonResponseExtractor {
    fn extract(&self, text: &str, _reference: DateTime<Utc>) -> Result<Vec<ParsedTaskCandidate>> {
        decode_candidates(text)
    }
}

/// Decode a model response into candidates.
///
/// Accepts a JSON array of task objects, an object with a `tasks` array, or
/// a single task object. Every task must carry a non-empty `description`,
/// `assignee` and `dueDate`; `priority` is optional.
///
/// # Errors
///
/// Returns [`TaskError::Validation`] if the response is not JSON, has an
/// unexpected shape, or any task is missing a required field.
pub fn decode_candidates(response: &str) -> Result<Vec<ParsedTaskCandidate>> {
    let value: Value = serde_json::from_str(response.trim()).map_err(|e| {
        TaskError::Validation(format!("extraction response is not valid JSON: {e}"))
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("tasks") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(TaskError::Validation(
                    "extraction response field 'tasks' is not an array".to_string(),
                ))
            }
            None => vec![Value::Object(object)],
        },
        _ => {
            return Err(TaskError::Validation(
                "extraction response must be a JSON object or array".to_string(),
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let candidate: ParsedTaskCandidate = serde_json::from_value(item).map_err(|e| {
                TaskError::Validation(format!("task at index {index} is malformed: {e}"))
            })?;
            candidate.validate().map_err(|e| {
                TaskError::Validation(format!("task at index {index} is invalid: {e}"))
            })?;
            Ok(candidate)
        })
        .collect()
}

/// Extract exactly one task from `text` and resolve its due date.
///
/// # Errors
///
/// Returns [`TaskError::Validation`] unless the extractor yields exactly one
/// candidate, and [`TaskError::UnresolvedDate`] if its due date cannot be resolved.
pub fn parse_single<E: TaskExtractor + ?Sized>(
    extractor: &E,
    text: &str,
    reference: DateTime<Utc>,
    options: &ResolveOptions,
) -> Result<ParsedTaskCandidate> {
    let mut candidates = extractor.extract(text, reference)?;
    if candidates.len() != 1 {
        return Err(TaskError::Validation(format!(
            "expected exactly one task, extracted {}",
            candidates.len()
        )));
    }
    let candidate = candidates.remove(0);
    Ok(candidate.resolve(reference, options)?.into())
}

/// Extract every task in a transcript and resolve their due dates.
///
/// Fails as a whole if any candidate cannot be resolved, so a transcript is
/// never half-accepted.
pub fn parse_transcript<E: TaskExtractor + ?Sized>(
    extractor: &E,
    transcript: &str,
    reference: DateTime<Utc>,
    options: &ResolveOptions,
) -> Result<Vec<ParsedTaskCandidate>> {
    extractor
        .extract(transcript, reference)?
        .into_iter()
        .map(|c| c.resolve(reference, options).map(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::task::{DueDate, Priority};
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 20, 6, 0, 0).unwrap()
    }

    /// Stands in for a model that always answers with a fixed response.
    struct CannedExtractor(&'static str);

    impl TaskExtractor for CannedExtractor {
        fn extract(
            &self,
            _text: &str,
            _reference: DateTime<Utc>,
        ) -> Result<Vec<ParsedTaskCandidate>> {
            decode_candidates(self.0)
        }
    }

    #[test]
    fn test_decode_array() {
        let candidates = decode_candidates(
            r#"[
                {"description": "Send deck", "assignee": "Asha", "dueDate": "tomorrow 2pm", "priority": "P1"},
                {"description": "Book room", "assignee": "Ravi", "dueDate": "eod"}
            ]"#,
        )
        .unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].priority, Some(Priority::P1));
        assert_eq!(candidates[1].priority, None);
    }

    #[test]
    fn test_decode_tasks_object_and_single_object() {
        let wrapped = decode_candidates(
            r#"{"tasks": [{"description": "a", "assignee": "b", "dueDate": "eow"}]}"#,
        )
        .unwrap();
        assert_eq!(wrapped.len(), 1);

        let single =
            decode_candidates(r#"{"description": "a", "assignee": "b", "dueDate": "eow"}"#).unwrap();
        assert_eq!(single, wrapped);
    }

    #[test]
    fn test_decode_empty_array() {
        assert!(decode_candidates("[]").unwrap().is_empty());
    }

    #[test]
    fn test_decode_reports_index_of_missing_field() {
        let err = decode_candidates(
            r#"[
                {"description": "a", "assignee": "b", "dueDate": "eow"},
                {"description": "c", "dueDate": "eow"}
            ]"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("index 1"), "got: {err}");
    }

    #[test]
    fn test_decode_rejects_blank_assignee_and_bad_json() {
        let blank = decode_candidates(r#"{"description": "a", "assignee": " ", "dueDate": "eow"}"#);
        assert!(blank.is_err());
        assert!(decode_candidates("the model said hello").is_err());
        assert!(decode_candidates("42").is_err());
        assert!(decode_candidates(r#"{"tasks": "none"}"#).is_err());
    }

    #[test]
    fn test_parse_single_resolves_due_date() {
        let extractor = CannedExtractor(
            r#"{"description": "Send deck", "assignee": "Asha", "dueDate": "today 9:30pm"}"#,
        );
        let parsed =
            parse_single(&extractor, "ignored", reference(), &ResolveOptions::default()).unwrap();
        assert_eq!(
            parsed.due_date,
            DueDate::At(Utc.with_ymd_and_hms(2025, 6, 20, 16, 0, 0).unwrap())
        );
        assert_eq!(parsed.priority, Some(Priority::P3));
    }

    #[test]
    fn test_parse_single_accepts_model_resolved_instant() {
        let extractor = CannedExtractor(
            r#"{"description": "Call", "assignee": "Ravi", "dueDate": "2025-06-14T22:30:00.000Z"}"#,
        );
        let parsed =
            parse_single(&extractor, "ignored", reference(), &ResolveOptions::default()).unwrap();
        assert_eq!(
            parsed.due_date,
            DueDate::At(Utc.with_ymd_and_hms(2025, 6, 14, 22, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_single_rejects_multiple() {
        let extractor = CannedExtractor(
            r#"[{"description": "a", "assignee": "b", "dueDate": "eod"},
                {"description": "c", "assignee": "d", "dueDate": "eod"}]"#,
        );
        let err = parse_single(&extractor, "x", reference(), &ResolveOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_parse_transcript_fails_whole_on_unresolved_date() {
        let extractor = CannedExtractor(
            r#"[{"description": "a", "assignee": "b", "dueDate": "eod"},
                {"description": "c", "assignee": "d", "dueDate": "sometime soon"}]"#,
        );
        let err =
            parse_transcript(&extractor, "x", reference(), &ResolveOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedDate);
    }

    #[test]
    fn test_json_response_extractor_then_parse_transcript() {
        let response = r#"[
            {"description": "Send deck", "assignee": "Asha", "dueDate": "tomorrow 2pm"},
            {"description": "Review PR", "assignee": "Ravi", "dueDate": "15/6/2025 4am", "priority": "P2"}
        ]"#;
        let parsed = parse_transcript(
            &JsonResponseExtractor,
            response,
            reference(),
            &ResolveOptions::default(),
        )
        .unwrap();
        assert_eq!(
            parsed[0].due_date,
            DueDate::At(Utc.with_ymd_and_hms(2025, 6, 21, 8, 30, 0).unwrap())
        );
        assert_eq!(
            parsed[1].due_date,
            DueDate::At(Utc.with_ymd_and_hms(2025, 6, 14, 22, 30, 0).unwrap())
        );
    }
}
