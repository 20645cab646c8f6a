//! Task records, extraction candidates and partial updates.
//!
//! All types serialize with the camelCase field names the task JSON document
//! uses (`dueDate`, `isCompleted`, ...). Instants serialize as RFC 3339 in UTC
//! with millisecond precision (`2025-06-14T22:30:00.000Z`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::resolver::{resolve_due_date_with_options, ResolveOptions};

// ── Identifiers ─────────────────────────────────────────────────────────────

/// Opaque unique task identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| TaskError::Validation(format!("invalid task id: '{s}'")))
    }
}

// ── Priority ────────────────────────────────────────────────────────────────

/// Task priority. `P1` is the most urgent; ordering follows urgency.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Priority {
    P1,
    P2,
    #[default]
    P3,
    P4,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
            Priority::P4 => "P4",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P1" => Ok(Priority::P1),
            "P2" => Ok(Priority::P2),
            "P3" => Ok(Priority::P3),
            "P4" => Ok(Priority::P4),
            _ => Err(TaskError::Validation(format!(
                "invalid priority: '{s}' (expected P1, P2, P3 or P4)"
            ))),
        }
    }
}

// ── Task ────────────────────────────────────────────────────────────────────

/// A persisted task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub assignee: String,
    #[serde(with = "timestamp")]
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_completed: bool,
}

impl Task {
    /// Build a fresh, incomplete task from a resolved candidate.
    pub(crate) fn create(candidate: ResolvedCandidate, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            description: candidate.description,
            assignee: candidate.assignee,
            due_date: candidate.due_date,
            priority: candidate.priority,
            created_at: now,
            updated_at: now,
            is_completed: false,
        }
    }

    /// Merge the present fields of `update` and advance `updated_at`.
    ///
    /// `updated_at` always moves forward, even if `now` does not.
    pub(crate) fn apply(&mut self, update: ResolvedUpdate, now: DateTime<Utc>) {
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(assignee) = update.assignee {
            self.assignee = assignee;
        }
        if let Some(due_date) = update.due_date {
            self.due_date = due_date;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(is_completed) = update.is_completed {
            self.is_completed = is_completed;
        }
        self.updated_at = next_update_stamp(self.updated_at, now);
    }
}

/// The next `updatedAt` value: `now`, or one millisecond past `previous` if the
/// clock has not moved beyond it.
fn next_update_stamp(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

// ── Due dates and candidates ────────────────────────────────────────────────

/// A candidate's due date: a phrase still to be resolved, or an instant.
///
/// On the wire both are strings; a string that parses as RFC 3339 is an
/// instant, anything else is a phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueDate {
    Phrase(String),
    At(DateTime<Utc>),
}

impl DueDate {
    /// Resolve to an instant using `reference` as "now".
    pub fn resolve(
        &self,
        reference: DateTime<Utc>,
        options: &ResolveOptions,
    ) -> Result<DateTime<Utc>> {
        match self {
            DueDate::At(instant) => Ok(*instant),
            DueDate::Phrase(phrase) => {
                resolve_due_date_with_options(reference, phrase, options).map(|r| r.utc)
            }
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, DueDate::Phrase(p) if p.trim().is_empty())
    }
}

impl From<&str> for DueDate {
    fn from(s: &str) -> Self {
        match DateTime::parse_from_rfc3339(s.trim()) {
            Ok(dt) => DueDate::At(dt.with_timezone(&Utc)),
            Err(_) => DueDate::Phrase(s.to_string()),
        }
    }
}

impl From<DateTime<Utc>> for DueDate {
    fn from(instant: DateTime<Utc>) -> Self {
        DueDate::At(instant)
    }
}

impl Serialize for DueDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DueDate::Phrase(phrase) => serializer.serialize_str(phrase),
            DueDate::At(instant) => timestamp::serialize(instant, serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DueDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(DueDate::from(s.as_str()))
    }
}

/// An unpersisted task proposed by extraction, awaiting accept or reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTaskCandidate {
    pub description: String,
    pub assignee: String,
    pub due_date: DueDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl ParsedTaskCandidate {
    pub fn new(
        description: impl Into<String>,
        assignee: impl Into<String>,
        due_date: impl Into<DueDate>,
    ) -> Self {
        Self {
            description: description.into(),
            assignee: assignee.into(),
            due_date: due_date.into(),
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Check that description, assignee and due date are all present.
    pub fn validate(&self) -> Result<()> {
        require_text("description", &self.description)?;
        require_text("assignee", &self.assignee)?;
        if self.due_date.is_blank() {
            return Err(TaskError::Validation("dueDate is required".to_string()));
        }
        Ok(())
    }

    /// Validate and resolve the due date, yielding a candidate ready to persist.
    pub fn resolve(
        &self,
        reference: DateTime<Utc>,
        options: &ResolveOptions,
    ) -> Result<ResolvedCandidate> {
        self.validate()?;
        Ok(ResolvedCandidate {
            description: self.description.trim().to_string(),
            assignee: self.assignee.trim().to_string(),
            due_date: self.due_date.resolve(reference, options)?,
            priority: self.priority.unwrap_or_default(),
        })
    }
}

/// A validated candidate with an absolute due date and a concrete priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCandidate {
    pub description: String,
    pub assignee: String,
    #[serde(with = "timestamp")]
    pub due_date: DateTime<Utc>,
    pub priority: Priority,
}

impl From<ResolvedCandidate> for ParsedTaskCandidate {
    fn from(resolved: ResolvedCandidate) -> Self {
        Self {
            description: resolved.description,
            assignee: resolved.assignee,
            due_date: DueDate::At(resolved.due_date),
            priority: Some(resolved.priority),
        }
    }
}

// ── Partial updates ─────────────────────────────────────────────────────────

/// Partial update for a task. Only present fields overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DueDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
}

impl TaskUpdate {
    pub fn completed(is_completed: bool) -> Self {
        Self {
            is_completed: Some(is_completed),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Validate present fields and resolve a phrase due date.
    pub(crate) fn resolve(
        self,
        reference: DateTime<Utc>,
        options: &ResolveOptions,
    ) -> Result<ResolvedUpdate> {
        if let Some(description) = &self.description {
            require_text("description", description)?;
        }
        if let Some(assignee) = &self.assignee {
            require_text("assignee", assignee)?;
        }
        let due_date = match &self.due_date {
            Some(due) if due.is_blank() => {
                return Err(TaskError::Validation("dueDate must not be empty".to_string()));
            }
            Some(due) => Some(due.resolve(reference, options)?),
            None => None,
        };

        Ok(ResolvedUpdate {
            description: self.description.map(|d| d.trim().to_string()),
            assignee: self.assignee.map(|a| a.trim().to_string()),
            due_date,
            priority: self.priority,
            is_completed: self.is_completed,
        })
    }
}

/// A validated update with any due date already resolved.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolvedUpdate {
    description: Option<String>,
    assignee: Option<String>,
    due_date: Option<DateTime<Utc>>,
    priority: Option<Priority>,
    is_completed: Option<bool>,
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TaskError::Validation(format!("{field} is required")));
    }
    Ok(())
}

// ── Timestamp serialization ─────────────────────────────────────────────────

/// Serde adapter: RFC 3339, UTC, millisecond precision, `Z` suffix.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| D::Error::custom(format!("invalid timestamp '{s}': {e}")))
    }
}
