//! Filtering and sorting for task lists.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{Priority, Task};

/// Which completion states to include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Completed,
}

/// The key a list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    /// Persisted order.
    #[default]
    Position,
    DueDate,
    Priority,
    CreatedAt,
}

/// A filter-and-sort request over the task list.
///
/// Every filter is optional; an empty query returns all tasks in persisted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskQuery {
    pub status: StatusFilter,
    pub priority: Option<Priority>,
    /// Case-insensitive exact match.
    pub assignee: Option<String>,
    /// Local calendar date the task is due on.
    pub due_on: Option<NaiveDate>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of description, assignee or priority.
    pub search: Option<String>,
    pub sort: SortKey,
    pub descending: bool,
}

impl TaskQuery {
    /// Filter and sort `tasks`. `offset` is the local offset used for `due_on`.
    ///
    /// Sorting is stable in either direction, so ties keep their persisted
    /// order. Descending by position is the persisted order reversed.
    pub fn apply(&self, tasks: Vec<Task>, offset: FixedOffset) -> Vec<Task> {
        let mut matched: Vec<Task> = tasks
            .into_iter()
            .filter(|t| self.matches(t, offset))
            .collect();

        match self.sort {
            SortKey::Position if self.descending => matched.reverse(),
            SortKey::Position => {}
            SortKey::DueDate => self.sort_by(&mut matched, |t| t.due_date),
            SortKey::Priority => self.sort_by(&mut matched, |t| t.priority),
            SortKey::CreatedAt => self.sort_by(&mut matched, |t| t.created_at),
        }
        matched
    }

    /// Stable in both directions: ties keep their persisted order.
    fn sort_by<K: Ord>(&self, tasks: &mut [Task], key: impl Fn(&Task) -> K) {
        if self.descending {
            tasks.sort_by(|a, b| key(b).cmp(&key(a)));
        } else {
            tasks.sort_by(|a, b| key(a).cmp(&key(b)));
        }
    }

    pub fn matches(&self, task: &Task, offset: FixedOffset) -> bool {
        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Pending => !task.is_completed,
            StatusFilter::Completed => task.is_completed,
        };

        status_ok
            && self.priority.is_none_or(|p| task.priority == p)
            && self
                .assignee
                .as_deref()
                .is_none_or(|a| task.assignee.trim().eq_ignore_ascii_case(a.trim()))
            && self
                .due_on
                .is_none_or(|day| task.due_date.with_timezone(&offset).date_naive() == day)
            && self.due_from.is_none_or(|from| task.due_date >= from)
            && self.due_to.is_none_or(|to| task.due_date <= to)
            && self.search.as_deref().is_none_or(|q| search_matches(task, q))
    }
}

fn search_matches(task: &Task, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    task.description.to_lowercase().contains(&query)
        || task.assignee.to_lowercase().contains(&query)
        || task.priority.as_str().to_lowercase().contains(&query)
}
