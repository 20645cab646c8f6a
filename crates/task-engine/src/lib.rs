//! # task-engine
//!
//! Deterministic core of a natural-language task manager.
//!
//! Free text or a meeting transcript goes to an external language model,
//! which returns task fields and a due-date phrase. This crate resolves
//! that phrase to an absolute instant and keeps the resulting tasks in an
//! ordered, durable store.
//!
//! ## Modules
//!
//! - [`resolver`]: due-date phrase + reference instant + fixed offset → UTC instant
//! - [`task`]: task records, extraction candidates, partial updates
//! - [`store`]: ordered task collection with serialized mutations
//! - [`storage`]: durable storage port with JSON file and in-memory backends
//! - [`query`]: list filtering and sorting
//! - [`extract`]: boundary to the extraction service; parse-single and parse-transcript
//! - [`clock`]: injectable "now"
//! - [`error`]: error types

pub mod clock;
pub mod error;
pub mod extract;
pub mod query;
pub mod resolver;
pub mod storage;
pub mod store;
pub mod task;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ErrorKind, ErrorPayload, TaskError};
pub use extract::{
    decode_candidates, parse_single, parse_transcript, JsonResponseExtractor, TaskExtractor,
};
pub use query::{SortKey, StatusFilter, TaskQuery};
pub use resolver::{
    resolve_due_date, resolve_due_date_with_options, ResolveOptions, ResolvedDueDate,
    WeekStartDay, DEFAULT_OFFSET_MINUTES,
};
pub use storage::{JsonFileStorage, MemoryStorage, StorageLock, TaskStorage};
pub use store::TaskRecordStore;
pub use task::{
    DueDate, ParsedTaskCandidate, Priority, ResolvedCandidate, Task, TaskId, TaskUpdate,
};
