//! The ordered, durable collection of task records.
//!
//! Every mutation is one read-modify-write of the whole stored sequence under
//! a single write lock. Reads share the lock with each other but never
//! overlap a mutation. Nothing is retried: if the storage write fails the
//! error is returned and the stored sequence is whatever it was before.

use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, TaskError};
use crate::query::TaskQuery;
use crate::resolver::ResolveOptions;
use crate::storage::TaskStorage;
use crate::task::{ParsedTaskCandidate, Task, TaskId, TaskUpdate};

pub struct TaskRecordStore<S, C = SystemClock> {
    storage: S,
    clock: C,
    options: ResolveOptions,
    lock: RwLock<()>,
}

impl<S: TaskStorage> TaskRecordStore<S, SystemClock> {
    pub fn new(storage: S) -> Self {
        Self::with_clock(storage, SystemClock)
    }
}

impl<S: TaskStorage, C: Clock> TaskRecordStore<S, C> {
    pub fn with_clock(storage: S, clock: C) -> Self {
        Self {
            storage,
            clock,
            options: ResolveOptions::default(),
            lock: RwLock::new(()),
        }
    }

    /// Set how due-date phrases on candidates and updates are resolved.
    pub fn with_resolve_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn resolve_options(&self) -> &ResolveOptions {
        &self.options
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// All tasks in persisted order.
    pub fn list(&self) -> Result<Vec<Task>> {
        let _guard = self.read_guard()?;
        let tasks = self.storage.load()?;
        debug!(count = tasks.len(), "listed tasks");
        Ok(tasks)
    }

    /// Tasks matching `query`, in the order it asks for.
    pub fn query(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        let offset = self.options.offset()?;
        Ok(query.apply(self.list()?, offset))
    }

    /// Persist one candidate at the end of the order.
    pub fn create(&self, candidate: &ParsedTaskCandidate) -> Result<Task> {
        let mut created = self.create_many(std::slice::from_ref(candidate))?;
        created
            .pop()
            .ok_or_else(|| TaskError::Persistence("created task missing".to_string()))
    }

    /// Persist all candidates at the end of the order, keeping their order.
    ///
    /// Every candidate is validated and resolved before anything is written;
    /// one bad candidate or a failed write leaves the stored sequence unchanged.
    pub fn create_many(&self, candidates: &[ParsedTaskCandidate]) -> Result<Vec<Task>> {
        let now = self.clock.now();
        let created = candidates
            .iter()
            .map(|c| c.resolve(now, &self.options).map(|r| Task::create(r, now)))
            .collect::<Result<Vec<_>>>()?;

        self.mutate("create", |tasks| {
            tasks.extend(created.iter().cloned());
            Ok(())
        })?;
        info!(count = created.len(), "created tasks");
        Ok(created)
    }

    /// Merge the present fields of `update` into the task with `id`.
    pub fn update(&self, id: &TaskId, update: TaskUpdate) -> Result<Task> {
        let now = self.clock.now();
        let resolved = update.resolve(now, &self.options)?;

        let updated = self.mutate("update", |tasks| {
            let task = tasks
                .iter_mut()
                .find(|t| t.id == *id)
                .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
            task.apply(resolved, now);
            Ok(task.clone())
        })?;
        info!(task_id = %id, "updated task");
        Ok(updated)
    }

    /// Remove the task with `id` and return it.
    pub fn delete(&self, id: &TaskId) -> Result<Task> {
        let removed = self.mutate("delete", |tasks| {
            let index = tasks
                .iter()
                .position(|t| t.id == *id)
                .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
            Ok(tasks.remove(index))
        })?;
        info!(task_id = %id, "deleted task");
        Ok(removed)
    }

    /// Store the tasks in the order given.
    ///
    /// `ordered` must hold every stored task exactly once. Record contents are
    /// taken from storage, not from `ordered`, so edits must go through
    /// [`update`](Self::update).
    pub fn reorder(&self, ordered: &[Task]) -> Result<Vec<Task>> {
        let ids: Vec<TaskId> = ordered.iter().map(|t| t.id).collect();
        self.reorder_ids(&ids)
    }

    /// Store the tasks in the order of `ids`, which must be a permutation of
    /// the stored ids.
    pub fn reorder_ids(&self, ids: &[TaskId]) -> Result<Vec<Task>> {
        let reordered = self.mutate("reorder", |tasks| {
            check_permutation(tasks, ids)?;
            let mut remaining = std::mem::take(tasks);
            for id in ids {
                if let Some(index) = remaining.iter().position(|t| t.id == *id) {
                    tasks.push(remaining.swap_remove(index));
                }
            }
            Ok(tasks.clone())
        })?;
        info!(count = reordered.len(), "reordered tasks");
        Ok(reordered)
    }

    /// Load, apply `f` to a working copy, and save, all under the write lock
    /// and the storage lock.
    ///
    /// If `f` fails, nothing is saved.
    fn mutate<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Vec<Task>) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.write_guard()?;
        let _storage_lock = self.storage.lock()?;
        let mut tasks = self.storage.load()?;
        let value = f(&mut tasks)?;
        if let Err(err) = self.storage.save(&tasks) {
            warn!(operation, error = %err, "task write failed; stored tasks unchanged");
            return Err(err);
        }
        Ok(value)
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.lock
            .read()
            .map_err(|_| TaskError::Persistence("task store lock poisoned".to_string()))
    }

    fn write_guard(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        self.lock
            .write()
            .map_err(|_| TaskError::Persistence("task store lock poisoned".to_string()))
    }
}

/// `ids` must name each stored task exactly once.
fn check_permutation(tasks: &[Task], ids: &[TaskId]) -> Result<()> {
    let stored: HashSet<&TaskId> = tasks.iter().map(|t| &t.id).collect();
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !stored.contains(id) {
            return Err(TaskError::Validation(format!("reorder names unknown task {id}")));
        }
        if !seen.insert(id) {
            return Err(TaskError::Validation(format!("reorder lists task {id} twice")));
        }
    }
    if seen.len() != stored.len() {
        return Err(TaskError::Validation(format!(
            "reorder must list all {} tasks, got {}",
            stored.len(),
            seen.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::ErrorKind;
    use crate::storage::{JsonFileStorage, MemoryStorage};
    use crate::task::{DueDate, Priority};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn start() -> DateTime<Utc> {
        // Friday, June 20, 2025, 11:30 IST
        Utc.with_ymd_and_hms(2025, 6, 20, 6, 0, 0).unwrap()
    }

    fn store() -> TaskRecordStore<MemoryStorage, FixedClock> {
        TaskRecordStore::with_clock(MemoryStorage::new(), FixedClock::new(start()))
    }

    fn candidate(description: &str) -> ParsedTaskCandidate {
        ParsedTaskCandidate::new(description, "Asha", "tomorrow 2pm")
    }

    /// Storage whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_writes: AtomicBool,
    }

    impl TaskStorage for FlakyStorage {
        fn load(&self) -> Result<Vec<Task>> {
            self.inner.load()
        }

        fn save(&self, tasks: &[Task]) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(TaskError::Persistence("disk full".to_string()));
            }
            self.inner.save(tasks)
        }
    }

    #[test]
    fn test_create_assigns_fields() {
        let store = store();
        let task = store.create(&candidate("Send report")).unwrap();

        assert_eq!(task.description, "Send report");
        assert_eq!(task.priority, Priority::P3);
        assert!(!task.is_completed);
        assert_eq!(task.created_at, start());
        assert_eq!(task.updated_at, start());
        assert_eq!(task.due_date, Utc.with_ymd_and_hms(2025, 6, 21, 8, 30, 0).unwrap());
        assert_eq!(store.list().unwrap(), vec![task]);
    }

    #[test]
    fn test_create_appends_in_order_with_unique_ids() {
        let store = store();
        let a = store.create(&candidate("a")).unwrap();
        let b = store.create(&candidate("b")).unwrap();
        let many = store
            .create_many(&[candidate("c"), candidate("d")])
            .unwrap();

        let listed: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|t| t.description)
            .collect();
        assert_eq!(listed, ["a", "b", "c", "d"]);

        let ids: HashSet<TaskId> = [a.id, b.id, many[0].id, many[1].id].into_iter().collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_create_keeps_resolved_due_date() {
        let store = store();
        let due = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        let task = store
            .create(&ParsedTaskCandidate::new("Audit", "Ravi", DueDate::At(due)))
            .unwrap();
        assert_eq!(task.due_date, due);
    }

    #[test]
    fn test_create_unresolved_date_writes_nothing() {
        let store = store();
        let err = store
            .create(&ParsedTaskCandidate::new("Audit", "Ravi", "whenever"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedDate);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_create_many_with_one_invalid_writes_nothing() {
        let store = store();
        store.create(&candidate("existing")).unwrap();
        let err = store
            .create_many(&[candidate("ok"), ParsedTaskCandidate::new("", "Ravi", "eod")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_create_many_persistence_failure_leaves_list_unchanged() {
        let storage = Arc::new(FlakyStorage::default());
        let store = TaskRecordStore::with_clock(storage.clone(), FixedClock::new(start()));
        store.create(&candidate("existing")).unwrap();

        storage.fail_writes.store(true, Ordering::SeqCst);
        let err = store
            .create_many(&[candidate("x"), candidate("y"), candidate("z")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);

        storage.fail_writes.store(false, Ordering::SeqCst);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_update_merges_and_bumps_updated_at() {
        let store = store();
        let task = store.create(&candidate("Send report")).unwrap();
        store.clock().advance(Duration::minutes(10));

        let updated = store
            .update(
                &task.id,
                TaskUpdate {
                    priority: Some(Priority::P1),
                    due_date: Some(DueDate::from("eod")),
                    ..TaskUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(updated.priority, Priority::P1);
        assert_eq!(updated.description, "Send report");
        assert_eq!(updated.assignee, "Asha");
        assert_eq!(updated.due_date, Utc.with_ymd_and_hms(2025, 6, 20, 18, 29, 0).unwrap());
        assert_eq!(updated.updated_at, start() + Duration::minutes(10));
        assert_eq!(updated.created_at, start());
        assert_eq!(store.list().unwrap(), vec![updated]);
    }

    #[test]
    fn test_update_with_frozen_clock_still_advances() {
        let store = store();
        let task = store.create(&candidate("Send report")).unwrap();
        let first = store.update(&task.id, TaskUpdate::completed(true)).unwrap();
        let second = store.update(&task.id, TaskUpdate::completed(false)).unwrap();
        assert!(first.updated_at > task.updated_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[test]
    fn test_update_missing_id_is_not_found_and_unchanged() {
        let store = store();
        store.create(&candidate("a")).unwrap();
        let before = store.list().unwrap();

        let err = store
            .update(&TaskId::new(), TaskUpdate::completed(true))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(store.list().unwrap(), before);
    }

    #[test]
    fn test_update_persistence_failure_leaves_task_unchanged() {
        let storage = Arc::new(FlakyStorage::default());
        let store = TaskRecordStore::with_clock(storage.clone(), FixedClock::new(start()));
        let task = store.create(&candidate("a")).unwrap();

        storage.fail_writes.store(true, Ordering::SeqCst);
        assert!(store.update(&task.id, TaskUpdate::completed(true)).is_err());
        assert_eq!(store.list().unwrap(), vec![task]);
    }

    #[test]
    fn test_delete_returns_task() {
        let store = store();
        let a = store.create(&candidate("a")).unwrap();
        let b = store.create(&candidate("b")).unwrap();

        assert_eq!(store.delete(&a.id).unwrap(), a);
        assert_eq!(store.list().unwrap(), vec![b]);
        assert_eq!(store.delete(&a.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_reorder_of_list_is_noop() {
        let store = store();
        store
            .create_many(&[candidate("a"), candidate("b"), candidate("c")])
            .unwrap();
        let before = store.list().unwrap();
        store.reorder(&before).unwrap();
        assert_eq!(store.list().unwrap(), before);
    }

    #[test]
    fn test_reorder_applies_permutation() {
        let store = store();
        let created = store
            .create_many(&[candidate("a"), candidate("b"), candidate("c")])
            .unwrap();
        let ids = [created[2].id, created[0].id, created[1].id];

        let reordered = store.reorder_ids(&ids).unwrap();
        let order: Vec<&str> = reordered.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(order, ["c", "a", "b"]);
        assert_eq!(store.list().unwrap(), reordered);
    }

    #[test]
    fn test_reorder_uses_stored_contents() {
        let store = store();
        let created = store.create_many(&[candidate("a"), candidate("b")]).unwrap();
        let mut edited = vec![created[1].clone(), created[0].clone()];
        edited[0].description = "tampered".to_string();

        let reordered = store.reorder(&edited).unwrap();
        assert_eq!(reordered[0].description, "b");
    }

    #[test]
    fn test_reorder_rejects_non_permutations() {
        let store = store();
        let created = store
            .create_many(&[candidate("a"), candidate("b"), candidate("c")])
            .unwrap();
        let before = store.list().unwrap();

        let dropped = [created[0].id, created[1].id];
        let duplicated = [created[0].id, created[0].id, created[1].id];
        let unknown = [created[0].id, created[1].id, TaskId::new()];
        for ids in [&dropped[..], &duplicated[..], &unknown[..]] {
            let err = store.reorder_ids(ids).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert_eq!(store.list().unwrap(), before);
        }
    }

    #[test]
    fn test_concurrent_creates_are_not_lost() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..10 {
                        store.create(&candidate(&format!("{i}-{j}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.list().unwrap().len(), 80);
    }

    #[test]
    fn test_separate_stores_sharing_a_file_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");
        JsonFileStorage::open(&path).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let storage = JsonFileStorage::open(path).unwrap();
                    let store = TaskRecordStore::with_clock(storage, FixedClock::new(start()));
                    (0..25)
                        .map(|j| store.create(&candidate(&format!("{i}-{j}"))).map(|t| t.id))
                        .collect::<Result<Vec<_>>>()
                })
            })
            .collect();
        let mut created = Vec::new();
        for handle in handles {
            created.extend(handle.join().unwrap().unwrap());
        }

        let stored = JsonFileStorage::open(&path).unwrap().load().unwrap();
        assert_eq!(stored.len(), 100);
        let stored_ids: HashSet<TaskId> = stored.iter().map(|t| t.id).collect();
        assert!(created.iter().all(|id| stored_ids.contains(id)));
    }
}
