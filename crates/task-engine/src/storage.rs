//! Durable storage port for the task sequence.
//!
//! The store treats storage as an opaque document: `load` returns the whole
//! ordered sequence and `save` replaces it. Each `save` must be atomic from
//! the store's point of view: either the new sequence is durable or the old
//! one still is. A store holds [`TaskStorage::lock`] across every
//! load-modify-save, so backends shared between processes must make that
//! lock exclusive across them.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tempfile::NamedTempFile;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TaskError};
use crate::task::Task;

pub trait TaskStorage: Send + Sync {
    /// Load the full task sequence in persisted order.
    fn load(&self) -> Result<Vec<Task>>;

    /// Replace the full task sequence.
    fn save(&self, tasks: &[Task]) -> Result<()>;

    /// Keep other writers out until the returned guard drops.
    ///
    /// Backends only reachable through one store need no lock of their own.
    fn lock(&self) -> Result<StorageLock> {
        Ok(StorageLock::default())
    }
}

impl<S: TaskStorage + ?Sized> TaskStorage for std::sync::Arc<S> {
    fn load(&self) -> Result<Vec<Task>> {
        (**self).load()
    }

    fn save(&self, tasks: &[Task]) -> Result<()> {
        (**self).save(tasks)
    }

    fn lock(&self) -> Result<StorageLock> {
        (**self).lock()
    }
}

/// An exclusive hold on a storage backend, released on drop.
#[derive(Debug, Default)]
pub struct StorageLock {
    _file: Option<File>,
}

// ── JSON file ───────────────────────────────────────────────────────────────

/// On-disk document shape: `{ "tasks": [ ... ] }`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskDocument {
    #[serde(default)]
    tasks: Vec<Task>,
}

/// A single pretty-printed JSON document on disk.
///
/// Each write goes to its own uniquely named temp file in the document's
/// directory, which is then renamed over the document, so a failed write
/// never leaves a truncated document behind. Writers in different processes
/// are serialized by an advisory lock on a sibling `<name>.lock` file.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    /// Open the document at `path`, creating an empty one if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let storage = Self { path: path.into() };
        if !storage.path.exists() {
            let dir = storage.dir();
            fs::create_dir_all(dir).map_err(|e| io_error("creating", dir, e))?;
            // Another process may have created it since the check above.
            let _lock = storage.lock()?;
            if !storage.path.exists() {
                storage.save(&[])?;
                debug!(path = %storage.path.display(), "initialized empty task document");
            }
        }
        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl TaskStorage for JsonFileStorage {
    fn load(&self) -> Result<Vec<Task>> {
        let content =
            fs::read_to_string(&self.path).map_err(|e| io_error("reading", &self.path, e))?;
        let document: TaskDocument = serde_json::from_str(&content).map_err(|e| {
            TaskError::Persistence(format!("reading {}: {e}", self.path.display()))
        })?;
        Ok(document.tasks)
    }

    fn save(&self, tasks: &[Task]) -> Result<()> {
        #[derive(Serialize)]
        struct DocumentRef<'a> {
            tasks: &'a [Task],
        }

        let json = serde_json::to_vec_pretty(&DocumentRef { tasks })
            .map_err(|e| TaskError::Persistence(format!("encoding tasks: {e}")))?;

        // An unpersisted temp file is removed when dropped.
        let write = || -> std::io::Result<()> {
            let mut temp = NamedTempFile::new_in(self.dir())?;
            temp.write_all(&json)?;
            temp.as_file().sync_all()?;
            temp.persist(&self.path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|e| io_error("writing", &self.path, e))
    }

    fn lock(&self) -> Result<StorageLock> {
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| io_error("opening", &lock_path, e))?;
        file.lock().map_err(|e| io_error("locking", &lock_path, e))?;
        Ok(StorageLock { _file: Some(file) })
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> TaskError {
    TaskError::Persistence(format!("{action} {}: {err}", path.display()))
}

// ── In memory ───────────────────────────────────────────────────────────────

/// Process-local storage, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tasks: RwLock<Vec<Task>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
        }
    }
}

impl TaskStorage for MemoryStorage {
    fn load(&self) -> Result<Vec<Task>> {
        self.tasks
            .read()
            .map(|tasks| tasks.clone())
            .map_err(|_| TaskError::Persistence("memory storage poisoned".to_string()))
    }

    fn save(&self, tasks: &[Task]) -> Result<()> {
        let mut stored = self
            .tasks
            .write()
            .map_err(|_| TaskError::Persistence("memory storage poisoned".to_string()))?;
        *stored = tasks.to_vec();
        Ok(())
    }
}
