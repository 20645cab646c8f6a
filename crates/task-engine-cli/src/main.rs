//! `tasks`: capture, resolve and manage natural-language tasks from the shell.
//!
//! Every command prints JSON on stdout. Failures print an error payload on
//! stderr and exit non-zero.

mod config;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use task_engine::{
    parse_single, parse_transcript, resolve_due_date_with_options, Clock, DueDate, FixedClock,
    JsonFileStorage, JsonResponseExtractor, ParsedTaskCandidate, Priority, SortKey, StatusFilter,
    SystemClock, TaskError, TaskId, TaskQuery, TaskRecordStore, TaskUpdate,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

type Store = TaskRecordStore<JsonFileStorage, Arc<dyn Clock>>;

/// Natural-language task manager
#[derive(Parser, Debug)]
#[command(name = "tasks", author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the task document (overrides config)
    #[arg(short, long, global = true)]
    data_file: Option<PathBuf>,

    /// Local UTC offset in minutes (overrides config)
    #[arg(long, global = true, allow_negative_numbers = true)]
    offset: Option<i32>,

    /// Reference instant (RFC 3339) to use instead of the system clock
    #[arg(long, global = true, value_parser = parse_instant)]
    now: Option<DateTime<Utc>>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a due-date phrase to an absolute instant
    Resolve {
        #[arg(required = true, num_args = 1..)]
        phrase: Vec<String>,
    },

    #[command(flatten)]
    Stored(StoredCommand),
}

/// Commands that read or write the task document.
#[derive(Subcommand, Debug)]
enum StoredCommand {
    /// Create a task
    Add(AddArgs),

    /// Take exactly one task from an extraction response and resolve it
    Parse {
        /// Extraction response JSON (stdin if omitted)
        input: Option<PathBuf>,

        /// Persist the task instead of only printing it
        #[arg(long)]
        accept: bool,
    },

    /// Create every task from a transcript's extraction response
    Import {
        /// Extraction response JSON (stdin if omitted)
        input: Option<PathBuf>,

        /// Print the resolved candidates without persisting them
        #[arg(long)]
        dry_run: bool,
    },

    /// List tasks
    List(ListArgs),

    /// Change fields of a task
    Update(UpdateArgs),

    /// Mark a task completed
    Complete {
        id: TaskId,

        /// Mark it pending again instead
        #[arg(long)]
        undo: bool,
    },

    /// Delete a task
    Delete { id: TaskId },

    /// Store tasks in the given order; every task id must be listed once
    Reorder { ids: Vec<TaskId> },
}

#[derive(Args, Debug)]
struct AddArgs {
    /// What needs doing
    description: String,

    #[arg(short, long)]
    assignee: String,

    /// Due date phrase ("tomorrow 2pm") or RFC 3339 instant
    #[arg(long)]
    due: String,

    #[arg(short, long)]
    priority: Option<Priority>,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long, value_enum, default_value_t = StatusArg::All)]
    status: StatusArg,

    #[arg(short, long)]
    priority: Option<Priority>,

    #[arg(short, long)]
    assignee: Option<String>,

    /// Local date the task is due on (YYYY-MM-DD)
    #[arg(long)]
    due_on: Option<NaiveDate>,

    #[arg(long, value_parser = parse_instant)]
    due_from: Option<DateTime<Utc>>,

    #[arg(long, value_parser = parse_instant)]
    due_to: Option<DateTime<Utc>>,

    /// Case-insensitive text search
    #[arg(short, long)]
    search: Option<String>,

    #[arg(long, value_enum, default_value_t = SortArg::Position)]
    sort: SortArg,

    #[arg(long)]
    desc: bool,
}

#[derive(Args, Debug)]
struct UpdateArgs {
    id: TaskId,

    #[arg(long)]
    description: Option<String>,

    #[arg(short, long)]
    assignee: Option<String>,

    /// Due date phrase or RFC 3339 instant
    #[arg(long)]
    due: Option<String>,

    #[arg(short, long)]
    priority: Option<Priority>,

    #[arg(long)]
    completed: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StatusArg {
    All,
    Pending,
    Completed,
}

impl From<StatusArg> for StatusFilter {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::All => StatusFilter::All,
            StatusArg::Pending => StatusFilter::Pending,
            StatusArg::Completed => StatusFilter::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SortArg {
    Position,
    Due,
    Priority,
    Created,
}

impl From<SortArg> for SortKey {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Position => SortKey::Position,
            SortArg::Due => SortKey::DueDate,
            SortArg::Priority => SortKey::Priority,
            SortArg::Created => SortKey::CreatedAt,
        }
    }
}

impl From<ListArgs> for TaskQuery {
    fn from(args: ListArgs) -> Self {
        TaskQuery {
            status: args.status.into(),
            priority: args.priority,
            assignee: args.assignee,
            due_on: args.due_on,
            due_from: args.due_from,
            due_to: args.due_to,
            search: args.search,
            sort: args.sort.into(),
            descending: args.desc,
        }
    }
}

impl From<UpdateArgs> for TaskUpdate {
    fn from(args: UpdateArgs) -> Self {
        TaskUpdate {
            description: args.description,
            assignee: args.assignee,
            due_date: args.due.as_deref().map(DueDate::from),
            priority: args.priority,
            is_completed: args.completed,
        }
    }
}

fn parse_instant(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 instant: {e}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

fn report(err: &anyhow::Error) {
    let payload = match err.downcast_ref::<TaskError>() {
        Some(task_err) => serde_json::to_value(task_err.payload()),
        None => Ok(json!({ "error": { "kind": "USAGE", "message": format!("{err:#}") } })),
    };
    match payload.and_then(|p| serde_json::to_string_pretty(&p)) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("{err:#}"),
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::discover(cli.config.as_deref())?;
    if let Some(data_file) = cli.data_file {
        config.storage.data_file = data_file;
    }
    if let Some(offset) = cli.offset {
        config.time.utc_offset_minutes = offset;
    }
    let options = config.resolve_options()?;

    let clock: Arc<dyn Clock> = match cli.now {
        Some(now) => Arc::new(FixedClock::new(now)),
        None => Arc::new(SystemClock),
    };
    debug!(
        data_file = %config.storage.data_file.display(),
        offset = options.offset_minutes,
        "configured"
    );

    match cli.command {
        // Resolution needs no storage; don't create a document for it.
        Command::Resolve { phrase } => {
            let resolved =
                resolve_due_date_with_options(clock.now(), &phrase.join(" "), &options)?;
            print_json(&resolved)
        }
        Command::Stored(command) => {
            let storage = JsonFileStorage::open(&config.storage.data_file)?;
            let store = TaskRecordStore::with_clock(storage, clock).with_resolve_options(options);
            run_with_store(command, &store)
        }
    }
}

fn run_with_store(command: StoredCommand, store: &Store) -> Result<()> {
    match command {
        StoredCommand::Add(args) => {
            let mut candidate =
                ParsedTaskCandidate::new(args.description, args.assignee, args.due.as_str());
            candidate.priority = args.priority;
            print_json(&store.create(&candidate)?)
        }
        StoredCommand::Parse { input, accept } => {
            let response = read_input(input.as_deref())?;
            let now = store.clock().now();
            let candidate =
                parse_single(&JsonResponseExtractor, &response, now, store.resolve_options())?;
            if accept {
                print_json(&store.create(&candidate)?)
            } else {
                print_json(&candidate)
            }
        }
        StoredCommand::Import { input, dry_run } => {
            let response = read_input(input.as_deref())?;
            let now = store.clock().now();
            let candidates =
                parse_transcript(&JsonResponseExtractor, &response, now, store.resolve_options())?;
            if dry_run {
                print_json(&candidates)
            } else {
                print_json(&store.create_many(&candidates)?)
            }
        }
        StoredCommand::List(args) => print_json(&store.query(&args.into())?),
        StoredCommand::Update(args) => {
            let id = args.id;
            let update = TaskUpdate::from(args);
            if update.is_empty() {
                return Err(TaskError::Validation("nothing to update".to_string()).into());
            }
            print_json(&store.update(&id, update)?)
        }
        StoredCommand::Complete { id, undo } => {
            print_json(&store.update(&id, TaskUpdate::completed(!undo))?)
        }
        StoredCommand::Delete { id } => print_json(&store.delete(&id)?),
        StoredCommand::Reorder { ids } => print_json(&store.reorder_ids(&ids)?),
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("reading stdin")?;
            Ok(buffer)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
