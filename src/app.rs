//! Application flow for clic
//!
//! Exposes the operations the command line drives (initialize the store,
//! expire old entries, get-or-run a command) and `run`, which sequences
//! them according to the resolved `Settings`. The path-based operations are
//! the library entry points; `run` goes through the same helpers once it has
//! opened the database.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{Store, StoreError};
use crate::cli::Settings;
use crate::exec::{ExecError, SystemExecutor};
use crate::runner::{Clock, Outcome, Runner, SystemClock};

/// Terminal failures reported to the user
#[derive(Debug, Error)]
pub enum AppError {
    /// A cache operation that was explicitly requested failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The external command could not run or failed
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Creates the database at `path`, or empties it if it already exists
pub fn initialize_store(path: &Path) -> Result<(), StoreError> {
    Store::initialize(path)?.close()
}

/// Removes entries stored before `cutoff` from the database at `path`
pub fn expire(path: &Path, cutoff: i64) -> Result<usize, StoreError> {
    let store = Store::open(path)?;
    let removed = expire_in(&store, cutoff)?;
    store.close()?;
    Ok(removed)
}

fn expire_in(store: &Store, cutoff: i64) -> Result<usize, StoreError> {
    let removed = store.expire(cutoff)?;
    debug!(cutoff, removed, "Expired cache entries");
    Ok(removed)
}

/// Returns the output of `argv` from the database at `path`, running it if needed.
///
/// An unavailable database degrades to running the command without caching.
pub fn get_or_run(
    path: &Path,
    argv: &[OsString],
    ttl: Duration,
    get_only: bool,
) -> Result<Outcome, ExecError> {
    let store = open_store(path);
    get_or_run_in(store.as_ref(), argv, ttl, get_only)
}

fn get_or_run_in(
    store: Option<&Store>,
    argv: &[OsString],
    ttl: Duration,
    get_only: bool,
) -> Result<Outcome, ExecError> {
    Runner::new(store, SystemExecutor, SystemClock).get_or_run(argv, ttl, get_only)
}

/// Opens the database if possible; failures are logged and yield `None`
pub fn open_store(path: &Path) -> Option<Store> {
    match Store::open(path) {
        Ok(store) => Some(store),
        Err(err) => {
            warn!("{err}");
            None
        }
    }
}

/// Cutoff timestamp for expiring entries older than `ttl` at time `now`
pub fn expiry_cutoff(now: i64, ttl: Duration) -> i64 {
    now.saturating_sub(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

/// Runs clic with the given settings.
///
/// # Returns
/// * `Ok(Some(output))` when a command result must be printed
/// * `Ok(None)` when there is nothing to print (init, clean only, get-only miss)
/// * `Err(AppError)` on a terminal failure
pub fn run(settings: &Settings) -> Result<Option<Vec<u8>>, AppError> {
    let db_path = settings.db_path.as_path();

    if settings.init {
        debug!(path = %db_path.display(), "Initializing cache database");
        initialize_store(db_path)?;
        return Ok(None);
    }

    if !settings.clean && settings.command.is_empty() {
        return Ok(None);
    }

    debug!(path = %db_path.display(), "Using cache database");
    let store = open_store(db_path);

    if settings.clean {
        let Some(store) = store.as_ref() else {
            return Err(StoreError::Unavailable {
                path: db_path.to_path_buf(),
                reason: "cannot clean without a usable database".to_string(),
            }
            .into());
        };
        debug!(ttl = ?settings.ttl, "Cleaning outdated entries");
        expire_in(store, expiry_cutoff(SystemClock.now(), settings.ttl))?;
    }

    if settings.command.is_empty() {
        return Ok(None);
    }

    let outcome = get_or_run_in(
        store.as_ref(),
        &settings.command,
        settings.ttl,
        settings.get_only,
    )?;
    Ok(outcome.into_output())
}
