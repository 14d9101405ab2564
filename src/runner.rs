//! Get-or-run orchestration
//!
//! Decides whether a command's cached output can be served or whether the
//! command has to run again. Cache problems never stop the command from
//! running: a failed lookup is a miss and a failed write is only logged.

use std::ffi::OsString;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStore, StoreError};
use crate::exec::{CommandExecutor, ExecError};

/// Source of the current time in seconds since the Unix epoch
pub trait Clock {
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Result of a get-or-run request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Served from the cache without running the command
    Cached { output: Vec<u8>, timestamp: i64 },
    /// The command ran; `refreshed` is set when it replaced a stale entry
    Executed { output: Vec<u8>, refreshed: bool },
    /// Get-only request and nothing fresh was cached
    Missed,
}

impl Outcome {
    /// The payload to emit, if any
    pub fn output(&self) -> Option<&[u8]> {
        match self {
            Outcome::Cached { output, .. } | Outcome::Executed { output, .. } => {
                Some(output.as_slice())
            }
            Outcome::Missed => None,
        }
    }

    pub fn into_output(self) -> Option<Vec<u8>> {
        match self {
            Outcome::Cached { output, .. } | Outcome::Executed { output, .. } => Some(output),
            Outcome::Missed => None,
        }
    }
}

/// What the cache holds for one key
enum Lookup {
    Fresh(CacheEntry),
    Stale,
    Miss,
}

/// Serves command output from the cache or runs the command
///
/// The store is optional: without one every request runs the command and
/// nothing is written.
pub struct Runner<'s, S, E, C> {
    store: Option<&'s S>,
    executor: E,
    clock: C,
}

impl<'s, S: CacheStore, E: CommandExecutor, C: Clock> Runner<'s, S, E, C> {
    pub fn new(store: Option<&'s S>, executor: E, clock: C) -> Self {
        Self {
            store,
            executor,
            clock,
        }
    }

    /// Returns the output of `argv`, from the cache when an entry is at most `ttl` old.
    ///
    /// With `get_only`, a miss returns [`Outcome::Missed`] and nothing is executed.
    /// Only execution failures are returned as errors.
    pub fn get_or_run(
        &self,
        argv: &[OsString],
        ttl: Duration,
        get_only: bool,
    ) -> Result<Outcome, ExecError> {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
        let key = CacheKey::from_argv(argv);

        let refreshed = match self.lookup(&key, ttl) {
            Lookup::Fresh(entry) => {
                return Ok(Outcome::Cached {
                    output: entry.value,
                    timestamp: entry.timestamp,
                });
            }
            Lookup::Stale => true,
            Lookup::Miss => false,
        };

        if get_only {
            return Ok(Outcome::Missed);
        }

        debug!(program = %program.to_string_lossy(), "Running external command");
        let output = self.executor.execute(program, args)?;

        if let Some(store) = self.store {
            debug!("Storing result in cache");
            if let Err(err) = store.set_at(&key, &output, self.clock.now()) {
                warn!(error = %err, "Cannot update cache");
            }
        }

        Ok(Outcome::Executed { output, refreshed })
    }

    fn lookup(&self, key: &CacheKey, ttl: Duration) -> Lookup {
        let Some(store) = self.store else {
            debug!("No cache database, running command directly");
            return Lookup::Miss;
        };

        match store.get(key) {
            Ok(entry) => {
                let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
                if entry.age(self.clock.now()) <= ttl_secs {
                    debug!(timestamp = entry.timestamp, "Using cached result");
                    Lookup::Fresh(entry)
                } else {
                    debug!(timestamp = entry.timestamp, "Found expired result in cache");
                    Lookup::Stale
                }
            }
            Err(StoreError::NotFound) => {
                debug!("No cached result");
                Lookup::Miss
            }
            Err(err) => {
                warn!(error = %err, "Cache lookup failed, running command");
                Lookup::Miss
            }
        }
    }
}
