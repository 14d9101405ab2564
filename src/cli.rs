//! Command-line interface parsing for clic
//!
//! This module handles parsing of CLI arguments using clap, reading the
//! `CLIC_*` environment variables and the optional config file, and merging
//! them into the `Settings` the application runs with.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use directories::ProjectDirs;
use thiserror::Error;

use crate::config::{ConfigError, FileConfig};

/// TTL used when neither flags, environment nor config file set one
pub const DEFAULT_TTL: Duration = Duration::from_secs(120);

/// File name of the cache database
const DB_FILE_NAME: &str = "clic.sqlite3";

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The TTL could not be parsed as a duration
    #[error("Invalid TTL: '{0}'. Use seconds or a duration such as 90s, 2m, 1.5h or 1h30m")]
    InvalidTtl(String),

    /// The config file could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// clic - cache the output of commands
#[derive(Parser, Debug)]
#[command(name = "clic")]
#[command(about = "A CLI tool that adds a cache to commands output")]
#[command(version)]
pub struct Cli {
    /// Path of the cache database
    #[arg(long, env = "CLIC_DB", value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// How long a cached result stays valid [default: 120s]
    #[arg(long, env = "CLIC_TTL", value_name = "DURATION", value_parser = parse_ttl)]
    pub ttl: Option<Duration>,

    /// Log verbose information
    #[arg(short, long, env = "CLIC_VERBOSE", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub verbose: bool,

    /// Create the database, or empty an existing one, then exit
    #[arg(long, env = "CLIC_INIT", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub init: bool,

    /// Only print a cached result, never run the command
    #[arg(long = "get", env = "CLIC_GET", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub get_only: bool,

    /// Remove entries older than the TTL
    #[arg(long, env = "CLIC_CLEAN", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub clean: bool,

    /// Config file (TOML) with defaults for db, ttl and verbose
    #[arg(long, env = "CLIC_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Command to run, followed by its arguments
    #[arg(trailing_var_arg = true, value_name = "COMMAND")]
    pub command: Vec<OsString>,
}

/// Settings the application runs with, after merging all configuration sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Path of the cache database
    pub db_path: PathBuf,
    /// Maximum age of a cached result
    pub ttl: Duration,
    /// Whether to log verbose information
    pub verbose: bool,
    /// Initialize the database and exit
    pub init: bool,
    /// Never run the command, only look up the cache
    pub get_only: bool,
    /// Expire entries older than the TTL
    pub clean: bool,
    /// Command and arguments, program first
    pub command: Vec<OsString>,
}

/// Parses a TTL such as `90`, `45s`, `2m`, `1.5h` or `1h30m`.
///
/// A bare integer is a count of seconds. Otherwise the value is a sequence of
/// `<number><unit>` groups, where the number may carry a decimal fraction and
/// the unit is one of `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h` and `d`. The
/// total is rounded to the nearest whole second, halves rounding up.
///
/// # Returns
/// * `Ok(Duration)` for a well-formed value
/// * `Err(CliError::InvalidTtl)` if the value is empty, uses an unknown unit or overflows
pub fn parse_ttl(s: &str) -> Result<Duration, CliError> {
    let s = s.trim();
    let invalid = || CliError::InvalidTtl(s.to_string());

    if s.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let (number, tail) = rest.split_at(rest.find(|c: char| !is_number(c)).unwrap_or(rest.len()));
        let (unit, tail) = tail.split_at(tail.find(is_number).unwrap_or(tail.len()));
        // a missing unit (e.g. "1m30") is rejected here as well
        let scale = unit_nanos(unit).ok_or_else(invalid)?;
        let nanos = scaled_nanos(number, scale).ok_or_else(invalid)?;
        total = total.checked_add(nanos).ok_or_else(invalid)?;
        rest = tail;
    }

    let secs = (total + NANOS_PER_SEC / 2) / NANOS_PER_SEC;
    u64::try_from(secs)
        .map(Duration::from_secs)
        .map_err(|_| invalid())
}

fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 3_600 * NANOS_PER_SEC,
        "d" => 86_400 * NANOS_PER_SEC,
        _ => return None,
    };
    Some(nanos)
}

/// `number` (digits with an optional `.fraction`) times `scale` nanoseconds
fn scaled_nanos(number: &str, scale: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(scale)?;
    let mut divisor: u128 = 1;
    for digit in fraction.bytes() {
        divisor *= 10;
        if divisor > scale {
            break;
        }
        nanos = nanos.checked_add(u128::from(digit - b'0') * scale / divisor)?;
    }
    Some(nanos)
}

/// Default database location: the user's cache directory, or the working directory
pub fn default_db_path() -> PathBuf {
    ProjectDirs::from("", "", "clic")
        .map(|dirs| dirs.cache_dir().join(DB_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DB_FILE_NAME))
}

impl Settings {
    /// Creates Settings from parsed CLI arguments, loading the config file if one is named.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    /// Merges CLI arguments (which already include environment variables) over `file`.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, CliError> {
        let ttl = match (cli.ttl, file.ttl.as_deref()) {
            (Some(ttl), _) => ttl,
            (None, Some(raw)) => parse_ttl(raw)?,
            (None, None) => DEFAULT_TTL,
        };

        Ok(Settings {
            db_path: cli.db.clone().or(file.db).unwrap_or_else(default_db_path),
            ttl,
            verbose: cli.verbose || file.verbose.unwrap_or(false),
            init: cli.init,
            get_only: cli.get_only,
            clean: cli.clean,
            command: cli.command.clone(),
        })
    }
}
