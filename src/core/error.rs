//! PG-000: Error taxonomy for the provisioning flow.
//!
//! Every failure is persistent (bad config, permissions, bad SQL), so
//! nothing here is retried. Each variant carries enough context to
//! diagnose the failure without re-running.

use std::path::PathBuf;
use thiserror::Error;

/// All errors raised while loading, generating, or provisioning a part.
#[derive(Error, Debug)]
pub enum RecipeError {
    /// Bad or missing option in a recipe part.
    #[error("invalid option '{option}' in [{section}]: {message}")]
    Configuration {
        section: String,
        option: String,
        message: String,
    },

    /// The recipe file is not valid YAML or has the wrong shape.
    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The binary directory lacks required executables.
    #[error("missing PostgreSQL executable(s) in {dir}: {}", missing.join(", "))]
    MissingBinary { dir: PathBuf, missing: Vec<String> },

    /// No `bin` was supplied and no built installation exists yet.
    #[error("no `bin` option in [{part}] and no PostgreSQL build found under {prefix}")]
    BuildRequired { part: String, prefix: PathBuf },

    /// A generated artifact could not be written.
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `initdb` exited non-zero.
    #[error("initdb failed for {pgdata} (exit {status}): {stderr}")]
    Initdb {
        pgdata: PathBuf,
        status: i32,
        stderr: String,
    },

    /// A post-initialization command exited non-zero or could not be spawned.
    #[error("command #{index} `{command}` failed (exit {status}): {output}")]
    Command {
        index: usize,
        command: String,
        status: i32,
        output: String,
    },

    /// The server could not be started or did not become ready.
    #[error("server error: {message}")]
    Server { message: String },

    /// Generated scripts differ from what the install lock recorded.
    #[error("{count} drift finding(s) in [{part}]")]
    Drift { part: String, count: usize },

    /// Other filesystem failure, with context.
    #[error("{message}: {source}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl RecipeError {
    /// Configuration error for `option` in `section`.
    pub fn config(
        section: impl Into<String>,
        option: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            section: section.into(),
            option: option.into(),
            message: message.into(),
        }
    }

    /// I/O error with context.
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Write error for `path`.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using [`RecipeError`].
pub type Result<T> = std::result::Result<T, RecipeError>;
