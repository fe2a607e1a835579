//! PG-001: Recipe file schema, resolved configuration, and run-state types.
//!
//! The recipe file mirrors a buildout configuration: a `buildout` section
//! with global directories and a set of named parts, each a flat mapping of
//! option name to scalar value.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Recipe file (pgrecipe.yaml)
// ============================================================================

/// Root of a recipe file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeFile {
    /// Global directory settings
    #[serde(default)]
    pub buildout: BuildoutSettings,

    /// Named parts (order-preserving)
    #[serde(default)]
    pub parts: IndexMap<String, PartOptions>,
}

/// Raw options of one part, as written in the recipe file.
pub type PartOptions = IndexMap<String, serde_yaml_ng::Value>;

/// Global `buildout` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildoutSettings {
    /// Directory holding per-part working directories
    #[serde(default = "default_parts_directory")]
    pub parts_directory: String,

    /// Directory receiving generated scripts
    #[serde(default = "default_bin_directory")]
    pub bin_directory: String,
}

impl Default for BuildoutSettings {
    fn default() -> Self {
        Self {
            parts_directory: default_parts_directory(),
            bin_directory: default_bin_directory(),
        }
    }
}

fn default_parts_directory() -> String {
    "parts".to_string()
}

fn default_bin_directory() -> String {
    "bin".to_string()
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Validated configuration of one part. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeConfig {
    /// Part name
    pub name: String,

    /// Directory with PostgreSQL executables, if supplied
    pub bin: Option<PathBuf>,

    /// Whether and how to run `initdb`
    pub initdb: InitdbMode,

    /// Cluster data directory
    pub pgdata: Option<PathBuf>,

    /// Server port
    pub port: u16,

    /// Unix socket directory used by clients
    pub socket_dir: Option<PathBuf>,

    /// Where generated scripts go
    pub bin_directory: PathBuf,

    /// Per-part working directory (lock, events, server log)
    pub location: PathBuf,

    /// Post-initialization commands, in declared order
    pub cmds: Vec<PgCommand>,

    /// `postgresql.local.conf` settings, sorted by name
    pub server_settings: BTreeMap<String, String>,
}

impl RecipeConfig {
    /// Path of the server log written by `pg_ctl start`.
    pub fn server_log(&self) -> PathBuf {
        self.location.join("postgresql.log")
    }

    /// Client environment (`PGHOST`, `PGPORT`).
    pub fn client_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(ref socket) = self.socket_dir {
            env.push(("PGHOST".to_string(), socket.display().to_string()));
        }
        env.push(("PGPORT".to_string(), self.port.to_string()));
        env
    }

    /// Server environment (`PGDATA`), empty without pgdata.
    pub fn server_env(&self) -> Vec<(String, String)> {
        self.pgdata
            .iter()
            .map(|p| ("PGDATA".to_string(), p.display().to_string()))
            .collect()
    }
}

/// How `initdb` is requested.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InitdbMode {
    /// Never run `initdb`
    #[default]
    Disabled,
    /// Run `initdb` with these arguments
    Enabled(Vec<String>),
}

impl InitdbMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Arguments to pass to `initdb`; defaults apply when disabled so the
    /// generated `initialize` script still works.
    pub fn args_or_default(&self, pgdata: &Path) -> Vec<String> {
        match self {
            Self::Enabled(args) => args.clone(),
            Self::Disabled => default_initdb_args(pgdata),
        }
    }
}

/// Arguments used for `initdb: true`.
pub fn default_initdb_args(pgdata: &Path) -> Vec<String> {
    vec![
        "--auth-local=trust".to_string(),
        format!("--pgdata={}", pgdata.display()),
    ]
}

/// One post-initialization command, parsed from a `cmds` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgCommand {
    /// Executable name inside the binary directory
    pub program: String,

    /// Arguments, already unquoted
    pub args: Vec<String>,

    /// Line as written in the recipe
    pub line: String,
}

impl fmt::Display for PgCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line)
    }
}

// ============================================================================
// Generated scripts
// ============================================================================

/// Kind of generated script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    /// `start` control action
    Start,
    /// `stop` control action
    Stop,
    /// `status` control action
    Status,
    /// `initialize` control action
    Initialize,
    /// Wrapper with `PGDATA` set
    ServerWrapper,
    /// Wrapper with `PGHOST`/`PGPORT` set
    ClientWrapper,
    /// `<part>_server`: run any binary with the server environment
    ServerShift,
    /// `<part>_client`: run any binary with the client environment
    ClientShift,
}

impl ScriptKind {
    /// Whether the script cannot be produced without pgdata.
    pub fn needs_pgdata(self) -> bool {
        !matches!(self, Self::ClientWrapper | Self::ClientShift)
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Status => write!(f, "status"),
            Self::Initialize => write!(f, "initialize"),
            Self::ServerWrapper => write!(f, "server-wrapper"),
            Self::ClientWrapper => write!(f, "client-wrapper"),
            Self::ServerShift => write!(f, "server-shift"),
            Self::ClientShift => write!(f, "client-shift"),
        }
    }
}

/// A script ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedScript {
    /// File name inside the bin directory
    pub name: String,

    pub kind: ScriptKind,

    /// Full script text
    pub body: String,

    /// Absolute target path
    pub path: PathBuf,
}

// ============================================================================
// Cluster and runner state
// ============================================================================

/// Marker file written by `initdb`.
pub const CLUSTER_MARKER: &str = "PG_VERSION";

/// Pid file present while the server runs.
pub const POSTMASTER_PID: &str = "postmaster.pid";

/// On-disk state of a data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterState {
    Missing,
    Empty,
    Uninitialized,
    Initialized,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "MISSING"),
            Self::Empty => write!(f, "EMPTY"),
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::Initialized => write!(f, "INITIALIZED"),
        }
    }
}

/// Step at which initialization failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStep {
    Initdb,
    Configure,
    Server,
    Command(usize),
}

/// Initialization Runner state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    NotStarted,
    Initdb,
    RunningCommands(usize),
    Done,
    Failed(FailedStep),
}

impl InitPhase {
    fn rank(self) -> (u8, usize) {
        match self {
            Self::NotStarted => (0, 0),
            Self::Initdb => (1, 0),
            Self::RunningCommands(i) => (2, i),
            Self::Done | Self::Failed(_) => (3, 0),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: InitPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Self::Failed(_)) {
            return self != Self::NotStarted;
        }
        next.rank() > self.rank()
    }
}

impl fmt::Display for InitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NOT-STARTED"),
            Self::Initdb => write!(f, "INITDB"),
            Self::RunningCommands(i) => write!(f, "RUNNING-COMMANDS[{}]", i),
            Self::Done => write!(f, "DONE"),
            Self::Failed(FailedStep::Command(i)) => write!(f, "FAILED[{}]", i),
            Self::Failed(step) => write!(f, "FAILED({:?})", step),
        }
    }
}

// ============================================================================
// Install lock
// ============================================================================

/// Per-part install lock, stored in the part location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallLock {
    /// Schema version
    pub schema: String,

    /// Part name
    pub part: String,

    /// When the lock was generated
    pub generated_at: String,

    /// Generator version
    pub generator: String,

    /// Resolved PostgreSQL binary directory
    pub bin_dir: String,

    #[serde(default)]
    pub pgdata: Option<String>,

    pub port: u16,

    /// Generated scripts by name
    pub scripts: IndexMap<String, ScriptLock>,
}

/// Lock entry for one generated script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLock {
    pub kind: ScriptKind,
    pub path: String,
    /// BLAKE3 of the script body
    pub hash: String,
}

// ============================================================================
// Provenance events
// ============================================================================

/// Event appended to the part's JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InstallEvent {
    InstallStarted {
        part: String,
        run_id: String,
        pgrecipe_version: String,
    },
    ScriptsGenerated {
        part: String,
        count: usize,
    },
    ClusterInitialized {
        part: String,
        pgdata: String,
        commands_run: usize,
    },
    ClusterSkipped {
        part: String,
        pgdata: String,
    },
    InstallFailed {
        part: String,
        run_id: String,
        error: String,
    },
    InstallCompleted {
        part: String,
        run_id: String,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: InstallEvent,
}

// ============================================================================
// Value helper
// ============================================================================

/// Convert a scalar YAML value to its option string. Non-scalars yield `None`.
pub fn yaml_scalar_to_string(val: &serde_yaml_ng::Value) -> Option<String> {
    match val {
        serde_yaml_ng::Value::String(s) => Some(s.clone()),
        serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
        serde_yaml_ng::Value::Bool(b) => Some(b.to_string()),
        serde_yaml_ng::Value::Null => Some(String::new()),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
