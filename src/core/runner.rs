//! PG-006: Initialization Runner — initdb, local configuration, bootstrap commands.
//!
//! Strictly sequential: each step depends on the committed effect of the
//! previous one (a role must exist before a database can be owned by it).
//! The first failure is terminal; the partial cluster is left for the
//! operator to clean up.

use super::configure;
use super::error::{RecipeError, Result};
use super::types::*;
use crate::transport::{local, ExecOutput};
use std::path::{Path, PathBuf};
use std::time::Duration;

const READY_ATTEMPTS: u32 = 10;
#[cfg(not(test))]
const READY_INTERVAL: Duration = Duration::from_secs(1);
#[cfg(test)]
const READY_INTERVAL: Duration = Duration::from_millis(10);

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// `initdb` is not requested; nothing was touched
    Disabled,
    /// The cluster already existed; only changed settings were rewritten
    AlreadyInitialized { reconfigured: bool },
    /// A new cluster was created and every command ran
    Initialized { commands_run: usize },
}

/// Inspect a data directory.
pub fn cluster_state(pgdata: &Path) -> ClusterState {
    if pgdata.join(CLUSTER_MARKER).is_file() {
        return ClusterState::Initialized;
    }
    match std::fs::read_dir(pgdata) {
        Ok(mut entries) => {
            if entries.next().is_none() {
                ClusterState::Empty
            } else {
                ClusterState::Uninitialized
            }
        }
        Err(_) => ClusterState::Missing,
    }
}

/// Whether a server holds the data directory.
pub fn is_running(pgdata: &Path) -> bool {
    pgdata.join(POSTMASTER_PID).exists()
}

/// Drives one part's initialization through [`InitPhase`].
pub struct Runner<'a> {
    cfg: &'a RecipeConfig,
    bin_dir: &'a Path,
    phase: InitPhase,
}

impl<'a> Runner<'a> {
    pub fn new(cfg: &'a RecipeConfig, bin_dir: &'a Path) -> Self {
        Self {
            cfg,
            bin_dir,
            phase: InitPhase::NotStarted,
        }
    }

    pub fn phase(&self) -> InitPhase {
        self.phase
    }

    fn advance(&mut self, next: InitPhase) {
        if self.phase.can_advance_to(next) {
            tracing::debug!(part = %self.cfg.name, from = %self.phase, to = %next, "phase");
            self.phase = next;
        } else {
            tracing::warn!(part = %self.cfg.name, from = %self.phase, to = %next, "ignored backward transition");
        }
    }

    fn fail(&mut self, step: FailedStep, err: RecipeError) -> RecipeError {
        self.advance(InitPhase::Failed(step));
        err
    }

    /// Run the sequence. Safe to call repeatedly: an initialized cluster is
    /// never re-initialized.
    pub fn run(&mut self) -> Result<InitOutcome> {
        if !self.cfg.initdb.is_enabled() {
            tracing::debug!(part = %self.cfg.name, "initdb disabled");
            return Ok(InitOutcome::Disabled);
        }
        let pgdata = self.cfg.pgdata.clone().ok_or_else(|| {
            RecipeError::config(&self.cfg.name, "pgdata", "required when initdb is enabled")
        })?;

        match cluster_state(&pgdata) {
            ClusterState::Initialized => {
                tracing::info!(pgdata = %pgdata.display(), "cluster exists, skipping initialization");
                let reconfigured = configure::apply(&pgdata, &self.cfg.server_settings)?;
                self.phase = InitPhase::Done;
                return Ok(InitOutcome::AlreadyInitialized { reconfigured });
            }
            ClusterState::Uninitialized => {
                tracing::warn!(pgdata = %pgdata.display(), "data directory is not empty and has no cluster");
            }
            ClusterState::Missing | ClusterState::Empty => {}
        }

        self.advance(InitPhase::Initdb);
        self.initdb(&pgdata)
            .map_err(|e| self.fail(FailedStep::Initdb, e))?;
        configure::apply(&pgdata, &self.cfg.server_settings)
            .map_err(|e| self.fail(FailedStep::Configure, e))?;

        if self.cfg.cmds.is_empty() {
            self.advance(InitPhase::Done);
            return Ok(InitOutcome::Initialized { commands_run: 0 });
        }

        start_server(self.cfg, self.bin_dir, &pgdata)
            .map_err(|e| self.fail(FailedStep::Server, e))?;

        let result = self.run_commands();
        let stopped = stop_server(self.cfg, self.bin_dir, &pgdata);

        match (result, stopped) {
            (Ok(n), Ok(())) => {
                self.advance(InitPhase::Done);
                Ok(InitOutcome::Initialized { commands_run: n })
            }
            (Ok(_), Err(e)) => Err(self.fail(FailedStep::Server, e)),
            (Err((index, e)), stop) => {
                if let Err(stop_err) = stop {
                    tracing::warn!(error = %stop_err, "server stop after failed command also failed");
                }
                Err(self.fail(FailedStep::Command(index), e))
            }
        }
    }

    fn initdb(&self, pgdata: &Path) -> Result<()> {
        let program = self.bin_dir.join("initdb");
        let args = self.cfg.initdb.args_or_default(pgdata);
        let mut env = self.cfg.server_env();
        env.push(("PGPORT".to_string(), self.cfg.port.to_string()));

        tracing::info!(pgdata = %pgdata.display(), ?args, "running initdb");
        let out = local::run_program(&program, &args, &env).map_err(|e| RecipeError::Initdb {
            pgdata: pgdata.to_path_buf(),
            status: -1,
            stderr: format!("cannot run {}: {}", program.display(), e),
        })?;
        if !out.success() {
            return Err(RecipeError::Initdb {
                pgdata: pgdata.to_path_buf(),
                status: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    /// Run commands in order, stopping at the first failure.
    fn run_commands(&mut self) -> std::result::Result<usize, (usize, RecipeError)> {
        let cfg = self.cfg;
        let env = cfg.client_env();
        for (index, cmd) in cfg.cmds.iter().enumerate() {
            self.advance(InitPhase::RunningCommands(index));
            tracing::info!(index, command = %cmd, "running command");

            let program = self.bin_dir.join(&cmd.program);
            let out = local::run_program(&program, &cmd.args, &env).map_err(|e| {
                (
                    index,
                    command_error(index, cmd, -1, format!("cannot run {}: {}", program.display(), e)),
                )
            })?;
            if !out.success() {
                return Err((index, command_error(index, cmd, out.exit_code, out.combined())));
            }
        }
        Ok(cfg.cmds.len())
    }
}

fn command_error(index: usize, cmd: &PgCommand, status: i32, output: String) -> RecipeError {
    RecipeError::Command {
        index,
        command: cmd.line.clone(),
        status,
        output,
    }
}

fn pg_ctl(cfg: &RecipeConfig, bin_dir: &Path, pgdata: &Path, args: &[&str]) -> Result<ExecOutput> {
    let program = bin_dir.join("pg_ctl");
    let mut argv = vec!["-D".to_string(), pgdata.display().to_string()];
    argv.extend(args.iter().map(|a| a.to_string()));
    let mut env = cfg.server_env();
    env.extend(cfg.client_env());
    local::run_program(&program, &argv, &env).map_err(|e| RecipeError::Server {
        message: format!("cannot run {}: {}", program.display(), e),
    })
}

/// Start (or restart) the server and wait until it accepts connections.
pub fn start_server(cfg: &RecipeConfig, bin_dir: &Path, pgdata: &Path) -> Result<()> {
    std::fs::create_dir_all(&cfg.location).map_err(|e| RecipeError::write(&cfg.location, e))?;
    let log = cfg.server_log().display().to_string();
    let action = if is_running(pgdata) { "restart" } else { "start" };

    tracing::info!(pgdata = %pgdata.display(), action, "starting server");
    let out = pg_ctl(cfg, bin_dir, pgdata, &["-w", "-l", &log, action])?;
    let started = if out.success() {
        wait_ready(cfg, bin_dir)
    } else {
        Err(RecipeError::Server {
            message: format!("pg_ctl {} failed (exit {}): {}", action, out.exit_code, out.combined()),
        })
    };
    if started.is_err() {
        // a half-started server must not outlive the run
        if let Err(stop_err) = stop_server(cfg, bin_dir, pgdata) {
            tracing::warn!(error = %stop_err, "server stop after failed start also failed");
        }
    }
    started
}

fn wait_ready(cfg: &RecipeConfig, bin_dir: &Path) -> Result<()> {
    let isready: PathBuf = bin_dir.join("pg_isready");
    if !isready.exists() {
        return Ok(());
    }
    let env = cfg.client_env();
    for attempt in 1..=READY_ATTEMPTS {
        if let Ok(out) = local::run_program(&isready, &[], &env) {
            if out.success() {
                return Ok(());
            }
        }
        tracing::debug!(attempt, "server not ready yet");
        std::thread::sleep(READY_INTERVAL);
    }
    Err(RecipeError::Server {
        message: format!("server not ready after {} attempts", READY_ATTEMPTS),
    })
}

/// Stop the server if it runs. A no-op otherwise.
pub fn stop_server(cfg: &RecipeConfig, bin_dir: &Path, pgdata: &Path) -> Result<()> {
    if !is_running(pgdata) {
        return Ok(());
    }
    tracing::info!(pgdata = %pgdata.display(), "stopping server");
    let out = pg_ctl(cfg, bin_dir, pgdata, &["-w", "-m", "fast", "stop"])?;
    if !out.success() {
        return Err(RecipeError::Server {
            message: format!("pg_ctl stop failed (exit {}): {}", out.exit_code, out.combined()),
        });
    }
    Ok(())
}
