//! PG-011: Installer — orchestration of one part.
//!
//! load → locate → generate → write → lock → initialize → events

use super::codegen;
use super::error::{RecipeError, Result};
use super::locator::{self, BinaryLocation};
use super::parser;
use super::runner::{self, InitOutcome, Runner};
use super::state;
use super::types::*;
use crate::tripwire::drift::{self, DriftFinding};
use crate::tripwire::eventlog;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Load the parts of a recipe file, optionally only one.
pub fn load(path: &Path, part: Option<&str>) -> Result<Vec<RecipeConfig>> {
    let file = parser::parse_recipe_file(path)?;
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let base_dir = std::fs::canonicalize(base_dir)
        .map_err(|e| RecipeError::io(format!("cannot resolve {}", base_dir.display()), e))?;

    let parts = parser::load_parts(&file, &base_dir)?;
    match part {
        None => Ok(parts),
        Some(name) => {
            let found: Vec<_> = parts.into_iter().filter(|p| p.name == name).collect();
            if found.is_empty() {
                return Err(RecipeError::config("parts", name, "no such part"));
            }
            Ok(found)
        }
    }
}

/// Result of an install run.
#[derive(Debug)]
pub struct InstallReport {
    pub part: String,
    pub bin_dir: PathBuf,
    pub scripts: Vec<PathBuf>,
    pub outcome: InitOutcome,
    pub duration_seconds: f64,
}

/// Locate binaries, write scripts and the install lock. No process is run.
pub fn generate(cfg: &RecipeConfig) -> Result<(PathBuf, Vec<PathBuf>)> {
    let bin_dir = locator::resolve(cfg)?;
    let scripts = codegen::generate_scripts(cfg, &bin_dir)?;
    let written = codegen::write_scripts(&scripts)?;
    state::save_lock(&cfg.location, &state::new_lock(cfg, &bin_dir, &scripts))?;
    tracing::info!(part = %cfg.name, count = written.len(), dir = %cfg.bin_directory.display(), "scripts generated");
    Ok((bin_dir, written))
}

/// Full provisioning of one part.
pub fn install(cfg: &RecipeConfig) -> Result<InstallReport> {
    let start = Instant::now();
    let run_id = eventlog::generate_run_id();
    record(
        cfg,
        InstallEvent::InstallStarted {
            part: cfg.name.clone(),
            run_id: run_id.clone(),
            pgrecipe_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    );

    match install_inner(cfg) {
        Ok((bin_dir, scripts, outcome)) => {
            let duration_seconds = start.elapsed().as_secs_f64();
            record(
                cfg,
                InstallEvent::InstallCompleted {
                    part: cfg.name.clone(),
                    run_id,
                    total_seconds: duration_seconds,
                },
            );
            Ok(InstallReport {
                part: cfg.name.clone(),
                bin_dir,
                scripts,
                outcome,
                duration_seconds,
            })
        }
        Err(e) => {
            record(
                cfg,
                InstallEvent::InstallFailed {
                    part: cfg.name.clone(),
                    run_id,
                    error: e.to_string(),
                },
            );
            Err(e)
        }
    }
}

fn install_inner(cfg: &RecipeConfig) -> Result<(PathBuf, Vec<PathBuf>, InitOutcome)> {
    let (bin_dir, scripts) = generate(cfg)?;
    record(
        cfg,
        InstallEvent::ScriptsGenerated {
            part: cfg.name.clone(),
            count: scripts.len(),
        },
    );

    let outcome = Runner::new(cfg, &bin_dir).run()?;
    let pgdata = cfg
        .pgdata
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    match outcome {
        InitOutcome::Initialized { commands_run } => record(
            cfg,
            InstallEvent::ClusterInitialized {
                part: cfg.name.clone(),
                pgdata,
                commands_run,
            },
        ),
        InitOutcome::AlreadyInitialized { .. } => record(
            cfg,
            InstallEvent::ClusterSkipped {
                part: cfg.name.clone(),
                pgdata,
            },
        ),
        InitOutcome::Disabled => {}
    }
    Ok((bin_dir, scripts, outcome))
}

fn record(cfg: &RecipeConfig, event: InstallEvent) {
    if let Err(e) = eventlog::append_event(&cfg.location, event) {
        tracing::warn!(part = %cfg.name, error = %e, "cannot record event");
    }
}

/// What an install would do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunPlan {
    pub location: BinaryLocation,
    pub scripts: Vec<PathBuf>,
    pub steps: Vec<String>,
}

/// Describe an install without touching the filesystem or running anything.
pub fn dry_run(cfg: &RecipeConfig) -> Result<DryRunPlan> {
    let location = locator::locate(cfg)?;
    let bin_dir = match location {
        BinaryLocation::Supplied(ref dir) => dir.clone(),
        BinaryLocation::BuildRequired { ref prefix } => prefix.join("bin"),
    };
    let scripts = codegen::generate_scripts(cfg, &bin_dir)?
        .into_iter()
        .map(|s| s.path)
        .collect();
    Ok(DryRunPlan {
        location,
        scripts,
        steps: planned_steps(cfg),
    })
}

fn planned_steps(cfg: &RecipeConfig) -> Vec<String> {
    let pgdata = match (&cfg.initdb, &cfg.pgdata) {
        (InitdbMode::Enabled(_), Some(p)) => p,
        _ => return vec!["initdb disabled: no cluster steps".to_string()],
    };
    if runner::cluster_state(pgdata) == ClusterState::Initialized {
        return vec![format!("cluster at {} exists: skip initialization", pgdata.display())];
    }

    let mut steps = vec![
        format!("initdb {}", cfg.initdb.args_or_default(pgdata).join(" ")),
        format!("write {}", pgdata.join(super::configure::LOCAL_CONF).display()),
    ];
    if !cfg.cmds.is_empty() {
        steps.push("pg_ctl start".to_string());
        steps.extend(cfg.cmds.iter().map(|c| c.line.clone()));
        steps.push("pg_ctl stop".to_string());
    }
    steps
}

/// Observed state of one part.
#[derive(Debug)]
pub struct PartStatus {
    pub part: String,
    pub cluster: Option<ClusterState>,
    pub running: bool,
    pub lock: Option<InstallLock>,
    pub drift: Vec<DriftFinding>,
}

pub fn status(cfg: &RecipeConfig) -> Result<PartStatus> {
    let lock = state::load_lock(&cfg.location)?;
    let drift = lock.as_ref().map(drift::detect_drift).unwrap_or_default();
    Ok(PartStatus {
        part: cfg.name.clone(),
        cluster: cfg.pgdata.as_deref().map(runner::cluster_state),
        running: cfg.pgdata.as_deref().is_some_and(runner::is_running),
        lock,
        drift,
    })
}

/// What uninstall removed.
#[derive(Debug, Default)]
pub struct UninstallReport {
    pub stopped: bool,
    pub removed: Vec<PathBuf>,
}

/// Stop a running server and remove the scripts recorded in the lock.
/// The data directory is never removed.
pub fn uninstall(cfg: &RecipeConfig) -> Result<UninstallReport> {
    let mut report = UninstallReport::default();
    let lock = state::load_lock(&cfg.location)?;

    if let Some(pgdata) = cfg.pgdata.as_deref().filter(|p| runner::is_running(p)) {
        let bin_dir = match lock {
            Some(ref l) => PathBuf::from(&l.bin_dir),
            None => locator::resolve(cfg)?,
        };
        runner::stop_server(cfg, &bin_dir, pgdata)?;
        report.stopped = true;
    }

    let Some(lock) = lock else {
        tracing::info!(part = %cfg.name, "no install lock, nothing to remove");
        return Ok(report);
    };
    for script in lock.scripts.values() {
        let path = PathBuf::from(&script.path);
        match std::fs::remove_file(&path) {
            Ok(()) => report.removed.push(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RecipeError::write(&path, e)),
        }
    }
    state::remove_lock(&cfg.location)?;
    tracing::info!(part = %cfg.name, removed = report.removed.len(), "uninstalled");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testutil::{calls, config_with, fake_bin};

    fn recipe(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("pgrecipe.yaml");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn with_bin(root: &Path, extra: &[(&str, &str)]) -> RecipeConfig {
        let bin = fake_bin(root, &[]);
        let bin = bin.display().to_string();
        let mut opts = vec![("bin", bin.as_str())];
        opts.extend_from_slice(extra);
        config_with(root, &opts)
    }

    #[test]
    fn test_pg011_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = recipe(
            dir.path(),
            "parts:\n  postgres:\n    pgdata: var/pg\n    initdb: true\n  replica:\n    port: 5433\n    bin-directory: bin-replica\n",
        );
        let parts = load(&path, None).unwrap();
        assert_eq!(parts.len(), 2);
        let root = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(parts[0].pgdata, Some(root.join("var/pg")));
        assert_eq!(parts[1].name, "replica");

        let only = load(&path, Some("replica")).unwrap();
        assert_eq!(only.len(), 1);
        match load(&path, Some("nope")).unwrap_err() {
            RecipeError::Configuration {
                ref section,
                ref option,
                ..
            } => {
                assert_eq!(section, "parts");
                assert_eq!(option, "nope");
            }
            ref other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_pg011_invalid_port_before_any_filesystem_action() {
        let dir = tempfile::tempdir().unwrap();
        let path = recipe(
            dir.path(),
            "parts:\n  postgres:\n    pgdata: pgdata\n    initdb: true\n    port: 70000\n",
        );
        let err = load(&path, None).unwrap_err();
        assert!(matches!(err, RecipeError::Configuration { ref option, .. } if option == "port"));
        assert!(!dir.path().join("parts").exists());
        assert!(!dir.path().join("bin").exists());
        assert!(!dir.path().join("pgdata").exists());
    }

    #[test]
    fn test_pg011_parts_in_one_bin_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = recipe(
            dir.path(),
            "parts:\n  a:\n    pgdata: a\n    port: 5501\n  b:\n    pgdata: b\n    port: 5502\n",
        );
        let err = load(&path, Some("a")).unwrap_err();
        assert!(
            matches!(err, RecipeError::Configuration { ref option, .. } if option == "bin-directory")
        );
        assert!(!dir.path().join("bin").exists());
    }

    #[test]
    fn test_pg011_two_parts_keep_their_own_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_bin(dir.path(), &[]);
        let path = recipe(
            dir.path(),
            &format!(
                "buildout:\n  bin-directory: scripts\nparts:\n  a:\n    bin: {bin}\n    pgdata: a\n    port: 5501\n  b:\n    bin: {bin}\n    pgdata: b\n    port: 5502\n    bin-directory: scripts-b\n",
                bin = bin.display()
            ),
        );
        let parts = load(&path, None).unwrap();
        generate(&parts[0]).unwrap();
        generate(&parts[1]).unwrap();

        assert!(status(&parts[0]).unwrap().drift.is_empty());
        let start_a = std::fs::read_to_string(parts[0].bin_directory.join("start")).unwrap();
        assert!(start_a.contains("PGPORT=5501"));

        uninstall(&parts[1]).unwrap();
        assert!(parts[0].bin_directory.join("psql").exists());
        assert!(status(&parts[0]).unwrap().drift.is_empty());
    }

    #[test]
    fn test_pg011_missing_binary_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_bin(dir.path(), &[]);
        std::fs::remove_file(bin.join("pg_ctl")).unwrap();
        let bin = bin.display().to_string();
        let cfg = config_with(dir.path(), &[("bin", bin.as_str())]);

        let err = install(&cfg).unwrap_err();
        match err {
            RecipeError::MissingBinary { ref missing, .. } => assert_eq!(missing, &vec!["pg_ctl"]),
            ref other => panic!("unexpected error: {}", other),
        }
        assert!(!cfg.bin_directory.exists());
        assert!(calls(dir.path()).is_empty());
    }

    #[test]
    fn test_pg011_build_required_without_bin() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_with(dir.path(), &[]);
        let err = generate(&cfg).unwrap_err();
        assert!(matches!(err, RecipeError::BuildRequired { .. }));
    }

    #[test]
    fn test_pg011_install_full_flow() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = with_bin(dir.path(), &[("cmds", "createuser admin")]);
        let report = install(&cfg).unwrap();
        assert_eq!(report.outcome, InitOutcome::Initialized { commands_run: 1 });
        assert_eq!(report.scripts.len(), 10);
        assert!(cfg.bin_directory.join("psql").exists());
        assert!(state::load_lock(&cfg.location).unwrap().is_some());

        let events: Vec<_> = eventlog::read_events(&cfg.location)
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert!(matches!(events[0], InstallEvent::InstallStarted { .. }));
        assert!(matches!(events[1], InstallEvent::ScriptsGenerated { count: 10, .. }));
        assert!(matches!(events[2], InstallEvent::ClusterInitialized { commands_run: 1, .. }));
        assert!(matches!(events[3], InstallEvent::InstallCompleted { .. }));
    }

    #[test]
    fn test_pg011_second_install_skips_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = with_bin(dir.path(), &[("cmds", "createuser admin")]);
        install(&cfg).unwrap();
        let before = calls(dir.path());

        let report = install(&cfg).unwrap();
        assert_eq!(report.outcome, InitOutcome::AlreadyInitialized { reconfigured: false });
        assert_eq!(calls(dir.path()), before);
        let last = eventlog::read_events(&cfg.location).unwrap();
        assert!(last
            .iter()
            .any(|e| matches!(e.event, InstallEvent::ClusterSkipped { .. })));
    }

    #[test]
    fn test_pg011_failed_install_logs_event() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_bin(dir.path(), &["createuser"]);
        let bin = bin.display().to_string();
        let cfg = config_with(dir.path(), &[("bin", bin.as_str()), ("cmds", "createuser admin")]);
        assert!(install(&cfg).is_err());
        let events = eventlog::read_events(&cfg.location).unwrap();
        match &events.last().unwrap().event {
            InstallEvent::InstallFailed { error, .. } => assert!(error.contains("command #0")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_pg011_dry_run_has_no_effect() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_with(
            dir.path(),
            &[("cmds", "createuser admin\ncreatedb --owner admin zsig")],
        );
        let plan = dry_run(&cfg).unwrap();
        assert!(matches!(plan.location, BinaryLocation::BuildRequired { .. }));
        assert_eq!(plan.scripts.len(), 10);
        assert!(plan.steps[0].starts_with("initdb --auth-local=trust"));
        assert_eq!(plan.steps[3], "createuser admin");
        assert_eq!(plan.steps.last().unwrap(), "pg_ctl stop");
        assert!(!cfg.bin_directory.exists());
        assert!(!cfg.location.exists());
    }

    #[test]
    fn test_pg011_status_reports_drift() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = with_bin(dir.path(), &[]);
        install(&cfg).unwrap();

        let st = status(&cfg).unwrap();
        assert_eq!(st.cluster, Some(ClusterState::Initialized));
        assert!(!st.running);
        assert!(st.drift.is_empty());

        std::fs::write(cfg.bin_directory.join("start"), "#!/bin/bash\n").unwrap();
        let st = status(&cfg).unwrap();
        assert_eq!(st.drift.len(), 1);
        assert_eq!(st.drift[0].script, "start");
    }

    #[test]
    fn test_pg011_uninstall_removes_scripts_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = with_bin(dir.path(), &[]);
        install(&cfg).unwrap();
        let pgdata = cfg.pgdata.clone().unwrap();
        std::fs::write(pgdata.join(POSTMASTER_PID), "1").unwrap();

        let report = uninstall(&cfg).unwrap();
        assert!(report.stopped);
        assert_eq!(report.removed.len(), 10);
        assert!(!runner::is_running(&pgdata));
        assert!(!cfg.bin_directory.join("psql").exists());
        assert!(!state::lock_file_path(&cfg.location).exists());
        assert!(pgdata.join(CLUSTER_MARKER).exists());

        let again = uninstall(&cfg).unwrap();
        assert!(!again.stopped);
        assert!(again.removed.is_empty());
    }
}
