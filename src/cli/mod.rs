//! PG-012: CLI subcommands — init, validate, generate, install, status, uninstall.

use crate::core::error::{RecipeError, Result};
use crate::core::installer;
use crate::core::locator::BinaryLocation;
use crate::core::runner::InitOutcome;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "pgrecipe",
    version,
    about = "Provision a local PostgreSQL cluster from a recipe file"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter pgrecipe.yaml
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Load and validate every part
    Validate {
        /// Path to pgrecipe.yaml
        #[arg(short, long, default_value = "pgrecipe.yaml")]
        file: PathBuf,
    },

    /// Locate binaries and write scripts, without initializing
    Generate {
        /// Path to pgrecipe.yaml
        #[arg(short, long, default_value = "pgrecipe.yaml")]
        file: PathBuf,

        /// Target a single part
        #[arg(short, long)]
        part: Option<String>,
    },

    /// Write scripts and initialize the cluster
    Install {
        /// Path to pgrecipe.yaml
        #[arg(short, long, default_value = "pgrecipe.yaml")]
        file: PathBuf,

        /// Target a single part
        #[arg(short, long)]
        part: Option<String>,

        /// Show what would be done without doing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show cluster state, install lock and script drift
    Status {
        /// Path to pgrecipe.yaml
        #[arg(short, long, default_value = "pgrecipe.yaml")]
        file: PathBuf,

        /// Target a single part
        #[arg(short, long)]
        part: Option<String>,

        /// Exit non-zero if any generated script drifted (for CI/cron)
        #[arg(long)]
        tripwire: bool,
    },

    /// Stop the server and remove generated scripts (data is kept)
    Uninstall {
        /// Path to pgrecipe.yaml
        #[arg(short, long, default_value = "pgrecipe.yaml")]
        file: PathBuf,

        /// Target a single part
        #[arg(short, long)]
        part: Option<String>,
    },

    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Generate { file, part } => cmd_generate(&file, part.as_deref()),
        Commands::Install {
            file,
            part,
            dry_run,
        } => cmd_install(&file, part.as_deref(), dry_run),
        Commands::Status {
            file,
            part,
            tripwire,
        } => cmd_status(&file, part.as_deref(), tripwire),
        Commands::Uninstall { file, part } => cmd_uninstall(&file, part.as_deref()),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "pgrecipe", &mut std::io::stdout());
            Ok(())
        }
    }
}

const TEMPLATE: &str = r#"# pgrecipe recipe file
buildout:
  parts-directory: parts
  bin-directory: bin

parts:
  postgres:
    # Directory with initdb and pg_ctl. Omit to use parts/postgres/bin,
    # populated by your own PostgreSQL build.
    bin: /usr/lib/postgresql/16/bin
    pgdata: var/pgdata
    port: 5432
    initdb: true
    # One command per line, run once after initdb with PGHOST/PGPORT set.
    cmds: |
      createuser admin
      createdb --owner admin app
    # Extra postgresql.conf settings, written to postgresql.local.conf.
    config.shared_buffers: 128MB
"#;

fn cmd_init(path: &Path) -> Result<()> {
    let recipe_path = path.join("pgrecipe.yaml");
    if recipe_path.exists() {
        return Err(RecipeError::config(
            "init",
            "path",
            format!("{} already exists", recipe_path.display()),
        ));
    }
    std::fs::create_dir_all(path).map_err(|e| RecipeError::write(path, e))?;
    std::fs::write(&recipe_path, TEMPLATE).map_err(|e| RecipeError::write(&recipe_path, e))?;

    println!("Initialized pgrecipe at {}", path.display());
    println!("  Created: {}", recipe_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<()> {
    let parts = installer::load(file, None)?;
    for cfg in &parts {
        let initdb = if cfg.initdb.is_enabled() { "initdb" } else { "no initdb" };
        println!(
            "  {}: port {}, {}, {} command(s)",
            cfg.name,
            cfg.port,
            initdb,
            cfg.cmds.len()
        );
    }
    println!("OK: {} ({} part(s))", file.display(), parts.len());
    Ok(())
}

fn cmd_generate(file: &Path, part: Option<&str>) -> Result<()> {
    for cfg in installer::load(file, part)? {
        let (bin_dir, scripts) = installer::generate(&cfg)?;
        println!("{}: {} script(s) using {}", cfg.name, scripts.len(), bin_dir.display());
        for path in &scripts {
            println!("  + {}", path.display());
        }
    }
    Ok(())
}

fn cmd_install(file: &Path, part: Option<&str>, dry_run: bool) -> Result<()> {
    let parts = installer::load(file, part)?;
    if dry_run {
        for cfg in &parts {
            print_dry_run(&cfg.name, &installer::dry_run(cfg)?);
        }
        println!("Dry run: nothing changed.");
        return Ok(());
    }

    for cfg in &parts {
        let report = installer::install(cfg)?;
        let cluster = match report.outcome {
            InitOutcome::Disabled => "initdb disabled".to_string(),
            InitOutcome::AlreadyInitialized { reconfigured: true } => {
                "cluster exists, settings updated".to_string()
            }
            InitOutcome::AlreadyInitialized { reconfigured: false } => "cluster exists".to_string(),
            InitOutcome::Initialized { commands_run } => {
                format!("cluster initialized, {} command(s) run", commands_run)
            }
        };
        println!(
            "{}: {} script(s), {} ({:.1}s)",
            report.part,
            report.scripts.len(),
            cluster,
            report.duration_seconds
        );
    }
    Ok(())
}

fn print_dry_run(name: &str, plan: &installer::DryRunPlan) {
    match plan.location {
        BinaryLocation::Supplied(ref dir) => println!("{}: binaries in {}", name, dir.display()),
        BinaryLocation::BuildRequired { ref prefix } => {
            println!("{}: binaries expected under {}/bin", name, prefix.display())
        }
    }
    for path in &plan.scripts {
        println!("  write {}", path.display());
    }
    for step in &plan.steps {
        println!("  run   {}", step);
    }
}

fn cmd_status(file: &Path, part: Option<&str>, tripwire: bool) -> Result<()> {
    let mut drifted = Vec::new();
    for cfg in installer::load(file, part)? {
        let st = installer::status(&cfg)?;
        println!("Part: {}", st.part);
        match (st.cluster, cfg.pgdata.as_ref()) {
            (Some(state), Some(pgdata)) => {
                let running = if st.running { ", running" } else { "" };
                println!("  Cluster: {} ({}{})", state, pgdata.display(), running);
            }
            _ => println!("  Cluster: none (no pgdata)"),
        }
        match st.lock {
            Some(ref lock) => {
                println!("  Generated: {}", lock.generated_at);
                println!("  Generator: {}", lock.generator);
                println!("  Binaries: {}", lock.bin_dir);
                println!("  Scripts: {}", lock.scripts.len());
            }
            None => println!("  Not installed."),
        }
        for f in &st.drift {
            println!("  DRIFTED: {} ({})", f.script, f.detail);
            println!("    Expected: {}", f.expected_hash);
            println!("    Actual:   {}", f.actual_hash);
        }
        if !st.drift.is_empty() {
            drifted.push((st.part.clone(), st.drift.len()));
        }
    }

    match drifted.first() {
        Some((part, count)) if tripwire => Err(RecipeError::Drift {
            part: part.clone(),
            count: *count,
        }),
        _ => Ok(()),
    }
}

fn cmd_uninstall(file: &Path, part: Option<&str>) -> Result<()> {
    for cfg in installer::load(file, part)? {
        let report = installer::uninstall(&cfg)?;
        if report.stopped {
            println!("{}: server stopped", cfg.name);
        }
        println!("{}: {} script(s) removed", cfg.name, report.removed.len());
    }
    Ok(())
}
