//! PG-005: Control scripts — start, stop, status, initialize.

use super::env_assignments;
use crate::core::cmdline::{shell_join, shell_quote};
use crate::core::configure::{include_line, render_local_conf, LOCAL_CONF};
use crate::core::types::{RecipeConfig, CLUSTER_MARKER};
use std::path::Path;

fn q(path: &Path) -> String {
    shell_quote(&path.display().to_string())
}

fn prelude(cfg: &RecipeConfig, pgdata: &Path) -> String {
    let mut env = vec![("PGDATA".to_string(), pgdata.display().to_string())];
    env.extend(cfg.client_env());
    format!("#!/bin/bash\nset -euo pipefail\nexport {}\n", env_assignments(&env))
}

/// Start the server, waiting until it accepts connections.
pub fn start_script(cfg: &RecipeConfig, bin_dir: &Path, pgdata: &Path) -> String {
    format!(
        "{}mkdir -p {}\nexec {} -D {} -w -l {} start \"$@\"\n",
        prelude(cfg, pgdata),
        q(&cfg.location),
        q(&bin_dir.join("pg_ctl")),
        q(pgdata),
        q(&cfg.server_log())
    )
}

/// Stop the server (fast shutdown).
pub fn stop_script(cfg: &RecipeConfig, bin_dir: &Path, pgdata: &Path) -> String {
    format!(
        "{}exec {} -D {} -w -m fast stop \"$@\"\n",
        prelude(cfg, pgdata),
        q(&bin_dir.join("pg_ctl")),
        q(pgdata)
    )
}

/// Report whether the server runs.
pub fn status_script(cfg: &RecipeConfig, bin_dir: &Path, pgdata: &Path) -> String {
    format!(
        "{}exec {} -D {} status \"$@\"\n",
        prelude(cfg, pgdata),
        q(&bin_dir.join("pg_ctl")),
        q(pgdata)
    )
}

/// Shell rendition of the initialization sequence: initdb, local
/// configuration, then each command against a temporarily started server.
/// Does nothing if the cluster already exists.
pub fn initialize_script(cfg: &RecipeConfig, bin_dir: &Path, pgdata: &Path) -> String {
    let mut lines = vec![prelude(cfg, pgdata)];
    lines.push(format!("BIN={}", q(bin_dir)));
    lines.push(format!(
        "if [ -f \"$PGDATA/{marker}\" ]; then\n  echo \"cluster already initialized in $PGDATA\"\n  exit 0\nfi",
        marker = CLUSTER_MARKER
    ));
    lines.push(format!(
        "\"$BIN/initdb\" {}",
        shell_join(&cfg.initdb.args_or_default(pgdata))
    ));
    lines.push(format!(
        "cat > \"$PGDATA/{}\" <<'PGRECIPE_EOF'\n{}PGRECIPE_EOF",
        LOCAL_CONF,
        render_local_conf(&cfg.server_settings)
    ));
    let include = shell_quote(&include_line());
    lines.push(format!(
        "grep -qxF {inc} \"$PGDATA/postgresql.conf\" || printf '\\n%s\\n' {inc} >> \"$PGDATA/postgresql.conf\"",
        inc = include
    ));

    if !cfg.cmds.is_empty() {
        lines.push(format!("mkdir -p {}", q(&cfg.location)));
        lines.push(format!(
            "\"$BIN/pg_ctl\" -D \"$PGDATA\" -w -l {} start",
            q(&cfg.server_log())
        ));
        lines.push(
            "stop_server() { \"$BIN/pg_ctl\" -D \"$PGDATA\" -w -m fast stop; }\ntrap stop_server EXIT"
                .to_string(),
        );
        for cmd in &cfg.cmds {
            let mut argv = Vec::with_capacity(cmd.args.len());
            argv.push(format!("\"$BIN\"/{}", shell_quote(&cmd.program)));
            argv.extend(cmd.args.iter().map(|a| shell_quote(a)));
            lines.push(argv.join(" "));
        }
    }

    let mut script = lines.join("\n");
    script.push('\n');
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testutil::{calls, config_with, fake_bin, sample_config};

    #[test]
    fn test_pg005_start_script() {
        let cfg = sample_config(Path::new("/srv"));
        let s = start_script(&cfg, Path::new("/opt/pg/bin"), Path::new("/srv/pgdata"));
        assert!(s.starts_with("#!/bin/bash\nset -euo pipefail\n"));
        assert!(s.contains("export PGDATA=/srv/pgdata PGHOST=/srv/pgdata PGPORT=5432"));
        assert!(s.contains(
            "exec /opt/pg/bin/pg_ctl -D /srv/pgdata -w -l /srv/parts/postgres/postgresql.log start"
        ));
    }

    #[test]
    fn test_pg005_stop_and_status_scripts() {
        let cfg = sample_config(Path::new("/srv"));
        let stop = stop_script(&cfg, Path::new("/opt/pg/bin"), Path::new("/srv/pgdata"));
        assert!(stop.contains("-w -m fast stop"));
        let status = status_script(&cfg, Path::new("/opt/pg/bin"), Path::new("/srv/pgdata"));
        assert!(status.contains("-D /srv/pgdata status"));
    }

    #[test]
    fn test_pg005_initialize_without_cmds_skips_server() {
        let cfg = sample_config(Path::new("/srv"));
        let s = initialize_script(&cfg, Path::new("/opt/pg/bin"), Path::new("/srv/pgdata"));
        assert!(s.contains("\"$BIN/initdb\" --auth-local=trust --pgdata=/srv/pgdata"));
        assert!(s.contains("PGRECIPE_EOF"));
        assert!(!s.contains("pg_ctl"));
    }

    #[test]
    fn test_pg005_initialize_quotes_command_args() {
        let cfg = config_with(
            Path::new("/srv"),
            &[("cmds", "psql -d zsig -c 'select 1; select 2'")],
        );
        let s = initialize_script(&cfg, Path::new("/opt/pg/bin"), Path::new("/srv/pgdata"));
        assert!(s.contains("\"$BIN\"/psql -d zsig -c 'select 1; select 2'"));
    }

    #[test]
    fn test_pg005_initialize_quotes_program_name() {
        let mut cfg = config_with(Path::new("/srv"), &[("cmds", "createuser admin")]);
        cfg.cmds[0].program = "x\"||touch owned||\"".to_string();
        let s = initialize_script(&cfg, Path::new("/opt/pg/bin"), Path::new("/srv/pgdata"));
        assert!(s.contains("\"$BIN\"/'x\"||touch owned||\"' admin"));
        assert!(!s.contains("\"$BIN/x\""));
    }

    #[test]
    fn test_pg005_initialize_script_runs_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_bin(dir.path(), &[]);
        let cfg = config_with(
            dir.path(),
            &[("cmds", "createuser admin\ncreatedb --owner admin zsig")],
        );
        let pgdata = cfg.pgdata.clone().unwrap();
        let script = dir.path().join("initialize");
        std::fs::write(&script, initialize_script(&cfg, &bin, &pgdata)).unwrap();

        let out = std::process::Command::new("bash").arg(&script).output().unwrap();
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        assert!(pgdata.join(CLUSTER_MARKER).exists());
        assert!(pgdata.join(LOCAL_CONF).exists());
        assert!(!pgdata.join("postmaster.pid").exists());

        let log = calls(dir.path());
        let programs: Vec<_> = log.iter().map(|l| l.split(' ').next().unwrap()).collect();
        assert_eq!(programs, vec!["initdb", "pg_ctl", "createuser", "createdb", "pg_ctl"]);

        // Second run finds the marker and does nothing.
        let again = std::process::Command::new("bash").arg(&script).output().unwrap();
        assert!(again.status.success());
        assert_eq!(calls(dir.path()).len(), 5);
    }

    #[test]
    fn test_pg005_initialize_script_stops_at_failure() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_bin(dir.path(), &["createuser"]);
        let cfg = config_with(
            dir.path(),
            &[("cmds", "createuser admin\ncreatedb --owner admin zsig")],
        );
        let pgdata = cfg.pgdata.clone().unwrap();
        let script = dir.path().join("initialize");
        std::fs::write(&script, initialize_script(&cfg, &bin, &pgdata)).unwrap();

        let out = std::process::Command::new("bash").arg(&script).output().unwrap();
        assert!(!out.status.success());
        let log = calls(dir.path());
        assert!(log.iter().any(|l| l.starts_with("createuser")));
        assert!(!log.iter().any(|l| l.starts_with("createdb")));
        // trap stopped the server
        assert!(log.last().unwrap().ends_with("stop"));
    }
}
