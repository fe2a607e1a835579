//! PG-005: Wrapper scripts around individual PostgreSQL executables.

use super::env_assignments;
use crate::core::cmdline::shell_quote;
use std::path::Path;

/// Wrapper that runs `bin_dir/command` with a fixed environment prefix.
pub fn wrapper_script(env: &[(String, String)], bin_dir: &Path, command: &str) -> String {
    format!(
        "#!/bin/bash\n{} exec {} \"$@\"\n",
        env_assignments(env),
        shell_quote(&bin_dir.join(command).display().to_string())
    )
}

/// Wrapper taking the executable name as its first argument.
pub fn shift_script(env: &[(String, String)], bin_dir: &Path) -> String {
    let bin = shell_quote(&bin_dir.display().to_string());
    format!(
        r#"#!/bin/bash
if [[ $# -eq 0 ]]; then
  echo "Usage: $0 <command> [args ...]" >&2
  exit 1
fi
command=$1
shift
case "$command" in
  */*|.*) echo "$0: '$command' is not an executable name" >&2; exit 1 ;;
esac
{env} exec {bin}/"$command" "$@"
"#,
        env = env_assignments(env),
        bin = bin,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn env() -> Vec<(String, String)> {
        vec![
            ("PGHOST".to_string(), "/srv/pg".to_string()),
            ("PGPORT".to_string(), "5433".to_string()),
        ]
    }

    #[test]
    fn test_pg005_wrapper_script() {
        let s = wrapper_script(&env(), Path::new("/usr/lib/postgresql/16/bin"), "psql");
        assert_eq!(
            s,
            "#!/bin/bash\nPGHOST=/srv/pg PGPORT=5433 exec /usr/lib/postgresql/16/bin/psql \"$@\"\n"
        );
    }

    #[test]
    fn test_pg005_wrapper_quotes_paths() {
        let s = wrapper_script(&env(), Path::new("/opt/my pg/bin"), "psql");
        assert!(s.contains("exec '/opt/my pg/bin/psql'"));
    }

    #[test]
    fn test_pg005_shift_script_text() {
        let s = shift_script(&env(), Path::new("/opt/pg/bin"));
        assert!(s.starts_with("#!/bin/bash\n"));
        assert!(s.contains("PGHOST=/srv/pg PGPORT=5433 exec /opt/pg/bin/\"$command\" \"$@\""));
    }

    fn write_exec(path: &Path, body: &str) {
        std::fs::write(path, body).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_pg005_shift_script_runs() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        write_exec(&bin.join("createdb"), "#!/bin/bash\necho \"$PGPORT $*\"\n");
        let shift = dir.path().join("pg_client");
        write_exec(&shift, &shift_script(&env(), &bin));

        let out = std::process::Command::new("bash")
            .arg(&shift)
            .args(["createdb", "zsig"])
            .output()
            .unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "5433 zsig");

        let usage = std::process::Command::new("bash").arg(&shift).output().unwrap();
        assert_eq!(usage.status.code(), Some(1));

        let escape = std::process::Command::new("bash")
            .arg(&shift)
            .arg("../../bin/sh")
            .output()
            .unwrap();
        assert_eq!(escape.status.code(), Some(1));
    }
}
