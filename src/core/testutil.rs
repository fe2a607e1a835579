//! Test fixtures: stub PostgreSQL binaries that log their invocations.

use super::parser::{load_part, LoadContext};
use super::types::{BuildoutSettings, RecipeConfig};
use indexmap::IndexMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const STUBS: &[&str] = &[
    "initdb",
    "pg_ctl",
    "postgres",
    "pg_isready",
    "psql",
    "createuser",
    "createdb",
    "createlang",
];

/// Log file the stubs in `parent/bin` append to.
pub fn calls_log(parent: &Path) -> PathBuf {
    parent.join("calls.log")
}

/// Logged invocations, one per line (empty when nothing ran).
pub fn calls(parent: &Path) -> Vec<String> {
    std::fs::read_to_string(calls_log(parent))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Write stub binaries into `parent/bin`. Stubs named in `failing` exit 1.
pub fn fake_bin(parent: &Path, failing: &[&str]) -> PathBuf {
    let bin = parent.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let log = calls_log(parent);

    for name in STUBS {
        let mut body = format!(
            "#!/bin/bash\necho \"{} $*\" >> '{}'\n",
            name,
            log.display()
        );
        if failing.contains(name) {
            body.push_str(&format!("echo '{} failed' >&2\nexit 1\n", name));
        } else {
            body.push_str(match *name {
                "initdb" => {
                    "mkdir -p \"$PGDATA\"\n\
                     echo 16 > \"$PGDATA/PG_VERSION\"\n\
                     echo '# postgresql.conf' > \"$PGDATA/postgresql.conf\"\n"
                }
                "pg_ctl" => {
                    "for a in \"$@\"; do last=\"$a\"; done\n\
                     case \"$last\" in\n\
                       start|restart) touch \"$PGDATA/postmaster.pid\" ;;\n\
                       stop) rm -f \"$PGDATA/postmaster.pid\" ;;\n\
                       status) [ -f \"$PGDATA/postmaster.pid\" ] || exit 3 ;;\n\
                     esac\n"
                }
                _ => "echo ok\n",
            });
        }
        let path = bin.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    bin
}

/// A part rooted at `root`: pgdata `root/pgdata`, scripts in `root/scripts`,
/// location `root/parts/postgres`, initdb enabled, no `bin`.
pub fn sample_config(root: &Path) -> RecipeConfig {
    config_with(root, &[])
}

/// Like [`sample_config`] with extra or overriding options.
pub fn config_with(root: &Path, extra: &[(&str, &str)]) -> RecipeConfig {
    let mut options: IndexMap<String, String> = IndexMap::new();
    options.insert("pgdata".to_string(), "pgdata".to_string());
    options.insert("initdb".to_string(), "true".to_string());
    for (k, v) in extra {
        options.insert(k.to_string(), v.to_string());
    }
    let ctx = LoadContext::new(
        root,
        BuildoutSettings {
            parts_directory: "parts".to_string(),
            bin_directory: "scripts".to_string(),
        },
    );
    load_part("postgres", &options, &ctx).unwrap()
}
