//! PG-013: Local server configuration.
//!
//! Server settings go to `postgresql.local.conf`, which `postgresql.conf`
//! includes. Files are only rewritten when their content changes, so
//! re-applying an unchanged recipe leaves the data directory untouched.

use super::error::{RecipeError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

/// File holding recipe-managed settings.
pub const LOCAL_CONF: &str = "postgresql.local.conf";

/// Line appended to `postgresql.conf`.
pub fn include_line() -> String {
    format!("include = '{}'", LOCAL_CONF)
}

/// Render `name = value` lines, sorted by name.
pub fn render_local_conf(settings: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (name, value) in settings {
        out.push_str(&format!("{} = {}\n", name, value));
    }
    out
}

fn has_include(conf: &str) -> bool {
    let pattern = format!(r"(?m)^{}", regex::escape(&include_line()));
    Regex::new(&pattern)
        .map(|re| re.is_match(conf))
        .unwrap_or(false)
}

/// Write the local configuration into `pgdata`. Returns whether anything
/// changed on disk.
pub fn apply(pgdata: &Path, settings: &BTreeMap<String, String>) -> Result<bool> {
    let mut changed = false;

    let conf_path = pgdata.join("postgresql.conf");
    let conf = std::fs::read_to_string(&conf_path)
        .map_err(|e| RecipeError::io(format!("cannot read {}", conf_path.display()), e))?;
    if !has_include(&conf) {
        tracing::info!(path = %conf_path.display(), "including local configuration");
        let mut updated = conf;
        updated.push_str(&format!("\n\n{}\n", include_line()));
        std::fs::write(&conf_path, updated).map_err(|e| RecipeError::write(&conf_path, e))?;
        changed = true;
    }

    let local_path = pgdata.join(LOCAL_CONF);
    let desired = render_local_conf(settings);
    let current = std::fs::read_to_string(&local_path).ok();
    if current.as_deref() != Some(desired.as_str()) {
        tracing::info!(path = %local_path.display(), settings = settings.len(), "writing local configuration");
        std::fs::write(&local_path, desired).map_err(|e| RecipeError::write(&local_path, e))?;
        changed = true;
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("port".to_string(), "5433".to_string()),
            ("listen_addresses".to_string(), "''".to_string()),
        ])
    }

    #[test]
    fn test_pg013_render_sorted() {
        assert_eq!(
            render_local_conf(&settings()),
            "listen_addresses = ''\nport = 5433\n"
        );
    }

    #[test]
    fn test_pg013_has_include() {
        assert!(has_include("a = 1\ninclude = 'postgresql.local.conf'\n"));
        assert!(!has_include("# include = 'postgresql.local.conf'\n"));
        assert!(!has_include("a = 1\n"));
    }

    #[test]
    fn test_pg013_apply_writes_then_noop() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("postgresql.conf"), "max_connections = 100\n").unwrap();

        assert!(apply(dir.path(), &settings()).unwrap());
        let conf = std::fs::read_to_string(dir.path().join("postgresql.conf")).unwrap();
        assert!(conf.starts_with("max_connections = 100\n"));
        assert_eq!(conf.matches("include = 'postgresql.local.conf'").count(), 1);
        let local = std::fs::read_to_string(dir.path().join(LOCAL_CONF)).unwrap();
        assert!(local.contains("port = 5433"));

        assert!(!apply(dir.path(), &settings()).unwrap());
        let again = std::fs::read_to_string(dir.path().join("postgresql.conf")).unwrap();
        assert_eq!(again, conf);
    }

    #[test]
    fn test_pg013_apply_updates_changed_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("postgresql.conf"), "").unwrap();
        apply(dir.path(), &settings()).unwrap();

        let mut s = settings();
        s.insert("port".to_string(), "6000".to_string());
        assert!(apply(dir.path(), &s).unwrap());
        let local = std::fs::read_to_string(dir.path().join(LOCAL_CONF)).unwrap();
        assert!(local.contains("port = 6000"));
        assert!(!local.contains("5433"));
    }

    #[test]
    fn test_pg013_apply_missing_conf() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            apply(dir.path(), &settings()),
            Err(RecipeError::Io { .. })
        ));
    }
}
