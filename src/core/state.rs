//! PG-009: Install lock — load, save (atomic), build from generated scripts.

use super::error::{RecipeError, Result};
use super::types::{GeneratedScript, InstallLock, RecipeConfig, ScriptLock};
use crate::tripwire::{eventlog, hasher};
use std::path::{Path, PathBuf};

/// Lock file path inside a part location.
pub fn lock_file_path(location: &Path) -> PathBuf {
    location.join("state.lock.yaml")
}

/// Load a part's lock. Returns None if it doesn't exist.
pub fn load_lock(location: &Path) -> Result<Option<InstallLock>> {
    let path = lock_file_path(location);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| RecipeError::io(format!("cannot read {}", path.display()), e))?;
    let lock: InstallLock = serde_yaml_ng::from_str(&content).map_err(|e| RecipeError::Parse {
        path: path.clone(),
        message: format!("invalid lock file: {}", e),
    })?;
    Ok(Some(lock))
}

/// Save a lock atomically (write to temp, then rename).
pub fn save_lock(location: &Path, lock: &InstallLock) -> Result<()> {
    std::fs::create_dir_all(location).map_err(|e| RecipeError::write(location, e))?;
    let path = lock_file_path(location);

    let yaml = serde_yaml_ng::to_string(lock).map_err(|e| RecipeError::Io {
        message: "cannot serialize lock".to_string(),
        source: std::io::Error::other(e),
    })?;

    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml).map_err(|e| RecipeError::write(&tmp_path, e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| RecipeError::write(&path, e))?;
    Ok(())
}

/// Remove a part's lock if present.
pub fn remove_lock(location: &Path) -> Result<()> {
    let path = lock_file_path(location);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RecipeError::write(&path, e)),
    }
}

/// Build a lock recording the scripts just generated for `cfg`.
pub fn new_lock(cfg: &RecipeConfig, bin_dir: &Path, scripts: &[GeneratedScript]) -> InstallLock {
    InstallLock {
        schema: "1.0".to_string(),
        part: cfg.name.clone(),
        generated_at: eventlog::now_rfc3339(),
        generator: format!("pgrecipe {}", env!("CARGO_PKG_VERSION")),
        bin_dir: bin_dir.display().to_string(),
        pgdata: cfg.pgdata.as_ref().map(|p| p.display().to_string()),
        port: cfg.port,
        scripts: scripts
            .iter()
            .map(|s| {
                (
                    s.name.clone(),
                    ScriptLock {
                        kind: s.kind,
                        path: s.path.display().to_string(),
                        hash: hasher::hash_string(&s.body),
                    },
                )
            })
            .collect(),
    }
}
