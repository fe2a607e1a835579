//! PG-005: Script generation — dispatch to script templates, write atomically.
//!
//! Generation is pure; [`write_scripts`] does the I/O. Each write replaces
//! the previous script wholesale, so regenerating never leaves stale content.

use super::error::{RecipeError, Result};
use super::types::{GeneratedScript, RecipeConfig, ScriptKind};
use crate::scripts::{control, wrapper};
use std::path::{Path, PathBuf};

/// Names and kinds of every script a part can produce, in write order.
pub fn script_plan(cfg: &RecipeConfig) -> Vec<(String, ScriptKind)> {
    vec![
        ("start".to_string(), ScriptKind::Start),
        ("stop".to_string(), ScriptKind::Stop),
        ("status".to_string(), ScriptKind::Status),
        ("initialize".to_string(), ScriptKind::Initialize),
        ("pg_ctl".to_string(), ScriptKind::ServerWrapper),
        ("postgres".to_string(), ScriptKind::ServerWrapper),
        ("psql".to_string(), ScriptKind::ClientWrapper),
        ("pg_isready".to_string(), ScriptKind::ClientWrapper),
        (format!("{}_server", cfg.name), ScriptKind::ServerShift),
        (format!("{}_client", cfg.name), ScriptKind::ClientShift),
    ]
}

/// Render one script. `None` when the script needs a pgdata the part lacks.
pub fn script_body(
    cfg: &RecipeConfig,
    bin_dir: &Path,
    name: &str,
    kind: ScriptKind,
) -> Option<String> {
    if kind.needs_pgdata() && cfg.pgdata.is_none() {
        return None;
    }
    let pgdata = cfg.pgdata.as_deref();
    Some(match (kind, pgdata) {
        (ScriptKind::Start, Some(p)) => control::start_script(cfg, bin_dir, p),
        (ScriptKind::Stop, Some(p)) => control::stop_script(cfg, bin_dir, p),
        (ScriptKind::Status, Some(p)) => control::status_script(cfg, bin_dir, p),
        (ScriptKind::Initialize, Some(p)) => control::initialize_script(cfg, bin_dir, p),
        (ScriptKind::ServerWrapper, _) => wrapper::wrapper_script(&cfg.server_env(), bin_dir, name),
        (ScriptKind::ClientWrapper, _) => wrapper::wrapper_script(&cfg.client_env(), bin_dir, name),
        (ScriptKind::ServerShift, _) => wrapper::shift_script(&cfg.server_env(), bin_dir),
        (ScriptKind::ClientShift, _) => wrapper::shift_script(&cfg.client_env(), bin_dir),
        (_, None) => return None,
    })
}

/// Generate all scripts for a part against a resolved binary directory.
///
/// Fails if the output directory is the binary directory itself, since the
/// wrappers would replace the executables they wrap.
pub fn generate_scripts(cfg: &RecipeConfig, bin_dir: &Path) -> Result<Vec<GeneratedScript>> {
    let out_dir = std::fs::canonicalize(&cfg.bin_directory).unwrap_or_else(|_| cfg.bin_directory.clone());
    if out_dir == bin_dir {
        return Err(RecipeError::config(
            &cfg.name,
            "bin-directory",
            format!("{} is the PostgreSQL binary directory", cfg.bin_directory.display()),
        ));
    }

    let mut scripts = Vec::new();
    for (name, kind) in script_plan(cfg) {
        match script_body(cfg, bin_dir, &name, kind) {
            Some(body) => scripts.push(GeneratedScript {
                path: cfg.bin_directory.join(&name),
                name,
                kind,
                body,
            }),
            None => tracing::debug!(part = %cfg.name, script = %name, "skipped, no pgdata"),
        }
    }
    Ok(scripts)
}

/// Write scripts (temp file + rename, mode 0755). Returns the written paths.
pub fn write_scripts(scripts: &[GeneratedScript]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(scripts.len());
    for script in scripts {
        write_script(script)?;
        tracing::debug!(path = %script.path.display(), kind = %script.kind, "script written");
        written.push(script.path.clone());
    }
    Ok(written)
}

fn write_script(script: &GeneratedScript) -> Result<()> {
    let dir = script.path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| RecipeError::write(dir, e))?;

    let tmp = dir.join(format!(".{}.tmp", script.name));
    std::fs::write(&tmp, &script.body).map_err(|e| RecipeError::write(&tmp, e))?;
    set_executable(&tmp).map_err(|e| RecipeError::write(&tmp, e))?;
    std::fs::rename(&tmp, &script.path).map_err(|e| RecipeError::write(&script.path, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
