//! PG-004: Binary Locator — find the PostgreSQL executables.

use super::error::{RecipeError, Result};
use super::types::RecipeConfig;
use std::path::{Path, PathBuf};

/// Executables every binary directory must provide.
pub const REQUIRED_BINARIES: &[&str] = &["initdb", "pg_ctl"];

/// Executables used when present.
pub const OPTIONAL_BINARIES: &[&str] = &[
    "postgres",
    "pg_isready",
    "psql",
    "createuser",
    "createdb",
    "createlang",
];

/// Where the binaries come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryLocation {
    /// `bin` was supplied and validated
    Supplied(PathBuf),
    /// No `bin`; an external build must install PostgreSQL under `prefix`
    BuildRequired { prefix: PathBuf },
}

/// Resolve the binary directory of a part from its `bin` option.
pub fn locate(cfg: &RecipeConfig) -> Result<BinaryLocation> {
    match cfg.bin {
        Some(ref bin) => validate_bin_dir(bin).map(BinaryLocation::Supplied),
        None => {
            tracing::debug!(part = %cfg.name, prefix = %cfg.location.display(), "no bin option, build required");
            Ok(BinaryLocation::BuildRequired {
                prefix: cfg.location.clone(),
            })
        }
    }
}

/// Resolve to a usable directory, checking `<prefix>/bin` when a build is
/// required.
pub fn resolve(cfg: &RecipeConfig) -> Result<PathBuf> {
    match locate(cfg)? {
        BinaryLocation::Supplied(dir) => Ok(dir),
        BinaryLocation::BuildRequired { prefix } => {
            let built = prefix.join("bin");
            if !built.is_dir() {
                return Err(RecipeError::BuildRequired {
                    part: cfg.name.clone(),
                    prefix,
                });
            }
            validate_bin_dir(&built)
        }
    }
}

/// Check that `dir` exists and holds the required executables.
/// Returns the canonical absolute path.
pub fn validate_bin_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(RecipeError::MissingBinary {
            dir: dir.to_path_buf(),
            missing: REQUIRED_BINARIES.iter().map(|s| s.to_string()).collect(),
        });
    }
    let dir = std::fs::canonicalize(dir)
        .map_err(|e| RecipeError::io(format!("cannot resolve {}", dir.display()), e))?;

    let missing: Vec<String> = REQUIRED_BINARIES
        .iter()
        .filter(|name| !is_executable(&dir.join(name)))
        .map(|s| s.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(RecipeError::MissingBinary { dir, missing });
    }

    for name in OPTIONAL_BINARIES {
        if !is_executable(&dir.join(name)) {
            tracing::debug!(dir = %dir.display(), binary = name, "optional executable not found");
        }
    }
    Ok(dir)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
