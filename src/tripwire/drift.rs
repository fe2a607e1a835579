//! PG-007: Drift detection — compare generated scripts on disk to lock hashes.

use crate::core::types::InstallLock;
use crate::tripwire::hasher;
use std::path::Path;

/// A single drift finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftFinding {
    pub script: String,
    pub expected_hash: String,
    pub actual_hash: String,
    pub detail: String,
}

/// Check one script against its recorded hash.
pub fn check_script_drift(script: &str, path: &str, expected_hash: &str) -> Option<DriftFinding> {
    let file_path = Path::new(path);
    if !file_path.exists() {
        return Some(DriftFinding {
            script: script.to_string(),
            expected_hash: expected_hash.to_string(),
            actual_hash: "MISSING".to_string(),
            detail: format!("{} does not exist", path),
        });
    }

    let actual = hasher::hash_file(file_path).unwrap_or_else(|e| format!("ERROR:{}", e));
    if actual != expected_hash {
        Some(DriftFinding {
            script: script.to_string(),
            expected_hash: expected_hash.to_string(),
            actual_hash: actual,
            detail: format!("{} content changed", path),
        })
    } else {
        None
    }
}

/// Check every script recorded in a lock.
pub fn detect_drift(lock: &InstallLock) -> Vec<DriftFinding> {
    lock.scripts
        .iter()
        .filter_map(|(name, sl)| check_script_drift(name, &sl.path, &sl.hash))
        .collect()
}
