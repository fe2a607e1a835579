//! PG-008: Append-only JSONL install event log.

use crate::core::error::{RecipeError, Result};
use crate::core::types::{InstallEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};

/// RFC 3339 UTC timestamp, second precision.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .unsigned_abs();
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Event log path inside a part location.
pub fn event_log_path(location: &Path) -> PathBuf {
    location.join("events.jsonl")
}

/// Append an event to the part's event log.
pub fn append_event(location: &Path, event: InstallEvent) -> Result<()> {
    let path = event_log_path(location);
    std::fs::create_dir_all(location).map_err(|e| RecipeError::write(location, e))?;

    let te = TimestampedEvent {
        ts: now_rfc3339(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| RecipeError::Io {
        message: "cannot serialize event".to_string(),
        source: std::io::Error::other(e),
    })?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| RecipeError::write(&path, e))?;
    writeln!(file, "{}", json).map_err(|e| RecipeError::write(&path, e))?;
    Ok(())
}

/// Read every event back, skipping malformed lines.
pub fn read_events(location: &Path) -> Result<Vec<TimestampedEvent>> {
    let path = event_log_path(location);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| RecipeError::io(format!("cannot read {}", path.display()), e))?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
