//! Script templates — one module per script family.
//!
//! Every template embeds absolute, shell-quoted paths so the result runs
//! the same from any working directory, with no ambient environment.

pub mod control;
pub mod wrapper;

use crate::core::cmdline::shell_quote;

/// Render `K='v' K2='v2'` assignments for an env prefix.
pub(crate) fn env_assignments(env: &[(String, String)]) -> String {
    env.iter()
        .map(|(k, v)| format!("{}={}", k, shell_quote(v)))
        .collect::<Vec<_>>()
        .join(" ")
}
