//! PG-010: Local process execution.

use super::ExecOutput;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run `program` with `args` and extra environment, blocking until it exits.
/// stdin is closed so a password prompt fails instead of hanging the run.
pub fn run_program(
    program: &Path,
    args: &[String],
    env: &[(String, String)],
) -> std::io::Result<ExecOutput> {
    tracing::debug!(program = %program.display(), ?args, "spawning");
    let output = Command::new(program)
        .args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
