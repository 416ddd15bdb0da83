//! A small subprocess-invocation builder, used by the overlay manager to
//! shell out to `qemu-img`.

use std::ffi::OsStr;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// A named external command, run to completion with its stdout/stderr
/// captured so failures can be logged without polluting the controller's
/// own output.
pub(crate) struct Task {
    description: String,
    cmd: Command,
}

impl Task {
    /// Start building an invocation of `exe`, described by `description`
    /// for logging purposes.
    pub fn new(description: impl Into<String>, exe: impl AsRef<OsStr>) -> Self {
        let mut cmd = Command::new(exe.as_ref());
        cmd.stdin(Stdio::null());
        Self {
            description: description.into(),
            cmd,
        }
    }

    /// Append arguments to the command line.
    pub fn args<S: AsRef<OsStr>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.cmd.args(args);
        self
    }

    /// Run the command to completion, capturing stdout/stderr. Returns an
    /// error including the captured stderr if the process exits
    /// unsuccessfully or cannot be spawned.
    pub fn run(mut self) -> Result<()> {
        tracing::debug!(description = %self.description, cmd = ?self.cmd, "exec");
        self.cmd.stdout(Stdio::piped());
        self.cmd.stderr(Stdio::piped());
        let output = self
            .cmd
            .output()
            .with_context(|| format!("spawning {}", self.description))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}
