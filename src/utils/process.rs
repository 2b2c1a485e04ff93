// tablevault/src/utils/process.rs
use std::path::{Path, PathBuf};
use which::{which, which_in};

use crate::errors::{DbToolError, Result};

/// Captured result of one external client invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn status_text(&self) -> String {
        match self.status {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }

    /// Converts a non-zero exit into a `DbToolError::Command`.
    pub fn into_command_error(self, program: &str) -> DbToolError {
        DbToolError::Command {
            program: program.to_string(),
            status: self.status_text(),
            stderr: self.stderr.trim().to_string(),
        }
    }
}

impl From<std::process::Output> for ProcessOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Finds a client executable, preferring `client_dir` over the system PATH.
pub fn find_executable(name: &str, client_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = client_dir {
        if let Ok(path) = which_in(name, Some(dir.as_os_str()), dir) {
            return Ok(path);
        }
    }
    which(name).map_err(|_| {
        DbToolError::ExecutableNotFound(format!(
            "{} not found in {}PATH. Please ensure the client tools are installed.",
            name,
            client_dir
                .map(|d| format!("{} or ", d.display()))
                .unwrap_or_default()
        ))
    })
}
