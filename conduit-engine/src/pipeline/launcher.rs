//! Pipeline launcher
//!
//! Builds the subprocess command for a pipeline definition:
//!
//! ```text
//! <executable> <executable-args...> <script> <params...>
//! ```
//!
//! With the default `sh -c`, the script is run by the shell and the extra
//! parameters become `$0`, `$1`, ...

use conduit_core::domain::pipeline::PipelineDefinition;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::config::Config;
use crate::pipeline::PipelineError;

/// Knows how to turn a pipeline definition into a running process
#[derive(Debug, Clone)]
pub struct Launcher {
    executable: String,
    args: Vec<String>,
}

impl Launcher {
    pub fn new(executable: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.executable.clone(), config.executable_args.clone())
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Start precondition: the executable must resolve to an executable file
    pub fn check(&self) -> Result<PathBuf, PipelineError> {
        resolve_executable(&self.executable).ok_or_else(|| {
            PipelineError::StartPrecondition(format!(
                "executable '{}' was not found or is not executable",
                self.executable
            ))
        })
    }

    /// Command for `definition` with stdout and stderr piped
    ///
    /// On Unix the process leads its own process group so that killing the
    /// pipeline also reaches anything the script spawned.
    pub fn command(&self, definition: &PipelineDefinition) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .args(&self.args)
            .arg(&definition.script)
            .args(&definition.params)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        command
    }
}

fn resolve_executable(executable: &str) -> Option<PathBuf> {
    if executable.is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.components().count() > 1 {
        return is_executable(path).then(|| path.to_path_buf());
    }

    let search_path = std::env::var_os("PATH")?;
    std::env::split_paths(&search_path)
        .map(|dir| dir.join(executable))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
