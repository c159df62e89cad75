//! Synchronous process execution.
//!
//! Entry scripts and store callables run as blocking child processes:
//! the invoking command waits for the child to exit and captures both
//! output streams. No timeout or retry policy lives here.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::core::{Error, Result};

/// Captured result of a child process run
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `program` with `args` in `cwd`, inheriting the parent
/// environment extended by `env`. Blocks until the child exits.
///
/// A non-zero exit is not an error at this layer - callers decide what
/// a failure means for their lifecycle stage.
pub fn run_process(
    program: &str,
    args: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
    stdin: Option<&str>,
) -> Result<ProcessOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .envs(env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::io(cwd.join(program), e))?;

    if let Some(input) = stdin {
        use std::io::{ErrorKind, Write};
        if let Some(mut pipe) = child.stdin.take() {
            // A child that exits without reading stdin closes the pipe
            // and the write sees EPIPE; its exit status still decides
            // success, so that is not an error here.
            if let Err(e) = pipe.write_all(input.as_bytes()) {
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(Error::io(cwd.join(program), e));
                }
            }
        }
    }

    let output = child
        .wait_with_output()
        .map_err(|e| Error::io(cwd.join(program), e))?;

    Ok(ProcessOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Whether an executable is reachable on `PATH`. Advisory tool checks only.
pub fn tool_on_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(name).is_file())
}
