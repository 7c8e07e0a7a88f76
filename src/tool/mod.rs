// src/tool/mod.rs

//! External diff/apply tool execution
//!
//! Wraps the configured diff-generation and patch-apply tools as
//! subprocesses. This is the component most exposed to injection risk, so
//! every path is sanitized first and tools are always invoked with an
//! argument array, never a concatenated shell string — version and patch
//! names are partially user-supplied, which makes this a security
//! decision, not a style choice.
//!
//! Tool contract (both tools): `tool -f <input-a> <input-b> <output>`,
//! exit code 0 means success and the output file must exist; any other
//! exit carries the failure reason on stderr.

use crate::error::{Error, Result};
use crate::paths;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Seam between the patch engine / update flow and the external tools
///
/// Lets tests substitute a counting or scripted implementation.
pub trait PatchTool: Send + Sync {
    /// Generate delta bytes transforming `source` into `target`
    fn diff(&self, source: &Path, target: &Path) -> Result<Vec<u8>>;

    /// Apply `patch_file` to `source_archive`, writing `output`
    ///
    /// Returns `Ok(false)` when the tool fails or produces no output —
    /// callers treat that as a fallback trigger, not a hard fault.
    fn apply(&self, source_archive: &Path, patch_file: &Path, output: &Path) -> Result<bool>;
}

/// Subprocess-backed implementation of [`PatchTool`]
pub struct ToolRunner {
    diff_tool: PathBuf,
    apply_tool: PathBuf,
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(diff_tool: PathBuf, apply_tool: PathBuf, timeout: Duration) -> Self {
        Self {
            diff_tool,
            apply_tool,
            timeout,
        }
    }

    pub fn from_config(tools: &crate::config::ToolsSection) -> Self {
        Self::new(
            tools.diff_tool.clone(),
            tools.apply_tool.clone(),
            tools.timeout(),
        )
    }

    /// Run a tool with the `-f <a> <b> <out>` argument array
    ///
    /// Returns the exit code and captured stderr, or a timeout error after
    /// killing the subprocess.
    fn run(&self, tool: &Path, a: &Path, b: &Path, out: &Path) -> Result<(i32, String)> {
        debug!(
            "Invoking {} -f {} {} {}",
            tool.display(),
            a.display(),
            b.display(),
            out.display()
        );

        let mut child = Command::new(tool)
            .arg("-f")
            .arg(a)
            .arg(b)
            .arg(out)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Tool {
                exit_code: -1,
                stderr: format!("failed to spawn {}: {e}", tool.display()),
            })?;

        match child.wait_timeout(self.timeout)? {
            Some(status) => {
                let output = child.wait_with_output()?;
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                Ok((status.code().unwrap_or(-1), stderr))
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::ToolTimeout(self.timeout.as_secs()))
            }
        }
    }
}

impl PatchTool for ToolRunner {
    fn diff(&self, source: &Path, target: &Path) -> Result<Vec<u8>> {
        let source = paths::canonical_file(source)?;
        let target = paths::canonical_file(target)?;

        // Per-invocation scratch dir: unique name, removed on every exit
        // path when dropped
        let scratch = TempDir::new()?;
        let out = scratch.path().join("out.patch");

        let (exit_code, stderr) = self.run(&self.diff_tool, &source, &target, &out)?;

        if exit_code != 0 {
            return Err(Error::Tool { exit_code, stderr });
        }

        if !out.exists() {
            return Err(Error::Tool {
                exit_code: 0,
                stderr: "tool exited successfully but produced no output file".to_string(),
            });
        }

        Ok(std::fs::read(&out)?)
    }

    fn apply(&self, source_archive: &Path, patch_file: &Path, output: &Path) -> Result<bool> {
        let source_archive = paths::canonical_file(source_archive)?;
        let patch_file = paths::canonical_file(patch_file)?;

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let result = self.run(&self.apply_tool, &source_archive, &patch_file, output);

        let ok = match result {
            Ok((0, _)) if output.exists() => true,
            Ok((0, _)) => {
                warn!("Apply tool exited successfully but produced no output");
                false
            }
            Ok((exit_code, stderr)) => {
                warn!("Apply tool failed with exit code {exit_code}: {stderr}");
                false
            }
            Err(Error::ToolTimeout(secs)) => {
                warn!("Apply tool timed out after {secs} seconds");
                false
            }
            Err(e) => return Err(e),
        };

        if !ok {
            // No partial output is trusted
            let _ = std::fs::remove_file(output);
        }

        Ok(ok)
    }
}
