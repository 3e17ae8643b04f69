//! Lifecycle hooks around a delivery pass
//!
//! Hooks are configured as `[[hooks]]` entries and executed as
//! subprocesses. `DRY_RUN` is always set in their environment; post-run
//! hooks also get `SUCCESS` and `STATUS_MSG`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Points in a pass where hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookEvent {
    /// Before the lock is taken
    PreflightChecks,
    /// After the lock, before the repository is touched
    PreRun,
    /// After the repository was updated or cloned
    PostRepoUp,
    /// After the pass, whatever its outcome
    PostRun,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreflightChecks => write!(f, "preflight-checks"),
            Self::PreRun => write!(f, "pre-run"),
            Self::PostRepoUp => write!(f, "post-repo-up"),
            Self::PostRun => write!(f, "post-run"),
        }
    }
}

impl HookEvent {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preflight-checks" => Some(Self::PreflightChecks),
            "pre-run" => Some(Self::PreRun),
            "post-repo-up" => Some(Self::PostRepoUp),
            "post-run" => Some(Self::PostRun),
            _ => None,
        }
    }

    pub fn all_names() -> &'static [&'static str] {
        &["preflight-checks", "pre-run", "post-repo-up", "post-run"]
    }
}

/// Configuration for a single hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookConfig {
    pub event: HookEvent,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Defaults to the delivery work directory
    pub working_dir: Option<PathBuf>,
}

/// Variables exported to hooks and substituted into their args
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub vars: HashMap<String, String>,
}

impl HookContext {
    /// Context for hooks that run before or during a pass.
    pub fn for_pass(dry_run: bool) -> Self {
        let mut vars = HashMap::new();
        vars.insert("DRY_RUN".to_string(), dry_run.to_string());
        Self { vars }
    }

    /// Context for post-run hooks, carrying the pass outcome.
    pub fn for_outcome(dry_run: bool, success: bool, status_msg: &str) -> Self {
        let mut ctx = Self::for_pass(dry_run);
        ctx.vars.insert("SUCCESS".to_string(), success.to_string());
        ctx.vars
            .insert("STATUS_MSG".to_string(), status_msg.to_string());
        ctx
    }
}

/// Result of running a single hook
#[derive(Debug)]
pub struct HookResult {
    pub event: HookEvent,
    pub command: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Run all hooks matching the given event
///
/// Hooks are executed in order. If a hook fails (non-zero exit), execution
/// stops and an error is returned (fail-fast behavior).
pub fn run_hooks(
    hooks: &[HookConfig],
    event: HookEvent,
    context: &HookContext,
    default_dir: &Path,
) -> Result<Vec<HookResult>> {
    let mut results = Vec::new();

    for hook in hooks.iter().filter(|h| h.event == event) {
        tracing::info!("Running {} hook: {}", event, hook.command);
        let result = execute_hook(hook, context, default_dir)?;

        if !result.success {
            let stderr_snippet = result.stderr.trim();
            let message = if stderr_snippet.is_empty() {
                format!(
                    "Hook exited with non-zero status (exit code: {:?})",
                    result.exit_code
                )
            } else {
                format!(
                    "Hook exited with non-zero status (exit code: {:?}): {}",
                    result.exit_code, stderr_snippet
                )
            };
            return Err(Error::HookFailed {
                event: event.to_string(),
                command: hook.command.clone(),
                message,
            });
        }

        tracing::debug!("{} hook output: {}", event, result.stdout.trim());
        results.push(result);
    }

    Ok(results)
}

fn execute_hook(hook: &HookConfig, context: &HookContext, default_dir: &Path) -> Result<HookResult> {
    let work_dir = hook.working_dir.as_deref().unwrap_or(default_dir);

    let args: Vec<String> = hook
        .args
        .iter()
        .map(|arg| substitute_vars(arg, &context.vars))
        .collect();

    let output = Command::new(&hook.command)
        .args(&args)
        .current_dir(work_dir)
        .envs(&context.vars)
        .output()
        .map_err(|e| Error::HookFailed {
            event: hook.event.to_string(),
            command: hook.command.clone(),
            message: format!("could not start: {e}"),
        })?;

    Ok(HookResult {
        event: hook.event,
        command: hook.command.clone(),
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
    })
}

/// Substitute `${VAR_NAME}` patterns with context variables
fn substitute_vars(input: &str, vars: &HashMap<String, String>) -> String {
    let mut result = input.to_string();
    for (key, value) in vars {
        let pattern = format!("${{{}}}", key);
        result = result.replace(&pattern, value);
    }
    result
}
