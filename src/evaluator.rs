//! Subprocess evaluators: run configured shell commands (tests, linters,
//! type-checkers) against a workspace and fold their verdicts into a single
//! [`EvaluationResult`].

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};
use crate::model::transition::EvaluationResult;

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Configuration for a single evaluator, as stored under
/// `.store/config.json`'s `evaluators` array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    pub name: String,
    /// Explicit argv. Takes precedence over `command` when both are set —
    /// it is the only cross-platform form, since `command` relies on
    /// shell-style splitting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Legacy shell-style command line, split with [`shell_split`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

const fn default_required() -> bool {
    true
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// The outcome of running one evaluator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorOutcome {
    pub name: String,
    pub passed: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Runs every evaluator in `configs` against `workspace_path` in order and
/// folds the results into one [`EvaluationResult`]: passes only if every
/// `required` evaluator passed. A non-required evaluator's failure is still
/// recorded in `detail` but does not fail the overall verdict.
pub fn run_all(configs: &[EvaluatorConfig], workspace_path: &Path) -> Result<EvaluationResult> {
    let mut outcomes = Vec::with_capacity(configs.len());
    let mut all_passed = true;
    for config in configs {
        let outcome = run_one(config, workspace_path)?;
        if !outcome.passed && config.required {
            all_passed = false;
        }
        outcomes.push(outcome);
    }

    let summary = outcomes
        .iter()
        .map(|o| format!("{}: {}", o.name, if o.passed { "passed" } else { "FAILED" }))
        .collect::<Vec<_>>()
        .join("; ");
    let detail = serde_json::to_value(&outcomes).unwrap_or(serde_json::Value::Null);

    Ok(EvaluationResult {
        passed: all_passed,
        summary,
        detail,
    })
}

/// Runs a single evaluator, returning its outcome. Never fails the crate's
/// `Result` for the evaluator's own exit status — only for I/O errors
/// launching it (missing binary, permission denied, etc.).
pub fn run_one(config: &EvaluatorConfig, workspace_path: &Path) -> Result<EvaluatorOutcome> {
    let cwd = match &config.working_directory {
        Some(sub) => {
            let joined = workspace_path.join(sub);
            let resolved = joined.canonicalize().unwrap_or(joined);
            let root = workspace_path.canonicalize().unwrap_or_else(|_| workspace_path.to_path_buf());
            if !resolved.starts_with(&root) {
                return Ok(EvaluatorOutcome {
                    name: config.name.clone(),
                    passed: false,
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: format!("evaluator working_directory '{sub}' escapes the workspace"),
                    duration_ms: 0,
                });
            }
            resolved
        }
        None => workspace_path.to_path_buf(),
    };

    let argv = match &config.args {
        Some(args) if !args.is_empty() => args.clone(),
        _ => {
            if config.command.is_empty() {
                return Ok(EvaluatorOutcome {
                    name: config.name.clone(),
                    passed: false,
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: format!("evaluator '{}' has neither args nor command", config.name),
                    duration_ms: 0,
                });
            }
            shell_split(&config.command)
        }
    };
    let Some((program, rest)) = argv.split_first() else {
        return Ok(EvaluatorOutcome {
            name: config.name.clone(),
            passed: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("evaluator '{}' command parsed to an empty argv", config.name),
            duration_ms: 0,
        });
    };

    let started = Instant::now();
    let mut child = Command::new(program)
        .args(rest)
        .current_dir(&cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| StrataError::IoFailure {
            context: format!("spawning evaluator '{}'", config.name),
            source: e,
        })?;

    let timeout = Duration::from_secs(config.timeout_secs);
    let status = loop {
        if let Some(status) = child.try_wait().map_err(|e| StrataError::IoFailure {
            context: format!("waiting on evaluator '{}'", config.name),
            source: e,
        })? {
            break Some(status);
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let Some(status) = status else {
        return Ok(EvaluatorOutcome {
            name: config.name.clone(),
            passed: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("evaluator '{}' timed out after {}s", config.name, config.timeout_secs),
            duration_ms,
        });
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut stdout);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }

    Ok(EvaluatorOutcome {
        name: config.name.clone(),
        passed: status.success(),
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
        duration_ms,
    })
}

/// Minimal POSIX-ish shell word splitting for the legacy `command` string
/// form: whitespace-separated, with single and double quotes honored.
/// `args` should be preferred for anything that needs real shell semantics.
fn shell_split(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut has_content = false;

    for ch in command.chars() {
        match ch {
            '\'' if !in_double => {
                in_single = !in_single;
                has_content = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                has_content = true;
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if has_content {
                    words.push(std::mem::take(&mut current));
                    has_content = false;
                }
            }
            c => {
                current.push(c);
                has_content = true;
            }
        }
    }
    if has_content {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, args: &[&str]) -> EvaluatorConfig {
        EvaluatorConfig {
            name: name.to_owned(),
            args: Some(args.iter().map(|s| (*s).to_owned()).collect()),
            command: String::new(),
            working_directory: None,
            required: true,
            timeout_secs: 5,
        }
    }

    #[test]
    fn shell_split_handles_quotes() {
        assert_eq!(shell_split("pytest -k 'foo bar' --verbose"), vec!["pytest", "-k", "foo bar", "--verbose"]);
    }

    #[test]
    fn passing_evaluator_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run_one(&config("true", &["true"]), dir.path()).unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn failing_evaluator_is_not_required_to_fail_run_all() {
        let dir = tempfile::tempdir().unwrap();
        let mut optional = config("lint", &["false"]);
        optional.required = false;
        let result = run_all(&[optional], dir.path()).unwrap();
        assert!(result.passed);
        assert!(result.summary.contains("lint: FAILED"));
    }

    #[test]
    fn required_failure_fails_the_whole_run() {
        let dir = tempfile::tempdir().unwrap();
        let required = config("tests", &["false"]);
        let result = run_all(&[required], dir.path()).unwrap();
        assert!(!result.passed);
    }

    #[test]
    fn working_directory_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut escaping = config("sneaky", &["true"]);
        escaping.working_directory = Some("../../../etc".to_owned());
        let outcome = run_one(&escaping, dir.path()).unwrap();
        assert!(!outcome.passed);
        assert!(outcome.stderr.contains("escapes"));
    }

    #[test]
    fn missing_command_and_args_reports_failure_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let empty = EvaluatorConfig {
            name: "nothing".to_owned(),
            args: None,
            command: String::new(),
            working_directory: None,
            required: true,
            timeout_secs: 5,
        };
        let outcome = run_one(&empty, dir.path()).unwrap();
        assert!(!outcome.passed);
    }
}
