//! Unified error type for the storage-and-history engine.
//!
//! Mirrors the error taxonomy of the design: each variant is self-contained
//! enough that a calling agent can understand what happened and what to do
//! next without extra context. No CLI- or transport-specific concepts leak
//! in here — those live at the skin (`strata-cli`).

use std::fmt;
use std::path::PathBuf;

use crate::ids::{Hash, LaneName, StateId, WorkspaceName};

/// Unified error type for all `strata` operations.
#[derive(Debug)]
pub enum StrataError {
    /// No `.store` directory found walking up from the start path.
    NotARepository {
        /// The path search started from.
        start: PathBuf,
    },

    /// `.store/config.json` failed schema validation or names a future version.
    ConfigInvalid {
        /// Path to the offending config file.
        path: PathBuf,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// A blob exceeded `max_blob_size`, or a tree exceeded `max_tree_depth`.
    LimitExceeded {
        /// What was being limited (e.g. `"blob size"`, `"tree depth"`).
        what: String,
        /// The configured limit.
        limit: u64,
        /// The value that violated it.
        actual: u64,
    },

    /// The repository instance lock is held by another machine, or was lost
    /// on re-verification.
    ConcurrentAccess {
        /// Hostname recorded in the foreign lock.
        hostname: String,
        /// PID recorded in the foreign lock.
        pid: u32,
    },

    /// A proposed transition's cost would push lane totals over a configured
    /// budget limit.
    BudgetExceeded {
        /// The lane whose budget was exceeded.
        lane: LaneName,
        /// Which budget dimension (e.g. `"max_tokens_in"`).
        dimension: String,
        /// The configured limit.
        limit: u64,
        /// The total that would result.
        would_be: u64,
    },

    /// A promote detected path-level overlap between the lane's own changes
    /// and the target's changes since the fork base. Carries the structured
    /// report rather than being raised as a hard failure in most call paths;
    /// exposed as a typed error for callers that prefer `Result`.
    Conflict {
        /// The conflicting paths and how each side touched them.
        conflicts: Vec<PathConflict>,
    },

    /// A hash, state, workspace, or lane name does not exist.
    NotFound {
        /// What kind of thing was missing (e.g. `"state"`, `"lane"`).
        kind: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A lane, workspace, or template name contains forbidden characters.
    InvalidName {
        /// The invalid name.
        name: String,
        /// Why it is invalid.
        reason: String,
    },

    /// A workspace lock is held by another (non-stale) agent.
    LockHeld {
        /// The workspace name.
        workspace: WorkspaceName,
        /// The agent id recorded as the lock owner.
        owner: String,
    },

    /// A filesystem-backed object's payload is missing from `<blobs_dir>` —
    /// a tamper or corruption signal, not reconstructed silently.
    Missing {
        /// The hash whose payload could not be read.
        hash: Hash,
    },

    /// A filesystem operation failed, the database is unavailable, or
    /// on-disk metadata is corrupted.
    IoFailure {
        /// What was being done when the failure occurred.
        context: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The underlying SQLite database reported an error.
    Database(rusqlite::Error),

    /// A stored state's root tree (or an entry within it) does not exist.
    DanglingReference {
        /// The missing hash.
        hash: Hash,
        /// The state that referenced it, if known.
        state: Option<StateId>,
    },
}

/// A single path-level conflict detected during promote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathConflict {
    /// The conflicting path, relative to the workspace root.
    pub path: String,
    /// How the source lane touched this path (`added`/`modified`/`removed`).
    pub lane_action: String,
    /// How the target lane touched this path (`added`/`modified`/`removed`).
    pub target_action: String,
}

impl fmt::Display for PathConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: lane {} vs target {}",
            self.path, self.lane_action, self.target_action
        )
    }
}

impl fmt::Display for StrataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotARepository { start } => write!(
                f,
                "no repository found walking up from '{}'.\n  To fix: run `strata init` here, or check that you are inside a repository.",
                start.display()
            ),
            Self::ConfigInvalid { path, detail } => write!(
                f,
                "invalid configuration in '{}': {detail}\n  To fix: edit the config and correct the issue.",
                path.display()
            ),
            Self::LimitExceeded { what, limit, actual } => write!(
                f,
                "{what} exceeded: limit is {limit}, got {actual}.\n  To fix: raise the limit in .store/config.json, or reduce the input."
            ),
            Self::ConcurrentAccess { hostname, pid } => write!(
                f,
                "repository is locked by another machine (host '{hostname}', pid {pid}).\n  To fix: shared-filesystem concurrent writers are not supported; use the remote-sync interface instead."
            ),
            Self::BudgetExceeded { lane, dimension, limit, would_be } => write!(
                f,
                "budget exceeded on lane '{lane}': {dimension} limit is {limit}, proposal would bring total to {would_be}.\n  To fix: raise the lane's budget, or reduce the proposed cost."
            ),
            Self::Conflict { conflicts } => {
                write!(f, "promote conflict in {} path(s):", conflicts.len())?;
                for c in conflicts {
                    write!(f, "\n  - {c}")?;
                }
                write!(f, "\n  To fix: resolve on one side, or retry with force to rebase anyway.")
            }
            Self::NotFound { kind, id } => write!(
                f,
                "{kind} '{id}' not found.\n  To fix: check the identifier, or list available {kind}s."
            ),
            Self::InvalidName { name, reason } => write!(
                f,
                "invalid name '{name}': {reason}\n  Names must not contain path separators, NUL bytes, or '..'."
            ),
            Self::LockHeld { workspace, owner } => write!(
                f,
                "workspace '{workspace}' is locked by agent '{owner}'.\n  To fix: wait for the lock to release, or confirm the owning agent is gone and retry (stale locks reclaim automatically)."
            ),
            Self::Missing { hash } => write!(
                f,
                "object '{hash}' is recorded but its payload is missing from the filesystem store.\n  This indicates tampering or corruption; run `strata doctor`."
            ),
            Self::IoFailure { context, source } => {
                write!(f, "I/O error during {context}: {source}")
            }
            Self::Database(e) => write!(f, "database error: {e}"),
            Self::DanglingReference { hash, state } => match state {
                Some(s) => write!(f, "state '{s}' references missing object '{hash}'"),
                None => write!(f, "missing object '{hash}' referenced by a stored tree"),
            },
        }
    }
}

impl std::error::Error for StrataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoFailure { source, .. } => Some(source),
            Self::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StrataError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e)
    }
}

impl From<crate::ids::ValidationError> for StrataError {
    fn from(e: crate::ids::ValidationError) -> Self {
        Self::InvalidName {
            name: e.value,
            reason: e.reason,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_not_a_repository() {
        let err = StrataError::NotARepository {
            start: PathBuf::from("/tmp/nope"),
        };
        let msg = format!("{err}");
        assert!(msg.contains("/tmp/nope"));
        assert!(msg.contains("strata init"));
    }

    #[test]
    fn display_conflict_lists_paths() {
        let err = StrataError::Conflict {
            conflicts: vec![PathConflict {
                path: "main.py".to_owned(),
                lane_action: "modified".to_owned(),
                target_action: "modified".to_owned(),
            }],
        };
        let msg = format!("{err}");
        assert!(msg.contains("1 path(s)"));
        assert!(msg.contains("main.py"));
    }

    #[test]
    fn display_budget_exceeded() {
        let lane = LaneName::new("feat").unwrap();
        let err = StrataError::BudgetExceeded {
            lane,
            dimension: "max_tokens_in".to_owned(),
            limit: 1000,
            would_be: 1500,
        };
        let msg = format!("{err}");
        assert!(msg.contains("feat"));
        assert!(msg.contains("1000"));
        assert!(msg.contains("1500"));
    }

    #[test]
    fn source_for_database_error() {
        let err = StrataError::Database(rusqlite::Error::QueryReturnedNoRows);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn from_rusqlite_error() {
        let e: StrataError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(e, StrataError::Database(_)));
    }
}
