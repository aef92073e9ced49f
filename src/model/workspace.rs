//! Workspace metadata sidecar.

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, LaneName, StateId, WorkspaceName};

/// The reserved name denoting the repository root itself.
pub const MAIN_WORKSPACE: &str = "main";

/// Whether a workspace is expected to be torn down after one promote cycle
/// or to live across many. Ephemeral is the ordinary case for a per-task
/// agent workspace; persistent is for workspaces meant to survive repeated
/// propose/accept/promote cycles (a long-lived integration lane's staging
/// area, for instance).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceMode {
    #[default]
    Ephemeral,
    Persistent,
}

/// Whether a workspace's lock is currently held.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Idle,
    Active,
}

/// The persisted sidecar record for a workspace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub name: WorkspaceName,
    pub lane: LaneName,
    pub path: std::path::PathBuf,
    #[serde(default)]
    pub base_state: Option<StateId>,
    pub status: WorkspaceStatus,
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub mode: WorkspaceMode,
    pub created_at: f64,
    pub updated_at: f64,
}

impl WorkspaceInfo {
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.name.as_str() == MAIN_WORKSPACE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_main_checks_reserved_name() {
        let info = WorkspaceInfo {
            name: WorkspaceName::new(MAIN_WORKSPACE).unwrap(),
            lane: LaneName::new("main").unwrap(),
            path: "/repo".into(),
            base_state: None,
            status: WorkspaceStatus::Idle,
            agent_id: None,
            mode: WorkspaceMode::default(),
            created_at: 0.0,
            updated_at: 0.0,
        };
        assert!(info.is_main());
    }

    #[test]
    fn default_mode_is_ephemeral() {
        assert_eq!(WorkspaceMode::default(), WorkspaceMode::Ephemeral);
    }
}
