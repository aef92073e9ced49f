//! Isolated working directories materialized from the content store.

pub mod lock;
pub mod metadata;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{Result, StrataError};
use crate::ids::{AgentId, LaneName, StateId, WorkspaceName};
use crate::model::workspace::{MAIN_WORKSPACE, WorkspaceInfo, WorkspaceMode, WorkspaceStatus};
use crate::store::ContentStore;
use crate::worldstate::WorldStateManager;

/// Name of the crash-recovery marker file written before a materialize or
/// update begins and removed only on success.
pub const DIRTY_MARKER: &str = ".store_materializing";

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// Crash injection point for exercising dirty-marker recovery in tests.
/// Reads `STRATA_FAILPOINT` and, if it matches `name`, returns an error
/// instead of continuing — standing in for a process kill between the
/// marker write and its clearing. Compiled out unless the `failpoints`
/// feature is enabled.
#[cfg(feature = "failpoints")]
fn failpoint(name: &str) -> Result<()> {
    if std::env::var("STRATA_FAILPOINT").as_deref() == Ok(name) {
        return Err(StrataError::IoFailure {
            context: format!("failpoint '{name}'"),
            source: std::io::Error::other("simulated crash"),
        });
    }
    Ok(())
}

#[cfg(not(feature = "failpoints"))]
fn failpoint(_name: &str) -> Result<()> {
    Ok(())
}

/// The contents of a dirty marker: either a fresh materialize or an
/// incremental update was in flight.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirtyMarker {
    Materializing { state_id: String, started_at: f64 },
    Updating { from_state: Option<String>, to_state: String, started_at: f64 },
}

/// Creates, updates, locks, and destroys workspace directories.
pub struct WorkspaceManager {
    workspaces_dir: PathBuf,
    repo_root: PathBuf,
    lock_max_age_secs: u64,
}

impl WorkspaceManager {
    #[must_use]
    pub fn new(repo_root: PathBuf, workspaces_dir: PathBuf, lock_max_age_secs: u64) -> Self {
        let lock_max_age_secs = if lock_max_age_secs == 0 { lock::DEFAULT_LOCK_MAX_AGE_SECS } else { lock_max_age_secs };
        Self { workspaces_dir, repo_root, lock_max_age_secs }
    }

    /// The on-disk path a workspace's files live under (the repository root
    /// itself, for `"main"`).
    #[must_use]
    pub fn path_for(&self, name: &WorkspaceName) -> PathBuf {
        if name.as_str() == MAIN_WORKSPACE {
            self.repo_root.clone()
        } else {
            self.workspaces_dir.join(name.as_str())
        }
    }

    fn metadata_path(&self, name: &WorkspaceName) -> PathBuf {
        self.workspaces_dir.join(format!("{name}.json"))
    }

    fn lockdir_path(&self, name: &WorkspaceName) -> PathBuf {
        self.workspaces_dir.join(format!("{name}.lockdir"))
    }

    fn marker_path(&self, name: &WorkspaceName) -> PathBuf {
        self.path_for(name).join(DIRTY_MARKER)
    }

    /// Creates a new workspace, materializing `state` (if given) into it.
    ///
    /// Refuses if metadata already exists for `name`, or (for non-main
    /// workspaces) if the target directory already exists.
    #[instrument(skip(self, store, wsm))]
    pub fn create(
        &self,
        store: &ContentStore,
        wsm: &WorldStateManager,
        name: WorkspaceName,
        lane: LaneName,
        state: Option<StateId>,
        agent_id: Option<AgentId>,
        mode: WorkspaceMode,
    ) -> Result<WorkspaceInfo> {
        let meta_path = self.metadata_path(&name);
        if metadata::read(&meta_path)?.is_some() {
            return Err(StrataError::InvalidName {
                name: name.to_string(),
                reason: "a workspace with this name already exists".to_owned(),
            });
        }
        let path = self.path_for(&name);
        let is_main = name.as_str() == MAIN_WORKSPACE;
        if !is_main && path.exists() {
            return Err(StrataError::InvalidName {
                name: name.to_string(),
                reason: "target directory already exists".to_owned(),
            });
        }
        std::fs::create_dir_all(&path).map_err(|e| io_failure("creating workspace directory", e))?;

        if let Some(state) = &state {
            self.write_marker(&name, &DirtyMarker::Materializing { state_id: state.to_string(), started_at: now_secs() })?;
            failpoint("materialize")?;
            wsm.materialize(store, state, &path, is_main)?;
            self.clear_marker(&name)?;
        }

        let now = now_secs();
        let info = WorkspaceInfo {
            name,
            lane,
            path,
            base_state: state,
            status: WorkspaceStatus::Idle,
            agent_id,
            mode,
            created_at: now,
            updated_at: now,
        };
        metadata::write(&meta_path, &info)?;
        Ok(info)
    }

    fn write_marker(&self, name: &WorkspaceName, marker: &DirtyMarker) -> Result<()> {
        let bytes = serde_json::to_vec(marker).unwrap_or_default();
        std::fs::write(self.marker_path(name), bytes).map_err(|e| io_failure("writing dirty marker", e))
    }

    fn clear_marker(&self, name: &WorkspaceName) -> Result<()> {
        let path = self.marker_path(name);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| io_failure("removing dirty marker", e))?;
        }
        Ok(())
    }

    /// Whether a workspace's dirty marker is present — a crash occurred
    /// mid-materialize or mid-update and recovery has not yet run.
    #[must_use]
    pub fn is_dirty(&self, name: &WorkspaceName) -> bool {
        self.marker_path(name).exists()
    }

    /// Reads back the dirty marker's contents for a doctor-style sweep.
    pub fn read_marker(&self, name: &WorkspaceName) -> Result<Option<DirtyMarker>> {
        let path = self.marker_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path).map_err(|e| io_failure("reading dirty marker", e))?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StrataError::ConfigInvalid { path, detail: e.to_string() })
    }

    /// Acquires the workspace's lock directory for `agent_id`, marking it
    /// `active` on success.
    pub fn acquire(&self, name: &WorkspaceName, agent_id: &AgentId) -> Result<bool> {
        let meta_path = self.metadata_path(name);
        let Some(mut info) = metadata::read(&meta_path)? else {
            return Err(StrataError::NotFound { kind: "workspace".to_owned(), id: name.to_string() });
        };
        let acquired = lock::acquire(&self.lockdir_path(name), agent_id, self.lock_max_age_secs)?;
        if acquired {
            info.status = WorkspaceStatus::Active;
            info.agent_id = Some(agent_id.clone());
            info.updated_at = now_secs();
            metadata::write(&meta_path, &info)?;
        }
        Ok(acquired)
    }

    /// Releases a workspace's lock, marking it `idle`.
    pub fn release(&self, name: &WorkspaceName) -> Result<()> {
        lock::release(&self.lockdir_path(name))?;
        let meta_path = self.metadata_path(name);
        if let Some(mut info) = metadata::read(&meta_path)? {
            info.status = WorkspaceStatus::Idle;
            info.updated_at = now_secs();
            metadata::write(&meta_path, &info)?;
        }
        Ok(())
    }

    /// Updates a workspace to `new_state`, incrementally when a base state
    /// is known, or by full materialize otherwise.
    #[instrument(skip(self, store, wsm))]
    pub fn update(&self, store: &ContentStore, wsm: &WorldStateManager, name: &WorkspaceName, new_state: StateId) -> Result<()> {
        let meta_path = self.metadata_path(name);
        let mut info = metadata::read(&meta_path)?.ok_or_else(|| StrataError::NotFound { kind: "workspace".to_owned(), id: name.to_string() })?;
        let is_main = info.is_main();

        self.write_marker(
            name,
            &DirtyMarker::Updating {
                from_state: info.base_state.as_ref().map(StateId::to_string),
                to_state: new_state.to_string(),
                started_at: now_secs(),
            },
        )?;
        failpoint("update")?;

        match &info.base_state {
            None => wsm.materialize(store, &new_state, &info.path, is_main)?,
            Some(base) => self.apply_incremental(store, wsm, &info.path, base, &new_state, is_main)?,
        }

        self.clear_marker(name)?;
        info.base_state = Some(new_state);
        info.updated_at = now_secs();
        metadata::write(&meta_path, &info)?;
        Ok(())
    }

    fn apply_incremental(
        &self,
        store: &ContentStore,
        wsm: &WorldStateManager,
        workspace_path: &Path,
        base: &StateId,
        new_state: &StateId,
        is_main: bool,
    ) -> Result<()> {
        let diff = wsm.diff(store, base, new_state)?;
        for path in diff.removed.keys() {
            if is_main && path.starts_with(crate::worldstate::ignore::STORE_DIR_NAME) {
                continue;
            }
            let full = workspace_path.join(path);
            if full.exists() {
                std::fs::remove_file(&full).map_err(|e| io_failure("removing file", e))?;
            }
            remove_empty_ancestors(workspace_path, full.parent());
        }
        for (path, (hash, mode)) in diff.added.iter().chain(
            diff.modified
                .iter()
                .map(|(path, (_, after))| (path, after)),
        ) {
            if is_main && path.starts_with(crate::worldstate::ignore::STORE_DIR_NAME) {
                continue;
            }
            self.write_entry(store, workspace_path, path, hash, *mode)?;
        }
        Ok(())
    }

    fn write_entry(&self, store: &ContentStore, workspace_path: &Path, path: &str, hash: &crate::ids::Hash, mode: u32) -> Result<()> {
        let dest = workspace_path.join(path);
        if dest.is_dir() {
            std::fs::remove_dir_all(&dest).map_err(|e| io_failure("removing directory where file is needed", e))?;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_failure("creating parent directory", e))?;
        }
        let object = store.get(hash)?.ok_or_else(|| StrataError::Missing { hash: hash.clone() })?;
        std::fs::write(&dest, &object.payload).map_err(|e| io_failure("writing file", e))?;
        set_mode(&dest, mode);
        Ok(())
    }

    /// Destroys a workspace: removes its lock, metadata, and (for non-main
    /// workspaces) its directory.
    pub fn destroy(&self, name: &WorkspaceName) -> Result<()> {
        lock::release(&self.lockdir_path(name))?;
        let meta_path = self.metadata_path(name);
        if let Some(info) = metadata::read(&meta_path)? {
            if !info.is_main() && info.path.exists() {
                std::fs::remove_dir_all(&info.path).map_err(|e| io_failure("removing workspace directory", e))?;
            }
        }
        metadata::delete(&meta_path)
    }

    pub fn info(&self, name: &WorkspaceName) -> Result<Option<WorkspaceInfo>> {
        metadata::read(&self.metadata_path(name))
    }

    pub fn list(&self) -> Result<Vec<WorkspaceInfo>> {
        if !self.workspaces_dir.exists() {
            return Ok(vec![]);
        }
        let mut infos = Vec::new();
        for entry in std::fs::read_dir(&self.workspaces_dir).map_err(|e| io_failure("listing workspaces", e))? {
            let entry = entry.map_err(|e| io_failure("reading workspace entry", e))?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                // Corrupt metadata is logged and skipped from listings
                // rather than failing the whole listing.
                match metadata::read(&path) {
                    Ok(Some(info)) => infos.push(info),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping corrupt workspace metadata"),
                }
            }
        }
        infos.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        Ok(infos)
    }
}

fn remove_empty_ancestors(root: &Path, mut dir: Option<&Path>) {
    while let Some(d) = dir {
        if d == root {
            break;
        }
        if std::fs::read_dir(d).is_ok_and(|mut it| it.next().is_none()) {
            let _ = std::fs::remove_dir(d);
        } else {
            break;
        }
        dir = d.parent();
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

fn io_failure(context: &str, source: std::io::Error) -> StrataError {
    StrataError::IoFailure {
        context: context.to_owned(),
        source,
    }
}
