//! Top-level facade: ties [`ContentStore`], [`WorldStateManager`], and
//! [`WorkspaceManager`] together behind instance locking, config
//! validation, budget enforcement, promote, and GC.

pub mod config;
pub mod gc;
pub mod instance_lock;
pub mod promote;

use std::path::{Path, PathBuf};

use tracing::{instrument, warn};

use crate::error::{Result, StrataError};
use crate::ids::{AgentId, IntentId, LaneName, StateId, TransitionId, WorkspaceName};
use crate::model::intent::{Agent, Intent};
use crate::model::transition::{EvaluationResult, TransitionStatus};
use crate::model::workspace::{WorkspaceInfo, WorkspaceMode, MAIN_WORKSPACE};
use crate::model::{check_budget, CostRecord};
use crate::store::ContentStore;
use crate::worldstate::WorldStateManager;
use crate::workspace::WorkspaceManager;

const STORE_DIR_NAME: &str = ".store";

/// A fully opened repository: store, history, workspaces, and the
/// write-path guards (instance lock, budget, config) layered on top.
pub struct Repository {
    store_dir: PathBuf,
    store: ContentStore,
    wsm: WorldStateManager,
    workspaces: WorkspaceManager,
    config: config::RepoConfig,
}

impl Repository {
    /// Walks upward from `start` looking for a `.store` directory, opening
    /// the repository rooted there. Raises `NotARepository` if none found.
    pub fn discover(start: &Path) -> Result<Self> {
        let mut dir = start.to_path_buf();
        loop {
            if dir.join(STORE_DIR_NAME).is_dir() {
                return Self::open(&dir);
            }
            if !dir.pop() {
                return Err(StrataError::NotARepository { start: start.to_path_buf() });
            }
        }
    }

    /// Opens a repository rooted at `root`, which must already contain a
    /// `.store` directory.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn open(root: &Path) -> Result<Self> {
        let store_dir = root.join(STORE_DIR_NAME);
        if !store_dir.is_dir() {
            return Err(StrataError::NotARepository { start: root.to_path_buf() });
        }
        let config = config::load(&store_dir.join("config.json"))?;
        instance_lock::acquire(&store_dir)?;

        let store = ContentStore::open(
            &store_dir.join("store.db"),
            Some(store_dir.join("blobs")),
            config.max_blob_size_u64(),
            config.blob_threshold_u64(),
        )?;
        let wsm = WorldStateManager::new(&store, config.max_tree_depth_u64())?;
        let workspaces = WorkspaceManager::new(root.to_path_buf(), store_dir.join("workspaces"), 0);

        Ok(Self { store_dir, store, wsm, workspaces, config })
    }

    /// Initializes a fresh repository at `root`: creates `.store`, writes
    /// default config, and registers the `main` workspace at the repo root.
    pub fn init(root: &Path) -> Result<Self> {
        let store_dir = root.join(STORE_DIR_NAME);
        if store_dir.is_dir() {
            return Err(StrataError::InvalidName {
                name: root.display().to_string(),
                reason: "a .store directory already exists here".to_owned(),
            });
        }
        std::fs::create_dir_all(root).map_err(|e| io_failure("creating repository root", e))?;
        let mut config = config::RepoConfig::default();
        config.created_at = crate::store::now_secs();
        config::save(&store_dir.join("config.json"), &config)?;

        let repo = Self::open(root)?;
        let lane = LaneName::new(repo.config.default_lane.clone())?;
        repo.wsm.create_lane(&repo.store, lane.clone(), None)?;
        repo.workspaces.create(
            &repo.store,
            &repo.wsm,
            WorkspaceName::new(MAIN_WORKSPACE)?,
            lane,
            None,
            None,
            WorkspaceMode::Persistent,
        )?;
        Ok(repo)
    }

    #[must_use]
    pub const fn config(&self) -> &config::RepoConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &ContentStore {
        &self.store
    }

    #[must_use]
    pub const fn world_state(&self) -> &WorldStateManager {
        &self.wsm
    }

    #[must_use]
    pub const fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    fn reverify_lock(&self) -> Result<()> {
        instance_lock::reverify(&self.store_dir)
    }

    /// Snapshots the named workspace's current contents.
    pub fn snapshot(&self, workspace: &WorkspaceName, parent: Option<StateId>) -> Result<StateId> {
        self.reverify_lock()?;
        let path = self.workspaces.path_for(workspace);
        self.wsm.snapshot(&self.store, &path, parent)
    }

    /// Records an intent and a proposed transition, after checking the
    /// additional cost against the lane's accumulated spend and budget.
    #[instrument(skip(self, intent))]
    pub fn propose(
        &self,
        from: Option<StateId>,
        to: StateId,
        intent: Intent,
        lane: LaneName,
        cost: CostRecord,
    ) -> Result<TransitionId> {
        self.reverify_lock()?;
        if let Some(existing) = self.wsm.get_lane(&self.store, &lane)? {
            match check_budget(&existing.budget, &existing.spent, &cost) {
                Ok(warnings) => {
                    for w in warnings {
                        warn!(lane = %lane, dimension = w.dimension, limit = w.limit, would_be = w.would_be, "approaching lane budget");
                    }
                }
                Err(exceeded) => {
                    return Err(StrataError::BudgetExceeded {
                        lane,
                        dimension: exceeded.dimension.to_owned(),
                        limit: exceeded.limit,
                        would_be: exceeded.would_be,
                    });
                }
            }
        }
        self.wsm.propose(&self.store, from, to, intent, lane, cost)
    }

    /// Applies an evaluation verdict. On an accept whose intent carries the
    /// promote tag, also advances the source lane's `fork_base` so future
    /// promotes compute minimal deltas; failure of that secondary update is
    /// logged but not fatal.
    #[instrument(skip(self, result))]
    pub fn accept(&self, transition_id: &TransitionId, result: EvaluationResult) -> Result<TransitionStatus> {
        self.reverify_lock()?;
        let status = self.wsm.evaluate(&self.store, transition_id, result)?;
        if status == TransitionStatus::Accepted {
            self.advance_fork_base_if_promote(transition_id);
        }
        Ok(status)
    }

    fn advance_fork_base_if_promote(&self, transition_id: &TransitionId) {
        let Ok(Some(intent_id)) = self.wsm.get_transition_intent_id(&self.store, transition_id) else { return };
        let Ok(Some(intent)) = self.wsm.get_intent(&self.store, &intent_id) else { return };
        let Some(source_lane) = intent.promoted_from_lane() else { return };
        if let Ok(Some(to_state)) = self.transition_to_state(transition_id) {
            if let Err(e) = self.wsm.set_lane_fork_base(&self.store, &source_lane, &to_state) {
                warn!(lane = %source_lane, error = %e, "failed to advance source lane fork_base after promote accept");
            }
        }
    }

    fn transition_to_state(&self, transition_id: &TransitionId) -> Result<Option<StateId>> {
        let s: Option<String> = self
            .store
            .connection()
            .query_row("SELECT to_state FROM transitions WHERE id = ?1", rusqlite::params![transition_id.as_str()], |r| r.get(0))
            .ok();
        Ok(s.and_then(|s| s.parse().ok()))
    }

    /// Rejects a proposed transition outright with `summary`.
    pub fn reject(&self, transition_id: &TransitionId, summary: impl Into<String>) -> Result<TransitionStatus> {
        self.reverify_lock()?;
        self.wsm.evaluate(&self.store, transition_id, EvaluationResult::failed(summary))
    }

    /// Moves `source_workspace`'s work into `target_lane`. See
    /// [`promote::promote`] for the algorithm.
    pub fn promote(
        &self,
        source_workspace: &WorkspaceName,
        target_lane: &LaneName,
        agent_id: AgentId,
        force: bool,
    ) -> Result<promote::PromoteOutcome> {
        self.reverify_lock()?;
        let info = self
            .workspaces
            .info(source_workspace)?
            .ok_or_else(|| StrataError::NotFound { kind: "workspace".to_owned(), id: source_workspace.to_string() })?;
        let agent = Agent::new(agent_id, "promote");
        promote::promote(&self.store, &self.wsm, &info.path, &info.lane, target_lane, agent, force)
    }

    /// Restores a workspace to `state`, delegating to
    /// [`WorkspaceManager::update`].
    pub fn restore(&self, workspace: &WorkspaceName, state: StateId) -> Result<()> {
        self.reverify_lock()?;
        self.workspaces.update(&self.store, &self.wsm, workspace, state)
    }

    /// Runs a garbage collection pass.
    pub fn gc(&self, rejected_max_age_secs: u64, dry_run: bool) -> Result<gc::GcReport> {
        gc::run(&self.store, rejected_max_age_secs, dry_run)
    }

    /// Lists known workspaces.
    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceInfo>> {
        self.workspaces.list()
    }

    /// Runs every evaluator configured in `.store/config.json` against
    /// `workspace`'s materialized contents.
    pub fn evaluate_workspace(&self, workspace: &WorkspaceName) -> Result<EvaluationResult> {
        let info = self
            .workspaces
            .info(workspace)?
            .ok_or_else(|| StrataError::NotFound { kind: "workspace".to_owned(), id: workspace.to_string() })?;
        crate::evaluator::run_all(&self.config.evaluators, &info.path)
    }

    /// The directory templates are stored under.
    fn templates_dir(&self) -> PathBuf {
        self.store_dir.join("templates")
    }

    /// Stamps a saved template into `workspace`'s materialized directory.
    pub fn apply_template(&self, workspace: &WorkspaceName, template_name: &str) -> Result<()> {
        let info = self
            .workspaces
            .info(workspace)?
            .ok_or_else(|| StrataError::NotFound { kind: "workspace".to_owned(), id: workspace.to_string() })?;
        let template = crate::template::load(&self.templates_dir(), template_name)?
            .ok_or_else(|| StrataError::NotFound { kind: "template".to_owned(), id: template_name.to_owned() })?;
        crate::template::apply(&template, &info.path, Some(&self.store))
    }

    /// Saves a template definition for later [`Self::apply_template`] calls.
    pub fn save_template(&self, template: &crate::template::Template) -> Result<()> {
        crate::template::save(&self.templates_dir(), template)
    }

    /// Lists saved templates.
    pub fn list_templates(&self) -> Result<Vec<crate::template::Template>> {
        crate::template::list(&self.templates_dir())
    }

    /// Deletes a saved template by name. Returns `true` if one was removed.
    pub fn delete_template(&self, name: &str) -> Result<bool> {
        crate::template::delete(&self.templates_dir(), name)
    }

    /// Records a vector embedding for an intent, for later
    /// [`Self::search_similar_intents`] queries.
    pub fn embed_intent(&self, intent_id: &IntentId, vector: &[f32], model: &str) -> Result<()> {
        self.wsm.put_embedding(&self.store, intent_id, vector, model)
    }

    /// Finds intents whose embeddings are most similar to `query_vector`.
    pub fn search_similar_intents(&self, query_vector: &[f32], limit: usize) -> Result<Vec<(Intent, f32)>> {
        self.wsm.query_similar_intents(&self.store, query_vector, limit)
    }
}

fn io_failure(context: &str, source: std::io::Error) -> StrataError {
    StrataError::IoFailure {
        context: context.to_owned(),
        source,
    }
}
