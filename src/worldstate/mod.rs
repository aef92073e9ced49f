//! Builds states from directories, records the history graph, serves
//! queries over it.

pub mod embedding;
pub mod ignore;

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{OptionalExtension, params};
use tracing::{instrument, warn};

use crate::error::{Result, StrataError};
use crate::ids::{AgentId, Hash, IntentId, LaneName, StateId, TransitionId};
use crate::model::intent::{Agent, Intent};
use crate::model::lane::Lane;
use crate::model::transition::{EvaluationResult, Transition, TransitionStatus};
use crate::model::tree::{EntryKind, TreeEntry};
use crate::model::{BudgetConfig, CostRecord};
use crate::serializable::state_payload;
use crate::store::{ContentStore, now_secs};

/// Default cap on directory nesting during snapshot and materialize.
pub const DEFAULT_MAX_TREE_DEPTH: u64 = 100;

/// Flattened `path → (blob_hash, mode)` view of a tree, used by diff and
/// materialize.
pub type FlatTree = BTreeMap<String, (Hash, u32)>;

/// The result of comparing two states path-by-path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub added: BTreeMap<String, (Hash, u32)>,
    pub removed: BTreeMap<String, (Hash, u32)>,
    /// `(before, after)` per modified path.
    pub modified: BTreeMap<String, ((Hash, u32), (Hash, u32))>,
    pub unchanged_count: usize,
}

impl DiffResult {
    /// All paths touched by this diff, across added/removed/modified.
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        self.added.keys().chain(self.removed.keys()).chain(self.modified.keys()).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Builds states, records history, and serves the query surface over it.
pub struct WorldStateManager {
    max_tree_depth: u64,
}

impl WorldStateManager {
    /// Opens the manager, creating its tables in `store`'s database if
    /// absent.
    pub fn new(store: &ContentStore, max_tree_depth: u64) -> Result<Self> {
        let depth = if max_tree_depth == 0 { DEFAULT_MAX_TREE_DEPTH } else { max_tree_depth };
        let conn = store.connection();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS states (
                id TEXT PRIMARY KEY,
                root_tree TEXT NOT NULL,
                parent_id TEXT,
                created_at REAL NOT NULL,
                nonce TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_states_parent ON states(parent_id);
            CREATE TABLE IF NOT EXISTS intents (
                id TEXT PRIMARY KEY,
                prompt TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                agent_type TEXT NOT NULL,
                agent_model TEXT,
                agent_session_id TEXT,
                context_refs TEXT NOT NULL DEFAULT '[]',
                tags TEXT NOT NULL DEFAULT '[]',
                metadata TEXT NOT NULL DEFAULT 'null',
                created_at REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS transitions (
                id TEXT PRIMARY KEY,
                from_state TEXT,
                to_state TEXT NOT NULL,
                intent_id TEXT NOT NULL,
                lane TEXT NOT NULL,
                status TEXT NOT NULL,
                evaluation TEXT,
                cost TEXT NOT NULL DEFAULT '{}',
                created_at REAL NOT NULL,
                updated_at REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_transitions_lane ON transitions(lane);
            CREATE INDEX IF NOT EXISTS idx_transitions_to_state ON transitions(to_state);
            CREATE TABLE IF NOT EXISTS lanes (
                name TEXT PRIMARY KEY,
                head_state TEXT,
                fork_base TEXT,
                created_at REAL NOT NULL,
                budget TEXT NOT NULL DEFAULT '{}',
                spent TEXT NOT NULL DEFAULT '{}'
            );",
        )?;
        embedding::init_table(conn)?;
        Ok(Self { max_tree_depth: depth })
    }

    #[must_use]
    pub const fn max_tree_depth(&self) -> u64 {
        self.max_tree_depth
    }

    // ---- snapshot ----------------------------------------------------

    /// Hashes `root` into a tree and wraps it in a freshly created state,
    /// all inside one store-level batch.
    #[instrument(skip(self, store), fields(root = %root.display()))]
    pub fn snapshot(&self, store: &ContentStore, root: &Path, parent: Option<StateId>) -> Result<StateId> {
        let patterns = ignore::load_patterns(root).map_err(|e| io_failure("reading ignore file", e))?;
        store.batch(|s| {
            let root_tree = self.hash_directory(s, root, root, &patterns, 0)?;
            self.create_state(s, root_tree, parent.clone())
        })
    }

    fn hash_directory(&self, store: &ContentStore, dir: &Path, root: &Path, patterns: &[ignore::Pattern], depth: u64) -> Result<Hash> {
        if depth >= self.max_tree_depth {
            return Err(StrataError::LimitExceeded {
                what: "tree depth".to_owned(),
                limit: self.max_tree_depth,
                actual: depth,
            });
        }
        let mut read_entries: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| io_failure("reading directory", e))?
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| io_failure("reading directory entry", e))?;
        read_entries.sort_by_key(std::fs::DirEntry::file_name);

        let mut entries = Vec::new();
        for entry in read_entries {
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| io_failure("reading file type", e))?;
            if file_type.is_symlink() {
                continue;
            }
            let rel = relative_slash_path(root, &path);
            let is_dir = file_type.is_dir();
            if ignore::is_ignored(patterns, &rel, is_dir) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_dir {
                let child = self.hash_directory(store, &path, root, patterns, depth + 1)?;
                entries.push(TreeEntry::new(name, EntryKind::Tree, child, Some(dir_mode(&path)?)));
            } else {
                let meta = std::fs::symlink_metadata(&path).map_err(|e| io_failure("stat'ing file", e))?;
                let mtime_ns = mtime_ns(&meta);
                #[allow(clippy::cast_possible_wrap)]
                let size = meta.len() as i64;
                let hash = match store.stat_cache_lookup(&rel, mtime_ns, size)? {
                    Some(h) if store.exists(&h)? => h,
                    _ => {
                        let bytes = std::fs::read(&path).map_err(|e| io_failure("reading file", e))?;
                        let h = store.put(&bytes, crate::model::object::ObjectKind::Blob)?;
                        store.stat_cache_put(&rel, mtime_ns, size, &h)?;
                        h
                    }
                };
                entries.push(TreeEntry::new(name, EntryKind::Blob, hash, Some(file_mode(&meta))));
            }
        }
        store.store_tree(&mut entries)
    }

    /// Computes the state hash over `(root_tree, parent, now, nonce)` and
    /// records the state row. Idempotent: inserting the same id twice is a
    /// no-op.
    pub fn create_state(&self, store: &ContentStore, root_tree: Hash, parent: Option<StateId>) -> Result<StateId> {
        let created_at = now_secs();
        #[allow(clippy::cast_possible_truncation)]
        let nonce = format!("{:032x}", rand::random::<u128>());
        let parent_str = parent.as_ref().map(StateId::to_string);
        let payload = state_payload(root_tree.as_str(), parent_str.as_deref(), created_at, &nonce);
        let id = StateId::from_hash(Hash::digest("state", &payload));
        store.connection().execute(
            "INSERT OR IGNORE INTO states (id, root_tree, parent_id, created_at, nonce) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id.to_string(), root_tree.as_str(), parent_str, created_at, nonce],
        )?;
        Ok(id)
    }

    /// Fetches a state's full record: `(root_tree, parent_id, created_at)`.
    pub fn get_state(&self, store: &ContentStore, state: &StateId) -> Result<Option<(Hash, Option<StateId>, f64)>> {
        let row: Option<(String, Option<String>, f64)> = store
            .connection()
            .query_row(
                "SELECT root_tree, parent_id, created_at FROM states WHERE id = ?1",
                params![state.to_string()],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((root_tree, parent_id, created_at)) = row else { return Ok(None) };
        let root_tree = Hash::new(root_tree)?;
        let parent = parent_id.and_then(|p| p.parse().ok());
        Ok(Some((root_tree, parent, created_at)))
    }

    /// Fetches a state's `root_tree` hash.
    pub fn root_tree_of(&self, store: &ContentStore, state: &StateId) -> Result<Hash> {
        let s: String = store
            .connection()
            .query_row("SELECT root_tree FROM states WHERE id = ?1", params![state.to_string()], |r| r.get(0))
            .optional()?
            .ok_or_else(|| StrataError::NotFound {
                kind: "state".to_owned(),
                id: state.to_string(),
            })?;
        Hash::new(s).map_err(StrataError::from)
    }

    // ---- intents & transitions ----------------------------------------

    /// Records an intent, a proposed transition, and (if absent) the lane
    /// it targets.
    #[instrument(skip(self, store, intent))]
    pub fn propose(
        &self,
        store: &ContentStore,
        from: Option<StateId>,
        to: StateId,
        intent: Intent,
        lane: LaneName,
        cost: CostRecord,
    ) -> Result<TransitionId> {
        store.batch(|s| {
            self.insert_intent(s, &intent)?;
            let id = TransitionId::generate();
            let now = now_secs();
            s.connection().execute(
                "INSERT INTO transitions (id, from_state, to_state, intent_id, lane, status, cost, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.as_str(),
                    from.as_ref().map(StateId::to_string),
                    to.to_string(),
                    intent.id.as_str(),
                    lane.to_string(),
                    TransitionStatus::Proposed.as_str(),
                    serde_json::to_string(&cost).unwrap_or_else(|_| "{}".to_owned()),
                    now,
                    now,
                ],
            )?;
            s.connection().execute(
                "INSERT OR IGNORE INTO lanes (name, head_state, fork_base, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![lane.to_string(), from.as_ref().map(StateId::to_string), from.as_ref().map(StateId::to_string), now],
            )?;
            Ok(id)
        })
    }

    fn insert_intent(&self, store: &ContentStore, intent: &Intent) -> Result<()> {
        store.connection().execute(
            "INSERT OR IGNORE INTO intents
             (id, prompt, agent_id, agent_type, agent_model, agent_session_id, context_refs, tags, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                intent.id.as_str(),
                intent.prompt,
                intent.agent.agent_id.as_str(),
                intent.agent.agent_type,
                intent.agent.model,
                intent.agent.session_id,
                serde_json::to_string(&intent.context_refs).unwrap_or_else(|_| "[]".to_owned()),
                serde_json::to_string(&intent.tags).unwrap_or_else(|_| "[]".to_owned()),
                serde_json::to_string(&intent.metadata).unwrap_or_else(|_| "null".to_owned()),
                intent.created_at,
            ],
        )?;
        Ok(())
    }

    /// Applies an evaluation verdict to a proposed transition.
    ///
    /// Implements the stale-accept rule: if the verdict passed but the
    /// lane head has moved since the transition's `from_state`, the verdict
    /// is downgraded to `rejected` with an explanatory summary rather than
    /// silently overwriting a lane that another accept already advanced.
    #[instrument(skip(self, store, result))]
    pub fn evaluate(&self, store: &ContentStore, transition_id: &TransitionId, result: EvaluationResult) -> Result<TransitionStatus> {
        store.batch(|s| {
            let (from_state, to_state, lane, intent_id, status): (Option<String>, String, String, String, String) = s
                .connection()
                .query_row(
                    "SELECT from_state, to_state, lane, intent_id, status FROM transitions WHERE id = ?1",
                    params![transition_id.as_str()],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
                )
                .optional()?
                .ok_or_else(|| StrataError::NotFound {
                    kind: "transition".to_owned(),
                    id: transition_id.to_string(),
                })?;
            let current_status: TransitionStatus = status.parse()?;
            if current_status != TransitionStatus::Proposed {
                return Err(StrataError::ConfigInvalid {
                    path: std::path::PathBuf::from("<transitions table>"),
                    detail: format!("transition '{transition_id}' is not proposed (status: {current_status})"),
                });
            }
            let lane_name: LaneName = lane.parse()?;
            let mut final_result = result;
            let mut final_status = if final_result.passed { TransitionStatus::Accepted } else { TransitionStatus::Rejected };

            if final_result.passed {
                let current_head = self.get_lane_head(s, &lane_name)?;
                if current_head.as_ref().map(StateId::to_string) != from_state {
                    let expected = from_state.clone().unwrap_or_else(|| "<none>".to_owned());
                    let actual = current_head.as_ref().map_or_else(|| "<none>".to_owned(), StateId::to_string);
                    warn!(lane = %lane_name, expected = %expected, actual = %actual, "stale accept: lane head moved, downgrading to rejected");
                    final_status = TransitionStatus::Rejected;
                    final_result = EvaluationResult::failed(format!(
                        "stale: lane head moved to {actual} (expected {expected}). Re-propose from current head."
                    ));
                }
            }

            let now = now_secs();
            s.connection().execute(
                "UPDATE transitions SET status = ?1, evaluation = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    final_status.as_str(),
                    serde_json::to_string(&final_result).unwrap_or_else(|_| "null".to_owned()),
                    now,
                    transition_id.as_str()
                ],
            )?;

            if final_status == TransitionStatus::Accepted {
                s.connection().execute(
                    "UPDATE lanes SET head_state = ?1 WHERE name = ?2",
                    params![to_state, lane],
                )?;
                let cost: CostRecord = s
                    .connection()
                    .query_row("SELECT cost FROM transitions WHERE id = ?1", params![transition_id.as_str()], |r| r.get::<_, String>(0))
                    .ok()
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_default();
                self.fold_lane_spend(s, &lane_name, &cost)?;
            }
            let _ = intent_id;
            Ok(final_status)
        })
    }

    fn fold_lane_spend(&self, store: &ContentStore, lane: &LaneName, cost: &CostRecord) -> Result<()> {
        if let Some(existing) = self.get_lane(store, lane)? {
            let spent = existing.spent.plus(cost);
            store.connection().execute(
                "UPDATE lanes SET spent = ?1 WHERE name = ?2",
                params![serde_json::to_string(&spent).unwrap_or_default(), lane.to_string()],
            )?;
        }
        Ok(())
    }

    /// Fetches a single intent by id.
    pub fn get_intent(&self, store: &ContentStore, id: &IntentId) -> Result<Option<Intent>> {
        store
            .connection()
            .query_row(
                "SELECT id, prompt, agent_id, agent_type, agent_model, agent_session_id, context_refs, tags, metadata, created_at
                 FROM intents WHERE id = ?1",
                params![id.as_str()],
                row_to_intent,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Fetches a single transition by id.
    pub fn get_transition(&self, store: &ContentStore, transition_id: &TransitionId) -> Result<Option<Transition>> {
        store
            .connection()
            .query_row(
                "SELECT id, from_state, to_state, intent_id, lane, status, evaluation, cost, created_at, updated_at
                 FROM transitions WHERE id = ?1",
                params![transition_id.as_str()],
                row_to_transition,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Lists every transition recorded against `lane`, most recently
    /// updated first.
    pub fn list_transitions_for_lane(&self, store: &ContentStore, lane: &LaneName) -> Result<Vec<Transition>> {
        let mut stmt = store.connection().prepare(
            "SELECT id, from_state, to_state, intent_id, lane, status, evaluation, cost, created_at, updated_at
             FROM transitions WHERE lane = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![lane.to_string()], row_to_transition)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Fetches a transition's recorded intent id.
    pub fn get_transition_intent_id(&self, store: &ContentStore, transition_id: &TransitionId) -> Result<Option<IntentId>> {
        let id: Option<String> = store
            .connection()
            .query_row("SELECT intent_id FROM transitions WHERE id = ?1", params![transition_id.as_str()], |r| r.get(0))
            .optional()?;
        Ok(id.and_then(|s| s.parse().ok()))
    }

    /// Free-text search over intent prompts and tags (substring,
    /// case-insensitive).
    pub fn search_intents(&self, store: &ContentStore, query: &str) -> Result<Vec<Intent>> {
        let mut stmt = store.connection().prepare(
            "SELECT id, prompt, agent_id, agent_type, agent_model, agent_session_id, context_refs, tags, metadata, created_at FROM intents",
        )?;
        let rows = stmt.query_map([], row_to_intent)?;
        let mut matches = Vec::new();
        for row in rows {
            let intent = row?;
            if intent.matches(query) {
                matches.push(intent);
            }
        }
        Ok(matches)
    }

    /// Stores (or replaces) the embedding vector associated with an intent,
    /// for later [`Self::query_similar_intents`] lookups.
    pub fn put_embedding(&self, store: &ContentStore, intent_id: &IntentId, vector: &[f32], model: &str) -> Result<()> {
        embedding::put(store.connection(), intent_id, vector, model, now_secs())
    }

    /// Finds the intents whose stored embeddings are most similar to
    /// `query_vector` by cosine similarity, most similar first, truncated to
    /// `limit`.
    pub fn query_similar_intents(&self, store: &ContentStore, query_vector: &[f32], limit: usize) -> Result<Vec<(Intent, f32)>> {
        let matches = embedding::query(store.connection(), query_vector, limit)?;
        let mut results = Vec::with_capacity(matches.len());
        for (intent_id, score) in matches {
            if let Some(intent) = self.get_intent(store, &intent_id)? {
                results.push((intent, score));
            }
        }
        Ok(results)
    }

    // ---- lanes ----------------------------------------------------------

    /// Creates a lane with both head and fork base set to `base`.
    pub fn create_lane(&self, store: &ContentStore, name: LaneName, base: Option<StateId>) -> Result<Lane> {
        let lane = Lane::new(name, base, now_secs());
        store.connection().execute(
            "INSERT INTO lanes (name, head_state, fork_base, created_at, budget, spent) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                lane.name.to_string(),
                lane.head_state.as_ref().map(StateId::to_string),
                lane.fork_base.as_ref().map(StateId::to_string),
                lane.created_at,
                serde_json::to_string(&lane.budget).unwrap_or_default(),
                serde_json::to_string(&lane.spent).unwrap_or_default(),
            ],
        )?;
        Ok(lane)
    }

    /// Deletes a lane record. Does not touch states or transitions.
    pub fn delete_lane(&self, store: &ContentStore, name: &LaneName) -> Result<()> {
        store.connection().execute("DELETE FROM lanes WHERE name = ?1", params![name.to_string()])?;
        Ok(())
    }

    pub fn list_lanes(&self, store: &ContentStore) -> Result<Vec<Lane>> {
        let mut stmt = store
            .connection()
            .prepare("SELECT name, head_state, fork_base, created_at, budget, spent FROM lanes ORDER BY name")?;
        let rows = stmt.query_map([], row_to_lane)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn get_lane(&self, store: &ContentStore, name: &LaneName) -> Result<Option<Lane>> {
        store
            .connection()
            .query_row(
                "SELECT name, head_state, fork_base, created_at, budget, spent FROM lanes WHERE name = ?1",
                params![name.to_string()],
                row_to_lane,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn get_lane_head(&self, store: &ContentStore, name: &LaneName) -> Result<Option<StateId>> {
        Ok(self.get_lane(store, name)?.and_then(|l| l.head_state))
    }

    pub fn get_lane_fork_base(&self, store: &ContentStore, name: &LaneName) -> Result<Option<StateId>> {
        Ok(self.get_lane(store, name)?.and_then(|l| l.fork_base))
    }

    /// Advances a lane's fork base directly (used after a promote-tagged
    /// accept). Failure of the caller to call this is non-fatal by
    /// contract — documented at the call site in the repository facade.
    pub fn set_lane_fork_base(&self, store: &ContentStore, name: &LaneName, new_base: &StateId) -> Result<()> {
        let changed = store.connection().execute(
            "UPDATE lanes SET fork_base = ?1 WHERE name = ?2",
            params![new_base.to_string(), name.to_string()],
        )?;
        if changed == 0 {
            return Err(StrataError::NotFound {
                kind: "lane".to_owned(),
                id: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_lane_budget(&self, store: &ContentStore, name: &LaneName, budget: &BudgetConfig) -> Result<()> {
        store.connection().execute(
            "UPDATE lanes SET budget = ?1 WHERE name = ?2",
            params![serde_json::to_string(budget).unwrap_or_default(), name.to_string()],
        )?;
        Ok(())
    }

    // ---- diff / trace / materialize ------------------------------------

    /// Flattens both states' trees and computes path-level differences.
    pub fn diff(&self, store: &ContentStore, a: &StateId, b: &StateId) -> Result<DiffResult> {
        let tree_a = self.flatten_state(store, a)?;
        let tree_b = self.flatten_state(store, b)?;
        let mut result = DiffResult::default();
        for (path, entry_b) in &tree_b {
            match tree_a.get(path) {
                None => {
                    result.added.insert(path.clone(), entry_b.clone());
                }
                Some(entry_a) if entry_a != entry_b => {
                    result.modified.insert(path.clone(), (entry_a.clone(), entry_b.clone()));
                }
                Some(_) => result.unchanged_count += 1,
            }
        }
        for (path, entry_a) in &tree_a {
            if !tree_b.contains_key(path) {
                result.removed.insert(path.clone(), entry_a.clone());
            }
        }
        Ok(result)
    }

    /// Flattens a state's tree into `path → (blob_hash, mode)`.
    pub fn flatten_state(&self, store: &ContentStore, state: &StateId) -> Result<FlatTree> {
        let root = self.root_tree_of(store, state)?;
        let mut out = FlatTree::new();
        self.flatten_tree(store, &root, String::new(), &mut out, 0)?;
        Ok(out)
    }

    fn flatten_tree(&self, store: &ContentStore, tree_hash: &Hash, prefix: String, out: &mut FlatTree, depth: u64) -> Result<()> {
        if depth >= self.max_tree_depth {
            return Err(StrataError::LimitExceeded {
                what: "tree depth".to_owned(),
                limit: self.max_tree_depth,
                actual: depth,
            });
        }
        for entry in store.get_tree(tree_hash)? {
            let path = if prefix.is_empty() { entry.name.clone() } else { format!("{prefix}/{}", entry.name) };
            match entry.kind {
                EntryKind::Blob => {
                    out.insert(path, (entry.hash, entry.mode));
                }
                EntryKind::Tree => self.flatten_tree(store, &entry.hash, path, out, depth + 1)?,
            }
        }
        Ok(())
    }

    /// Walks `to_state` backwards through accepted transitions, bounded by
    /// `max_depth` entries (inclusive of `to_state`).
    pub fn trace(&self, store: &ContentStore, to_state: &StateId, max_depth: u64) -> Result<Vec<StateId>> {
        let mut chain = vec![to_state.clone()];
        let mut current = to_state.clone();
        while (chain.len() as u64) < max_depth {
            let from: Option<String> = store
                .connection()
                .query_row(
                    "SELECT from_state FROM transitions WHERE to_state = ?1 AND status = 'accepted' ORDER BY updated_at DESC LIMIT 1",
                    params![current.to_string()],
                    |r| r.get(0),
                )
                .optional()?;
            let Some(Some(from)) = from else { break };
            let id: StateId = from.parse()?;
            chain.push(id.clone());
            current = id;
        }
        Ok(chain)
    }

    /// Writes every file of `state`'s tree into `target_dir`. When
    /// `is_main` is set, any path beginning with the store directory name
    /// is skipped so materializing into the repository root never
    /// clobbers `.store`.
    #[instrument(skip(self, store), fields(target = %target_dir.display()))]
    pub fn materialize(&self, store: &ContentStore, state: &StateId, target_dir: &Path, is_main: bool) -> Result<()> {
        let flat = self.flatten_state(store, state)?;
        for (path, (hash, mode)) in flat {
            if is_main && path.starts_with(ignore::STORE_DIR_NAME) {
                continue;
            }
            let dest = target_dir.join(&path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_failure("creating directory", e))?;
            }
            let object = store.get(&hash)?.ok_or_else(|| StrataError::DanglingReference { hash: hash.clone(), state: Some(state.clone()) })?;
            write_atomic(&dest, &object.payload)?;
            set_mode(&dest, mode);
        }
        Ok(())
    }
}

fn row_to_intent(row: &rusqlite::Row<'_>) -> rusqlite::Result<Intent> {
    let id: String = row.get(0)?;
    let prompt: String = row.get(1)?;
    let agent_id: String = row.get(2)?;
    let agent_type: String = row.get(3)?;
    let agent_model: Option<String> = row.get(4)?;
    let agent_session_id: Option<String> = row.get(5)?;
    let context_refs: String = row.get(6)?;
    let tags: String = row.get(7)?;
    let metadata: String = row.get(8)?;
    let created_at: f64 = row.get(9)?;
    Ok(Intent {
        id: id.parse().unwrap_or_else(|_| IntentId::generate()),
        prompt,
        agent: Agent {
            agent_id: AgentId::new(agent_id).unwrap_or_else(|_| AgentId::new("unknown").expect("'unknown' is a valid agent id")),
            agent_type,
            model: agent_model,
            session_id: agent_session_id,
        },
        context_refs: serde_json::from_str(&context_refs).unwrap_or_default(),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        created_at,
    })
}

fn row_to_transition(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transition> {
    let id: String = row.get(0)?;
    let from_state: Option<String> = row.get(1)?;
    let to_state: String = row.get(2)?;
    let intent_id: String = row.get(3)?;
    let lane: String = row.get(4)?;
    let status: String = row.get(5)?;
    let evaluation: Option<String> = row.get(6)?;
    let cost: String = row.get(7)?;
    let created_at: f64 = row.get(8)?;
    let updated_at: f64 = row.get(9)?;
    Ok(Transition {
        id: id.parse().unwrap_or_else(|_| TransitionId::generate()),
        from_state: from_state.and_then(|s| s.parse().ok()),
        to_state: to_state.parse().unwrap_or_else(|_| StateId::from_hash(Hash::digest("state", b""))),
        intent_id: intent_id.parse().unwrap_or_else(|_| IntentId::generate()),
        lane: lane.parse().unwrap_or_else(|_| LaneName::new("main").expect("'main' is a valid lane name")),
        status: status.parse().unwrap_or(TransitionStatus::Proposed),
        evaluation: evaluation.and_then(|s| serde_json::from_str(&s).ok()),
        cost: serde_json::from_str(&cost).unwrap_or_default(),
        created_at,
        updated_at,
    })
}

fn row_to_lane(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lane> {
    let name: String = row.get(0)?;
    let head_state: Option<String> = row.get(1)?;
    let fork_base: Option<String> = row.get(2)?;
    let created_at: f64 = row.get(3)?;
    let budget: String = row.get(4)?;
    let spent: String = row.get(5)?;
    Ok(Lane {
        name: name.parse().unwrap_or_else(|_| LaneName::new("invalid").expect("'invalid' is a valid lane name")),
        head_state: head_state.and_then(|s| s.parse().ok()),
        fork_base: fork_base.and_then(|s| s.parse().ok()),
        created_at,
        budget: serde_json::from_str(&budget).unwrap_or_default(),
        spent: serde_json::from_str(&spent).unwrap_or_default(),
    })
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_meta: &std::fs::Metadata) -> u32 {
    crate::model::tree::DEFAULT_FILE_MODE
}

#[cfg(unix)]
fn dir_mode(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::symlink_metadata(path).map_err(|e| io_failure("stat'ing directory", e))?;
    Ok(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn dir_mode(_path: &Path) -> Result<u32> {
    Ok(crate::model::tree::DEFAULT_DIR_MODE)
}

#[cfg(unix)]
fn mtime_ns(meta: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    #[allow(clippy::cast_possible_wrap)]
    {
        meta.mtime() * 1_000_000_000 + i64::from(meta.mtime_nsec())
    }
}

#[cfg(not(unix))]
fn mtime_ns(meta: &std::fs::Metadata) -> i64 {
    meta.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map_or(0, |d| d.as_nanos() as i64)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    // Filesystems that reject chmod (e.g. some network mounts) should not
    // fail materialization; the write already succeeded.
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| io_failure("creating temp file", e))?;
    use std::io::Write;
    tmp.write_all(bytes).map_err(|e| io_failure("writing temp file", e))?;
    tmp.persist(dest).map_err(|e| io_failure("renaming temp file into place", e.error))?;
    Ok(())
}

fn io_failure(context: &str, source: std::io::Error) -> StrataError {
    StrataError::IoFailure {
        context: context.to_owned(),
        source,
    }
}
