//! The promote algorithm: moves a lane's work into a target lane using
//! path-level conflict detection, never a three-way content merge.

use std::path::Path;

use crate::error::{PathConflict, Result, StrataError};
use crate::ids::{IntentId, LaneName, StateId};
use crate::model::intent::{Agent, Intent};
use crate::model::CostRecord;
use crate::store::{now_secs, ContentStore};
use crate::worldstate::WorldStateManager;

/// What happened when promoting a workspace into a target lane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromoteOutcome {
    /// The workspace was rebased (or fast-pathed) onto the target and a new
    /// transition was proposed.
    Proposed(crate::ids::TransitionId),
    /// Path-level conflicts were detected and nothing was changed.
    Conflicts(Vec<PathConflict>),
}

/// Moves `workspace_path` (whose lane is `source_lane`) into `target_lane`.
///
/// `force` skips conflict detection and rebases onto the target regardless
/// of overlap — the caller accepts that paths touched by both sides will
/// end up holding the target's version, never a merge.
#[allow(clippy::too_many_arguments)]
pub fn promote(
    store: &ContentStore,
    wsm: &WorldStateManager,
    workspace_path: &Path,
    source_lane: &LaneName,
    target_lane: &LaneName,
    agent: Agent,
    force: bool,
) -> Result<PromoteOutcome> {
    let target_head = wsm.get_lane_head(store, target_lane)?.ok_or_else(|| StrataError::NotFound {
        kind: "lane head".to_owned(),
        id: target_lane.to_string(),
    })?;
    let fork_base = wsm.get_lane_fork_base(store, source_lane)?.ok_or_else(|| StrataError::NotFound {
        kind: "lane fork_base".to_owned(),
        id: source_lane.to_string(),
    })?;

    // Fast path: the source lane has not diverged from the target since it
    // forked, so the workspace's own content is already a clean successor.
    if fork_base == target_head {
        let state = wsm.snapshot(store, workspace_path, Some(target_head.clone()))?;
        return propose_promotion(store, wsm, state, source_lane, target_lane, agent).map(PromoteOutcome::Proposed);
    }

    let lane_head = wsm.snapshot(store, workspace_path, Some(fork_base.clone()))?;
    let lane_delta = wsm.diff(store, &fork_base, &lane_head)?;
    let target_delta = wsm.diff(store, &fork_base, &target_head)?;

    let lane_paths: std::collections::HashSet<&str> = lane_delta.touched_paths().collect();
    let conflicts: Vec<PathConflict> = target_delta
        .touched_paths()
        .filter(|p| lane_paths.contains(p))
        .map(|path| PathConflict {
            path: path.to_owned(),
            lane_action: action_on(&lane_delta, path),
            target_action: action_on(&target_delta, path),
        })
        .collect();

    if !conflicts.is_empty() && !force {
        return Ok(PromoteOutcome::Conflicts(conflicts));
    }

    apply_delta(store, workspace_path, &target_delta)?;
    let rebased = wsm.snapshot(store, workspace_path, Some(target_head))?;
    propose_promotion(store, wsm, rebased, source_lane, target_lane, agent).map(PromoteOutcome::Proposed)
}

fn action_on(delta: &crate::worldstate::DiffResult, path: &str) -> String {
    if delta.added.contains_key(path) {
        "added".to_owned()
    } else if delta.removed.contains_key(path) {
        "removed".to_owned()
    } else {
        "modified".to_owned()
    }
}

fn apply_delta(store: &ContentStore, workspace_path: &Path, delta: &crate::worldstate::DiffResult) -> Result<()> {
    for path in delta.removed.keys() {
        let full = workspace_path.join(path);
        if full.exists() {
            std::fs::remove_file(&full).map_err(|e| io_failure("removing path during rebase", e))?;
        }
    }
    for (path, (hash, mode)) in delta.added.iter().chain(delta.modified.iter().map(|(p, (_, after))| (p, after))) {
        let dest = workspace_path.join(path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_failure("creating directory during rebase", e))?;
        }
        let object = store.get(hash)?.ok_or_else(|| StrataError::Missing { hash: hash.clone() })?;
        std::fs::write(&dest, &object.payload).map_err(|e| io_failure("writing file during rebase", e))?;
        set_mode(&dest, *mode);
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

fn propose_promotion(
    store: &ContentStore,
    wsm: &WorldStateManager,
    state: StateId,
    source_lane: &LaneName,
    target_lane: &LaneName,
    agent: Agent,
) -> Result<crate::ids::TransitionId> {
    let from = wsm.get_lane_head(store, target_lane)?;
    let intent = Intent {
        id: IntentId::generate(),
        prompt: format!("promote into {target_lane}"),
        agent,
        context_refs: vec![],
        tags: vec![Intent::PROMOTE_TAG.to_owned(), Intent::from_lane_tag(source_lane)],
        metadata: serde_json::Value::Null,
        created_at: now_secs(),
    };
    wsm.propose(store, from, state, intent, target_lane.clone(), CostRecord::default())
}

fn io_failure(context: &str, source: std::io::Error) -> StrataError {
    StrataError::IoFailure {
        context: context.to_owned(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::AgentId;
    use crate::model::transition::EvaluationResult;

    fn env() -> (ContentStore, WorldStateManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(&dir.path().join("store.db"), Some(dir.path().join("blobs")), 0, 0).unwrap();
        let wsm = WorldStateManager::new(&store, 0).unwrap();
        (store, wsm, dir)
    }

    fn agent() -> Agent {
        Agent::new(AgentId::new("agent-1").unwrap(), "coding")
    }

    #[test]
    fn clean_promote_merges_both_sides_additions() {
        let (store, wsm, dir) = env();
        let main = LaneName::new("main").unwrap();
        let feat = LaneName::new("feat").unwrap();

        let repo = dir.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        std::fs::write(repo.join("main.py"), b"m").unwrap();
        std::fs::write(repo.join("util.py"), b"u").unwrap();
        let initial = wsm.snapshot(&store, &repo, None).unwrap();
        wsm.create_lane(&store, main.clone(), Some(initial.clone())).unwrap();
        wsm.create_lane(&store, feat.clone(), Some(initial.clone())).unwrap();
        let t0 = wsm.propose(&store, None, initial.clone(), sample_intent(), main.clone(), CostRecord::default()).unwrap();
        wsm.evaluate(&store, &t0, EvaluationResult::passed("ok")).unwrap();

        let feat_ws = dir.path().join("feat_ws");
        std::fs::create_dir_all(&feat_ws).unwrap();
        std::fs::write(feat_ws.join("main.py"), b"m").unwrap();
        std::fs::write(feat_ws.join("util.py"), b"u").unwrap();
        std::fs::write(feat_ws.join("auth.py"), b"a").unwrap();

        std::fs::write(repo.join("README.md"), b"r").unwrap();
        let main_with_readme = wsm.snapshot(&store, &repo, Some(initial)).unwrap();
        let t1 = wsm.propose(&store, Some(t0_to_state(&wsm, &store, &main)), main_with_readme, sample_intent(), main.clone(), CostRecord::default()).unwrap();
        wsm.evaluate(&store, &t1, EvaluationResult::passed("ok")).unwrap();

        let outcome = promote(&store, &wsm, &feat_ws, &feat, &main, agent(), false).unwrap();
        let PromoteOutcome::Proposed(transition) = outcome else { panic!("expected a clean promote") };
        wsm.evaluate(&store, &transition, EvaluationResult::passed("ok")).unwrap();

        let head = wsm.get_lane_head(&store, &main).unwrap().unwrap();
        let flat = wsm.flatten_state(&store, &head).unwrap();
        for name in ["main.py", "util.py", "auth.py", "README.md"] {
            assert!(flat.contains_key(name), "missing {name}");
        }
    }

    #[test]
    fn conflicting_promote_reports_path_and_leaves_target_untouched() {
        let (store, wsm, dir) = env();
        let main = LaneName::new("main").unwrap();
        let feat = LaneName::new("feat").unwrap();

        let repo = dir.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        std::fs::write(repo.join("main.py"), b"original").unwrap();
        let initial = wsm.snapshot(&store, &repo, None).unwrap();
        wsm.create_lane(&store, main.clone(), Some(initial.clone())).unwrap();
        wsm.create_lane(&store, feat.clone(), Some(initial.clone())).unwrap();

        let feat_ws = dir.path().join("feat_ws");
        std::fs::create_dir_all(&feat_ws).unwrap();
        std::fs::write(feat_ws.join("main.py"), b"from feat").unwrap();

        std::fs::write(repo.join("main.py"), b"from main").unwrap();
        let main_modified = wsm.snapshot(&store, &repo, Some(initial.clone())).unwrap();
        let t1 = wsm.propose(&store, Some(initial), main_modified, sample_intent(), main.clone(), CostRecord::default()).unwrap();
        wsm.evaluate(&store, &t1, EvaluationResult::passed("ok")).unwrap();

        let before_head = wsm.get_lane_head(&store, &main).unwrap();
        let outcome = promote(&store, &wsm, &feat_ws, &feat, &main, agent(), false).unwrap();
        let PromoteOutcome::Conflicts(conflicts) = outcome else { panic!("expected a conflict report") };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "main.py");
        assert_eq!(conflicts[0].lane_action, "modified");
        assert_eq!(conflicts[0].target_action, "modified");
        assert_eq!(wsm.get_lane_head(&store, &main).unwrap(), before_head);
    }

    fn t0_to_state(wsm: &WorldStateManager, store: &ContentStore, lane: &LaneName) -> StateId {
        wsm.get_lane_head(store, lane).unwrap().unwrap()
    }

    fn sample_intent() -> Intent {
        Intent {
            id: IntentId::generate(),
            prompt: "setup".to_owned(),
            agent: agent(),
            context_refs: vec![],
            tags: vec![],
            metadata: serde_json::Value::Null,
            created_at: now_secs(),
        }
    }
}
