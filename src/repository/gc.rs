//! Mark-and-sweep garbage collection.
//!
//! Runs entirely inside one write-transaction batch (SQLite's `BEGIN
//! IMMEDIATE` already gives the mark phase a consistent snapshot to read
//! against) and defers filesystem deletion until after that batch commits,
//! so a crash mid-sweep can only leak reclaimable `fs`-located blob files,
//! never lose a reachable one.

use std::collections::{HashSet, VecDeque};

use rusqlite::params;

use crate::error::Result;
use crate::ids::Hash;
use crate::model::tree::{EntryKind, decode_tree};
use crate::store::{ContentStore, now_secs};

/// Default age after which a `rejected`/`superseded` transition becomes
/// collectible, matching the workspace lock's default staleness window.
pub const DEFAULT_REJECTED_MAX_AGE_SECS: u64 = 4 * 3600;

/// Counts produced by a GC pass. In dry-run mode these are computed but
/// nothing is deleted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    pub objects_deleted: u64,
    pub bytes_reclaimed: u64,
    pub transitions_deleted: u64,
    pub intents_deleted: u64,
    pub states_deleted: u64,
    pub stat_cache_purged: u64,
}

/// Runs one GC pass. `rejected_max_age_secs` of `0` uses
/// [`DEFAULT_REJECTED_MAX_AGE_SECS`].
pub fn run(store: &ContentStore, rejected_max_age_secs: u64, dry_run: bool) -> Result<GcReport> {
    let threshold = if rejected_max_age_secs == 0 { DEFAULT_REJECTED_MAX_AGE_SECS } else { rejected_max_age_secs };
    let (report, fs_hashes) = store.batch(|s| run_locked(s, threshold, dry_run))?;
    // Filesystem payloads are only unlinked once the batch above has
    // committed, so a crash between the two can only leak reclaimable `fs`
    // files (cleaned up by a later GC) and never strands a DB row whose
    // backing file is already gone.
    for hash in &fs_hashes {
        if let Some(path) = store.blob_path(hash) {
            let _ = std::fs::remove_file(path);
        }
    }
    Ok(report)
}

fn run_locked(store: &ContentStore, threshold: u64, dry_run: bool) -> Result<(GcReport, Vec<Hash>)> {
    let conn = store.connection();
    let now = now_secs();

    // ---- mark ----------------------------------------------------------
    let mut live_states: HashSet<String> = HashSet::new();
    {
        let mut stmt = conn.prepare("SELECT head_state, fork_base FROM lanes")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let head: Option<String> = row.get(0)?;
            let base: Option<String> = row.get(1)?;
            live_states.extend(head);
            live_states.extend(base);
        }
    }
    {
        let mut stmt = conn.prepare("SELECT from_state, to_state, status, updated_at FROM transitions")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let from: Option<String> = row.get(0)?;
            let to: String = row.get(1)?;
            let status: String = row.get(2)?;
            let updated_at: f64 = row.get(3)?;
            let is_rejected_or_superseded = status == "rejected" || status == "superseded";
            let young_enough = now - updated_at < threshold as f64;
            if !is_rejected_or_superseded || young_enough {
                live_states.extend(from);
                live_states.insert(to);
            }
        }
    }
    // Walk parent chains backward to close the set transitively.
    let mut frontier: VecDeque<String> = live_states.iter().cloned().collect();
    while let Some(state_id) = frontier.pop_front() {
        let parent: Option<String> = conn
            .query_row("SELECT parent_id FROM states WHERE id = ?1", params![state_id], |r| r.get(0))
            .unwrap_or(None);
        if let Some(parent_id) = parent {
            if live_states.insert(parent_id.clone()) {
                frontier.push_back(parent_id);
            }
        }
    }

    // For each live state, recursively collect its root tree and every
    // blob/subtree it references.
    let mut reachable: HashSet<String> = HashSet::new();
    for state_id in &live_states {
        let root_tree: Option<String> = conn
            .query_row("SELECT root_tree FROM states WHERE id = ?1", params![state_id], |r| r.get(0))
            .unwrap_or(None);
        if let Some(root) = root_tree {
            collect_reachable(store, &root, &mut reachable)?;
        }
    }

    // ---- sweep -----------------------------------------------------------
    let mut deletable_objects: Vec<(Hash, u64)> = Vec::new();
    {
        let mut stmt = conn.prepare("SELECT hash, size FROM objects")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let hash: String = row.get(0)?;
            let size: i64 = row.get(1)?;
            if !reachable.contains(&hash) {
                if let Ok(h) = Hash::new(hash) {
                    #[allow(clippy::cast_sign_loss)]
                    deletable_objects.push((h, size as u64));
                }
            }
        }
    }

    let mut expired_transitions: Vec<String> = Vec::new();
    {
        let mut stmt = conn.prepare("SELECT id, status, updated_at FROM transitions")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let status: String = row.get(1)?;
            let updated_at: f64 = row.get(2)?;
            let is_rejected_or_superseded = status == "rejected" || status == "superseded";
            if is_rejected_or_superseded && now - updated_at >= threshold as f64 {
                expired_transitions.push(id);
            }
        }
    }

    let mut all_state_ids: Vec<String> = Vec::new();
    {
        let mut stmt = conn.prepare("SELECT id FROM states")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            all_state_ids.push(row.get(0)?);
        }
    }
    let deletable_states: Vec<String> = all_state_ids.into_iter().filter(|id| !live_states.contains(id)).collect();

    let bytes_reclaimed: u64 = deletable_objects.iter().map(|(_, size)| size).sum();
    let mut report = GcReport {
        objects_deleted: deletable_objects.len() as u64,
        bytes_reclaimed,
        transitions_deleted: expired_transitions.len() as u64,
        intents_deleted: 0,
        states_deleted: deletable_states.len() as u64,
        stat_cache_purged: 0,
    };

    if dry_run {
        return Ok((report, Vec::new()));
    }

    let hashes: Vec<Hash> = deletable_objects.iter().map(|(h, _)| h.clone()).collect();
    store.delete_objects(&hashes)?;
    report.stat_cache_purged = store.stat_cache_purge(&hashes)?;

    for id in &expired_transitions {
        conn.execute("DELETE FROM transitions WHERE id = ?1", params![id])?;
    }

    let intents_deleted = conn.execute(
        "DELETE FROM intents WHERE id NOT IN (SELECT intent_id FROM transitions)",
        [],
    )?;
    report.intents_deleted = intents_deleted as u64;

    for id in &deletable_states {
        conn.execute("DELETE FROM states WHERE id = ?1", params![id])?;
    }

    // Filesystem payload removal is deferred to the caller, which runs it
    // only after this batch's transaction has committed.
    Ok((report, hashes))
}

fn collect_reachable(store: &ContentStore, tree_hash: &str, reachable: &mut HashSet<String>) -> Result<()> {
    if !reachable.insert(tree_hash.to_owned()) {
        return Ok(());
    }
    let Ok(hash) = Hash::new(tree_hash) else { return Ok(()) };
    let Some(object) = store.get(&hash)? else { return Ok(()) };
    let entries = decode_tree(&object.payload)?;
    for entry in entries {
        match entry.kind {
            EntryKind::Blob => {
                reachable.insert(entry.hash.to_string());
            }
            EntryKind::Tree => collect_reachable(store, entry.hash.as_str(), reachable)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AgentId, LaneName};
    use crate::model::intent::{Agent, Intent};
    use crate::model::transition::EvaluationResult;
    use crate::model::CostRecord;
    use crate::worldstate::WorldStateManager;

    fn sample_intent() -> Intent {
        Intent {
            id: crate::ids::IntentId::generate(),
            prompt: "test".to_owned(),
            agent: Agent::new(AgentId::new("agent-1").unwrap(), "coding"),
            context_refs: vec![],
            tags: vec![],
            metadata: serde_json::Value::Null,
            created_at: now_secs(),
        }
    }

    #[test]
    fn gc_preserves_shared_blobs_and_removes_junk() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(&dir.path().join("store.db"), Some(dir.path().join("blobs")), 0, 0).unwrap();
        let wsm = WorldStateManager::new(&store, 0).unwrap();
        let lane = LaneName::new("main").unwrap();
        wsm.create_lane(&store, lane.clone(), None).unwrap();

        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("shared.txt"), b"shared content").unwrap();
        let accepted_state = wsm.snapshot(&store, &src, None).unwrap();
        let t1 = wsm.propose(&store, None, accepted_state.clone(), sample_intent(), lane.clone(), CostRecord::default()).unwrap();
        wsm.evaluate(&store, &t1, EvaluationResult::passed("ok")).unwrap();

        std::fs::write(src.join("junk.txt"), b"junk content").unwrap();
        let rejected_state = wsm.snapshot(&store, &src, Some(accepted_state.clone())).unwrap();
        let t2 = wsm.propose(&store, Some(accepted_state.clone()), rejected_state, sample_intent(), lane, CostRecord::default()).unwrap();
        wsm.evaluate(&store, &t2, EvaluationResult::failed("no good")).unwrap();
        // Backdate the rejection so it is past the age threshold.
        store
            .connection()
            .execute("UPDATE transitions SET updated_at = 0 WHERE id = ?1", params![t2.as_str()])
            .unwrap();

        let shared_hash = Hash::digest("blob", b"shared content");
        let junk_hash = Hash::digest("blob", b"junk content");
        assert!(store.exists(&shared_hash).unwrap());
        assert!(store.exists(&junk_hash).unwrap());

        let report = run(&store, 3600, false).unwrap();
        assert_eq!(report.transitions_deleted, 1);

        assert!(store.exists(&shared_hash).unwrap(), "shared blob must survive GC");
        assert!(!store.exists(&junk_hash).unwrap(), "unreferenced blob must be swept");
        assert_eq!(wsm.root_tree_of(&store, &accepted_state).is_ok(), true);
    }

    #[test]
    fn running_gc_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(&dir.path().join("store.db"), Some(dir.path().join("blobs")), 0, 0).unwrap();
        WorldStateManager::new(&store, 0).unwrap();
        run(&store, 3600, false).unwrap();
        let second = run(&store, 3600, false).unwrap();
        assert_eq!(second, GcReport::default());
    }

    #[test]
    fn dry_run_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(&dir.path().join("store.db"), Some(dir.path().join("blobs")), 0, 0).unwrap();
        let wsm = WorldStateManager::new(&store, 0).unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.txt"), b"x").unwrap();
        wsm.snapshot(&store, &src, None).unwrap();

        let report = run(&store, 3600, true).unwrap();
        assert!(report.objects_deleted > 0);
        // Dry run must not actually remove anything.
        assert!(store.exists(&Hash::digest("blob", b"x")).unwrap());
    }
}
