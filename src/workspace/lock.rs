//! Atomic advisory locking via lock *directories*.
//!
//! The existence of `<target>.lockdir/` is the lock. `mkdir` is atomic on
//! every filesystem this crate targets, which is what makes "try to create
//! the lockdir" race-free without any database involvement.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};
use crate::ids::AgentId;

/// Default age after which a lock is considered abandoned regardless of
/// whether its owning process looks alive.
pub const DEFAULT_LOCK_MAX_AGE_SECS: u64 = 4 * 3600;

/// The sidecar record written inside a lock directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockOwner {
    pub agent_id: String,
    pub acquired_at: f64,
    pub pid: u32,
    pub hostname: String,
}

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

fn current_hostname() -> String {
    hostname::get().ok().and_then(|h| h.into_string().ok()).unwrap_or_else(|| "unknown-host".to_owned())
}

/// Whether the process identified by `pid` is still alive, best-effort.
#[cfg(unix)]
#[allow(unsafe_code, clippy::cast_possible_wrap)]
fn pid_is_alive(pid: u32) -> bool {
    // Signal 0 performs no actual signal delivery, only existence/permission
    // checks, so this never disturbs the target process.
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    // ret == 0: signal delivered, process exists and is ours.
    // EPERM: process exists but is owned by someone else.
    // ESRCH: no such process — the only case we treat as dead.
    ret == 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    true
}

fn owner_path(lockdir: &Path) -> PathBuf {
    lockdir.join("owner.json")
}

fn read_owner(lockdir: &Path) -> Option<LockOwner> {
    let bytes = std::fs::read(owner_path(lockdir)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn is_stale(owner: &LockOwner, max_age_secs: u64) -> bool {
    let age = now_secs() - owner.acquired_at;
    if age > max_age_secs as f64 {
        return true;
    }
    owner.hostname == current_hostname() && !pid_is_alive(owner.pid)
}

/// Attempts to acquire the lock directory at `lockdir`. Reclaims a stale
/// lock (age-based or same-host-dead-PID) exactly once before giving up.
pub fn acquire(lockdir: &Path, agent_id: &AgentId, max_age_secs: u64) -> Result<bool> {
    if try_mkdir(lockdir)? {
        write_owner(lockdir, agent_id)?;
        return Ok(true);
    }
    let Some(owner) = read_owner(lockdir) else {
        // Lockdir exists but has no (or unreadable) owner file — treat as
        // foreign and held, since we cannot establish staleness safely.
        return Ok(false);
    };
    if !is_stale(&owner, max_age_secs) {
        return Ok(false);
    }
    std::fs::remove_dir_all(lockdir).map_err(|e| io_failure("removing stale lock directory", e))?;
    if try_mkdir(lockdir)? {
        write_owner(lockdir, agent_id)?;
        return Ok(true);
    }
    Ok(false)
}

fn try_mkdir(lockdir: &Path) -> Result<bool> {
    match std::fs::create_dir(lockdir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(io_failure("creating lock directory", e)),
    }
}

fn write_owner(lockdir: &Path, agent_id: &AgentId) -> Result<()> {
    let owner = LockOwner {
        agent_id: agent_id.to_string(),
        acquired_at: now_secs(),
        pid: std::process::id(),
        hostname: current_hostname(),
    };
    let bytes = serde_json::to_vec_pretty(&owner).unwrap_or_default();
    let mut tmp = tempfile::NamedTempFile::new_in(lockdir).map_err(|e| io_failure("creating owner.json temp file", e))?;
    use std::io::Write;
    tmp.write_all(&bytes).map_err(|e| io_failure("writing owner.json", e))?;
    tmp.persist(owner_path(lockdir)).map_err(|e| io_failure("renaming owner.json into place", e.error))?;
    Ok(())
}

/// Reads the current owner of `lockdir`, if any.
pub fn current_owner(lockdir: &Path) -> Option<LockOwner> {
    read_owner(lockdir)
}

/// Releases a held lock by removing its directory.
pub fn release(lockdir: &Path) -> Result<()> {
    if lockdir.exists() {
        std::fs::remove_dir_all(lockdir).map_err(|e| io_failure("removing lock directory", e))?;
    }
    Ok(())
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

    fn agent() -> AgentId {
        AgentId::new("agent-1").unwrap()
    }

    #[test]
    fn acquire_succeeds_when_unheld() {
        let dir = tempfile::tempdir().unwrap();
        let lockdir = dir.path().join("ws.lockdir");
        assert!(acquire(&lockdir, &agent(), DEFAULT_LOCK_MAX_AGE_SECS).unwrap());
        assert!(current_owner(&lockdir).is_some());
    }

    #[test]
    fn second_acquire_fails_while_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let lockdir = dir.path().join("ws.lockdir");
        assert!(acquire(&lockdir, &agent(), DEFAULT_LOCK_MAX_AGE_SECS).unwrap());
        assert!(!acquire(&lockdir, &AgentId::new("agent-2").unwrap(), DEFAULT_LOCK_MAX_AGE_SECS).unwrap());
    }

    #[test]
    fn release_then_acquire_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let lockdir = dir.path().join("ws.lockdir");
        assert!(acquire(&lockdir, &agent(), DEFAULT_LOCK_MAX_AGE_SECS).unwrap());
        release(&lockdir).unwrap();
        assert!(acquire(&lockdir, &agent(), DEFAULT_LOCK_MAX_AGE_SECS).unwrap());
    }

    #[test]
    fn aged_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let lockdir = dir.path().join("ws.lockdir");
        std::fs::create_dir(&lockdir).unwrap();
        let owner = LockOwner {
            agent_id: "stale-agent".to_owned(),
            acquired_at: 0.0, // far in the past
            pid: std::process::id(),
            hostname: current_hostname(),
        };
        std::fs::write(owner_path(&lockdir), serde_json::to_vec(&owner).unwrap()).unwrap();
        assert!(acquire(&lockdir, &agent(), DEFAULT_LOCK_MAX_AGE_SECS).unwrap());
    }

    #[test]
    fn dead_pid_on_same_host_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let lockdir = dir.path().join("ws.lockdir");
        std::fs::create_dir(&lockdir).unwrap();
        let owner = LockOwner {
            agent_id: "dead-agent".to_owned(),
            acquired_at: now_secs(),
            pid: 999_999, // exceedingly unlikely to be a live pid
            hostname: current_hostname(),
        };
        std::fs::write(owner_path(&lockdir), serde_json::to_vec(&owner).unwrap()).unwrap();
        assert!(acquire(&lockdir, &agent(), DEFAULT_LOCK_MAX_AGE_SECS).unwrap());
    }
}
