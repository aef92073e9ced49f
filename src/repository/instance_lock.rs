//! Repository-wide instance lock, guarding against concurrent writers on
//! separate machines sharing a filesystem (NFS and friends).
//!
//! Shaped like [`crate::workspace::lock`] but with one twist: instead of
//! "does a lock directory exist", staleness is judged per-machine via a
//! `machine_id` persisted once at first open. A foreign `machine_id` is
//! never stale by definition — the point of this lock is specifically to
//! refuse shared-filesystem cross-machine writers, never to adjudicate
//! who's right.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// A lock older than this is considered abandoned even on its own machine.
pub const MAX_AGE_SECS: u64 = 4 * 3600;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceLock {
    pub hostname: String,
    pub pid: u32,
    pub machine_id: String,
    pub started_at: f64,
}

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

fn current_hostname() -> String {
    hostname::get().ok().and_then(|h| h.into_string().ok()).unwrap_or_else(|| "unknown-host".to_owned())
}

#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    #[allow(unsafe_code, clippy::cast_possible_wrap)]
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    ret == 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    true
}

/// Reads (creating if absent) this machine's persisted identity, stored
/// alongside the lock file so repeated opens on the same machine recognize
/// their own prior lock as same-machine rather than foreign.
fn machine_id(store_dir: &Path) -> Result<String> {
    let path = store_dir.join("machine_id");
    if let Ok(bytes) = std::fs::read(&path) {
        let id = String::from_utf8_lossy(&bytes).trim().to_owned();
        if !id.is_empty() {
            return Ok(id);
        }
    }
    let id = format!("{:032x}", rand::random::<u128>());
    std::fs::create_dir_all(store_dir).map_err(|e| io_failure("creating .store directory", e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(store_dir).map_err(|e| io_failure("creating machine_id temp file", e))?;
    use std::io::Write;
    tmp.write_all(id.as_bytes()).map_err(|e| io_failure("writing machine_id", e))?;
    tmp.persist(&path).map_err(|e| io_failure("renaming machine_id into place", e.error))?;
    Ok(id)
}

fn lock_path(store_dir: &Path) -> PathBuf {
    store_dir.join("instance.lock")
}

fn read_lock(store_dir: &Path) -> Option<InstanceLock> {
    let bytes = std::fs::read(lock_path(store_dir)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn is_stale(lock: &InstanceLock, this_machine: &str) -> bool {
    let age = now_secs() - lock.started_at;
    if age > MAX_AGE_SECS as f64 {
        return true;
    }
    lock.machine_id == this_machine && !pid_is_alive(lock.pid)
}

/// Opens (or reopens) the instance lock at `store_dir/instance.lock`.
///
/// Raises [`StrataError::ConcurrentAccess`] if a live, non-stale lock from
/// a different `machine_id` is present. Same-machine opens, stale locks,
/// and absent locks all succeed by writing a fresh lock record.
pub fn acquire(store_dir: &Path) -> Result<InstanceLock> {
    let this_machine = machine_id(store_dir)?;
    if let Some(existing) = read_lock(store_dir) {
        if existing.machine_id != this_machine && !is_stale(&existing, &this_machine) {
            return Err(StrataError::ConcurrentAccess {
                hostname: existing.hostname,
                pid: existing.pid,
            });
        }
    }
    let lock = InstanceLock {
        hostname: current_hostname(),
        pid: std::process::id(),
        machine_id: this_machine,
        started_at: now_secs(),
    };
    write_lock(store_dir, &lock)?;
    Ok(lock)
}

fn write_lock(store_dir: &Path, lock: &InstanceLock) -> Result<()> {
    std::fs::create_dir_all(store_dir).map_err(|e| io_failure("creating .store directory", e))?;
    let bytes = serde_json::to_vec_pretty(lock).unwrap_or_default();
    let mut tmp = tempfile::NamedTempFile::new_in(store_dir).map_err(|e| io_failure("creating instance lock temp file", e))?;
    use std::io::Write;
    tmp.write_all(&bytes).map_err(|e| io_failure("writing instance lock", e))?;
    tmp.persist(lock_path(store_dir)).map_err(|e| io_failure("renaming instance lock into place", e.error))?;
    Ok(())
}

/// Re-verifies that the lock at `store_dir` is still this process's own, as
/// required before every write operation. Raises `ConcurrentAccess` if a
/// foreign, non-stale lock has since taken over.
pub fn reverify(store_dir: &Path) -> Result<()> {
    let this_machine = machine_id(store_dir)?;
    let Some(existing) = read_lock(store_dir) else {
        // Lock file vanished; nothing contends, so proceed and re-write it.
        return acquire(store_dir).map(|_| ());
    };
    if existing.machine_id != this_machine && existing.pid != std::process::id() && !is_stale(&existing, &this_machine) {
        return Err(StrataError::ConcurrentAccess {
            hostname: existing.hostname,
            pid: existing.pid,
        });
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

    #[test]
    fn acquire_succeeds_when_unheld() {
        let dir = tempfile::tempdir().unwrap();
        let lock = acquire(dir.path()).unwrap();
        assert_eq!(lock.pid, std::process::id());
    }

    #[test]
    fn reacquire_on_same_machine_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        acquire(dir.path()).unwrap();
        assert!(acquire(dir.path()).is_ok());
    }

    #[test]
    fn foreign_machine_with_fresh_lock_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        acquire(dir.path()).unwrap(); // establishes this machine's machine_id
        let foreign = InstanceLock {
            hostname: "other-host".to_owned(),
            pid: 123,
            machine_id: "some-other-machine".to_owned(),
            started_at: now_secs(),
        };
        write_lock(dir.path(), &foreign).unwrap();
        let err = acquire(dir.path()).unwrap_err();
        assert!(matches!(err, StrataError::ConcurrentAccess { hostname, pid } if hostname == "other-host" && pid == 123));
    }

    #[test]
    fn foreign_machine_with_aged_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        acquire(dir.path()).unwrap();
        let foreign = InstanceLock {
            hostname: "other-host".to_owned(),
            pid: 123,
            machine_id: "some-other-machine".to_owned(),
            started_at: 0.0,
        };
        write_lock(dir.path(), &foreign).unwrap();
        assert!(acquire(dir.path()).is_ok());
    }
}
