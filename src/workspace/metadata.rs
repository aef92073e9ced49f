//! Workspace metadata sidecar persistence.
//!
//! Writes use the temp-file + fsync + rename pattern used throughout the
//! store. On Windows, antivirus scanners can transiently hold a rename
//! target open; writes retry a bounded number of times on `PermissionError`
//! equivalents before giving up.

use std::path::Path;

use crate::error::{Result, StrataError};
use crate::model::workspace::WorkspaceInfo;

const WRITE_RETRIES: u32 = 5;

/// Reads a workspace's metadata file, if present.
pub fn read(path: &Path) -> Result<Option<WorkspaceInfo>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path).map_err(|e| io_failure("reading workspace metadata", e))?;
    let info: WorkspaceInfo = serde_json::from_slice(&bytes).map_err(|e| StrataError::ConfigInvalid {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(Some(info))
}

/// Writes a workspace's metadata file atomically.
pub fn write(path: &Path, info: &WorkspaceInfo) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| io_failure("creating metadata directory", e))?;
    let bytes = serde_json::to_vec_pretty(info).unwrap_or_default();

    let mut last_err = None;
    for attempt in 0..WRITE_RETRIES {
        match try_write(path, parent, &bytes) {
            Ok(()) => return Ok(()),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < WRITE_RETRIES {
                    std::thread::sleep(std::time::Duration::from_millis(20 * u64::from(attempt + 1)));
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| StrataError::IoFailure {
        context: "writing workspace metadata".to_owned(),
        source: std::io::Error::other("exhausted retries"),
    }))
}

fn try_write(path: &Path, parent: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| io_failure("creating temp metadata file", e))?;
    use std::io::Write;
    tmp.write_all(bytes).map_err(|e| io_failure("writing temp metadata file", e))?;
    tmp.as_file().sync_all().map_err(|e| io_failure("fsyncing temp metadata file", e))?;
    tmp.persist(path).map_err(|e| io_failure("renaming temp metadata file into place", e.error))
}

/// Deletes a workspace's metadata file. Idempotent: missing file is not an
/// error.
pub fn delete(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) | Err(_) if !path.exists() => Ok(()),
        Err(e) => Err(io_failure("deleting workspace metadata", e)),
    }
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
    use crate::ids::{LaneName, WorkspaceName};
    use crate::model::workspace::WorkspaceStatus;

    fn sample() -> WorkspaceInfo {
        WorkspaceInfo {
            name: WorkspaceName::new("feature-x").unwrap(),
            lane: LaneName::new("feature-x").unwrap(),
            path: "/tmp/does-not-matter".into(),
            base_state: None,
            status: WorkspaceStatus::Idle,
            agent_id: None,
            mode: crate::model::workspace::WorkspaceMode::Ephemeral,
            created_at: 0.0,
            updated_at: 0.0,
        }
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ws.json");
        write(&path, &sample()).unwrap();
        let read_back = read(&path).unwrap().unwrap();
        assert_eq!(read_back.name, sample().name);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ws.json");
        write(&path, &sample()).unwrap();
        delete(&path).unwrap();
        delete(&path).unwrap();
        assert!(!path.exists());
    }
}
