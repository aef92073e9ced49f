//! Shared integration-test infrastructure — a self-contained `strata`
//! repository in a temporary directory, driven entirely through the
//! compiled `strata` binary.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// A `strata` repository rooted in a fresh temp directory. Dropped (and the
/// temp dir removed) at the end of the owning test.
pub struct TestRepo {
    _dir: TempDir,
    root: PathBuf,
}

impl TestRepo {
    /// Creates a fresh temp directory and runs `strata init` in it.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let root = dir.path().to_path_buf();
        let repo = Self { _dir: dir, root };
        repo.strata_ok(&["init"]);
        repo
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The on-disk directory backing a named workspace (`"main"` is the
    /// repository root itself).
    #[must_use]
    pub fn workspace_dir(&self, workspace: &str) -> PathBuf {
        if workspace == "main" {
            self.root.clone()
        } else {
            self.root.join(".store").join("workspaces").join(workspace)
        }
    }

    /// Writes `contents` to `rel` inside `workspace`'s directory, creating
    /// parent directories as needed.
    pub fn write_file(&self, workspace: &str, rel: &str, contents: &str) {
        let path = self.workspace_dir(workspace).join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&path, contents).expect("write file");
    }

    /// Removes `rel` from `workspace`'s directory.
    pub fn remove_file(&self, workspace: &str, rel: &str) {
        std::fs::remove_file(self.workspace_dir(workspace).join(rel)).expect("remove file");
    }

    // -----------------------------------------------------------------
    // strata CLI helpers
    // -----------------------------------------------------------------

    /// Runs the `strata` binary with `args` and `extra_env`, returning the
    /// raw `Output`.
    pub fn strata_raw_with_env(&self, args: &[&str], extra_env: &[(&str, &str)]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_strata"));
        cmd.args(args).current_dir(&self.root);
        for (k, v) in extra_env {
            cmd.env(k, v);
        }
        cmd.output().expect("failed to execute strata")
    }

    pub fn strata_raw(&self, args: &[&str]) -> Output {
        self.strata_raw_with_env(args, &[])
    }

    /// Runs `strata` and asserts it exits successfully. Returns stdout.
    pub fn strata_ok(&self, args: &[&str]) -> String {
        let out = self.strata_raw(args);
        let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
        assert!(out.status.success(), "strata {} failed:\nstdout: {stdout}\nstderr: {stderr}", args.join(" "));
        stdout
    }

    /// Runs `strata` and asserts it fails. Returns stderr.
    pub fn strata_fails(&self, args: &[&str]) -> String {
        let out = self.strata_raw(args);
        assert!(
            !out.status.success(),
            "expected strata {} to fail, but it succeeded.\nstdout: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stdout),
        );
        String::from_utf8_lossy(&out.stderr).into_owned()
    }

    /// Runs `args` with `--json` appended and parses stdout as JSON,
    /// regardless of exit status (some commands, like a conflicting
    /// `promote`, print a JSON body and still exit non-zero).
    pub fn strata_json_any(&self, args: &[&str]) -> serde_json::Value {
        let mut full: Vec<&str> = args.to_vec();
        full.push("--json");
        let out = self.strata_raw(&full);
        let stdout = String::from_utf8_lossy(&out.stdout);
        serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid json from strata {}: {e}\nstdout: {stdout}", args.join(" ")))
    }

    /// Like [`Self::strata_json_any`] but additionally asserts success.
    pub fn strata_json(&self, args: &[&str]) -> serde_json::Value {
        let mut full: Vec<&str> = args.to_vec();
        full.push("--json");
        let stdout = self.strata_ok(&full);
        serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid json from strata {}: {e}\nstdout: {stdout}", args.join(" ")))
    }

    /// The current head state of `lane`, if any.
    pub fn lane_head(&self, lane: &str) -> Option<String> {
        let lanes = self.strata_json(&["lanes"]);
        lanes.as_array().expect("lanes array").iter().find(|l| l["name"] == lane).and_then(|l| l["head_state"].as_str()).map(ToOwned::to_owned)
    }

    /// Snapshots `workspace`'s current contents, proposes a transition from
    /// `lane`'s current head, and accepts it. Panics unless the accept
    /// succeeds outright (no stale-accept downgrade). Returns the new state.
    pub fn commit(&self, workspace: &str, lane: &str, prompt: &str) -> String {
        let parent = self.lane_head(lane);

        let mut snapshot_args = vec!["snapshot".to_owned(), "--workspace".to_owned(), workspace.to_owned()];
        if let Some(p) = &parent {
            snapshot_args.push("--parent".to_owned());
            snapshot_args.push(p.clone());
        }
        let snapshot_refs: Vec<&str> = snapshot_args.iter().map(String::as_str).collect();
        let state = self.strata_json(&snapshot_refs)["state"].as_str().expect("snapshot state").to_owned();

        let mut propose_args = vec!["propose".to_owned(), state.clone(), "--lane".to_owned(), lane.to_owned(), "--prompt".to_owned(), prompt.to_owned()];
        if let Some(p) = &parent {
            propose_args.push("--from".to_owned());
            propose_args.push(p.clone());
        }
        let propose_refs: Vec<&str> = propose_args.iter().map(String::as_str).collect();
        let transition = self.strata_json(&propose_refs)["transition"].as_str().expect("propose transition").to_owned();

        let status = self.strata_json(&["accept", &transition])["status"].as_str().expect("accept status").to_owned();
        assert_eq!(status, "accepted", "commit to lane '{lane}' should accept cleanly, got status {status}");
        state
    }
}
