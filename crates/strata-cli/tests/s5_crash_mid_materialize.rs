//! S5 (spec.md §8): a crash mid-`update` leaves a dirty marker behind;
//! `doctor` surfaces the unrecovered workspace, and `doctor --fix` re-runs
//! the interrupted write and clears the marker.

mod common;

use common::TestRepo;

#[test]
fn crash_mid_update_is_found_by_doctor_and_fixed() {
    let repo = TestRepo::new();

    repo.write_file("main", "a.txt", "v0");
    let h0 = repo.commit("main", "main", "seed a.txt");

    repo.strata_json(&["workspace", "create", "feat", "--lane", "main", "--state", &h0]);

    repo.write_file("main", "a.txt", "v1");
    let h1 = repo.commit("main", "main", "change a.txt");

    // Crash mid-update: the failpoint fires after the dirty marker is
    // written but before the workspace contents actually change.
    let out = repo.strata_raw_with_env(&["workspace", "update", "feat", &h1], &[("STRATA_FAILPOINT", "update")]);
    assert!(!out.status.success(), "update should fail when the update failpoint fires");

    let marker_path = repo.root().join(".store").join("workspaces").join("feat").join(".store_materializing");
    assert!(marker_path.exists(), "expected a dirty marker to remain after the crash");

    let findings = repo.strata_json(&["doctor"]);
    let findings = findings["findings"].as_array().expect("findings array");
    let feat_finding = findings.iter().find(|f| f["workspace"] == "feat").expect("doctor should report the dirty 'feat' workspace");
    assert_eq!(feat_finding["recovered"].as_bool(), Some(false));

    let fixed = repo.strata_json(&["doctor", "--fix"]);
    let fixed = fixed["findings"].as_array().expect("findings array");
    let feat_fixed = fixed.iter().find(|f| f["workspace"] == "feat").expect("doctor --fix should report the 'feat' workspace again");
    assert_eq!(feat_fixed["recovered"].as_bool(), Some(true));

    assert!(!marker_path.exists(), "the dirty marker should be cleared after a successful recovery");

    let contents = std::fs::read_to_string(repo.workspace_dir("feat").join("a.txt")).expect("a.txt should be readable after recovery");
    assert_eq!(contents, "v1", "the recovered workspace should reflect the state the crashed update was heading towards");

    // A subsequent doctor run with no further crashes finds nothing dirty.
    let clean = repo.strata_json(&["doctor"]);
    assert!(clean["findings"].as_array().unwrap().is_empty());
}
