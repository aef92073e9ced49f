//! S3 (spec.md §8): both the source lane and the target lane modify the
//! same path since the fork — promote reports a structured path conflict
//! and leaves the target lane's head untouched.

mod common;

use common::TestRepo;

#[test]
fn conflicting_promote_reports_path_and_leaves_target_untouched() {
    let repo = TestRepo::new();

    repo.write_file("main", "main.py", "original");
    let initial = repo.commit("main", "main", "initial main.py");

    repo.strata_json(&["lane", "create", "feat", "--base", &initial]);
    repo.strata_json(&["workspace", "create", "feat", "--lane", "feat", "--state", &initial]);

    // feat modifies main.py...
    repo.write_file("feat", "main.py", "from feat");

    // ...and so does main, independently.
    repo.write_file("main", "main.py", "from main");
    repo.commit("main", "main", "modify main.py");
    let head_before = repo.lane_head("main").expect("main should have a head");

    let promote_out = repo.strata_json_any(&["promote", "--workspace", "feat", "--target-lane", "main"]);

    assert!(promote_out["transition"].is_null(), "a conflicting promote must not propose a transition");
    let conflicts = promote_out["conflicts"].as_array().expect("conflicts array");
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["path"].as_str(), Some("main.py"));
    assert_eq!(conflicts[0]["lane_action"].as_str(), Some("modified"));
    assert_eq!(conflicts[0]["target_action"].as_str(), Some("modified"));

    assert_eq!(repo.lane_head("main").as_deref(), Some(head_before.as_str()), "target lane head must not move on conflict");
}
