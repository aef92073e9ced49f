//! S2 (spec.md §8): a lane that hasn't diverged from its target rebases
//! cleanly — promote accepts, and the target head carries both sides'
//! additions.

mod common;

use common::TestRepo;

#[test]
fn clean_promote_accepts_and_merges_both_sides_additions() {
    let repo = TestRepo::new();

    repo.write_file("main", "main.py", "m");
    repo.write_file("main", "util.py", "u");
    let initial = repo.commit("main", "main", "initial files");

    repo.strata_json(&["lane", "create", "feat", "--base", &initial]);
    repo.strata_json(&["workspace", "create", "feat", "--lane", "feat", "--state", &initial]);

    // feat adds a file of its own.
    repo.write_file("feat", "auth.py", "a");

    // main advances independently, on a disjoint path.
    repo.write_file("main", "README.md", "r");
    repo.commit("main", "main", "add readme");

    let promote_out = repo.strata_json(&["promote", "--workspace", "feat", "--target-lane", "main"]);
    assert!(promote_out["conflicts"].as_array().unwrap().is_empty(), "expected a clean promote, got conflicts: {promote_out}");
    let transition = promote_out["transition"].as_str().expect("promote should propose a transition").to_owned();

    let status = repo.strata_json(&["accept", &transition])["status"].as_str().unwrap().to_owned();
    assert_eq!(status, "accepted");

    let new_head = repo.lane_head("main").expect("main lane should have a head");
    repo.strata_ok(&["workspace", "update", "main", &new_head]);

    for name in ["main.py", "util.py", "auth.py", "README.md"] {
        assert!(repo.workspace_dir("main").join(name).exists(), "expected {name} to be present after promote");
    }
}
