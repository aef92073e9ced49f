//! S4 (spec.md §8): garbage collection reclaims objects and transitions that
//! only a rejected, aged-out transition still reaches, while leaving objects
//! and states reachable from a live lane head untouched. Running it again
//! immediately afterward is a no-op.

mod common;

use common::TestRepo;
use strata::ids::Hash;

#[test]
fn gc_reclaims_rejected_junk_but_keeps_shared_blob() {
    let repo = TestRepo::new();

    repo.write_file("main", "shared.txt", "shared-content");
    let accepted_state = repo.commit("main", "main", "seed shared.txt");
    let head_before_gc = repo.lane_head("main").expect("main should have a head");

    // A second transition off the same base, adding junk.txt, that gets
    // rejected outright and will age past the gc threshold.
    repo.write_file("main", "junk.txt", "junk-content");
    let junk_state = repo.strata_json(&["snapshot", "--workspace", "main", "--parent", &accepted_state])["state"]
        .as_str()
        .unwrap()
        .to_owned();
    let junk_transition =
        repo.strata_json(&["propose", &junk_state, "--from", &accepted_state, "--lane", "main", "--prompt", "add junk"])["transition"]
            .as_str()
            .unwrap()
            .to_owned();
    repo.strata_ok(&["reject", &junk_transition]);

    // Lane head must be untouched by the reject.
    assert_eq!(repo.lane_head("main").as_deref(), Some(head_before_gc.as_str()));

    // Clean up junk.txt from the main workspace so it doesn't get re-snapshotted later.
    repo.remove_file("main", "junk.txt");

    let shared_hash = Hash::digest("blob", b"shared-content").to_string();
    let junk_hash = Hash::digest("blob", b"junk-content").to_string();

    // Both blobs exist pre-gc.
    repo.strata_ok(&["cat-file", &shared_hash]);
    repo.strata_ok(&["cat-file", &junk_hash]);

    std::thread::sleep(std::time::Duration::from_millis(1200));

    let report = repo.strata_json(&["gc", "--rejected-max-age-secs", "1"]);
    assert!(report["transitions_deleted"].as_u64().unwrap() >= 1, "expected the aged rejected transition to be deleted: {report}");

    // junk.txt's blob is now unreachable from anything live and must be gone.
    repo.strata_fails(&["cat-file", &junk_hash]);

    // shared.txt's blob is still reachable from main's accepted head and must survive.
    repo.strata_ok(&["cat-file", &shared_hash]);

    // The rejected transition row itself is gone.
    repo.strata_fails(&["show", &junk_transition]);

    // The accepted state and lane head are untouched.
    repo.strata_ok(&["show", &accepted_state]);
    assert_eq!(repo.lane_head("main").as_deref(), Some(head_before_gc.as_str()));

    // Running gc again immediately finds nothing left to do.
    let second_report = repo.strata_json(&["gc", "--rejected-max-age-secs", "1"]);
    assert_eq!(second_report["transitions_deleted"].as_u64(), Some(0));
    assert_eq!(second_report["objects_deleted"].as_u64(), Some(0));
}
