//! S1 (spec.md §8): two transitions proposed from the same lane head; the
//! first accept wins, the second is auto-downgraded to rejected rather than
//! silently overwriting the lane head.

mod common;

use common::TestRepo;

#[test]
fn stale_accept_is_downgraded_and_lane_head_does_not_move() {
    let repo = TestRepo::new();

    repo.write_file("main", "a.txt", "v0");
    let h0 = repo.commit("main", "main", "seed a.txt");
    assert_eq!(repo.lane_head("main").as_deref(), Some(h0.as_str()));

    // T1: H0 -> H1 (a.txt = v1)
    repo.write_file("main", "a.txt", "v1");
    let h1 = repo.strata_json(&["snapshot", "--workspace", "main", "--parent", &h0])["state"].as_str().unwrap().to_owned();
    let t1 = repo.strata_json(&["propose", &h1, "--from", &h0, "--lane", "main", "--prompt", "change to v1"])["transition"].as_str().unwrap().to_owned();

    // T2: H0 -> H2 (a.txt = v2), proposed against the same base as T1.
    repo.write_file("main", "a.txt", "v2");
    let h2 = repo.strata_json(&["snapshot", "--workspace", "main", "--parent", &h0])["state"].as_str().unwrap().to_owned();
    let t2 = repo.strata_json(&["propose", &h2, "--from", &h0, "--lane", "main", "--prompt", "change to v2"])["transition"].as_str().unwrap().to_owned();

    assert_ne!(h1, h2, "the two proposed states must be distinct");

    // Accept T1: lane head advances to H1.
    let status1 = repo.strata_json(&["accept", &t1])["status"].as_str().unwrap().to_owned();
    assert_eq!(status1, "accepted");
    assert_eq!(repo.lane_head("main").as_deref(), Some(h1.as_str()));

    // Accept T2: stale (from=H0, but head has since moved to H1) -> rejected.
    let status2 = repo.strata_json(&["accept", &t2])["status"].as_str().unwrap().to_owned();
    assert_eq!(status2, "rejected");
    assert_eq!(repo.lane_head("main").as_deref(), Some(h1.as_str()), "lane head must not move on a stale accept");

    // The transition record itself reflects the downgrade.
    let shown = repo.strata_json(&["show", &t2]);
    assert_eq!(shown["status"].as_str(), Some("rejected"));
}
