//! Bisect sessions over real repositories.

use rewind::bisect::{BisectPhase, BisectReport};
use rewind::tools::Tools;
use rewind::GitBackend;

use crate::fixtures::TestRepo;

/// Repository with `total` commits after the initial one; commit number
/// `bad_from` (1-based) introduces `bug.txt` and every later commit keeps it.
fn repo_with_regression(total: usize, bad_from: usize) -> (TestRepo, String, String) {
    let repo = TestRepo::new();
    let good = repo.head_id();
    let mut first_bad = String::new();
    for i in 1..=total {
        let id = if i == bad_from {
            repo.commit_file("bug.txt", "broken\n", &format!("commit {} (regression)", i))
        } else {
            repo.commit_file(&format!("file{}.txt", i), "ok\n", &format!("commit {}", i))
        };
        if i == bad_from {
            first_bad = id;
        }
    }
    (repo, good, first_bad)
}

/// Answer good/bad from the working copy until the session completes.
fn drive(repo: &TestRepo, tools: &Tools<GitBackend>, mut report: BisectReport) -> (BisectReport, usize) {
    let mut steps = 0;
    while report.phase != BisectPhase::Complete {
        let session = report.session.clone().expect("session while bisecting");
        report = if repo.exists("bug.txt") {
            tools.bisect_bad(&session)
        } else {
            tools.bisect_good(&session)
        }
        .into_value()
        .expect("bisect step failed");
        steps += 1;
        assert!(steps <= 64, "bisect did not converge");
    }
    (report, steps)
}

#[test]
fn test_bisect_finds_first_bad_commit() {
    let (repo, good, first_bad) = repo_with_regression(9, 4);
    let branch = repo.head_branch();
    let tip = repo.head_id();
    let tools = repo.tools();

    let started = tools.bisect_start(&good, "HEAD").into_value().unwrap();
    assert_eq!(started.phase, BisectPhase::Started);
    assert_eq!(started.remaining_count, 9);
    assert!(repo.head_branch().is_none());

    let (done, steps) = drive(&repo, &tools, started);
    assert_eq!(done.first_bad_commit.unwrap().id.as_str(), first_bad);
    // ceil(log2(9)) verdicts at most
    assert!(steps <= 4, "took {} steps", steps);

    let session = done.session.unwrap();
    assert!(tools.bisect_reset(Some(&session)).is_success());
    assert_eq!(repo.head_branch(), branch);
    assert_eq!(repo.head_id(), tip);
    assert!(repo.exists("bug.txt"));
}

#[test]
fn test_bisect_regression_at_tip() {
    let (repo, good, first_bad) = repo_with_regression(5, 5);
    let tools = repo.tools();
    let started = tools.bisect_start(&good, "HEAD").into_value().unwrap();
    let (done, _) = drive(&repo, &tools, started);
    assert_eq!(done.first_bad_commit.unwrap().id.as_str(), first_bad);
}

#[test]
fn test_bisect_regression_right_after_good() {
    let (repo, good, first_bad) = repo_with_regression(6, 1);
    let tools = repo.tools();
    let started = tools.bisect_start(&good, "HEAD").into_value().unwrap();
    let (done, _) = drive(&repo, &tools, started);
    assert_eq!(done.first_bad_commit.unwrap().id.as_str(), first_bad);
}

#[test]
fn test_bisect_start_failures() {
    let (repo, good, _) = repo_with_regression(3, 2);
    let tools = repo.tools();
    let tip = repo.head_id();

    let unknown = tools.bisect_start(&good, "does-not-exist");
    assert!(unknown.message().unwrap().contains("does-not-exist"));

    let empty = tools.bisect_start("HEAD", "HEAD");
    assert!(empty.message().unwrap().starts_with("No commits found between"));
    assert_eq!(repo.head_id(), tip);
    assert!(repo.head_branch().is_some());
}

#[test]
fn test_bisect_reset_without_session() {
    let repo = TestRepo::with_commits(&["a"]);
    let report = repo.tools().bisect_reset(None).into_value().unwrap();
    assert_eq!(report.phase, BisectPhase::Reset);
}
