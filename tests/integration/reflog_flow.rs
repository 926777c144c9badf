//! Reflog listing and `ref@{n}` resets over real repositories.

use rewind::reflog::chain_breaks;

use crate::fixtures::TestRepo;

#[test]
fn test_head_at_zero_is_current_head() {
    let repo = TestRepo::with_commits(&["a", "b"]);
    let target = repo
        .tools()
        .reflog_resolve("HEAD@{0}")
        .into_value()
        .unwrap();
    assert_eq!(target.commit_id.as_str(), repo.head_id());
    assert_eq!(target.ref_name, "HEAD");
    assert_eq!(target.index, 0);
}

#[test]
fn test_reflog_chain_is_consistent() {
    let repo = TestRepo::with_commits(&["a", "b", "c"]);
    let entries = repo.tools().reflog(None, Some(0)).into_value().unwrap();

    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0].new_id.as_str(), repo.head_id());
    assert!(entries.last().unwrap().old_id.is_zero());
    assert!(chain_breaks(&entries, true).is_empty());
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.index, i);
    }
}

#[test]
fn test_goto_third_newest_entry() {
    let repo = TestRepo::with_commits(&["a", "b", "c", "d"]);
    let tools = repo.tools();
    let expected = repo.repo().revparse_single("HEAD~2").unwrap().id().to_string();
    let branch = repo.head_branch();

    let target = tools.reflog_goto("HEAD@{2}").into_value().unwrap();
    assert_eq!(target.commit_id.as_str(), expected);
    assert_eq!(repo.head_id(), expected);
    assert_eq!(repo.head_branch(), branch);
    assert!(repo.exists("b.txt"));
    assert!(!repo.exists("c.txt"));
    assert!(!repo.exists("d.txt"));
}

#[test]
fn test_goto_beyond_reflog_fails_and_keeps_head() {
    let repo = TestRepo::with_commits(&["a"]);
    let tools = repo.tools();
    let tip = repo.head_id();

    let outcome = tools.reflog_goto("HEAD@{2}");
    assert!(outcome.message().unwrap().contains("HEAD@{2}"));
    assert_eq!(repo.head_id(), tip);

    assert!(!tools.reflog_goto("HEAD~1").is_success());
    assert_eq!(repo.head_id(), tip);
}

#[test]
fn test_branch_reflog_by_short_name() {
    let repo = TestRepo::with_commits(&["a", "b"]);
    let full = repo.head_branch().unwrap();
    let short = full.trim_start_matches("refs/heads/").to_string();
    let tools = repo.tools();

    let entries = tools.reflog(Some(&short), Some(0)).into_value().unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.ref_name == short));

    let missing = tools.reflog(Some("refs/heads/nope"), None);
    assert_eq!(
        missing.message(),
        Some("No reflog found for ref: refs/heads/nope")
    );
}

#[test]
fn test_revert_to_commit() {
    let repo = TestRepo::with_commits(&["a", "b", "c"]);
    let tools = repo.tools();
    let first = repo.repo().revparse_single("HEAD~3").unwrap().id().to_string();

    let target = tools.reflog_revert(None, &first[..7]).into_value().unwrap();
    assert_eq!(target.as_str(), first);
    assert_eq!(repo.head_id(), first);
    assert!(!repo.exists("a.txt"));

    let entries = tools.reflog(None, Some(1)).into_value().unwrap();
    assert_eq!(entries[0].new_id.as_str(), first);

    assert!(!tools.reflog_revert(None, "0000000").is_success());
}
