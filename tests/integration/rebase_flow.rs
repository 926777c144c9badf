//! Instruction-driven rebases over real repositories.

use rewind::rebase::{DisplayFormat, RebaseInstruction};

use crate::fixtures::TestRepo;

fn drop_commit(n: usize) -> RebaseInstruction {
    RebaseInstruction::new("drop", n)
}

/// Initial commit plus three commits rewriting `x.txt`, so dropping the
/// middle one makes the last one conflict.
fn conflicting_repo() -> (TestRepo, String) {
    let repo = TestRepo::new();
    let base = repo.head_id();
    repo.commit_file("x.txt", "one\n", "x one");
    repo.commit_file("x.txt", "two\n", "x two");
    repo.commit_file("x.txt", "three\n", "x three");
    (repo, base)
}

#[test]
fn test_drop_omits_exactly_that_commit() {
    let repo = TestRepo::with_commits(&["a", "b", "c"]);
    let tools = repo.tools();
    let branch = repo.head_branch();
    let commit_a = repo.repo().revparse_single("HEAD~2").unwrap().id().to_string();

    let outcome = tools
        .rebase_execute("HEAD~3", &[drop_commit(2)])
        .into_value()
        .unwrap();
    assert!(outcome.success);
    assert!(!outcome.has_conflicts);

    assert_eq!(repo.summaries(), vec!["add c", "add a", "Initial commit"]);
    assert!(!repo.exists("b.txt"));
    assert!(repo.exists("a.txt"));
    assert!(repo.exists("c.txt"));
    assert_eq!(repo.repo().revparse_single("HEAD~1").unwrap().id().to_string(), commit_a);
    assert_eq!(repo.head_branch(), branch);
    assert!(!tools.rebase_status().into_value().unwrap().in_progress);
}

#[test]
fn test_reword_changes_only_the_target() {
    let repo = TestRepo::with_commits(&["a", "b", "c"]);
    let outcome = repo
        .tools()
        .rebase_execute("HEAD~3", &[RebaseInstruction::reword(2, "Reworded b\n")])
        .into_value()
        .unwrap();
    assert!(outcome.success);
    assert_eq!(
        repo.summaries(),
        vec!["add c", "Reworded b", "add a", "Initial commit"]
    );
}

#[test]
fn test_squash_and_fixup() {
    let repo = TestRepo::with_commits(&["a", "b", "c"]);
    repo.tools()
        .rebase_execute("HEAD~3", &[RebaseInstruction::new("Squash", 1)])
        .into_value()
        .unwrap();
    assert_eq!(repo.summaries(), vec!["add b", "add a", "Initial commit"]);
    let message = repo.message_of_head();
    assert!(message.contains("add b") && message.contains("add c"));
    assert!(repo.exists("c.txt"));

    repo.tools()
        .rebase_execute("HEAD~2", &[RebaseInstruction::new("fixup", 1)])
        .into_value()
        .unwrap();
    assert_eq!(repo.summaries(), vec!["add a", "Initial commit"]);
    assert_eq!(repo.message_of_head().trim_end(), "add a");
    assert!(repo.exists("b.txt") && repo.exists("c.txt"));
}

#[test]
fn test_edit_stops_are_continued_automatically() {
    let repo = TestRepo::with_commits(&["a", "b", "c"]);
    let tip = repo.head_id();
    let outcome = repo
        .tools()
        .rebase_execute("HEAD~3", &[RebaseInstruction::new("edit", 2)])
        .into_value()
        .unwrap();
    assert!(outcome.success);
    assert!(!outcome.stopped_for_edit);
    assert_eq!(repo.head_id(), tip);
}

#[test]
fn test_invalid_instructions_leave_repository_alone() {
    let repo = TestRepo::with_commits(&["a", "b"]);
    let tools = repo.tools();
    let tip = repo.head_id();

    let bad_number = tools.rebase_execute("HEAD~2", &[drop_commit(7)]);
    assert!(bad_number.message().unwrap().contains("7"));
    let bad_action = tools.rebase_execute("HEAD~2", &[RebaseInstruction::new("merge", 1)]);
    assert!(bad_action.message().unwrap().contains("merge"));
    let no_message = tools.rebase_execute("HEAD~2", &[RebaseInstruction::new("reword", 1)]);
    assert!(!no_message.is_success());

    assert_eq!(repo.head_id(), tip);
    assert!(!tools.rebase_status().into_value().unwrap().in_progress);
}

#[test]
fn test_uncommitted_changes_refuse_rebase() {
    let repo = TestRepo::with_commits(&["a", "b"]);
    repo.write("a.txt", "edited\n");
    let outcome = repo.tools().rebase_execute("HEAD~2", &[drop_commit(1)]);
    assert!(outcome
        .message()
        .unwrap()
        .contains("Cannot start rebase with uncommitted changes"));
    assert_eq!(repo.read("a.txt").as_deref(), Some("edited\n"));
}

#[test]
fn test_conflict_then_abort_restores_branch() {
    let (repo, base) = conflicting_repo();
    let tools = repo.tools();
    let tip = repo.head_id();
    let branch = repo.head_branch();

    let outcome = tools.rebase_execute(&base, &[drop_commit(2)]).into_value().unwrap();
    assert!(!outcome.success);
    assert!(outcome.has_conflicts);
    assert_eq!(outcome.conflicted_files, vec!["x.txt"]);

    let status = tools.rebase_status().into_value().unwrap();
    assert!(status.in_progress);
    assert!(status.conflicted);
    assert_eq!(status.total_steps, 3);

    let again = tools.rebase_execute(&base, &[drop_commit(1)]);
    assert_eq!(
        again.message(),
        Some("A rebase is already in progress. Use continue, skip, or abort.")
    );
    let still_conflicted = tools.rebase_continue().into_value().unwrap();
    assert!(still_conflicted.has_conflicts);

    assert!(tools.rebase_abort().into_value().unwrap().success);
    assert_eq!(repo.head_id(), tip);
    assert_eq!(repo.head_branch(), branch);
    assert_eq!(repo.read("x.txt").as_deref(), Some("three\n"));

    assert!(tools.rebase_abort().into_value().unwrap().success);
    assert!(!tools.rebase_status().into_value().unwrap().in_progress);
}

#[test]
fn test_conflict_resolved_then_continue() {
    let (repo, base) = conflicting_repo();
    let tools = repo.tools();
    tools.rebase_execute(&base, &[drop_commit(2)]).into_value().unwrap();

    repo.write("x.txt", "resolved\n");
    repo.stage("x.txt");
    let outcome = tools.rebase_continue().into_value().unwrap();
    assert!(outcome.success);

    assert_eq!(repo.summaries(), vec!["x three", "x one", "Initial commit"]);
    assert_eq!(repo.read("x.txt").as_deref(), Some("resolved\n"));
    assert!(repo.head_branch().is_some());
}

#[test]
fn test_conflict_then_skip_drops_the_commit() {
    let (repo, base) = conflicting_repo();
    let tools = repo.tools();
    tools.rebase_execute(&base, &[drop_commit(2)]).into_value().unwrap();

    assert!(tools.rebase_skip().into_value().unwrap().success);
    assert_eq!(repo.summaries(), vec!["x one", "Initial commit"]);
    assert_eq!(repo.read("x.txt").as_deref(), Some("one\n"));
}

#[test]
fn test_continue_and_skip_without_rebase() {
    let repo = TestRepo::with_commits(&["a"]);
    let tools = repo.tools();
    assert_eq!(tools.rebase_continue().message(), Some("No rebase in progress"));
    assert_eq!(tools.rebase_skip().message(), Some("No rebase in progress"));
    assert!(tools.rebase_abort().is_success());
}

#[test]
fn test_plan_preview_and_list_agree() {
    let repo = TestRepo::with_commits(&["a", "b", "c", "d"]);
    let tools = repo.tools();

    let plan = tools.rebase_plan("HEAD~3", None).into_value().unwrap();
    let preview = tools
        .rebase_preview("HEAD~3", 0, DisplayFormat::short())
        .into_value()
        .unwrap();
    let listed = tools
        .list_commits(Some("HEAD~3"), 0, DisplayFormat::short())
        .into_value()
        .unwrap();

    assert_eq!(plan.entries.len(), 3);
    assert_eq!(preview.len(), 3);
    assert_eq!(listed.len(), 3);
    for ((entry, preview), numbered) in plan.entries.iter().zip(&preview).zip(&listed) {
        assert_eq!(entry.short_id, preview.commit_id);
        assert_eq!(entry.short_id, numbered.commit_id);
        assert_eq!(entry.short_message, numbered.short_message);
    }
    assert_eq!(listed[0].short_message, "add d");
    assert_eq!(listed[0].author_name, "Test User");

    let unbounded = tools
        .list_commits(None, 0, DisplayFormat::short())
        .into_value()
        .unwrap();
    assert_eq!(unbounded.len(), 5);
}

#[test]
fn test_start_replays_all_commits() {
    let repo = TestRepo::with_commits(&["a", "b"]);
    let tip = repo.head_id();
    let outcome = repo.tools().rebase_start("HEAD~2").into_value().unwrap();
    assert!(outcome.success);
    assert_eq!(repo.head_id(), tip);
    assert!(repo.head_branch().is_some());
}
