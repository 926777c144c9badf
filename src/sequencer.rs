//! Interactive rebase on top of libgit2.
//!
//! libgit2 only knows plain picks, so todo lists are applied here by
//! cherry-picking one commit at a time onto a detached HEAD. Progress lives in
//! `<gitdir>/rewind-rebase/state.json` so a rebase that stops for an edit or a
//! conflict can be continued, skipped or aborted from a later process.
//!
//! The directory name differs from git's own `rebase-merge`, which
//! `git_repository_state_cleanup` deletes.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use git2::build::CheckoutBuilder;
use git2::{CherrypickOptions, Index, Oid, Repository, ResetType, Signature, StatusOptions};
use serde::{Deserialize, Serialize};

use crate::graph::{BackendStatus, RebaseProgress, TodoAction, TodoStep};
use crate::{rlog_debug, rlog_trace, rlog_warn, Error, Result};

const STATE_DIR: &str = "rewind-rebase";
const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StopReason {
    Edit,
    Conflict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SequencerState {
    /// Branch to move once every step is applied, `None` for a detached HEAD.
    head_name: Option<String>,
    orig_head: String,
    onto: String,
    done: Vec<TodoStep>,
    todo: VecDeque<TodoStep>,
    current: Option<TodoStep>,
    stop: Option<StopReason>,
}

enum Applied {
    Done,
    StopForEdit,
    Conflicted(Vec<String>),
}

/// Drives one repository's todo list.
pub struct Sequencer<'r> {
    repo: &'r Repository,
    committer: Signature<'static>,
}

impl<'r> Sequencer<'r> {
    pub fn new(repo: &'r Repository, committer: Signature<'static>) -> Self {
        Self { repo, committer }
    }

    fn state_dir(&self) -> PathBuf {
        self.repo.path().join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    pub fn is_active(&self) -> bool {
        self.state_path().exists()
    }

    fn load(&self) -> Result<Option<SequencerState>> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&fs::read_to_string(&path)?)?))
    }

    fn require_state(&self) -> Result<SequencerState> {
        self.load()?.ok_or(Error::RebaseNotInProgress)
    }

    fn save(&self, state: &SequencerState) -> Result<()> {
        fs::create_dir_all(self.state_dir())?;
        fs::write(self.state_path(), serde_json::to_string_pretty(state)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let dir = self.state_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn progress(&self) -> Result<Option<RebaseProgress>> {
        let Some(state) = self.load()? else {
            return Ok(None);
        };
        let conflicted = self.repo.index()?.has_conflicts();
        Ok(Some(RebaseProgress {
            done: state.done,
            todo: state.todo.into_iter().collect(),
            current: state.current,
            conflicted,
            foreign: false,
        }))
    }

    /// Check out `onto` and start applying `steps`, oldest first.
    pub fn begin(&self, onto: Oid, steps: Vec<TodoStep>) -> Result<BackendStatus> {
        if self.is_active() {
            return Err(Error::RebaseAlreadyInProgress);
        }
        if let Some(first) = steps.iter().find(|s| s.action != TodoAction::Skip) {
            if first.action.folds_into_previous() {
                return Err(Error::InvalidInstruction(format!(
                    "cannot {} {} without a previous commit",
                    first.action.as_str(),
                    first.commit.short()
                )));
            }
        }
        if self.has_uncommitted_changes()? {
            return Ok(BackendStatus::UncommittedChanges);
        }

        let head = self.repo.head()?;
        let head_name = if head.is_branch() {
            head.name().map(String::from)
        } else {
            None
        };
        let orig_head = head.peel_to_commit()?.id();
        drop(head);

        let onto_commit = self.repo.find_commit(onto)?;
        self.repo
            .checkout_tree(onto_commit.as_object(), Some(CheckoutBuilder::new().safe()))
            .map_err(|e| Error::Backend(format!("checkout of {} failed: {}", onto, e)))?;
        self.repo.set_head_detached(onto)?;
        rlog_debug!(
            "Sequencer::begin onto={} head={:?} steps={}",
            onto,
            head_name,
            steps.len()
        );

        let state = SequencerState {
            head_name,
            orig_head: orig_head.to_string(),
            onto: onto.to_string(),
            done: Vec::new(),
            todo: steps.into(),
            current: None,
            stop: None,
        };
        self.save(&state)?;
        self.run(state)
    }

    pub fn resume(&self) -> Result<BackendStatus> {
        let mut state = self.require_state()?;
        let conflicts = conflicted_paths(&self.repo.index()?);
        if !conflicts.is_empty() {
            return Ok(BackendStatus::Conflicts(conflicts));
        }

        if let Some(step) = state.current.take() {
            match state.stop {
                Some(StopReason::Conflict) => {
                    self.commit_step(&step)?;
                    self.repo.cleanup_state()?;
                    if step.action == TodoAction::Edit {
                        state.current = Some(step);
                        state.stop = Some(StopReason::Edit);
                        self.save(&state)?;
                        return Ok(BackendStatus::Stopped);
                    }
                }
                Some(StopReason::Edit) | None => self.amend_with_index()?,
            }
            state.done.push(step);
        }
        state.stop = None;
        self.save(&state)?;
        self.run(state)
    }

    pub fn skip(&self) -> Result<BackendStatus> {
        let mut state = self.require_state()?;
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo.reset(head.as_object(), ResetType::Hard, None)?;
        self.repo.cleanup_state()?;

        if let Some(step) = state.current.take() {
            rlog_debug!("Sequencer::skip {}", step.commit.short());
            // An edit stop has already been committed; a conflicted step is dropped.
            if state.stop == Some(StopReason::Edit) {
                state.done.push(step);
            }
        }
        state.stop = None;
        self.save(&state)?;
        self.run(state)
    }

    pub fn abort(&self) -> Result<BackendStatus> {
        let state = self.require_state()?;
        let orig = self.repo.find_commit(Oid::from_str(&state.orig_head)?)?;
        match &state.head_name {
            Some(name) => self.repo.set_head(name)?,
            None => self.repo.set_head_detached(orig.id())?,
        }
        self.repo
            .reset(orig.as_object(), ResetType::Hard, None)
            .map_err(|e| Error::Backend(format!("abort could not restore {}: {}", orig.id(), e)))?;
        self.repo.cleanup_state()?;
        self.clear()?;
        rlog_debug!("Sequencer::abort restored {}", orig.id());
        Ok(BackendStatus::Aborted)
    }

    fn run(&self, mut state: SequencerState) -> Result<BackendStatus> {
        while let Some(step) = state.todo.pop_front() {
            rlog_trace!("Sequencer step {} {}", step.action.as_str(), step.commit);
            match self.apply(&step)? {
                Applied::Done => state.done.push(step),
                Applied::StopForEdit => {
                    state.current = Some(step);
                    state.stop = Some(StopReason::Edit);
                    self.save(&state)?;
                    return Ok(BackendStatus::Stopped);
                }
                Applied::Conflicted(paths) => {
                    state.current = Some(step);
                    state.stop = Some(StopReason::Conflict);
                    self.save(&state)?;
                    return Ok(BackendStatus::Conflicts(paths));
                }
            }
            self.save(&state)?;
        }
        self.finish(&state)?;
        Ok(BackendStatus::Ok)
    }

    fn finish(&self, state: &SequencerState) -> Result<()> {
        let new_head = self.repo.head()?.peel_to_commit()?.id();
        if let Some(name) = &state.head_name {
            let log = format!("rebase (finish): {} onto {}", name, state.onto);
            self.repo.reference(name, new_head, true, &log)?;
            self.repo.set_head(name)?;
        }
        self.clear()?;
        rlog_debug!("Sequencer::finish head={}", new_head);
        Ok(())
    }

    fn apply(&self, step: &TodoStep) -> Result<Applied> {
        if step.action == TodoAction::Skip {
            return Ok(Applied::Done);
        }

        let commit = self.repo.find_commit(Oid::from_str(step.commit.as_str())?)?;
        let head = self.repo.head()?.peel_to_commit()?;

        let keeps_identity = matches!(step.action, TodoAction::Pick | TodoAction::Edit)
            && commit.parent_count() == 1
            && commit.parent_id(0)? == head.id();
        if keeps_identity {
            self.repo
                .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))
                .map_err(|e| Error::Backend(format!("checkout of {} failed: {}", commit.id(), e)))?;
            self.repo.set_head_detached(commit.id())?;
        } else {
            let mut opts = CherrypickOptions::new();
            if commit.parent_count() > 1 {
                opts.mainline(1);
            }
            self.repo
                .cherrypick(&commit, Some(&mut opts))
                .map_err(|e| Error::Backend(format!("cherry-pick of {} failed: {}", commit.id(), e)))?;

            let conflicts = conflicted_paths(&self.repo.index()?);
            if !conflicts.is_empty() {
                rlog_warn!(
                    "Conflicts applying {}: {}",
                    commit.id(),
                    conflicts.join(", ")
                );
                self.repo.cleanup_state()?;
                return Ok(Applied::Conflicted(conflicts));
            }
            self.commit_step(step)?;
            self.repo.cleanup_state()?;
        }

        if step.action == TodoAction::Edit {
            return Ok(Applied::StopForEdit);
        }
        Ok(Applied::Done)
    }

    /// Record the staged result of `step` on top of HEAD.
    fn commit_step(&self, step: &TodoStep) -> Result<()> {
        let original = self.repo.find_commit(Oid::from_str(step.commit.as_str())?)?;
        let head = self.repo.head()?.peel_to_commit()?;
        let mut index = self.repo.index()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;

        if step.action.folds_into_previous() {
            let message = match step.action {
                TodoAction::Squash => format!(
                    "{}\n\n{}\n",
                    head.message().unwrap_or("").trim_end(),
                    original.message().unwrap_or("").trim_end()
                ),
                _ => head.message().unwrap_or("").to_string(),
            };
            let oid = head.amend(
                Some("HEAD"),
                None,
                Some(&self.committer),
                None,
                Some(&message),
                Some(&tree),
            )?;
            rlog_trace!("{} {} into {}", step.action.as_str(), original.id(), oid);
            return Ok(());
        }

        if tree.id() == head.tree_id()
            && step.action != TodoAction::Reword
            && introduces_changes(&original)?
        {
            rlog_warn!("{} is already applied upstream, dropping it", original.id());
            return Ok(());
        }

        let message = step
            .message
            .clone()
            .unwrap_or_else(|| original.message().unwrap_or("").to_string());
        let oid = self.repo.commit(
            Some("HEAD"),
            &original.author(),
            &self.committer,
            &message,
            &tree,
            &[&head],
        )?;
        rlog_trace!("Applied {} as {}", original.id(), oid);
        Ok(())
    }

    /// Fold changes staged during an edit stop into HEAD.
    fn amend_with_index(&self) -> Result<()> {
        let head = self.repo.head()?.peel_to_commit()?;
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        if tree_id == head.tree_id() {
            return Ok(());
        }
        let tree = self.repo.find_tree(tree_id)?;
        head.amend(Some("HEAD"), None, Some(&self.committer), None, None, Some(&tree))?;
        Ok(())
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);
        Ok(!self.repo.statuses(Some(&mut opts))?.is_empty())
    }
}

/// Whether `commit` changes anything relative to its first parent.
fn introduces_changes(commit: &git2::Commit<'_>) -> Result<bool> {
    if commit.parent_count() == 0 {
        return Ok(!commit.tree()?.is_empty());
    }
    Ok(commit.parent(0)?.tree_id() != commit.tree_id())
}

/// Paths with unresolved conflicts in `index`.
pub fn conflicted_paths(index: &Index) -> Vec<String> {
    let mut paths = Vec::new();
    if !index.has_conflicts() {
        return paths;
    }
    if let Ok(conflicts) = index.conflicts() {
        for conflict in conflicts.flatten() {
            let path = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref())
                .map(|entry| String::from_utf8_lossy(&entry.path).to_string());
            if let Some(path) = path {
                paths.push(path);
            }
        }
    }
    paths
}
