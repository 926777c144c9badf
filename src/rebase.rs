//! Interactive rebase planning and execution.
//!
//! Callers address commits by call-scoped numbers (1 = newest) handed out by
//! [`RebaseEngine::list_commits`]. Those numbers are translated back to commit
//! ids before anything reaches the backend and are never stored.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_LIST_LIMIT, DEFAULT_VALIDATION_WINDOW};
use crate::graph::{BackendStatus, Commit, CommitGraph, CommitId, TodoAction, TodoStep};
use crate::{rlog, rlog_debug, rlog_warn, Error, Result};

const VALID_ACTIONS: &str = "pick, squash, drop, reword, edit, fixup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebaseAction {
    Pick,
    Squash,
    /// Leave the commit out of the rewritten history entirely.
    Drop,
    Reword,
    Edit,
    Fixup,
}

impl RebaseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebaseAction::Pick => "pick",
            RebaseAction::Squash => "squash",
            RebaseAction::Drop => "drop",
            RebaseAction::Reword => "reword",
            RebaseAction::Edit => "edit",
            RebaseAction::Fixup => "fixup",
        }
    }

    fn todo_action(self) -> TodoAction {
        match self {
            RebaseAction::Pick => TodoAction::Pick,
            RebaseAction::Squash => TodoAction::Squash,
            RebaseAction::Drop => TodoAction::Skip,
            RebaseAction::Reword => TodoAction::Reword,
            RebaseAction::Edit => TodoAction::Edit,
            RebaseAction::Fixup => TodoAction::Fixup,
        }
    }
}

impl FromStr for RebaseAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pick" => Ok(RebaseAction::Pick),
            "squash" => Ok(RebaseAction::Squash),
            "drop" => Ok(RebaseAction::Drop),
            "reword" => Ok(RebaseAction::Reword),
            "edit" => Ok(RebaseAction::Edit),
            "fixup" => Ok(RebaseAction::Fixup),
            _ => Err(Error::InvalidInstruction(format!(
                "invalid action '{}'. Valid actions: {}",
                s, VALID_ACTIONS
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebasePlanEntry {
    pub commit_id: CommitId,
    pub short_id: String,
    pub short_message: String,
    pub full_message: String,
    pub action: RebaseAction,
}

impl From<&Commit> for RebasePlanEntry {
    fn from(commit: &Commit) -> Self {
        Self {
            commit_id: commit.id.clone(),
            short_id: commit.short_id(),
            short_message: commit.summary.clone(),
            full_message: commit.message.clone(),
            action: RebaseAction::Pick,
        }
    }
}

/// Entries are newest first, as walked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebasePlan {
    pub entries: Vec<RebasePlanEntry>,
    pub upstream: CommitId,
    pub branch: String,
}

/// How commit ids and messages are rendered in listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayFormat {
    pub full_id: bool,
    pub full_message: bool,
}

impl DisplayFormat {
    pub fn short() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            full_id: true,
            full_message: true,
        }
    }

    fn id(&self, commit: &Commit) -> String {
        if self.full_id {
            commit.id.to_string()
        } else {
            commit.short_id()
        }
    }

    fn message(&self, commit: &Commit) -> String {
        if self.full_message {
            commit.message.clone()
        } else {
            commit.summary.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewCommit {
    pub commit_id: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub date: DateTime<Utc>,
    pub action: String,
}

impl PreviewCommit {
    fn new(commit: &Commit, action: &str, format: DisplayFormat) -> Self {
        Self {
            commit_id: format.id(commit),
            message: format.message(commit),
            author_name: commit.author.name.clone(),
            author_email: commit.author.email.clone(),
            date: commit.author.time,
            action: action.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberedCommit {
    pub numeric_id: usize,
    pub commit_id: String,
    pub short_message: String,
    pub author_name: String,
}

/// Caller instruction for one numbered commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseInstruction {
    pub action: String,
    pub numeric_id: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_message: Option<String>,
}

impl RebaseInstruction {
    pub fn new(action: &str, numeric_id: usize) -> Self {
        Self {
            action: action.to_string(),
            numeric_id,
            new_message: None,
        }
    }

    pub fn reword(numeric_id: usize, message: &str) -> Self {
        Self {
            action: RebaseAction::Reword.as_str().to_string(),
            numeric_id,
            new_message: Some(message.to_string()),
        }
    }
}

/// Parses `action:number[:message]`, e.g. `drop:2` or `reword:1:New subject`.
impl FromStr for RebaseInstruction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        let action = parts.next().unwrap_or("").trim();
        let number = parts.next().ok_or_else(|| {
            Error::InvalidInstruction(format!("'{}' is not of the form action:number", s))
        })?;
        let numeric_id = number.trim().parse::<usize>().map_err(|_| {
            Error::InvalidInstruction(format!("'{}' is not a commit number in '{}'", number, s))
        })?;
        Ok(Self {
            action: action.to_string(),
            numeric_id,
            new_message: parts.next().map(String::from),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseOutcome {
    pub success: bool,
    pub has_conflicts: bool,
    pub stopped_for_edit: bool,
    pub message: String,
    pub conflicted_files: Vec<String>,
}

impl RebaseOutcome {
    fn done(message: &str) -> Self {
        Self {
            success: true,
            has_conflicts: false,
            stopped_for_edit: false,
            message: message.to_string(),
            conflicted_files: Vec::new(),
        }
    }

    fn stopped() -> Self {
        Self {
            stopped_for_edit: true,
            ..Self::done("Rebase stopped for editing. Use continue when ready.")
        }
    }

    fn conflicted(files: Vec<String>) -> Self {
        Self {
            success: false,
            has_conflicts: true,
            stopped_for_edit: false,
            message: "Rebase stopped due to conflicts. Resolve conflicts and use continue."
                .to_string(),
            conflicted_files: files,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseStatus {
    pub in_progress: bool,
    pub current_step: usize,
    pub total_steps: usize,
    pub commits: Vec<PreviewCommit>,
    pub conflicted: bool,
}

pub struct RebaseEngine<'g, G: CommitGraph + ?Sized> {
    graph: &'g G,
    list_limit: usize,
    validation_window: usize,
}

impl<'g, G: CommitGraph + ?Sized> RebaseEngine<'g, G> {
    pub fn new(graph: &'g G) -> Self {
        Self {
            graph,
            list_limit: DEFAULT_LIST_LIMIT,
            validation_window: DEFAULT_VALIDATION_WINDOW,
        }
    }

    /// Default count for `list_commits` when no positive count is given.
    pub fn with_list_limit(mut self, limit: usize) -> Self {
        self.list_limit = limit.max(1);
        self
    }

    /// How many commits from HEAD instruction numbers may address.
    pub fn with_validation_window(mut self, window: usize) -> Self {
        self.validation_window = window.max(1);
        self
    }

    /// All commits in `upstream..branch` as picks, newest first.
    pub fn plan(&self, upstream: &str, branch: Option<&str>) -> Result<RebasePlan> {
        let branch = branch.unwrap_or("HEAD");
        rlog_debug!("RebaseEngine::plan upstream={} branch={}", upstream, branch);
        let upstream_id = self.graph.require(upstream)?;
        let tip = self.graph.require(branch)?;
        let entries = self
            .graph
            .range(&tip, Some(&upstream_id), None)?
            .iter()
            .map(RebasePlanEntry::from)
            .collect();
        Ok(RebasePlan {
            entries,
            upstream: upstream_id,
            branch: branch.to_string(),
        })
    }

    /// Commits a rebase onto `base` would replay. `max_count <= 0` is unlimited.
    pub fn preview(
        &self,
        base: &str,
        max_count: i64,
        format: DisplayFormat,
    ) -> Result<Vec<PreviewCommit>> {
        rlog_debug!("RebaseEngine::preview base={} max_count={}", base, max_count);
        let base = required_base(base)?;
        let limit = usize::try_from(max_count).ok().filter(|n| *n > 0);
        Ok(self
            .enumerate(Some(base), limit)?
            .iter()
            .map(|commit| PreviewCommit::new(commit, RebaseAction::Pick.as_str(), format))
            .collect())
    }

    /// Number the commits in `base..HEAD` (or all of HEAD's history), newest = 1.
    pub fn list_commits(
        &self,
        base: Option<&str>,
        max_count: i64,
        format: DisplayFormat,
    ) -> Result<Vec<NumberedCommit>> {
        rlog_debug!("RebaseEngine::list_commits base={:?} max_count={}", base, max_count);
        let limit = usize::try_from(max_count)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(self.list_limit);
        let base = base.map(str::trim).filter(|b| !b.is_empty());
        Ok(self
            .enumerate(base, Some(limit))?
            .iter()
            .enumerate()
            .map(|(i, commit)| NumberedCommit {
                numeric_id: i + 1,
                commit_id: format.id(commit),
                short_message: format.message(commit),
                author_name: commit.author.name.clone(),
            })
            .collect())
    }

    /// Begin an all-pick rebase of HEAD onto `upstream`.
    pub fn start(&self, upstream: &str) -> Result<RebaseOutcome> {
        rlog_debug!("RebaseEngine::start upstream={}", upstream);
        let upstream = required_base(upstream)?;
        self.ensure_idle()?;
        let upstream_id = self.graph.require(upstream)?;
        let steps = self
            .oldest_first(&upstream_id)?
            .into_iter()
            .map(|commit| TodoStep::new(TodoAction::Pick, commit.id))
            .collect();

        let status = self
            .graph
            .rebase_begin(&upstream_id, steps, &mut |commit: &Commit| commit.message.clone())?;
        translate(status, "Interactive rebase completed successfully")
    }

    /// Rewrite `upstream..HEAD` according to `instructions`.
    ///
    /// Every instruction is checked before the backend is touched. Stops for
    /// `edit` are continued automatically; conflicts are handed back.
    pub fn execute(
        &self,
        upstream: &str,
        instructions: &[RebaseInstruction],
    ) -> Result<RebaseOutcome> {
        rlog_debug!(
            "RebaseEngine::execute upstream={} instructions={}",
            upstream,
            instructions.len()
        );
        let upstream = required_base(upstream)?;
        if instructions.is_empty() {
            return Err(Error::InvalidInstruction(
                "rebase instructions are required".to_string(),
            ));
        }
        self.ensure_idle()?;
        let upstream_id = self.graph.require(upstream)?;

        let window = self.enumerate(Some(upstream), Some(self.validation_window))?;
        let mut actions: HashMap<CommitId, RebaseAction> = HashMap::new();
        let mut messages: HashMap<CommitId, String> = HashMap::new();
        for instruction in instructions {
            let action: RebaseAction = instruction.action.parse()?;
            let commit = instruction
                .numeric_id
                .checked_sub(1)
                .and_then(|i| window.get(i))
                .ok_or_else(|| {
                    Error::InvalidInstruction(format!(
                        "invalid commit number {} (expected 1..={})",
                        instruction.numeric_id,
                        window.len()
                    ))
                })?;
            if actions.insert(commit.id.clone(), action).is_some() {
                return Err(Error::InvalidInstruction(format!(
                    "commit number {} has more than one instruction",
                    instruction.numeric_id
                )));
            }
            if action == RebaseAction::Reword {
                let message = instruction
                    .new_message
                    .as_deref()
                    .filter(|m| !m.trim().is_empty())
                    .ok_or_else(|| {
                        Error::InvalidInstruction(format!(
                            "reword of commit number {} needs a new message",
                            instruction.numeric_id
                        ))
                    })?;
                messages.insert(commit.id.clone(), message.to_string());
            }
        }

        let steps: Vec<TodoStep> = self
            .oldest_first(&upstream_id)?
            .into_iter()
            .map(|commit| {
                let action = actions
                    .get(&commit.id)
                    .map_or(TodoAction::Pick, |a| a.todo_action());
                TodoStep::new(action, commit.id)
            })
            .collect();
        if let Some(first) = steps.iter().find(|s| s.action != TodoAction::Skip) {
            if first.action.folds_into_previous() {
                return Err(Error::InvalidInstruction(format!(
                    "cannot {} {}: there is no earlier commit to fold into",
                    first.action.as_str(),
                    first.commit.short()
                )));
            }
        }
        rlog!(
            "Rebasing {} commits onto {}",
            steps.len(),
            upstream_id.short()
        );

        let mut on_reword = |commit: &Commit| {
            messages
                .get(&commit.id)
                .cloned()
                .unwrap_or_else(|| commit.message.clone())
        };
        let mut status = self
            .graph
            .rebase_begin(&upstream_id, steps, &mut on_reword)?;
        while status == BackendStatus::Stopped {
            rlog_debug!("Rebase stopped for edit, continuing");
            status = self.graph.rebase_continue()?;
        }
        translate(status, "Rebase completed successfully")
    }

    pub fn continue_rebase(&self) -> Result<RebaseOutcome> {
        rlog_debug!("RebaseEngine::continue_rebase");
        self.ensure_active()?;
        translate(self.graph.rebase_continue()?, "Rebase completed successfully")
    }

    pub fn skip(&self) -> Result<RebaseOutcome> {
        rlog_debug!("RebaseEngine::skip");
        self.ensure_active()?;
        translate(self.graph.rebase_skip()?, "Rebase completed successfully")
    }

    /// Restore the pre-rebase state. Nothing to abort is not an error.
    pub fn abort(&self) -> Result<RebaseOutcome> {
        rlog_debug!("RebaseEngine::abort");
        if self.graph.rebase_progress()?.is_none() {
            return Ok(RebaseOutcome::done("No rebase in progress; nothing to abort."));
        }
        match self.graph.rebase_abort()? {
            BackendStatus::Aborted => {
                rlog!("Rebase aborted");
                Ok(RebaseOutcome::done(
                    "Rebase aborted successfully. Repository returned to original state.",
                ))
            }
            other => Err(Error::Backend(format!(
                "unexpected result when aborting rebase: {:?}",
                other
            ))),
        }
    }

    pub fn status(&self) -> Result<RebaseStatus> {
        let Some(progress) = self.graph.rebase_progress()? else {
            return Ok(RebaseStatus::default());
        };
        if progress.foreign {
            rlog_warn!("Rebase in progress was not started by rewind");
            return Ok(RebaseStatus {
                in_progress: true,
                ..RebaseStatus::default()
            });
        }

        let current_step = progress.done.len() + usize::from(progress.current.is_some());
        let steps = progress
            .done
            .iter()
            .chain(progress.current.iter())
            .chain(progress.todo.iter());
        let mut commits = Vec::new();
        for step in steps {
            let commit = self.graph.commit(&step.commit)?;
            let action = match step.action {
                TodoAction::Skip => RebaseAction::Drop.as_str(),
                other => other.as_str(),
            };
            commits.push(PreviewCommit::new(&commit, action, DisplayFormat::short()));
        }
        Ok(RebaseStatus {
            in_progress: true,
            current_step,
            total_steps: commits.len(),
            commits,
            conflicted: progress.conflicted,
        })
    }

    fn enumerate(&self, base: Option<&str>, limit: Option<usize>) -> Result<Vec<Commit>> {
        let head = self.graph.require("HEAD")?;
        let base = match base {
            Some(spec) => Some(self.graph.require(spec)?),
            None => None,
        };
        self.graph.range(&head, base.as_ref(), limit)
    }

    fn oldest_first(&self, upstream: &CommitId) -> Result<Vec<Commit>> {
        let head = self.graph.require("HEAD")?;
        let mut commits = self.graph.range(&head, Some(upstream), None)?;
        commits.reverse();
        Ok(commits)
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.graph.rebase_progress()?.is_some() {
            return Err(Error::RebaseAlreadyInProgress);
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.graph.rebase_progress()?.is_none() {
            return Err(Error::RebaseNotInProgress);
        }
        Ok(())
    }
}

fn required_base(base: &str) -> Result<&str> {
    let base = base.trim();
    if base.is_empty() {
        return Err(Error::InvalidInstruction(
            "base commit is required".to_string(),
        ));
    }
    Ok(base)
}

fn translate(status: BackendStatus, success_message: &str) -> Result<RebaseOutcome> {
    match status {
        BackendStatus::Ok => Ok(RebaseOutcome::done(success_message)),
        BackendStatus::Stopped => Ok(RebaseOutcome::stopped()),
        BackendStatus::Conflicts(files) => {
            rlog_warn!("Rebase stopped on conflicts: {}", files.join(", "));
            Ok(RebaseOutcome::conflicted(files))
        }
        BackendStatus::Aborted => Ok(RebaseOutcome::done("Rebase aborted.")),
        BackendStatus::UncommittedChanges => Err(Error::Backend(
            "Cannot start rebase with uncommitted changes".to_string(),
        )),
        BackendStatus::Failed(paths) => {
            let detail = if paths.is_empty() {
                "Unknown error".to_string()
            } else {
                paths.join(", ")
            };
            Err(Error::Backend(format!("Rebase failed: {}", detail)))
        }
    }
}
