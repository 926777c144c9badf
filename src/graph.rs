//! The commit-graph collaborator shared by the bisect, rebase and reflog engines.
//!
//! Engines never talk to libgit2 directly; they go through [`CommitGraph`],
//! which [`crate::git::GitBackend`] implements for real repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Length of abbreviated commit ids.
pub const SHORT_ID_LEN: usize = 7;

/// Full hexadecimal commit id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First seven characters, for display.
    pub fn short(&self) -> String {
        self.0.chars().take(SHORT_ID_LEN).collect()
    }

    /// The all-zero id a reflog uses as the old value of a ref's first entry.
    pub fn is_zero(&self) -> bool {
        !self.0.is_empty() && self.0.chars().all(|c| c == '0')
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name, email and time of an author, committer or reflog writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub time: DateTime<Utc>,
}

/// Read-only view of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: CommitId,
    /// First line of the message.
    pub summary: String,
    pub message: String,
    pub author: Identity,
    pub committer: Identity,
    pub parents: Vec<CommitId>,
}

impl Commit {
    pub fn short_id(&self) -> String {
        self.id.short()
    }
}

/// Caller-facing commit description used in bisect reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub id: CommitId,
    pub short_id: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub commit_time: DateTime<Utc>,
}

impl From<&Commit> for CommitSummary {
    fn from(commit: &Commit) -> Self {
        Self {
            id: commit.id.clone(),
            short_id: commit.short_id(),
            message: commit.summary.clone(),
            author_name: commit.author.name.clone(),
            author_email: commit.author.email.clone(),
            commit_time: commit.committer.time,
        }
    }
}

/// What HEAD pointed at: a branch (full ref name) or a detached commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum HeadRef {
    Branch(String),
    Detached(CommitId),
}

impl std::fmt::Display for HeadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeadRef::Branch(name) => {
                write!(f, "{}", name.strip_prefix("refs/heads/").unwrap_or(name))
            }
            HeadRef::Detached(id) => write!(f, "{}", id.short()),
        }
    }
}

/// A reflog line as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReflogEntry {
    pub old_id: CommitId,
    pub new_id: CommitId,
    pub message: String,
    pub committer: Identity,
}

/// Step kinds the backend sequencer knows how to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoAction {
    Pick,
    Reword,
    Edit,
    Squash,
    Fixup,
    /// Present in the todo list but never applied.
    Skip,
}

impl TodoAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoAction::Pick => "pick",
            TodoAction::Reword => "reword",
            TodoAction::Edit => "edit",
            TodoAction::Squash => "squash",
            TodoAction::Fixup => "fixup",
            TodoAction::Skip => "skip",
        }
    }

    /// Squash and fixup fold into the previously applied commit.
    pub fn folds_into_previous(&self) -> bool {
        matches!(self, TodoAction::Squash | TodoAction::Fixup)
    }
}

/// One line of a rebase todo list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoStep {
    pub action: TodoAction,
    pub commit: CommitId,
    /// Replacement message, filled in by the message callback for rewords.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TodoStep {
    pub fn new(action: TodoAction, commit: CommitId) -> Self {
        Self {
            action,
            commit,
            message: None,
        }
    }
}

/// Result of a backend rebase transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Ok,
    /// Paused on an edit step with a clean index.
    Stopped,
    Conflicts(Vec<String>),
    Failed(Vec<String>),
    Aborted,
    UncommittedChanges,
}

/// Snapshot of an active rebase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebaseProgress {
    pub done: Vec<TodoStep>,
    pub todo: Vec<TodoStep>,
    /// The step the sequencer stopped on, if any.
    pub current: Option<TodoStep>,
    pub conflicted: bool,
    /// The rebase was started by another tool and cannot be driven from here.
    pub foreign: bool,
}

/// Answers the sequencer's request for a reworded commit message.
pub type MessageCallback<'a> = dyn FnMut(&Commit) -> String + 'a;

/// Read access to a commit graph plus the narrow mutation primitives the
/// engines need.
///
/// Implementations are driven from a single thread and every call blocks
/// until the underlying repository I/O finishes.
pub trait CommitGraph {
    /// Resolve a ref name, revision expression or hash to a commit.
    fn resolve(&self, spec: &str) -> Result<Option<CommitId>>;

    fn commit(&self, id: &CommitId) -> Result<Commit>;

    /// Commits reachable from `start` and not from `uninteresting`, newest
    /// first, stopping after `limit` commits when given.
    fn walk(
        &self,
        start: &[CommitId],
        uninteresting: &[CommitId],
        limit: Option<usize>,
    ) -> Result<Vec<Commit>>;

    fn head(&self) -> Result<HeadRef>;

    /// Check out `id` with a detached HEAD.
    fn checkout(&self, id: &CommitId) -> Result<()>;

    /// Check out a previously recorded HEAD, re-attaching branches.
    fn checkout_head(&self, head: &HeadRef) -> Result<()>;

    /// Reverse-chronological reflog of `ref_name`, `None` when it has no log.
    fn reflog_entries(&self, ref_name: &str) -> Result<Option<Vec<RawReflogEntry>>>;

    fn reset_hard(&self, ref_name: &str, target: &CommitId) -> Result<()>;

    fn rebase_progress(&self) -> Result<Option<RebaseProgress>>;

    /// Start applying `steps` (oldest first) on top of `upstream`.
    fn rebase_begin(
        &self,
        upstream: &CommitId,
        steps: Vec<TodoStep>,
        on_reword: &mut MessageCallback<'_>,
    ) -> Result<BackendStatus>;

    fn rebase_continue(&self) -> Result<BackendStatus>;

    fn rebase_skip(&self) -> Result<BackendStatus>;

    fn rebase_abort(&self) -> Result<BackendStatus>;

    /// Like [`CommitGraph::resolve`] but failing with [`Error::Resolution`].
    fn require(&self, spec: &str) -> Result<CommitId> {
        self.resolve(spec)?
            .ok_or_else(|| Error::Resolution(spec.to_string()))
    }

    /// The commits in `base..tip` (or everything reachable from `tip` when
    /// `base` is absent), newest first. Bisect, rebase planning and the
    /// listing operations all enumerate through here.
    fn range(
        &self,
        tip: &CommitId,
        base: Option<&CommitId>,
        limit: Option<usize>,
    ) -> Result<Vec<Commit>> {
        let hidden: Vec<CommitId> = base.into_iter().cloned().collect();
        self.walk(std::slice::from_ref(tip), &hidden, limit)
    }
}
