use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::build::CheckoutBuilder;
use git2::{ErrorCode, Oid, Repository, RepositoryState, ResetType, Signature, Sort};

use crate::config::{DEFAULT_COMMITTER_EMAIL, DEFAULT_COMMITTER_NAME};
use crate::graph::{
    BackendStatus, Commit, CommitGraph, CommitId, HeadRef, Identity, MessageCallback,
    RawReflogEntry, RebaseProgress, TodoAction, TodoStep,
};
use crate::sequencer::Sequencer;
use crate::{rlog_debug, rlog_warn, Error, Result};

/// [`CommitGraph`] over an on-disk repository.
///
/// The repository is re-opened for every call so the backend never holds a
/// libgit2 handle across operations.
pub struct GitBackend {
    repo_path: PathBuf,
    committer_name: String,
    committer_email: String,
}

impl GitBackend {
    pub fn new(repo_path: &Path) -> Result<Self> {
        rlog_debug!("GitBackend::new path={}", repo_path.display());
        Repository::discover(repo_path).map_err(|e| {
            Error::RepositoryNotOpen(format!("{}: {}", repo_path.display(), e.message()))
        })?;
        Ok(Self {
            repo_path: repo_path.to_path_buf(),
            committer_name: DEFAULT_COMMITTER_NAME.to_string(),
            committer_email: DEFAULT_COMMITTER_EMAIL.to_string(),
        })
    }

    /// Identity for rewritten commits when the repository has no `user.name`.
    pub fn with_committer(mut self, name: &str, email: &str) -> Self {
        self.committer_name = name.to_string();
        self.committer_email = email.to_string();
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// The repository's git directory, where per-repository session state lives.
    pub fn git_dir(&self) -> Result<PathBuf> {
        Ok(self.repo()?.path().to_path_buf())
    }

    fn repo(&self) -> Result<Repository> {
        Ok(Repository::discover(&self.repo_path)?)
    }

    fn committer(&self, repo: &Repository) -> Result<Signature<'static>> {
        Ok(repo
            .signature()
            .or_else(|_| Signature::now(&self.committer_name, &self.committer_email))?)
    }

    fn oid(id: &CommitId) -> Result<Oid> {
        Oid::from_str(id.as_str()).map_err(|_| Error::Resolution(id.to_string()))
    }

    /// Full ref name for `name`, accepting short branch names.
    fn full_ref_name(repo: &Repository, name: &str) -> Result<Option<String>> {
        if name == "HEAD" || name.starts_with("refs/") {
            return Ok(Some(name.to_string()));
        }
        match repo.resolve_reference_from_short_name(name) {
            Ok(reference) => Ok(reference.name().map(String::from)),
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn with_sequencer<T>(&self, f: impl FnOnce(&Sequencer<'_>) -> Result<T>) -> Result<T> {
        let repo = self.repo()?;
        let committer = self.committer(&repo)?;
        let sequencer = Sequencer::new(&repo, committer);
        if !sequencer.is_active() && is_rebasing(repo.state()) {
            return Err(Error::Backend(
                "a rebase started by another tool is in progress".to_string(),
            ));
        }
        f(&sequencer)
    }
}

fn is_rebasing(state: RepositoryState) -> bool {
    matches!(
        state,
        RepositoryState::Rebase
            | RepositoryState::RebaseInteractive
            | RepositoryState::RebaseMerge
            | RepositoryState::ApplyMailboxOrRebase
    )
}

fn identity(sig: &Signature<'_>) -> Identity {
    Identity {
        name: sig.name().unwrap_or("").to_string(),
        email: sig.email().unwrap_or("").to_string(),
        time: DateTime::<Utc>::from_timestamp(sig.when().seconds(), 0).unwrap_or_default(),
    }
}

fn convert(commit: &git2::Commit<'_>) -> Commit {
    Commit {
        id: CommitId::new(commit.id().to_string()),
        summary: commit.summary().unwrap_or("").to_string(),
        message: commit.message().unwrap_or("").to_string(),
        author: identity(&commit.author()),
        committer: identity(&commit.committer()),
        parents: commit
            .parent_ids()
            .map(|id| CommitId::new(id.to_string()))
            .collect(),
    }
}

impl CommitGraph for GitBackend {
    fn resolve(&self, spec: &str) -> Result<Option<CommitId>> {
        let repo = self.repo()?;
        let object = match repo.revparse_single(spec) {
            Ok(object) => object,
            Err(e)
                if matches!(
                    e.code(),
                    ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Ambiguous
                ) =>
            {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };
        let resolved = match object.peel_to_commit() {
            Ok(commit) => Ok(Some(CommitId::new(commit.id().to_string()))),
            Err(e) if matches!(e.code(), ErrorCode::Peel | ErrorCode::InvalidSpec) => Ok(None),
            Err(e) => Err(e.into()),
        };
        resolved
    }

    fn commit(&self, id: &CommitId) -> Result<Commit> {
        let repo = self.repo()?;
        let commit = repo
            .find_commit(Self::oid(id)?)
            .map_err(|_| Error::Resolution(id.to_string()))?;
        Ok(convert(&commit))
    }

    fn walk(
        &self,
        start: &[CommitId],
        uninteresting: &[CommitId],
        limit: Option<usize>,
    ) -> Result<Vec<Commit>> {
        let repo = self.repo()?;
        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        for id in start {
            revwalk.push(Self::oid(id)?)?;
        }
        for id in uninteresting {
            revwalk.hide(Self::oid(id)?)?;
        }

        let mut commits = Vec::new();
        for oid in revwalk {
            if limit.is_some_and(|n| commits.len() >= n) {
                break;
            }
            commits.push(convert(&repo.find_commit(oid?)?));
        }
        Ok(commits)
    }

    fn head(&self) -> Result<HeadRef> {
        let repo = self.repo()?;
        let head = repo.head()?;
        if head.is_branch() {
            if let Some(name) = head.name() {
                return Ok(HeadRef::Branch(name.to_string()));
            }
        }
        let commit = head.peel_to_commit()?;
        Ok(HeadRef::Detached(CommitId::new(commit.id().to_string())))
    }

    fn checkout(&self, id: &CommitId) -> Result<()> {
        rlog_debug!("GitBackend::checkout {}", id);
        let repo = self.repo()?;
        let commit = repo.find_commit(Self::oid(id)?)?;
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))
            .map_err(|e| Error::Backend(format!("checkout of {} failed: {}", id, e.message())))?;
        repo.set_head_detached(commit.id())?;
        Ok(())
    }

    fn checkout_head(&self, head: &HeadRef) -> Result<()> {
        rlog_debug!("GitBackend::checkout_head {}", head);
        let repo = self.repo()?;
        let (object, branch) = match head {
            HeadRef::Branch(name) => (repo.revparse_single(name)?, Some(name.as_str())),
            HeadRef::Detached(id) => (repo.find_commit(Self::oid(id)?)?.into_object(), None),
        };
        repo.checkout_tree(&object, Some(CheckoutBuilder::new().safe()))
            .map_err(|e| Error::Backend(format!("checkout of {} failed: {}", head, e.message())))?;
        match branch {
            Some(name) => repo.set_head(name)?,
            None => repo.set_head_detached(object.id())?,
        }
        Ok(())
    }

    fn reflog_entries(&self, ref_name: &str) -> Result<Option<Vec<RawReflogEntry>>> {
        let repo = self.repo()?;
        let Some(full_name) = Self::full_ref_name(&repo, ref_name)? else {
            return Ok(None);
        };
        let reflog = repo.reflog(&full_name)?;
        if reflog.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            reflog
                .iter()
                .map(|entry| RawReflogEntry {
                    old_id: CommitId::new(entry.id_old().to_string()),
                    new_id: CommitId::new(entry.id_new().to_string()),
                    message: entry.message().unwrap_or("").to_string(),
                    committer: identity(&entry.committer()),
                })
                .collect(),
        ))
    }

    fn reset_hard(&self, ref_name: &str, target: &CommitId) -> Result<()> {
        rlog_debug!("GitBackend::reset_hard ref={} target={}", ref_name, target);
        let repo = self.repo()?;
        let commit = repo.find_commit(Self::oid(target)?)?;
        let full_name = Self::full_ref_name(&repo, ref_name)?
            .ok_or_else(|| Error::Resolution(ref_name.to_string()))?;

        let head = repo.head()?;
        let moves_head =
            full_name == "HEAD" || (head.is_branch() && head.name() == Some(full_name.as_str()));
        drop(head);

        if moves_head {
            repo.reset(commit.as_object(), ResetType::Hard, None)?;
        } else {
            let log = format!("rewind: reset to {}", commit.id());
            repo.reference(&full_name, commit.id(), true, &log)?;
        }
        Ok(())
    }

    fn rebase_progress(&self) -> Result<Option<RebaseProgress>> {
        let repo = self.repo()?;
        let committer = self.committer(&repo)?;
        if let Some(progress) = Sequencer::new(&repo, committer).progress()? {
            return Ok(Some(progress));
        }
        if is_rebasing(repo.state()) {
            rlog_warn!("Repository is mid-rebase from another tool: {:?}", repo.state());
            return Ok(Some(RebaseProgress {
                foreign: true,
                ..RebaseProgress::default()
            }));
        }
        Ok(None)
    }

    fn rebase_begin(
        &self,
        upstream: &CommitId,
        mut steps: Vec<TodoStep>,
        on_reword: &mut MessageCallback<'_>,
    ) -> Result<BackendStatus> {
        for step in steps.iter_mut() {
            if step.action == TodoAction::Reword {
                let commit = self.commit(&step.commit)?;
                step.message = Some(on_reword(&commit));
            }
        }
        let onto = Self::oid(upstream)?;
        self.with_sequencer(|sequencer| sequencer.begin(onto, steps))
    }

    fn rebase_continue(&self) -> Result<BackendStatus> {
        self.with_sequencer(|sequencer| sequencer.resume())
    }

    fn rebase_skip(&self) -> Result<BackendStatus> {
        self.with_sequencer(|sequencer| sequencer.skip())
    }

    fn rebase_abort(&self) -> Result<BackendStatus> {
        self.with_sequencer(|sequencer| sequencer.abort())
    }
}
