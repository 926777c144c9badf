//! Binary search for the first bad commit.
//!
//! The engine keeps no state of its own. Every call takes the caller's
//! [`BisectSession`] by reference and hands back a new one, so a failed call
//! leaves the caller holding the previous, still valid session.
//!
//! Two callers bisecting the same repository with different sessions race on
//! the checked-out working copy; serializing them is the caller's job.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::graph::{CommitGraph, CommitId, CommitSummary, HeadRef};
use crate::{rlog, rlog_debug, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BisectStatus {
    InProgress,
    Complete,
}

/// Caller-owned bisect state.
///
/// `remaining` holds the untested commits of `(good_commit, bad_commit]`,
/// newest first. The known-bad tip counts as tested from the start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BisectSession {
    pub good_commit: CommitId,
    pub bad_commit: CommitId,
    pub remaining: Vec<CommitId>,
    pub tested: Vec<CommitId>,
    pub status: BisectStatus,
    /// Where HEAD was before the session started.
    pub original_head: HeadRef,
}

impl BisectSession {
    /// `range` is the newest-first enumeration of `(good, bad]`.
    pub fn new(
        good_commit: CommitId,
        bad_commit: CommitId,
        range: Vec<CommitId>,
        original_head: HeadRef,
    ) -> Self {
        let tested = vec![bad_commit.clone()];
        let remaining: Vec<CommitId> = range.into_iter().filter(|id| *id != bad_commit).collect();
        let status = status_for(&remaining);
        Self {
            good_commit,
            bad_commit,
            remaining,
            tested,
            status,
            original_head,
        }
    }

    /// Session after `commit` tested good. `range` is the fresh enumeration
    /// of `(commit, bad_commit]`.
    pub fn with_good_commit(&self, commit: CommitId, range: &[CommitId]) -> Self {
        let tested = self.tested_with(&commit);
        let remaining = self.narrowed(range, &tested);
        Self {
            good_commit: commit,
            bad_commit: self.bad_commit.clone(),
            status: status_for(&remaining),
            remaining,
            tested,
            original_head: self.original_head.clone(),
        }
    }

    /// Session after `commit` tested bad. `range` is the fresh enumeration
    /// of `(good_commit, commit]`.
    pub fn with_bad_commit(&self, commit: CommitId, range: &[CommitId]) -> Self {
        let tested = self.tested_with(&commit);
        let remaining = self.narrowed(range, &tested);
        Self {
            good_commit: self.good_commit.clone(),
            bad_commit: commit,
            status: status_for(&remaining),
            remaining,
            tested,
            original_head: self.original_head.clone(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == BisectStatus::Complete || self.remaining.is_empty()
    }

    /// Next commit to test: `remaining[len / 2]`.
    pub fn midpoint(&self) -> Option<&CommitId> {
        self.remaining.get(self.remaining.len() / 2)
    }

    fn tested_with(&self, commit: &CommitId) -> Vec<CommitId> {
        let mut tested = self.tested.clone();
        if !tested.contains(commit) {
            tested.push(commit.clone());
        }
        tested
    }

    /// Keep the order of `range` but never re-admit commits an earlier
    /// verdict already ruled out.
    fn narrowed(&self, range: &[CommitId], tested: &[CommitId]) -> Vec<CommitId> {
        let still_open: HashSet<&CommitId> = self.remaining.iter().collect();
        range
            .iter()
            .filter(|id| still_open.contains(id) && !tested.contains(id))
            .cloned()
            .collect()
    }
}

fn status_for(remaining: &[CommitId]) -> BisectStatus {
    if remaining.is_empty() {
        BisectStatus::Complete
    } else {
        BisectStatus::InProgress
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BisectPhase {
    Started,
    InProgress,
    Complete,
    Reset,
}

/// What a bisect call reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BisectReport {
    pub phase: BisectPhase,
    pub message: String,
    /// The commit now checked out for testing.
    pub current_commit: Option<CommitSummary>,
    pub remaining_count: usize,
    /// Pass this back on the next call. Kept on completion so `reset` can
    /// still find the original HEAD.
    pub session: Option<BisectSession>,
    pub first_bad_commit: Option<CommitSummary>,
}

impl BisectReport {
    fn started(candidate: CommitSummary, remaining_count: usize, session: BisectSession) -> Self {
        Self {
            phase: BisectPhase::Started,
            message: "Bisect started. Please test this commit and mark it as good or bad."
                .to_string(),
            current_commit: Some(candidate),
            remaining_count,
            session: Some(session),
            first_bad_commit: None,
        }
    }

    fn in_progress(candidate: CommitSummary, session: BisectSession, verdict: Verdict) -> Self {
        Self {
            phase: BisectPhase::InProgress,
            message: format!(
                "Commit marked as {}. Please test this commit and mark it as good or bad.",
                verdict.as_str()
            ),
            current_commit: Some(candidate),
            remaining_count: session.remaining.len(),
            session: Some(session),
            first_bad_commit: None,
        }
    }

    fn complete(first_bad: CommitSummary, session: BisectSession) -> Self {
        Self {
            phase: BisectPhase::Complete,
            message: format!("Bisect complete. The first bad commit is: {}", first_bad.id),
            current_commit: None,
            remaining_count: 0,
            session: Some(session),
            first_bad_commit: Some(first_bad),
        }
    }

    fn reset(message: String) -> Self {
        Self {
            phase: BisectPhase::Reset,
            message,
            current_commit: None,
            remaining_count: 0,
            session: None,
            first_bad_commit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Good,
    Bad,
}

impl Verdict {
    fn as_str(&self) -> &'static str {
        match self {
            Verdict::Good => "good",
            Verdict::Bad => "bad",
        }
    }
}

pub struct BisectEngine<'g, G: CommitGraph + ?Sized> {
    graph: &'g G,
}

impl<'g, G: CommitGraph + ?Sized> BisectEngine<'g, G> {
    pub fn new(graph: &'g G) -> Self {
        Self { graph }
    }

    pub fn start(&self, good: &str, bad: &str) -> Result<BisectReport> {
        rlog_debug!("BisectEngine::start good={} bad={}", good, bad);
        let good_id = self
            .graph
            .resolve(good)?
            .ok_or_else(|| Error::Resolution(format!("{} (good commit)", good)))?;
        let bad_id = self
            .graph
            .resolve(bad)?
            .ok_or_else(|| Error::Resolution(format!("{} (bad commit)", bad)))?;

        let original_head = self.graph.head()?;
        let range = self.graph.range(&bad_id, Some(&good_id), None)?;
        if range.is_empty() {
            return Err(Error::EmptyRange {
                good: good.to_string(),
                bad: bad.to_string(),
            });
        }

        let candidate = &range[range.len() / 2];
        self.graph.checkout(&candidate.id)?;
        rlog!(
            "Bisect started between {} and {}: {} commits, testing {}",
            good_id.short(),
            bad_id.short(),
            range.len(),
            candidate.short_id()
        );

        let ids = range.iter().map(|c| c.id.clone()).collect();
        let session = BisectSession::new(good_id, bad_id, ids, original_head);
        Ok(BisectReport::started(
            CommitSummary::from(candidate),
            range.len(),
            session,
        ))
    }

    pub fn mark_good(&self, session: &BisectSession) -> Result<BisectReport> {
        self.mark(session, Verdict::Good)
    }

    pub fn mark_bad(&self, session: &BisectSession) -> Result<BisectReport> {
        self.mark(session, Verdict::Bad)
    }

    fn mark(&self, session: &BisectSession, verdict: Verdict) -> Result<BisectReport> {
        let current = self.graph.require("HEAD")?;
        rlog_debug!(
            "BisectEngine::mark {} current={}",
            verdict.as_str(),
            current.short()
        );

        let next = match verdict {
            Verdict::Good => {
                let range = self.ids(&session.bad_commit, &current)?;
                session.with_good_commit(current.clone(), &range)
            }
            Verdict::Bad => {
                let range = self.ids(&current, &session.good_commit)?;
                session.with_bad_commit(current.clone(), &range)
            }
        };

        let Some(candidate) = next.midpoint().cloned() else {
            let first_bad = match verdict {
                Verdict::Good => &next.bad_commit,
                Verdict::Bad => &current,
            };
            let first_bad = CommitSummary::from(&self.graph.commit(first_bad)?);
            rlog!("Bisect complete, first bad commit {}", first_bad.short_id);
            return Ok(BisectReport::complete(first_bad, next));
        };

        let commit = self.graph.commit(&candidate)?;
        self.graph.checkout(&candidate)?;
        rlog!(
            "Bisect: {} marked {}, {} left, testing {}",
            current.short(),
            verdict.as_str(),
            next.remaining.len(),
            candidate.short()
        );
        Ok(BisectReport::in_progress(
            CommitSummary::from(&commit),
            next,
            verdict,
        ))
    }

    /// Return to where HEAD was before `start`. No session is not an error.
    pub fn reset(&self, session: Option<&BisectSession>) -> Result<BisectReport> {
        let Some(session) = session else {
            rlog_debug!("BisectEngine::reset without a session");
            return Ok(BisectReport::reset(
                "No bisect session was in progress.".to_string(),
            ));
        };

        self.graph.checkout_head(&session.original_head)?;
        rlog!("Bisect reset to {}", session.original_head);
        Ok(BisectReport::reset(format!(
            "Bisect session reset. Returned to {}.",
            session.original_head
        )))
    }

    fn ids(&self, tip: &CommitId, base: &CommitId) -> Result<Vec<CommitId>> {
        Ok(self
            .graph
            .range(tip, Some(base), None)?
            .into_iter()
            .map(|c| c.id)
            .collect())
    }
}
