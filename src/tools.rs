//! Caller-facing entry points. Every operation returns an [`Outcome`]; engine
//! errors are logged and turned into failure messages here.

use std::path::Path;

use crate::bisect::{BisectEngine, BisectReport, BisectSession};
use crate::config::Config;
use crate::git::GitBackend;
use crate::graph::{CommitGraph, CommitId};
use crate::outcome::Outcome;
use crate::rebase::{
    DisplayFormat, NumberedCommit, PreviewCommit, RebaseEngine, RebaseInstruction,
    RebaseOutcome, RebasePlan, RebaseStatus,
};
use crate::reflog::{ReflogEngine, ReflogEntry, ReflogTarget};
use crate::{rlog_debug, rlog_error, Result};

pub struct Tools<G: CommitGraph> {
    graph: G,
    config: Config,
}

impl Tools<GitBackend> {
    /// Open the repository at `path`, or the configured one when absent.
    pub fn open(path: Option<&Path>, config: Config) -> Result<Self> {
        let repo_path = path.map(Path::to_path_buf).unwrap_or_else(|| config.repo_path());
        let (name, email) = config.fallback_committer();
        let backend = GitBackend::new(&repo_path)?.with_committer(name, email);
        rlog_debug!("Tools::open repo={}", backend.repo_path().display());
        Ok(Self::new(backend, config))
    }
}

impl<G: CommitGraph> Tools<G> {
    pub fn new(graph: G, config: Config) -> Self {
        Self { graph, config }
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    fn rebase_engine(&self) -> RebaseEngine<'_, G> {
        RebaseEngine::new(&self.graph)
            .with_list_limit(self.config.effective_list_limit())
            .with_validation_window(self.config.effective_validation_window())
    }

    pub fn bisect_start(&self, good: &str, bad: &str) -> Outcome<BisectReport> {
        finish("bisect start", BisectEngine::new(&self.graph).start(good, bad))
    }

    pub fn bisect_good(&self, session: &BisectSession) -> Outcome<BisectReport> {
        finish("bisect good", BisectEngine::new(&self.graph).mark_good(session))
    }

    pub fn bisect_bad(&self, session: &BisectSession) -> Outcome<BisectReport> {
        finish("bisect bad", BisectEngine::new(&self.graph).mark_bad(session))
    }

    pub fn bisect_reset(&self, session: Option<&BisectSession>) -> Outcome<BisectReport> {
        finish("bisect reset", BisectEngine::new(&self.graph).reset(session))
    }

    pub fn rebase_plan(&self, upstream: &str, branch: Option<&str>) -> Outcome<RebasePlan> {
        finish("rebase plan", self.rebase_engine().plan(upstream, branch))
    }

    pub fn rebase_preview(
        &self,
        base: &str,
        max_count: i64,
        format: DisplayFormat,
    ) -> Outcome<Vec<PreviewCommit>> {
        finish(
            "rebase preview",
            self.rebase_engine().preview(base, max_count, format),
        )
    }

    pub fn list_commits(
        &self,
        base: Option<&str>,
        max_count: i64,
        format: DisplayFormat,
    ) -> Outcome<Vec<NumberedCommit>> {
        finish(
            "list commits",
            self.rebase_engine().list_commits(base, max_count, format),
        )
    }

    pub fn rebase_start(&self, upstream: &str) -> Outcome<RebaseOutcome> {
        finish("rebase start", self.rebase_engine().start(upstream))
    }

    pub fn rebase_execute(
        &self,
        upstream: &str,
        instructions: &[RebaseInstruction],
    ) -> Outcome<RebaseOutcome> {
        finish(
            "rebase execute",
            self.rebase_engine().execute(upstream, instructions),
        )
    }

    pub fn rebase_continue(&self) -> Outcome<RebaseOutcome> {
        finish("rebase continue", self.rebase_engine().continue_rebase())
    }

    pub fn rebase_skip(&self) -> Outcome<RebaseOutcome> {
        finish("rebase skip", self.rebase_engine().skip())
    }

    pub fn rebase_abort(&self) -> Outcome<RebaseOutcome> {
        finish("rebase abort", self.rebase_engine().abort())
    }

    pub fn rebase_status(&self) -> Outcome<RebaseStatus> {
        finish("rebase status", self.rebase_engine().status())
    }

    /// `max_count` falls back to the configured `reflog_limit`.
    pub fn reflog(&self, ref_name: Option<&str>, max_count: Option<usize>) -> Outcome<Vec<ReflogEntry>> {
        let max_count = max_count.unwrap_or(self.config.reflog_limit);
        finish(
            "reflog",
            ReflogEngine::new(&self.graph).get_reflog(ref_name, max_count),
        )
    }

    pub fn reflog_revert(&self, ref_name: Option<&str>, commit: &str) -> Outcome<CommitId> {
        finish(
            "reflog revert",
            ReflogEngine::new(&self.graph).revert(ref_name, commit),
        )
    }

    pub fn reflog_resolve(&self, expression: &str) -> Outcome<ReflogTarget> {
        finish(
            "reflog resolve",
            ReflogEngine::new(&self.graph).resolve_expression(expression),
        )
    }

    pub fn reflog_goto(&self, expression: &str) -> Outcome<ReflogTarget> {
        finish(
            "reflog goto",
            ReflogEngine::new(&self.graph).revert_expression(expression),
        )
    }
}

fn finish<T>(operation: &str, result: Result<T>) -> Outcome<T> {
    if let Err(e) = &result {
        rlog_error!("{} failed: {}", operation, e);
    }
    result.into()
}
