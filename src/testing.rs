//! In-memory [`CommitGraph`] used by the engine unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::graph::{
    BackendStatus, Commit, CommitGraph, CommitId, HeadRef, Identity, MessageCallback,
    RawReflogEntry, RebaseProgress, TodoAction, TodoStep,
};
use crate::{Error, Result};

pub(crate) fn fake_id(n: usize) -> CommitId {
    CommitId::new(format!("{:040x}", n))
}

fn identity(name: &str, secs: i64) -> Identity {
    Identity {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        time: DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default(),
    }
}

#[derive(Default)]
pub(crate) struct FakeRebase {
    pub active: bool,
    pub upstream: Option<CommitId>,
    pub submitted: Vec<TodoStep>,
    /// Statuses handed out by begin/continue/skip, front first. Empty means `Ok`.
    pub script: VecDeque<BackendStatus>,
    pub calls: Vec<&'static str>,
}

pub(crate) struct FakeGraph {
    commits: HashMap<CommitId, Commit>,
    /// Insertion index, used as commit time.
    order: HashMap<CommitId, usize>,
    names: HashMap<String, CommitId>,
    pub head: RefCell<HeadRef>,
    pub branches: RefCell<HashMap<String, CommitId>>,
    pub reflogs: HashMap<String, Vec<RawReflogEntry>>,
    pub checkouts: RefCell<Vec<CommitId>>,
    pub resets: RefCell<Vec<(String, CommitId)>>,
    pub fail_checkout: Cell<bool>,
    pub rebase: RefCell<FakeRebase>,
}

impl FakeGraph {
    pub fn new() -> Self {
        Self {
            commits: HashMap::new(),
            order: HashMap::new(),
            names: HashMap::new(),
            head: RefCell::new(HeadRef::Branch("refs/heads/main".to_string())),
            branches: RefCell::new(HashMap::new()),
            reflogs: HashMap::new(),
            checkouts: RefCell::new(Vec::new()),
            resets: RefCell::new(Vec::new()),
            fail_checkout: Cell::new(false),
            rebase: RefCell::new(FakeRebase::default()),
        }
    }

    /// `C1 <- C2 <- ... <- Cn`, with `main` and HEAD at `Cn`.
    pub fn linear(n: usize) -> Self {
        let mut graph = Self::new();
        let mut parent = None;
        for i in 1..=n {
            let id = graph.add(&format!("C{}", i), parent.iter().cloned().collect());
            parent = Some(id);
        }
        if let Some(tip) = parent {
            graph.branches.borrow_mut().insert("refs/heads/main".to_string(), tip);
        }
        graph
    }

    /// Add a commit named `name` (resolvable by that name) with the given parents.
    pub fn add(&mut self, name: &str, parents: Vec<CommitId>) -> CommitId {
        let index = self.commits.len() + 1;
        let id = fake_id(index);
        let time = 1_700_000_000 + index as i64 * 60;
        let commit = Commit {
            id: id.clone(),
            summary: format!("{} summary", name),
            message: format!("{} summary\n\n{} body\n", name, name),
            author: identity("Author", time),
            committer: identity("Committer", time),
            parents,
        };
        self.commits.insert(id.clone(), commit);
        self.order.insert(id.clone(), index);
        self.names.insert(name.to_string(), id.clone());
        id
    }

    pub fn id(&self, name: &str) -> CommitId {
        self.names[name].clone()
    }

    pub fn with_reflog(mut self, ref_name: &str, entries: Vec<RawReflogEntry>) -> Self {
        self.reflogs.insert(ref_name.to_string(), entries);
        self
    }

    /// A consistent reflog of `count` updates walking forward through `C1..`.
    pub fn linear_reflog(&self, count: usize) -> Vec<RawReflogEntry> {
        let mut entries = Vec::new();
        for i in 1..=count {
            let old_id = if i == 1 {
                CommitId::new("0".repeat(40))
            } else {
                self.id(&format!("C{}", i - 1))
            };
            entries.push(RawReflogEntry {
                old_id,
                new_id: self.id(&format!("C{}", i)),
                message: format!("commit: C{}", i),
                committer: identity("Committer", 1_700_000_000 + i as i64),
            });
        }
        entries.reverse();
        entries
    }

    pub fn head_commit(&self) -> CommitId {
        match &*self.head.borrow() {
            HeadRef::Branch(name) => self.branches.borrow()[name].clone(),
            HeadRef::Detached(id) => id.clone(),
        }
    }

    fn ancestors(&self, from: &[CommitId]) -> HashSet<CommitId> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<CommitId> = from.iter().cloned().collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&id) {
                queue.extend(commit.parents.iter().cloned());
            }
        }
        seen
    }

    fn next_status(&self) -> BackendStatus {
        let mut rebase = self.rebase.borrow_mut();
        let status = rebase.script.pop_front().unwrap_or(BackendStatus::Ok);
        rebase.active = matches!(status, BackendStatus::Stopped | BackendStatus::Conflicts(_));
        status
    }
}

impl CommitGraph for FakeGraph {
    fn resolve(&self, spec: &str) -> Result<Option<CommitId>> {
        if spec == "HEAD" {
            return Ok(Some(self.head_commit()));
        }
        if let Some(id) = self.branches.borrow().get(&format!("refs/heads/{}", spec)) {
            return Ok(Some(id.clone()));
        }
        if let Some(id) = self.names.get(spec) {
            return Ok(Some(id.clone()));
        }
        let id = CommitId::new(spec);
        Ok(self.commits.contains_key(&id).then_some(id))
    }

    fn commit(&self, id: &CommitId) -> Result<Commit> {
        self.commits
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Resolution(id.to_string()))
    }

    fn walk(
        &self,
        start: &[CommitId],
        uninteresting: &[CommitId],
        limit: Option<usize>,
    ) -> Result<Vec<Commit>> {
        let hidden = self.ancestors(uninteresting);
        let mut commits: Vec<Commit> = self
            .ancestors(start)
            .into_iter()
            .filter(|id| !hidden.contains(id))
            .map(|id| self.commits[&id].clone())
            .collect();
        commits.sort_by_key(|c| std::cmp::Reverse(self.order[&c.id]));
        if let Some(limit) = limit {
            commits.truncate(limit);
        }
        Ok(commits)
    }

    fn head(&self) -> Result<HeadRef> {
        Ok(self.head.borrow().clone())
    }

    fn checkout(&self, id: &CommitId) -> Result<()> {
        if self.fail_checkout.get() {
            return Err(Error::Backend(format!("checkout of {} failed", id)));
        }
        self.checkouts.borrow_mut().push(id.clone());
        *self.head.borrow_mut() = HeadRef::Detached(id.clone());
        Ok(())
    }

    fn checkout_head(&self, head: &HeadRef) -> Result<()> {
        if self.fail_checkout.get() {
            return Err(Error::Backend(format!("checkout of {} failed", head)));
        }
        *self.head.borrow_mut() = head.clone();
        Ok(())
    }

    fn reflog_entries(&self, ref_name: &str) -> Result<Option<Vec<RawReflogEntry>>> {
        Ok(self.reflogs.get(ref_name).cloned())
    }

    fn reset_hard(&self, ref_name: &str, target: &CommitId) -> Result<()> {
        self.resets
            .borrow_mut()
            .push((ref_name.to_string(), target.clone()));
        let head = self.head.borrow().clone();
        match head {
            HeadRef::Branch(name) if ref_name == "HEAD" || ref_name == name => {
                self.branches.borrow_mut().insert(name, target.clone());
            }
            _ if ref_name == "HEAD" => {
                *self.head.borrow_mut() = HeadRef::Detached(target.clone());
            }
            _ => {
                self.branches
                    .borrow_mut()
                    .insert(ref_name.to_string(), target.clone());
            }
        }
        Ok(())
    }

    fn rebase_progress(&self) -> Result<Option<RebaseProgress>> {
        let rebase = self.rebase.borrow();
        if !rebase.active {
            return Ok(None);
        }
        Ok(Some(RebaseProgress {
            done: Vec::new(),
            todo: rebase.submitted.clone(),
            current: None,
            conflicted: false,
            foreign: false,
        }))
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
        {
            let mut rebase = self.rebase.borrow_mut();
            rebase.calls.push("begin");
            rebase.upstream = Some(upstream.clone());
            rebase.submitted = steps;
        }
        Ok(self.next_status())
    }

    fn rebase_continue(&self) -> Result<BackendStatus> {
        self.rebase.borrow_mut().calls.push("continue");
        Ok(self.next_status())
    }

    fn rebase_skip(&self) -> Result<BackendStatus> {
        self.rebase.borrow_mut().calls.push("skip");
        Ok(self.next_status())
    }

    fn rebase_abort(&self) -> Result<BackendStatus> {
        let mut rebase = self.rebase.borrow_mut();
        rebase.calls.push("abort");
        rebase.active = false;
        Ok(BackendStatus::Aborted)
    }
}
