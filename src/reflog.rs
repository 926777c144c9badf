//! Reflog listing and `ref@{n}` time travel.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::graph::{CommitGraph, CommitId, RawReflogEntry};
use crate::{rlog, rlog_debug, rlog_warn, Error, Result};

const DEFAULT_REF: &str = "HEAD";

/// `ref@{n}` with a non-negative decimal `n`
static EXPRESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)@\{(\d+)\}$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflogCommitter {
    pub name: String,
    pub email: String,
    pub time: DateTime<Utc>,
}

/// One reflog line. `index` is the `n` of `ref@{n}`; 0 is the latest update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflogEntry {
    pub old_id: CommitId,
    pub new_id: CommitId,
    pub message: String,
    pub committer: ReflogCommitter,
    pub ref_name: String,
    pub index: usize,
}

impl ReflogEntry {
    fn new(raw: RawReflogEntry, ref_name: &str, index: usize) -> Self {
        Self {
            old_id: raw.old_id,
            new_id: raw.new_id,
            message: raw.message,
            committer: ReflogCommitter {
                name: raw.committer.name,
                email: raw.committer.email,
                time: raw.committer.time,
            },
            ref_name: ref_name.to_string(),
            index,
        }
    }
}

/// Where a `ref@{n}` expression points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflogTarget {
    pub ref_name: String,
    pub index: usize,
    pub commit_id: CommitId,
}

/// Split `ref@{n}` into the ref name and `n`.
pub fn parse_expression(expression: &str) -> Result<(String, usize)> {
    let invalid = || Error::ExpressionResolution(expression.to_string());
    let captures = EXPRESSION_RE.captures(expression).ok_or_else(invalid)?;
    let index = captures[2].parse::<usize>().map_err(|_| invalid())?;
    Ok((captures[1].to_string(), index))
}

/// Positions `i` where `entries[i].new_id` does not continue from
/// `entries[i - 1].old_id`, plus the last position when a complete log does
/// not start from the all-zero id.
pub fn chain_breaks(entries: &[ReflogEntry], complete: bool) -> Vec<usize> {
    let mut breaks: Vec<usize> = entries
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1].new_id != pair[0].old_id)
        .map(|(i, _)| i + 1)
        .collect();
    if complete {
        if let Some(oldest) = entries.last() {
            if !oldest.old_id.is_zero() {
                breaks.push(entries.len() - 1);
            }
        }
    }
    breaks
}

pub struct ReflogEngine<'g, G: CommitGraph + ?Sized> {
    graph: &'g G,
}

impl<'g, G: CommitGraph + ?Sized> ReflogEngine<'g, G> {
    pub fn new(graph: &'g G) -> Self {
        Self { graph }
    }

    /// Newest-first reflog of `ref_name` (HEAD when absent). `max_count` 0 is unlimited.
    pub fn get_reflog(&self, ref_name: Option<&str>, max_count: usize) -> Result<Vec<ReflogEntry>> {
        let ref_name = ref_name_or_head(ref_name);
        rlog_debug!("ReflogEngine::get_reflog ref={} max_count={}", ref_name, max_count);

        let raw = self
            .graph
            .reflog_entries(ref_name)?
            .ok_or_else(|| Error::NoReflog(ref_name.to_string()))?;
        let complete = max_count == 0 || raw.len() <= max_count;
        let limit = if max_count == 0 { raw.len() } else { max_count };
        let entries: Vec<ReflogEntry> = raw
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(index, entry)| ReflogEntry::new(entry, ref_name, index))
            .collect();

        let breaks = chain_breaks(&entries, complete);
        if !breaks.is_empty() {
            rlog_warn!("Reflog of {} is discontinuous at {:?}", ref_name, breaks);
        }
        Ok(entries)
    }

    /// Hard-reset `ref_name` (HEAD when absent) to `commit`. Destroys
    /// uncommitted work.
    pub fn revert(&self, ref_name: Option<&str>, commit: &str) -> Result<CommitId> {
        let ref_name = ref_name_or_head(ref_name);
        rlog_debug!("ReflogEngine::revert ref={} commit={}", ref_name, commit);
        let target = self.graph.require(commit)?;
        self.graph.reset_hard(ref_name, &target)?;
        rlog!("Reset {} to {}", ref_name, target.short());
        Ok(target)
    }

    /// The commit `ref@{n}` names, without touching the repository.
    pub fn resolve_expression(&self, expression: &str) -> Result<ReflogTarget> {
        rlog_debug!("ReflogEngine::resolve_expression {}", expression);
        let (ref_name, index) = parse_expression(expression)?;
        let entries = match self.get_reflog(Some(&ref_name), index.saturating_add(1)) {
            Ok(entries) => entries,
            Err(Error::NoReflog(_)) => {
                return Err(Error::ExpressionResolution(format!(
                    "{} (no reflog for {})",
                    expression, ref_name
                )))
            }
            Err(e) => return Err(e),
        };
        let entry = entries.get(index).ok_or_else(|| {
            Error::ExpressionResolution(format!(
                "{} (only {} entries for {})",
                expression,
                entries.len(),
                ref_name
            ))
        })?;
        Ok(ReflogTarget {
            commit_id: entry.new_id.clone(),
            ref_name,
            index,
        })
    }

    /// Reset the expression's ref to the commit it named `n` updates ago.
    pub fn revert_expression(&self, expression: &str) -> Result<ReflogTarget> {
        let target = self.resolve_expression(expression)?;
        self.revert(Some(&target.ref_name), target.commit_id.as_str())?;
        Ok(target)
    }
}

fn ref_name_or_head(ref_name: Option<&str>) -> &str {
    ref_name
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REF)
}
