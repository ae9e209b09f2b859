// src/error.rs

use crate::model::CommitIdx;
use thiserror::Error;

/// An invariant of the predicate scanner did not hold
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("closed predicate has no enclosing parentheses: {text:?}")]
    Unbalanced { text: String },
}

/// A commit reached a state the delta transition table does not cover
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeltaError {
    #[error("commit {commit} visited after it settled ({visits} of {parents} parents)")]
    Transition { commit: CommitIdx, visits: usize, parents: usize },
    #[error("assertion-bearing commit {commit} has a delta {commits_since:?} commits from its last assertion")]
    Inconsistent { commit: CommitIdx, commits_since: Option<u32> },
    #[error("commit {commit} never settled ({visits} of {parents} parents visited)")]
    Unsettled { commit: CommitIdx, visits: usize, parents: usize },
}

#[derive(Debug, Error)]
pub enum MineError {
    #[error("git: {0}")]
    Git(#[from] git2::Error),
    #[error("invalid keyword pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("delta propagation: {0}")]
    Delta(#[from] DeltaError),
}
