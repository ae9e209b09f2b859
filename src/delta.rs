// src/delta.rs
//
// Distance from every commit back to the nearest ancestor that changed an
// assertion, measured in commits and in author/commit time.

use crate::error::DeltaError;
use crate::model::{CommitIdx, GitTime, History};
use chrono::Duration;
use tracing::debug;

/// Per-commit distance record. `None` stands for "no assertion seen yet" /
/// unbounded.
#[derive(Debug, Clone, Default)]
pub struct Delta {
    /// Commits since the nearest ancestor (inclusive) carrying an assertion
    pub commits_since: Option<u32>,
    pub last_author_time: Option<GitTime>,
    pub last_commit_time: Option<GitTime>,
    /// Only set on assertion-bearing commits with an assertion-bearing ancestor
    pub min_commit_distance: Option<u32>,
    pub min_author_duration: Option<Duration>,
    pub min_commit_duration: Option<Duration>,
    visit_count: usize,
}

impl PartialEq for Delta {
    fn eq(&self, other: &Self) -> bool {
        self.commits_since == other.commits_since
            && self.last_author_time == other.last_author_time
            && self.last_commit_time == other.last_commit_time
            && self.min_commit_distance == other.min_commit_distance
            && self.min_author_duration == other.min_author_duration
            && self.min_commit_duration == other.min_commit_duration
    }
}

impl Eq for Delta {}

fn min_opt<T: Ord>(current: Option<T>, candidate: T) -> Option<T> {
    Some(match current {
        Some(value) => value.min(candidate),
        None => candidate,
    })
}

fn latest(current: Option<GitTime>, candidate: Option<GitTime>) -> Option<GitTime> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(if b.seconds > a.seconds { b } else { a }),
        (a, b) => a.or(b),
    }
}

impl Delta {
    /// The history a root commit inherits: nothing seen
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn visit_count(&self) -> usize {
        self.visit_count
    }

    pub fn has_prior(&self) -> bool {
        self.commits_since.is_some()
    }

    /// Candidate distances from `parent`'s last assertion to a commit at
    /// `author_time`/`commit_time`, or `None` if the parent has seen none.
    fn measure(parent: &Delta, author_time: GitTime, commit_time: GitTime) -> Option<(u32, Duration, Duration)> {
        Some((
            parent.commits_since? + 1,
            author_time.since(parent.last_author_time?),
            commit_time.since(parent.last_commit_time?),
        ))
    }
}

/// Folds the settled delta of one parent into `child`.
fn fold(history: &History, deltas: &mut [Option<Delta>], child: CommitIdx, parent: &Delta) -> Result<(), DeltaError> {
    let commit = &history.commits[child];
    let has_assert = commit.has_assert();
    let settle_at = commit.parents.len().max(1);
    let measured = Delta::measure(parent, commit.author_time, commit.commit_time);

    match deltas[child].as_mut() {
        None => {
            let mut delta = match (measured, has_assert) {
                (None, false) => Delta::unbounded(),
                (None, true) => Delta {
                    commits_since: Some(0),
                    last_author_time: Some(commit.author_time),
                    last_commit_time: Some(commit.commit_time),
                    ..Delta::default()
                },
                (Some((distance, author, committed)), true) => Delta {
                    commits_since: Some(0),
                    last_author_time: Some(commit.author_time),
                    last_commit_time: Some(commit.commit_time),
                    min_commit_distance: Some(distance),
                    min_author_duration: Some(author),
                    min_commit_duration: Some(committed),
                    visit_count: 0,
                },
                (Some((distance, _, _)), false) => Delta {
                    commits_since: Some(distance),
                    last_author_time: parent.last_author_time,
                    last_commit_time: parent.last_commit_time,
                    ..Delta::default()
                },
            };
            delta.visit_count = 1;
            deltas[child] = Some(delta);
        }
        Some(delta) => {
            if delta.visit_count >= settle_at {
                return Err(DeltaError::Transition { commit: child, visits: delta.visit_count + 1, parents: settle_at });
            }
            if has_assert && delta.commits_since != Some(0) {
                return Err(DeltaError::Inconsistent { commit: child, commits_since: delta.commits_since });
            }
            match (measured, has_assert) {
                (None, _) => {}
                (Some((distance, author, committed)), true) => {
                    delta.min_commit_distance = min_opt(delta.min_commit_distance, distance);
                    delta.min_author_duration = min_opt(delta.min_author_duration, author);
                    delta.min_commit_duration = min_opt(delta.min_commit_duration, committed);
                }
                (Some((distance, _, _)), false) => {
                    delta.commits_since = min_opt(delta.commits_since, distance);
                    delta.last_author_time = latest(delta.last_author_time, parent.last_author_time);
                    delta.last_commit_time = latest(delta.last_commit_time, parent.last_commit_time);
                }
            }
            delta.visit_count += 1;
        }
    }
    Ok(())
}

/// Computes the settled `Delta` of every commit in `history`, indexed like
/// `history.commits`.
///
/// The walk is iterative: roots get one visit from `Delta::unbounded()`, and a
/// commit is expanded into its children only once every parent has folded
/// into it, so merges see the minimum over all of their ancestry.
pub fn propagate(history: &History) -> Result<Vec<Delta>, DeltaError> {
    let mut deltas: Vec<Option<Delta>> = vec![None; history.len()];
    let mut work: Vec<CommitIdx> = Vec::new();

    let unbounded = Delta::unbounded();
    for root in history.roots() {
        fold(history, &mut deltas, root, &unbounded)?;
        work.push(root);
    }

    while let Some(idx) = work.pop() {
        let Some(settled) = deltas[idx].clone() else {
            continue;
        };
        for &child in &history.commits[idx].children {
            fold(history, &mut deltas, child, &settled)?;
            let parents = history.commits[child].parents.len();
            if deltas[child].as_ref().is_some_and(|d| d.visit_count == parents) {
                work.push(child);
            }
        }
    }

    deltas
        .into_iter()
        .enumerate()
        .map(|(commit, delta)| {
            let parents = history.commits[commit].parents.len().max(1);
            match delta {
                Some(d) if d.visit_count == parents => Ok(d),
                other => Err(DeltaError::Unsettled { commit, visits: other.map_or(0, |d| d.visit_count), parents }),
            }
        })
        .inspect(|d| {
            if let Ok(d) = d {
                debug!(commits_since = ?d.commits_since, min_commit_distance = ?d.min_commit_distance, "delta settled");
            }
        })
        .collect()
}
