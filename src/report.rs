// src/report.rs

use crate::analyzer::Mined;
use crate::delta::Delta;
use crate::error::MineError;
use crate::model::{Commit, GitTime, History, Polarity};
use chrono::Duration;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

/// How often one normalized predicate was added and removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredicateActivity {
    pub predicate: String,
    pub added: usize,
    pub removed: usize,
}

/// Aggregate view of one mined repository
#[derive(Debug, Serialize)]
pub struct Summary {
    pub repo: String,
    pub commits: usize,
    pub commits_with_assertions: usize,
    pub first_commit: Option<String>,
    pub last_commit: Option<String>,
    pub confirmed_added: usize,
    pub confirmed_removed: usize,
    pub needs_inspection: usize,
    pub extraction_failures: usize,
    /// Confirmed assertions per keyword
    pub names: BTreeMap<String, usize>,
    /// Assertions needing inspection per keyword
    pub inspection_names: BTreeMap<String, usize>,
    pub top_predicates: Vec<PredicateActivity>,
    pub top_contexts: Vec<AssertionContext>,
    /// Commits between consecutive assertion changes on the same ancestry
    pub commit_distance: BTreeMap<u32, usize>,
    /// The same distances in whole days of author time
    pub author_days: BTreeMap<i64, usize>,
    /// ...and of commit time
    pub commit_days: BTreeMap<i64, usize>,
}

fn rfc2822(time: GitTime) -> Option<String> {
    time.to_datetime().map(|t| t.to_rfc2822())
}

fn histogram<K: Ord>(values: impl Iterator<Item = K>) -> BTreeMap<K, usize> {
    let mut buckets = BTreeMap::new();
    for value in values {
        *buckets.entry(value).or_insert(0) += 1;
    }
    buckets
}

/// Predicates ranked by how often they were added or removed
pub fn predicate_activity(history: &History) -> Vec<PredicateActivity> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for assertion in history.assertions() {
        let entry = counts.entry(assertion.normalized_predicate()).or_default();
        match assertion.change {
            Polarity::Added => entry.0 += 1,
            Polarity::Removed => entry.1 += 1,
            Polarity::None => {}
        }
    }

    let mut activity: Vec<PredicateActivity> = counts
        .into_iter()
        .map(|(predicate, (added, removed))| PredicateActivity { predicate, added, removed })
        .collect();
    activity.sort_by(|a, b| (b.added + b.removed).cmp(&(a.added + a.removed)).then_with(|| a.predicate.cmp(&b.predicate)));
    activity
}

/// Per file, the commits that added and removed one assertion most often
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionContext {
    pub name: String,
    /// Normalized predicate
    pub predicate: String,
    pub file: String,
    pub most_added: Option<String>,
    pub most_removed: Option<String>,
}

type CommitCounts<'a> = BTreeMap<&'a str, usize>;

#[derive(Default)]
struct Tally<'a> {
    total: usize,
    files: BTreeMap<&'a str, (CommitCounts<'a>, CommitCounts<'a>)>,
}

/// First commit id with the highest count
fn busiest(counts: &CommitCounts<'_>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for (&commit, &count) in counts {
        if best.map_or(true, |(_, most)| count > most) {
            best = Some((commit, count));
        }
    }
    best.map(|(commit, _)| commit.to_string())
}

/// Confirmed assertions grouped by keyword and normalized predicate, most
/// frequent first, with one entry per file they appear in.
pub fn assertion_contexts(history: &History) -> Vec<AssertionContext> {
    let mut groups: BTreeMap<(String, String), Tally<'_>> = BTreeMap::new();
    for commit in &history.commits {
        for file in &commit.files {
            for assertion in &file.confirmed {
                let tally = groups.entry((assertion.name.clone(), assertion.normalized_predicate())).or_default();
                tally.total += 1;
                let (added, removed) = tally.files.entry(file.path.as_str()).or_default();
                let counts = match assertion.change {
                    Polarity::Removed => removed,
                    Polarity::Added | Polarity::None => added,
                };
                *counts.entry(commit.id.as_str()).or_insert(0) += 1;
            }
        }
    }

    let mut groups: Vec<_> = groups.into_iter().collect();
    // stable, so equally frequent groups stay in key order
    groups.sort_by(|a, b| b.1.total.cmp(&a.1.total));
    groups
        .into_iter()
        .flat_map(|((name, predicate), tally)| {
            tally.files.into_iter().map(move |(file, (added, removed))| AssertionContext {
                name: name.clone(),
                predicate: predicate.clone(),
                file: file.to_string(),
                most_added: busiest(&added),
                most_removed: busiest(&removed),
            })
        })
        .collect()
}

impl Summary {
    pub fn new(mined: &Mined, deltas: &[Delta], top: usize) -> Self {
        let history = &mined.history;
        let count = |polarity: Polarity| history.assertions().filter(|a| a.change == polarity).count();

        let mut top_predicates = predicate_activity(history);
        top_predicates.truncate(top);
        let mut top_contexts = assertion_contexts(history);
        top_contexts.truncate(top);

        Summary {
            repo: mined.repo.display().to_string(),
            commits: history.len(),
            commits_with_assertions: history.commits.iter().filter(|c| c.has_assert()).count(),
            first_commit: history.commits.iter().map(|c| c.commit_time).min_by_key(|t| t.seconds).and_then(rfc2822),
            last_commit: history.commits.iter().map(|c| c.commit_time).max_by_key(|t| t.seconds).and_then(rfc2822),
            confirmed_added: count(Polarity::Added),
            confirmed_removed: count(Polarity::Removed),
            needs_inspection: history.to_inspect().count(),
            extraction_failures: mined.failures,
            names: histogram(history.assertions().map(|a| a.name.clone())),
            inspection_names: histogram(history.to_inspect().map(|a| a.name.clone())),
            top_predicates,
            top_contexts,
            commit_distance: histogram(deltas.iter().filter_map(|d| d.min_commit_distance)),
            author_days: histogram(deltas.iter().filter_map(|d| d.min_author_duration).map(|d| d.num_days())),
            commit_days: histogram(deltas.iter().filter_map(|d| d.min_commit_duration).map(|d| d.num_days())),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Repository: {}", self.repo);
        let _ = writeln!(out, "  {} commits, {} changed assertions", self.commits, self.commits_with_assertions);
        if let (Some(first), Some(last)) = (&self.first_commit, &self.last_commit) {
            let _ = writeln!(out, "  History spans from {first} to {last}.");
        }
        let _ = writeln!(
            out,
            "  {} added, {} removed, {} to inspect, {} failed",
            self.confirmed_added, self.confirmed_removed, self.needs_inspection, self.extraction_failures
        );

        if !self.names.is_empty() {
            let _ = writeln!(out, "  Keywords:");
            for (name, count) in &self.names {
                let _ = writeln!(out, "    {count:>6}  {name}");
            }
        }
        if !self.inspection_names.is_empty() {
            let _ = writeln!(out, "  Keywords to inspect:");
            for (name, count) in &self.inspection_names {
                let _ = writeln!(out, "    {count:>6}  {name}");
            }
        }
        if !self.top_predicates.is_empty() {
            let _ = writeln!(out, "  Most active predicates (added/removed):");
            for p in &self.top_predicates {
                let _ = writeln!(out, "    {:>4}/{:<4}  {}", p.added, p.removed, p.predicate);
            }
        }
        if !self.top_contexts.is_empty() {
            let _ = writeln!(out, "  Where they change:");
            for c in &self.top_contexts {
                let _ = writeln!(
                    out,
                    "    {}({}) | {} | add: {} | rem: {}",
                    c.name,
                    c.predicate,
                    c.file,
                    c.most_added.as_deref().unwrap_or("-"),
                    c.most_removed.as_deref().unwrap_or("-")
                );
            }
        }
        if !self.commit_distance.is_empty() {
            let _ = writeln!(out, "  Commits between assertion changes:");
            for (distance, count) in &self.commit_distance {
                let _ = writeln!(out, "    {distance:>6}: {count}");
            }
        }
        out
    }
}

/// One delta flattened for export; durations in fractional days
#[derive(Debug, Serialize)]
pub struct DeltaRow {
    pub commit: String,
    pub commits_since: Option<u32>,
    pub min_commit_distance: Option<u32>,
    pub min_author_days: Option<f64>,
    pub min_commit_days: Option<f64>,
}

fn days(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / 86_400.0
}

impl DeltaRow {
    pub fn new(commit: &Commit, delta: &Delta) -> Self {
        Self {
            commit: commit.id.clone(),
            commits_since: delta.commits_since,
            min_commit_distance: delta.min_commit_distance,
            min_author_days: delta.min_author_duration.map(days),
            min_commit_days: delta.min_commit_duration.map(days),
        }
    }
}

#[derive(Serialize)]
struct Export<'a> {
    summary: &'a Summary,
    history: &'a History,
    deltas: Vec<DeltaRow>,
    contexts: Vec<AssertionContext>,
}

/// File name for a repository's export, derived from its directory name
pub fn export_path(output: &Path, repo: &Path) -> PathBuf {
    let name = repo
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "repository".to_string());
    output.join(format!("{name}.json"))
}

/// Writes the full history, per-commit deltas, assertion contexts and the
/// summary as JSON.
pub fn export_json(path: &Path, mined: &Mined, deltas: &[Delta], summary: &Summary) -> Result<(), MineError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let export = Export {
        summary,
        history: &mined.history,
        deltas: mined.history.commits.iter().zip(deltas).map(|(c, d)| DeltaRow::new(c, d)).collect(),
        contexts: assertion_contexts(&mined.history),
    };
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &export)?;
    info!(path = %path.display(), "history exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::propagate;
    use crate::model::{Assertion, FileAssertions, FileRef, Problem};
    use pretty_assertions::assert_eq;

    fn assertion(predicate: &str, change: Polarity) -> Assertion {
        Assertion {
            start_lineno: 1,
            change_lineno: 1,
            num_lines: 1,
            raw_lines: vec![format!("BUG_ON({predicate});")],
            name: "BUG_ON".to_string(),
            predicate: predicate.to_string(),
            change,
            problem: None,
            function: None,
            file: FileRef { commit: 0, file: 0 },
        }
    }

    fn mined() -> Mined {
        let mut history = History::new();
        let mut first = FileAssertions::new("a.c");
        first.confirmed.push(assertion("a == b", Polarity::Added));
        first.confirmed.push(assertion("c", Polarity::Added));
        history.add_commit("1", "add", &[], GitTime::new(0, 0), GitTime::new(0, 0), vec![first]);
        history.add_commit("2", "noop", &["1".to_string()], GitTime::new(86_400, 0), GitTime::new(86_400, 0), vec![]);
        let mut third = FileAssertions::new("a.c");
        third.confirmed.push(assertion("a==b", Polarity::Removed));
        third.needs_inspection.push(Assertion {
            name: "ASSERT".to_string(),
            problem: Some(Problem::EndOfHunk),
            ..assertion("x &&", Polarity::Added)
        });
        history.add_commit("3", "remove", &["2".to_string()], GitTime::new(3 * 86_400, 60), GitTime::new(3 * 86_400, 60), vec![third]);
        Mined { repo: PathBuf::from("demo"), history, failures: 0 }
    }

    #[test]
    fn summary_counts_and_histograms() {
        let mined = mined();
        let deltas = propagate(&mined.history).unwrap();
        let summary = Summary::new(&mined, &deltas, 10);

        assert_eq!(summary.commits, 3);
        assert_eq!(summary.commits_with_assertions, 2);
        assert_eq!((summary.confirmed_added, summary.confirmed_removed), (2, 1));
        assert_eq!(summary.names, BTreeMap::from([("BUG_ON".to_string(), 3)]));
        assert_eq!(summary.inspection_names, BTreeMap::from([("ASSERT".to_string(), 1)]));
        assert_eq!(summary.needs_inspection, 1);
        assert_eq!(summary.commit_distance, BTreeMap::from([(2, 1)]));
        assert_eq!(summary.author_days, BTreeMap::from([(3, 1)]));
        assert_eq!(
            summary.top_predicates[0],
            PredicateActivity { predicate: "a==b".to_string(), added: 1, removed: 1 }
        );
        assert!(summary.render_text().contains("BUG_ON"));
    }

    #[test]
    fn contexts_name_the_busiest_commits() {
        let mut mined = mined();
        let mut fourth = FileAssertions::new("b.c");
        fourth.confirmed.push(assertion("a == b", Polarity::Added));
        fourth.confirmed.push(assertion("a == b", Polarity::Added));
        mined.history.add_commit("4", "again", &["3".to_string()], GitTime::new(0, 0), GitTime::new(0, 0), vec![fourth]);

        let contexts = assertion_contexts(&mined.history);
        let context = |name: &str, predicate: &str, file: &str, added: Option<&str>, removed: Option<&str>| AssertionContext {
            name: name.to_string(),
            predicate: predicate.to_string(),
            file: file.to_string(),
            most_added: added.map(str::to_string),
            most_removed: removed.map(str::to_string),
        };
        assert_eq!(
            contexts,
            vec![
                context("BUG_ON", "a==b", "a.c", Some("1"), Some("3")),
                context("BUG_ON", "a==b", "b.c", Some("4"), None),
                context("BUG_ON", "c", "a.c", Some("1"), None),
            ]
        );

        let deltas = propagate(&mined.history).unwrap();
        let summary = Summary::new(&mined, &deltas, 1);
        assert_eq!(summary.top_contexts.len(), 1);
        assert!(summary.render_text().contains("BUG_ON(a==b) | a.c | add: 1 | rem: 3"));
    }

    #[test]
    fn export_writes_json() {
        let mined = mined();
        let deltas = propagate(&mined.history).unwrap();
        let summary = Summary::new(&mined, &deltas, 5);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("demo.json");

        export_json(&path, &mined, &deltas, &summary).unwrap();

        let value: serde_json::Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(value["deltas"].as_array().unwrap().len(), 3);
        assert_eq!(value["deltas"][2]["min_commit_distance"], 2);
        assert_eq!(value["history"]["commits"][0]["files"][0]["confirmed"][0]["change"], "added");
        assert_eq!(value["contexts"][0]["most_removed"], "3");
    }
}
