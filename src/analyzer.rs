// src/analyzer.rs

use crate::assemble::{scan_hunk, scan_source};
use crate::error::MineError;
use crate::extract::DEFAULT_MAX_LINES;
use crate::keyword::{KeywordLocator, DEFAULT_PATTERN};
use crate::model::{CommitIdx, DiffLine, FileAssertions, FileRef, History, Hunk, Origin, Polarity};
use git2::{Commit, DiffFindOptions, DiffOptions, ObjectType, Oid, Patch, Repository, Sort, TreeWalkMode, TreeWalkResult};
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Settings for one mining run
#[derive(Debug, Clone)]
pub struct MineConfig {
    /// Revision whose ancestry is mined
    pub revision: String,
    /// Regex of assertion keywords, matched as whole words
    pub pattern: String,
    pub max_lines: usize,
    /// File extensions to look into, without the dot
    pub extensions: Vec<String>,
    /// Diff merge commits against their first parent instead of skipping them
    pub diff_merges: bool,
    /// Show a per-commit progress bar
    pub progress: bool,
}

impl Default for MineConfig {
    fn default() -> Self {
        Self {
            revision: "HEAD".to_string(),
            pattern: DEFAULT_PATTERN.to_string(),
            max_lines: DEFAULT_MAX_LINES,
            extensions: vec!["c".to_string(), "h".to_string()],
            diff_merges: false,
            progress: true,
        }
    }
}

impl MineConfig {
    pub fn wants(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|wanted| wanted == ext))
    }
}

/// The result of mining one repository
#[derive(Debug)]
pub struct Mined {
    pub repo: PathBuf,
    pub history: History,
    /// Occurrences dropped because the scanner hit an internal error
    pub failures: usize,
}

/// Assertions present in a single revision
#[derive(Debug)]
pub struct Snapshot {
    pub commit: String,
    pub files: Vec<FileAssertions>,
}

pub fn mine(repo_path: &Path, config: &MineConfig) -> Result<Mined, MineError> {
    let repo = Repository::open(repo_path)?;
    let locator = KeywordLocator::new(&config.pattern)?;
    info!(repo = %repo_path.display(), rev = %config.revision, "mining repository");

    // 1. Collect the ancestry of the revision, parents before children
    let tip = repo.revparse_single(&config.revision)?.peel_to_commit()?;
    let mut revwalk = repo.revwalk()?;
    revwalk.push(tip.id())?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
    let oids = revwalk.collect::<Result<Vec<Oid>, _>>()?;

    let bar = if config.progress { ProgressBar::new(oids.len() as u64) } else { ProgressBar::hidden() };
    bar.set_message("Mining commits");

    // 2. Diff every commit and collect its assertions
    let mut history = History::new();
    let mut failures = 0;
    for oid in oids {
        let commit = repo.find_commit(oid)?;
        let idx = history.next_idx();

        let files = if commit.parent_count() > 1 && !config.diff_merges {
            Vec::new()
        } else {
            let (files, failed) = commit_assertions(&repo, &commit, idx, &locator, config)?;
            failures += failed;
            files
        };
        if !files.is_empty() {
            debug!(commit = %oid, files = files.len(), "assertions changed");
        }

        let parent_ids: Vec<String> = commit.parent_ids().map(|p| p.to_string()).collect();
        history.add_commit(
            oid.to_string(),
            commit.summary().unwrap_or_default(),
            &parent_ids,
            commit.author().when().into(),
            commit.time().into(),
            files,
        );
        bar.inc(1);
    }
    bar.finish_with_message("Mining complete");

    if failures > 0 {
        warn!(repo = %repo_path.display(), failures, "some occurrences could not be extracted");
    }
    Ok(Mined { repo: repo_path.to_path_buf(), history, failures })
}

/// Mines several repositories in parallel, one worker per repository. Each
/// worker opens its own `Repository`; results come back in input order.
pub fn mine_all(repos: &[PathBuf], config: &MineConfig) -> Vec<Result<Mined, MineError>> {
    let config = MineConfig { progress: config.progress && repos.len() == 1, ..config.clone() };
    let bar = if repos.len() > 1 { ProgressBar::new(repos.len() as u64) } else { ProgressBar::hidden() };
    bar.set_message("Mining repositories");

    let results = repos.par_iter().progress_with(bar.clone()).map(|repo| mine(repo, &config)).collect();
    bar.finish_with_message("All repositories mined");
    results
}

fn commit_assertions(
    repo: &Repository,
    commit: &Commit,
    idx: CommitIdx,
    locator: &KeywordLocator,
    config: &MineConfig,
) -> Result<(Vec<FileAssertions>, usize), git2::Error> {
    let parent_tree = match commit.parents().next() {
        Some(parent) => Some(parent.tree()?),
        None => None,
    };
    let current_tree = commit.tree()?;

    // Enough context that a statement around a change is inside the hunk
    let mut diff_opts = DiffOptions::new();
    diff_opts.ignore_filemode(true);
    diff_opts.context_lines(u32::try_from(config.max_lines).unwrap_or(u32::MAX));

    let mut diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&current_tree), Some(&mut diff_opts))?;
    // A renamed file is one delta, not a removal of all its assertions plus an addition
    diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;

    let mut files = Vec::new();
    let mut failures = 0;
    for delta_idx in 0..diff.deltas().count() {
        let Some(patch) = Patch::from_diff(&diff, delta_idx)? else {
            continue;
        };
        let delta = patch.delta();
        let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()).map(Path::to_path_buf) else {
            continue;
        };
        if !config.wants(&path) {
            continue;
        }

        let file = FileRef { commit: idx, file: files.len() };
        let mut out = FileAssertions::new(path.to_string_lossy());
        for hunk_idx in 0..patch.num_hunks() {
            let hunk = read_hunk(&patch, hunk_idx)?;
            if hunk.lines.iter().any(|l| locator.is_match(&l.content)) {
                failures += scan_hunk(&hunk, locator, &[Polarity::Added, Polarity::Removed], config.max_lines, file, &mut out);
            }
        }
        if !out.is_empty() {
            files.push(out);
        }
    }
    Ok((files, failures))
}

fn read_hunk(patch: &Patch<'_>, hunk_idx: usize) -> Result<Hunk, git2::Error> {
    let (hunk, line_count) = patch.hunk(hunk_idx)?;
    let header = String::from_utf8_lossy(hunk.header()).trim_end().to_string();

    let mut lines = Vec::with_capacity(line_count);
    for line_idx in 0..line_count {
        let line = patch.line_in_hunk(hunk_idx, line_idx)?;
        // EOF-newline markers and the like carry no source text
        let Some(origin) = Origin::from_char(line.origin()) else {
            continue;
        };
        let content = String::from_utf8_lossy(line.content());
        let content = content.trim_end_matches(['\n', '\r']);
        lines.push(DiffLine::new(origin, content, line.old_lineno(), line.new_lineno()));
    }
    Ok(Hunk { header, lines })
}

/// Finds the assertions present in every matching file of one revision.
pub fn scan_revision(repo_path: &Path, config: &MineConfig) -> Result<Snapshot, MineError> {
    let repo = Repository::open(repo_path)?;
    let locator = KeywordLocator::new(&config.pattern)?;
    let commit = repo.revparse_single(&config.revision)?.peel_to_commit()?;
    let tree = commit.tree()?;

    let mut blobs = Vec::new();
    tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
        if entry.kind() == Some(ObjectType::Blob) {
            if let Some(name) = entry.name() {
                let path = format!("{dir}{name}");
                if config.wants(Path::new(&path)) {
                    blobs.push((path, entry.id()));
                }
            }
        }
        TreeWalkResult::Ok
    })?;
    info!(repo = %repo_path.display(), commit = %commit.id(), files = blobs.len(), "scanning revision");

    let mut files = Vec::new();
    for (path, id) in blobs {
        let blob = repo.find_blob(id)?;
        if blob.is_binary() {
            continue;
        }
        let text = String::from_utf8_lossy(blob.content());
        let file = FileRef { commit: 0, file: files.len() };
        let found = scan_source(&path, &text, &locator, config.max_lines, file);
        if !found.is_empty() {
            files.push(found);
        }
    }
    Ok(Snapshot { commit: commit.id().to_string(), files })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configured_extensions_are_wanted() {
        let config = MineConfig::default();
        assert!(config.wants(Path::new("src/basic.c")));
        assert!(config.wants(Path::new("include/x.h")));
        assert!(!config.wants(Path::new("longone.abc")));
        assert!(!config.wants(Path::new("longone.c.ccc")));
        assert!(!config.wants(Path::new("Makefile")));
    }
}
