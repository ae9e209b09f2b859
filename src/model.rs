// src/model.rs

use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Index of a commit in the `History` arena
pub type CommitIdx = usize;

/// Which side of a diff a line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Context,
    Addition,
    Deletion,
}

impl Origin {
    /// Maps a unified-diff origin character. Anything that is not a content
    /// line (file/hunk headers, EOF-newline markers) yields `None`.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            ' ' => Some(Origin::Context),
            '+' => Some(Origin::Addition),
            '-' => Some(Origin::Deletion),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Origin::Context => ' ',
            Origin::Addition => '+',
            Origin::Deletion => '-',
        }
    }
}

/// One physical line within a hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub origin: Origin,
    /// Line text with the trailing newline removed
    pub content: String,
    pub old_lineno: Option<u32>,
    pub new_lineno: Option<u32>,
}

impl DiffLine {
    pub fn new(origin: Origin, content: impl Into<String>, old_lineno: Option<u32>, new_lineno: Option<u32>) -> Self {
        Self { origin, content: content.into(), old_lineno, new_lineno }
    }
}

/// A contiguous block of a unified diff for one region of one file
#[derive(Debug, Clone, Default)]
pub struct Hunk {
    /// The `@@ -a,b +c,d @@ ...` line, if the hunk came from a diff
    pub header: String,
    pub lines: Vec<DiffLine>,
}

/// Whether an occurrence is being looked for as added, removed, or in a
/// single revision where no diff applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Added,
    Removed,
    None,
}

impl Polarity {
    /// The origin a line must carry to count as changed for this polarity
    pub fn marker(self) -> Option<Origin> {
        match self {
            Polarity::Added => Some(Origin::Addition),
            Polarity::Removed => Some(Origin::Deletion),
            Polarity::None => None,
        }
    }

    /// The origin of lines that belong to the other side of the diff
    pub fn anti_marker(self) -> Option<Origin> {
        match self {
            Polarity::Added => Some(Origin::Deletion),
            Polarity::Removed => Some(Origin::Addition),
            Polarity::None => None,
        }
    }

    /// True when a line with `origin` counts as a change for this polarity.
    /// A single-revision scan has nothing to compare against, so every line
    /// counts.
    pub fn is_change(self, origin: Origin) -> bool {
        match self.marker() {
            Some(marker) => marker == origin,
            None => true,
        }
    }
}

/// Why an extracted assertion needs a human to look at it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Problem {
    /// A string literal inside the predicate is not closed on its line
    UnterminatedString,
    /// The keyword line starts like the body of a block comment
    MidComment,
    /// A `*/` appeared with no `/*` pending
    StrayCommentEnd,
    /// The predicate crosses a preprocessor token
    Preprocessor,
    /// The line budget ran out before the parentheses closed
    TooManyLines,
    /// The hunk ended before the parentheses closed
    EndOfHunk,
}

/// Lookup handle from an assertion to the file-in-commit that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FileRef {
    pub commit: CommitIdx,
    pub file: usize,
}

/// An assertion statement found in a diff or a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assertion {
    pub start_lineno: u32,
    /// First line of the statement that actually carries the change
    pub change_lineno: u32,
    pub num_lines: usize,
    pub raw_lines: Vec<String>,
    /// The keyword that matched, e.g. `BUG_ON`
    pub name: String,
    /// Predicate text with whitespace runs collapsed
    pub predicate: String,
    pub change: Polarity,
    pub problem: Option<Problem>,
    /// Enclosing function, when the hunk header names one
    pub function: Option<String>,
    #[serde(skip)]
    pub file: FileRef,
}

impl Assertion {
    pub fn is_problematic(&self) -> bool {
        self.problem.is_some()
    }

    /// The predicate with all whitespace removed, used as a grouping key.
    pub fn normalized_predicate(&self) -> String {
        remove_whitespace(&self.predicate)
    }

    /// Raw lines joined for manual inspection
    pub fn raw_text(&self) -> String {
        self.raw_lines.join("\n")
    }
}

pub fn remove_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Assertions found in one file of one commit, split by confidence
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileAssertions {
    pub path: String,
    pub confirmed: Vec<Assertion>,
    pub needs_inspection: Vec<Assertion>,
}

impl FileAssertions {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty() && self.needs_inspection.is_empty()
    }
}

/// A git timestamp: seconds since the epoch plus the author's UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GitTime {
    pub seconds: i64,
    pub offset_minutes: i32,
}

impl GitTime {
    pub fn new(seconds: i64, offset_minutes: i32) -> Self {
        Self { seconds, offset_minutes }
    }

    /// Elapsed time from `earlier` to `self`, ignoring the offsets.
    pub fn since(self, earlier: GitTime) -> chrono::Duration {
        chrono::Duration::seconds(self.seconds - earlier.seconds)
    }

    /// Local wall-clock time, if the offset is representable
    pub fn to_datetime(self) -> Option<chrono::DateTime<chrono::FixedOffset>> {
        let offset = chrono::FixedOffset::east_opt(self.offset_minutes * 60)?;
        chrono::DateTime::from_timestamp(self.seconds, 0).map(|utc| utc.with_timezone(&offset))
    }
}

impl From<git2::Time> for GitTime {
    fn from(time: git2::Time) -> Self {
        GitTime::new(time.seconds(), time.offset_minutes())
    }
}

/// A node of the commit graph
#[derive(Debug, Clone, Serialize)]
pub struct Commit {
    pub id: String,
    pub summary: String,
    pub parents: Vec<CommitIdx>,
    /// Derived from the parents of later commits
    #[serde(skip)]
    pub children: Vec<CommitIdx>,
    pub author_time: GitTime,
    pub commit_time: GitTime,
    pub files: Vec<FileAssertions>,
}

impl Commit {
    /// True when any file of this commit has a confirmed assertion
    pub fn has_assert(&self) -> bool {
        self.files.iter().any(|f| !f.confirmed.is_empty())
    }

    pub fn assertions(&self) -> impl Iterator<Item = &Assertion> {
        self.files.iter().flat_map(|f| f.confirmed.iter())
    }

    pub fn to_inspect(&self) -> impl Iterator<Item = &Assertion> {
        self.files.iter().flat_map(|f| f.needs_inspection.iter())
    }
}

/// The mined commit graph, stored as an arena in parents-first order
#[derive(Debug, Default, Serialize)]
pub struct History {
    pub commits: Vec<Commit>,
    #[serde(skip)]
    index: HashMap<String, CommitIdx>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Index the next added commit will receive
    pub fn next_idx(&self) -> CommitIdx {
        self.commits.len()
    }

    pub fn get(&self, id: &str) -> Option<CommitIdx> {
        self.index.get(id).copied()
    }

    /// Adds a commit whose parents must already be present. Unknown parent
    /// ids are dropped, which makes the commit a root.
    pub fn add_commit(
        &mut self,
        id: impl Into<String>,
        summary: impl Into<String>,
        parent_ids: &[String],
        author_time: GitTime,
        commit_time: GitTime,
        files: Vec<FileAssertions>,
    ) -> CommitIdx {
        let id = id.into();
        let idx = self.commits.len();

        let mut parents = Vec::with_capacity(parent_ids.len());
        for parent_id in parent_ids {
            match self.index.get(parent_id) {
                Some(&parent) => parents.push(parent),
                None => warn!(commit = %id, parent = %parent_id, "parent not in history, treating commit as a root"),
            }
        }
        for &parent in &parents {
            self.commits[parent].children.push(idx);
        }

        self.index.insert(id.clone(), idx);
        self.commits.push(Commit {
            id,
            summary: summary.into(),
            parents,
            children: Vec::new(),
            author_time,
            commit_time,
            files,
        });
        idx
    }

    pub fn roots(&self) -> impl Iterator<Item = CommitIdx> + '_ {
        self.commits.iter().enumerate().filter(|(_, c)| c.parents.is_empty()).map(|(i, _)| i)
    }

    /// All confirmed assertions, in commit order
    pub fn assertions(&self) -> impl Iterator<Item = &Assertion> {
        self.commits.iter().flat_map(|c| c.assertions())
    }

    /// All assertions flagged for manual inspection, in commit order
    pub fn to_inspect(&self) -> impl Iterator<Item = &Assertion> {
        self.commits.iter().flat_map(|c| c.to_inspect())
    }

    /// Resolves an assertion's back-reference to its commit and file
    pub fn locate(&self, file: FileRef) -> Option<(&Commit, &FileAssertions)> {
        let commit = self.commits.get(file.commit)?;
        Some((commit, commit.files.get(file.file)?))
    }
}
