// src/extract.rs
//
// Predicate extraction from a keyword occurrence inside a diff hunk. The
// scanner only tracks lexical state (comments, strings, parentheses) and
// never tries to understand the C code it walks over.

use crate::classify::{classify, LineClass};
use crate::error::ExtractError;
use crate::keyword::KeywordMatch;
use crate::model::{DiffLine, Polarity, Problem};
use std::borrow::Cow;

/// How many physical lines one assertion may span before giving up
pub const DEFAULT_MAX_LINES: usize = 10;

/// Why a keyword occurrence did not yield an assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The keyword line belongs to the other side of the diff
    AntiChange,
    /// `#include <assert.h>` and friends
    Include,
    /// The keyword is the name of a macro being defined or undefined
    Definition,
    /// A line comment precedes the keyword
    Commented,
    /// A string literal opened before the keyword is not closed
    UnterminatedString,
    /// A block comment opened before the keyword is not closed
    UnterminatedComment,
    /// Something other than `(` follows the keyword
    NotCallStyle,
    /// No line of the statement carries the change being looked for
    Unchanged,
}

/// A statement that closed, or that ended in a way worth reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub start_lineno: u32,
    pub change_lineno: u32,
    pub raw_lines: Vec<String>,
    /// Predicate without its enclosing parentheses, whitespace collapsed.
    /// Best-effort (possibly empty) when `problem` is set.
    pub predicate: String,
    pub problem: Option<Problem>,
}

impl Extracted {
    pub fn num_lines(&self) -> usize {
        self.raw_lines.len()
    }

    pub fn is_confident(&self) -> bool {
        self.problem.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Rejected(Rejection),
    Extracted(Extracted),
}

impl Outcome {
    pub fn extracted(self) -> Option<Extracted> {
        match self {
            Outcome::Extracted(e) => Some(e),
            Outcome::Rejected(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    More,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    LineComment,
    BlockOpen,
    BlockClose,
    /// Opening `"` of a string or `'` of a character literal
    Quote(u8),
    Open,
    Close,
    Hash,
}

impl Delimiter {
    fn len(self) -> usize {
        match self {
            Delimiter::LineComment | Delimiter::BlockOpen | Delimiter::BlockClose => 2,
            Delimiter::Quote(_) | Delimiter::Open | Delimiter::Close | Delimiter::Hash => 1,
        }
    }
}

fn next_delimiter(text: &str) -> Option<(usize, Delimiter)> {
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        let delim = match (b, bytes.get(i + 1)) {
            (b'/', Some(b'/')) => Delimiter::LineComment,
            (b'/', Some(b'*')) => Delimiter::BlockOpen,
            (b'*', Some(b'/')) => Delimiter::BlockClose,
            (b'"' | b'\'', _) => Delimiter::Quote(b),
            (b'(', _) => Delimiter::Open,
            (b')', _) => Delimiter::Close,
            (b'#', _) => Delimiter::Hash,
            _ => continue,
        };
        return Some((i, delim));
    }
    None
}

/// Index of the `quote` closing a literal whose opening quote precedes `text`.
fn closing_quote(text: &str, quote: u8) -> Option<usize> {
    let mut escaped = false;
    for (i, b) in text.bytes().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' => escaped = true,
            _ if b == quote => return Some(i),
            _ => {}
        }
    }
    None
}

/// Replaces a trailing macro-continuation backslash with a space. Byte
/// offsets into the original line stay valid.
fn logical_text(content: &str) -> Cow<'_, str> {
    let trimmed = content.trim_end();
    if !trimmed.ends_with('\\') {
        return Cow::Borrowed(content);
    }
    let mut text = content.to_string();
    text.replace_range(trimmed.len() - 1..trimmed.len(), " ");
    Cow::Owned(text)
}

fn directive(content: &str) -> Option<&str> {
    content.trim_start().strip_prefix('#').map(str::trim_start)
}

fn is_include(content: &str) -> bool {
    directive(content).is_some_and(|d| d.starts_with("include"))
}

fn is_definition(prefix: &str) -> bool {
    matches!(directive(prefix).map(str::trim_end), Some("define" | "undef"))
}

/// Checks the text in front of the keyword. Anything that leaves the keyword
/// inside a comment or string is a rejection; a line that looks like the
/// middle of a block comment is only suspicious.
fn check_prefix(prefix: &str) -> Result<Option<Problem>, Rejection> {
    let trimmed = prefix.trim_start();
    let continuation = trimmed.strip_prefix('*').is_some_and(|r| r.is_empty() || r.starts_with(char::is_whitespace));
    let mut problem = continuation.then_some(Problem::MidComment);

    let mut rest = prefix;
    while let Some((pos, delim)) = next_delimiter(rest) {
        let after = &rest[pos + delim.len()..];
        rest = match delim {
            Delimiter::LineComment => return Err(Rejection::Commented),
            Delimiter::BlockOpen => match after.find("*/") {
                Some(end) => &after[end + 2..],
                None => return Err(Rejection::UnterminatedComment),
            },
            Delimiter::BlockClose => {
                problem.get_or_insert(Problem::StrayCommentEnd);
                after
            }
            Delimiter::Quote(quote) => match closing_quote(after, quote) {
                Some(end) => &after[end + 1..],
                None => return Err(Rejection::UnterminatedString),
            },
            Delimiter::Open | Delimiter::Close | Delimiter::Hash => after,
        };
    }
    Ok(problem)
}

/// Removes the one pair of parentheses enclosing a closed predicate.
pub fn strip_parens(text: &str) -> Option<&str> {
    text.trim().strip_prefix('(')?.strip_suffix(')')
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug)]
struct Extraction {
    raw_lines: Vec<String>,
    depth: usize,
    in_comment: bool,
    predicate: String,
    valid: bool,
    change_lineno: Option<u32>,
    problem: Option<Problem>,
}

impl Extraction {
    fn new(problem: Option<Problem>) -> Self {
        Self {
            raw_lines: Vec::new(),
            depth: 0,
            in_comment: false,
            predicate: String::new(),
            valid: true,
            change_lineno: None,
            problem,
        }
    }

    fn flag(&mut self, problem: Problem) {
        self.problem.get_or_insert(problem);
    }

    /// Takes one line into the statement, scanning from byte `from`.
    fn consume(&mut self, line: &DiffLine, lineno: u32, polarity: Polarity, from: usize) -> Status {
        if self.change_lineno.is_none() && polarity.is_change(line.origin) {
            self.change_lineno = Some(lineno);
        }
        if !self.raw_lines.is_empty() {
            self.separate();
        }
        self.raw_lines.push(line.content.clone());

        let text = logical_text(&line.content);
        self.scan(&text[from..])
    }

    fn separate(&mut self) {
        if self.depth > 0 {
            self.predicate.push(' ');
        }
    }

    /// Text between delimiters. Before the opening parenthesis only
    /// whitespace may appear.
    fn push_text(&mut self, text: &str) -> Status {
        if self.depth > 0 {
            self.predicate.push_str(text);
            Status::More
        } else if text.trim().is_empty() {
            Status::More
        } else {
            self.valid = false;
            Status::Done
        }
    }

    fn scan(&mut self, text: &str) -> Status {
        let mut rest = text;
        if self.in_comment {
            match rest.find("*/") {
                Some(end) => {
                    self.in_comment = false;
                    rest = &rest[end + 2..];
                }
                None => return Status::More,
            }
        }

        loop {
            let Some((pos, delim)) = next_delimiter(rest) else {
                return self.push_text(rest);
            };
            if self.push_text(&rest[..pos]) == Status::Done {
                return Status::Done;
            }
            let after = &rest[pos + delim.len()..];

            match delim {
                Delimiter::LineComment => return Status::More,
                Delimiter::BlockOpen => {
                    self.separate();
                    match after.find("*/") {
                        Some(end) => rest = &after[end + 2..],
                        None => {
                            self.in_comment = true;
                            return Status::More;
                        }
                    }
                }
                Delimiter::BlockClose => {
                    self.flag(Problem::StrayCommentEnd);
                    return Status::Done;
                }
                Delimiter::Quote(quote) => {
                    if self.depth == 0 {
                        self.valid = false;
                        return Status::Done;
                    }
                    self.predicate.push(char::from(quote));
                    match closing_quote(after, quote) {
                        Some(end) => {
                            self.predicate.push_str(&after[..=end]);
                            rest = &after[end + 1..];
                        }
                        None => {
                            // possibly a string continued on the next line
                            self.predicate.push_str(after);
                            self.flag(Problem::UnterminatedString);
                            return Status::Done;
                        }
                    }
                }
                Delimiter::Open => {
                    self.depth += 1;
                    self.predicate.push('(');
                    rest = after;
                }
                Delimiter::Close => {
                    if self.depth == 0 {
                        self.valid = false;
                        return Status::Done;
                    }
                    self.depth -= 1;
                    self.predicate.push(')');
                    if self.depth == 0 {
                        return Status::Done;
                    }
                    rest = after;
                }
                Delimiter::Hash => {
                    if self.depth == 0 {
                        self.valid = false;
                        return Status::Done;
                    }
                    self.flag(Problem::Preprocessor);
                    self.predicate.push('#');
                    rest = after;
                }
            }
        }
    }

    fn finish(self, start_lineno: u32) -> Result<Outcome, ExtractError> {
        if !self.valid {
            return Ok(Outcome::Rejected(Rejection::NotCallStyle));
        }
        let Some(change_lineno) = self.change_lineno else {
            return Ok(Outcome::Rejected(Rejection::Unchanged));
        };

        let predicate = match self.problem {
            None => strip_parens(&self.predicate).ok_or_else(|| ExtractError::Unbalanced { text: self.predicate.clone() })?,
            Some(_) => strip_parens(&self.predicate).unwrap_or_else(|| {
                let text = self.predicate.trim();
                text.strip_prefix('(').unwrap_or(text)
            }),
        };

        Ok(Outcome::Extracted(Extracted {
            start_lineno,
            change_lineno,
            predicate: collapse_whitespace(predicate),
            raw_lines: self.raw_lines,
            problem: self.problem,
        }))
    }
}

/// Runs one extraction attempt for the keyword occurrence `keyword` on line
/// `start` of `hunk`, looking for a change of the given polarity.
///
/// Lines of the opposite polarity are skipped and do not count towards
/// `max_lines`.
///
/// # Panics
/// If `start` is out of bounds for `hunk`.
pub fn extract(
    hunk: &[DiffLine],
    start: usize,
    keyword: KeywordMatch,
    polarity: Polarity,
    max_lines: usize,
) -> Result<Outcome, ExtractError> {
    let first = &hunk[start];
    let start_lineno = match classify(first, polarity) {
        LineClass::Skip => return Ok(Outcome::Rejected(Rejection::AntiChange)),
        LineClass::Use(lineno) => lineno,
    };
    if is_include(&first.content) {
        return Ok(Outcome::Rejected(Rejection::Include));
    }

    let prefix = &first.content[..keyword.start];
    if is_definition(prefix) {
        return Ok(Outcome::Rejected(Rejection::Definition));
    }
    let mut state = match check_prefix(prefix) {
        Ok(problem) => Extraction::new(problem),
        Err(rejection) => return Ok(Outcome::Rejected(rejection)),
    };

    let mut status = state.consume(first, start_lineno, polarity, keyword.end);
    let mut lines = hunk[start + 1..].iter();
    while status == Status::More {
        if state.raw_lines.len() >= max_lines.max(1) {
            state.flag(Problem::TooManyLines);
            break;
        }
        let Some(line) = lines.next() else {
            state.flag(Problem::EndOfHunk);
            break;
        };
        if let LineClass::Use(lineno) = classify(line, polarity) {
            status = state.consume(line, lineno, polarity, 0);
        }
    }

    state.finish(start_lineno)
}
