// src/keyword.rs

use regex::Regex;

/// Keywords used for defensive checks across C code bases: the assert family,
/// kernel `BUG_ON`, Chromium `DCHECK`, InnoDB `ut_a`/`ut_ad`.
pub const DEFAULT_PATTERN: &str = r"\w*(ASSERT|assert|BUG_ON|bug_on|DCHECK)\w*|ut_ad?";

/// A keyword occurrence within one line, as byte offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordMatch {
    pub start: usize,
    pub end: usize,
}

impl KeywordMatch {
    pub fn as_str(self, line: &str) -> &str {
        &line[self.start..self.end]
    }
}

/// Finds whole-word keyword occurrences
#[derive(Debug, Clone)]
pub struct KeywordLocator {
    re: Regex,
}

impl KeywordLocator {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let re = Regex::new(&format!(r"\b(?:{pattern})\b"))?;
        Ok(Self { re })
    }

    pub fn find_iter<'a>(&'a self, line: &'a str) -> impl Iterator<Item = KeywordMatch> + 'a {
        self.re.find_iter(line).map(|m| KeywordMatch { start: m.start(), end: m.end() })
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.re.is_match(line)
    }
}

impl Default for KeywordLocator {
    fn default() -> Self {
        Self { re: Regex::new(&format!(r"\b(?:{DEFAULT_PATTERN})\b")).expect("default pattern compiles") }
    }
}

const NOT_FUNCTIONS: &[&str] = &["__attribute__", "if", "for", "while", "switch", "return", "sizeof", "defined"];

/// Extracts the function name git puts after a hunk header, e.g.
/// `@@ -252 +252 @@ void xsave(struct vcpu *v, uint64_t mask)` gives `xsave`.
/// Declarations ending in `;`, struct headers, and preprocessor lines give
/// `None`.
pub fn function_context(header: &str) -> Option<String> {
    let after = header.trim_start().strip_prefix("@@")?;
    let close = after.find("@@")?;
    let context = after[close + 2..].trim();
    if context.is_empty() || context.starts_with('#') || context.ends_with(';') {
        return None;
    }

    let paren = context.find('(')?;
    let before = context[..paren].trim_end();
    let name_start = before
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
        .last()
        .map(|(i, _)| i)?;
    let name = &before[name_start..];

    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) || NOT_FUNCTIONS.contains(&name) {
        return None;
    }
    Some(name.to_string())
}
