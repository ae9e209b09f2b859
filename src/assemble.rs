// src/assemble.rs

use crate::extract::{extract, Outcome};
use crate::keyword::{function_context, KeywordLocator};
use crate::model::{Assertion, DiffLine, FileAssertions, FileRef, Hunk, Origin, Polarity};
use tracing::{debug, error};

/// Extracts every assertion of the given polarities from one hunk and files
/// it into `out`. Returns how many occurrences hit an internal scanner error;
/// those are logged and skipped without affecting their neighbours.
pub fn scan_hunk(
    hunk: &Hunk,
    locator: &KeywordLocator,
    polarities: &[Polarity],
    max_lines: usize,
    file: FileRef,
    out: &mut FileAssertions,
) -> usize {
    let function = function_context(&hunk.header);
    let mut failures = 0;

    for (i, line) in hunk.lines.iter().enumerate() {
        for keyword in locator.find_iter(&line.content) {
            let name = keyword.as_str(&line.content);
            for &polarity in polarities {
                let extracted = match extract(&hunk.lines, i, keyword, polarity, max_lines) {
                    Ok(Outcome::Extracted(e)) => e,
                    Ok(Outcome::Rejected(reason)) => {
                        if polarity.anti_marker() != Some(line.origin) {
                            debug!(path = %out.path, line = i, %name, ?polarity, ?reason, "occurrence rejected");
                        }
                        continue;
                    }
                    Err(e) => {
                        error!(path = %out.path, line = i, %name, ?polarity, error = %e, "predicate extraction failed");
                        failures += 1;
                        continue;
                    }
                };

                let assertion = Assertion {
                    start_lineno: extracted.start_lineno,
                    change_lineno: extracted.change_lineno,
                    num_lines: extracted.num_lines(),
                    name: name.to_string(),
                    predicate: extracted.predicate,
                    change: polarity,
                    problem: extracted.problem,
                    function: function.clone(),
                    raw_lines: extracted.raw_lines,
                    file,
                };
                if assertion.is_problematic() {
                    out.needs_inspection.push(assertion);
                } else {
                    out.confirmed.push(assertion);
                }
            }
        }
    }
    failures
}

/// Scans the complete text of one file at a single revision. Every line is
/// treated as context and extracted with `Polarity::None`.
pub fn scan_source(path: &str, text: &str, locator: &KeywordLocator, max_lines: usize, file: FileRef) -> FileAssertions {
    let lines = text
        .lines()
        .zip(1u32..)
        .map(|(content, n)| DiffLine::new(Origin::Context, content, Some(n), Some(n)))
        .collect();
    let hunk = Hunk { header: String::new(), lines };

    let mut out = FileAssertions::new(path);
    scan_hunk(&hunk, locator, &[Polarity::None], max_lines, file, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DEFAULT_MAX_LINES;
    use crate::model::Problem;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const FILE: FileRef = FileRef { commit: 3, file: 1 };

    fn line(origin: Origin, content: &str, old: Option<u32>, new: Option<u32>) -> DiffLine {
        DiffLine::new(origin, content, old, new)
    }

    fn predicates(asserts: &[Assertion]) -> Vec<(Polarity, String)> {
        asserts.iter().map(|a| (a.change, a.normalized_predicate())).collect()
    }

    #[test]
    fn changed_assertion_yields_one_added_and_one_removed() {
        let hunk = Hunk {
            header: "@@ -10,3 +10,3 @@ int check(struct s *p)".to_string(),
            lines: vec![
                line(Origin::Context, "    x = 1;", Some(10), Some(10)),
                line(Origin::Deletion, "    assert(to_change);", Some(11), None),
                line(Origin::Addition, "    assert(changed); assert(extra_add1);", None, Some(11)),
                line(Origin::Context, "    return 0;", Some(12), Some(12)),
            ],
        };
        let mut out = FileAssertions::new("basic.c");
        let failures = scan_hunk(
            &hunk,
            &KeywordLocator::new("assert").unwrap(),
            &[Polarity::Added, Polarity::Removed],
            DEFAULT_MAX_LINES,
            FILE,
            &mut out,
        );

        assert_eq!(failures, 0);
        assert_eq!(
            predicates(&out.confirmed),
            vec![
                (Polarity::Removed, "to_change".to_string()),
                (Polarity::Added, "changed".to_string()),
                (Polarity::Added, "extra_add1".to_string()),
            ]
        );
        assert!(out.needs_inspection.is_empty());

        let removed = &out.confirmed[0];
        assert_eq!(removed.start_lineno, 11);
        assert_eq!(removed.function.as_deref(), Some("check"));
        assert_eq!(removed.file, FILE);
        assert_eq!(removed.name, "assert");
    }

    #[test]
    fn channels_are_disjoint() {
        let hunk = Hunk {
            header: String::new(),
            lines: vec![
                line(Origin::Addition, "ASSERT(good == 1);", None, Some(1)),
                line(Origin::Addition, " * ASSERT(maybe == 1)", None, Some(2)),
                line(Origin::Addition, "// ASSERT(commented == 1)", None, Some(3)),
            ],
        };
        let mut out = FileAssertions::new("comments.c");
        scan_hunk(&hunk, &KeywordLocator::default(), &[Polarity::Added, Polarity::Removed], 10, FILE, &mut out);

        assert_eq!(predicates(&out.confirmed), vec![(Polarity::Added, "good==1".to_string())]);
        assert_eq!(predicates(&out.needs_inspection), vec![(Polarity::Added, "maybe==1".to_string())]);
        assert_eq!(out.needs_inspection[0].problem, Some(Problem::MidComment));
    }

    #[test]
    fn source_scan_finds_every_assertion() {
        let text = indoc! {r#"
            #include <assert.h>
            #define MY_ASSERT(x) assert((x) == 1)

            int main(int argc, char **argv) {
                assert(*argv);
                assert(argc > 0 &&
                       argc < 10);
                /* assert(commented_out); */
                return 0;
            }
        "#};
        let file = scan_source("macros.c", text, &KeywordLocator::default(), DEFAULT_MAX_LINES, FILE);

        let found: Vec<_> = file.confirmed.iter().map(|a| (a.name.as_str(), a.predicate.as_str(), a.start_lineno)).collect();
        assert_eq!(
            found,
            vec![("assert", "(x) == 1", 2), ("assert", "*argv", 5), ("assert", "argc > 0 && argc < 10", 6)]
        );
        assert_eq!(file.confirmed[2].num_lines, 2);
        assert!(file.confirmed.iter().all(|a| a.change == Polarity::None));
        assert!(file.needs_inspection.is_empty());
    }
}
