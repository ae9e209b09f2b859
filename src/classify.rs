// src/classify.rs

use crate::model::{DiffLine, Polarity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// The line belongs to the other side of the diff
    Skip,
    /// The line takes part, at this file line number
    Use(u32),
}

/// Decides whether `line` takes part in an extraction of the given polarity.
///
/// Added (and single-revision) extractions number lines in the new file,
/// removed extractions in the old one.
pub fn classify(line: &DiffLine, polarity: Polarity) -> LineClass {
    if polarity.anti_marker() == Some(line.origin) {
        return LineClass::Skip;
    }
    let lineno = match polarity {
        Polarity::Added | Polarity::None => line.new_lineno,
        Polarity::Removed => line.old_lineno,
    };
    lineno.map_or(LineClass::Skip, LineClass::Use)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Origin;

    #[test]
    fn anti_lines_are_skipped() {
        let added = DiffLine::new(Origin::Addition, "x", None, Some(4));
        let removed = DiffLine::new(Origin::Deletion, "x", Some(7), None);
        assert_eq!(classify(&added, Polarity::Removed), LineClass::Skip);
        assert_eq!(classify(&removed, Polarity::Added), LineClass::Skip);
        assert_eq!(classify(&added, Polarity::Added), LineClass::Use(4));
        assert_eq!(classify(&removed, Polarity::Removed), LineClass::Use(7));
    }

    #[test]
    fn context_lines_use_side_specific_numbers() {
        let context = DiffLine::new(Origin::Context, "x", Some(10), Some(12));
        assert_eq!(classify(&context, Polarity::Added), LineClass::Use(12));
        assert_eq!(classify(&context, Polarity::Removed), LineClass::Use(10));
        assert_eq!(classify(&context, Polarity::None), LineClass::Use(12));
    }
}
