//! Line index over raw source text
//!
//! Splits content on line feeds, keeps 1-based line numbers, and answers the
//! comment/markup skip predicate used throughout the analysis.

/// Prefixes whose lines never produce findings. `<` covers markup open tags;
/// PHP open tags (`<?php`, `<?=`) are exempted so template echo lines still
/// get analyzed.
const SKIP_PREFIXES: &[&str] = &["//", "#", "/*", "*/", "*"];

#[derive(Debug, Clone)]
pub struct SourceIndex {
    lines: Vec<String>,
}

impl SourceIndex {
    pub fn new(source: &str) -> Self {
        Self {
            lines: source.split('\n').map(str::to_string).collect(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Raw text of a 1-based line, carriage returns preserved.
    pub fn text(&self, line: usize) -> Option<&str> {
        if line == 0 {
            return None;
        }
        self.lines.get(line - 1).map(String::as_str)
    }

    /// Trimmed text of a 1-based line; empty for out-of-range lines.
    pub fn trimmed(&self, line: usize) -> &str {
        self.text(line).map(str::trim).unwrap_or("")
    }

    /// True when the line's first non-whitespace characters begin a comment
    /// or a markup open tag.
    pub fn is_skippable(&self, line: usize) -> bool {
        let trimmed = self.trimmed(line);
        if SKIP_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            return true;
        }
        trimmed.starts_with('<') && !trimmed.starts_with("<?")
    }

    /// Iterates `(line_number, raw_text)` pairs, 1-based.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines
            .iter()
            .enumerate()
            .map(|(i, text)| (i + 1, text.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_one_based() {
        let index = SourceIndex::new("first\nsecond\nthird");

        assert_eq!(index.line_count(), 3);
        assert_eq!(index.text(1), Some("first"));
        assert_eq!(index.text(3), Some("third"));
        assert_eq!(index.text(0), None);
        assert_eq!(index.text(4), None);
    }

    #[test]
    fn trailing_empty_line_is_retained() {
        let index = SourceIndex::new("a\nb\n");

        assert_eq!(index.line_count(), 3);
        assert_eq!(index.text(3), Some(""));
    }

    #[test]
    fn carriage_returns_preserved_in_raw_text() {
        let index = SourceIndex::new("echo $x;\r\nnext");

        assert_eq!(index.text(1), Some("echo $x;\r"));
        assert_eq!(index.trimmed(1), "echo $x;");
    }

    #[test]
    fn comment_lines_are_skippable() {
        let index = SourceIndex::new("// c\n# c\n/* c\n * c\n*/\necho $x;");

        for line in 1..=5 {
            assert!(index.is_skippable(line), "line {} should skip", line);
        }
        assert!(!index.is_skippable(6));
    }

    #[test]
    fn markup_lines_are_skippable_but_php_tags_are_not() {
        let index = SourceIndex::new("<div>\n<?php echo $x; ?>\n<?= $x ?>");

        assert!(index.is_skippable(1));
        assert!(!index.is_skippable(2));
        assert!(!index.is_skippable(3));
    }

    #[test]
    fn out_of_range_lines_are_not_skippable() {
        let index = SourceIndex::new("echo $x;");

        assert!(!index.is_skippable(0));
        assert!(!index.is_skippable(99));
    }
}
