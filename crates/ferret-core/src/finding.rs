//! Finding model for analysis results
//!
//! A `Finding` is the unit handed back to callers: one flagged source line,
//! the variables involved, and the suggested remediation.

use serde::Serialize;

/// Literal fix marker used for database-context findings.
pub const PREPARED_STATEMENT_FIX: &str = "using prepared statements";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    SqlInjection,
    HtmlOutput,
    UnnecessaryEscape,
    ParseError,
    Other,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::SqlInjection => "sql_injection",
            FindingKind::HtmlOutput => "html_output",
            FindingKind::UnnecessaryEscape => "unnecessary_escape",
            FindingKind::ParseError => "parse_error",
            FindingKind::Other => "other",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "sql_injection" => Some(FindingKind::SqlInjection),
            "html_output" => Some(FindingKind::HtmlOutput),
            "unnecessary_escape" => Some(FindingKind::UnnecessaryEscape),
            "parse_error" => Some(FindingKind::ParseError),
            "other" => Some(FindingKind::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// 1-based source line number.
    pub line: usize,
    /// Variable names involved, no leading sigil, first-seen order.
    pub vars: Vec<String>,
    /// The original trimmed source line.
    pub code: String,
    /// Rewritten line, fix marker, or empty for parse errors.
    pub fix: String,
    pub kind: FindingKind,
}

impl Finding {
    pub fn html_output(line: usize, vars: Vec<String>, code: &str, fix: &str) -> Self {
        Self {
            line,
            vars,
            code: code.to_string(),
            fix: fix.to_string(),
            kind: FindingKind::HtmlOutput,
        }
    }

    pub fn sql_injection(line: usize, vars: Vec<String>, code: &str) -> Self {
        Self {
            line,
            vars,
            code: code.to_string(),
            fix: PREPARED_STATEMENT_FIX.to_string(),
            kind: FindingKind::SqlInjection,
        }
    }

    pub fn unnecessary_escape(line: usize, vars: Vec<String>, code: &str) -> Self {
        Self {
            line,
            vars,
            code: code.to_string(),
            fix: PREPARED_STATEMENT_FIX.to_string(),
            kind: FindingKind::UnnecessaryEscape,
        }
    }

    pub fn parse_error(line: usize, message: &str) -> Self {
        Self {
            line,
            vars: Vec::new(),
            code: message.to_string(),
            fix: String::new(),
            kind: FindingKind::ParseError,
        }
    }

    pub fn advisory(line: usize, vars: Vec<String>, code: &str, fix: &str) -> Self {
        Self {
            line,
            vars,
            code: code.to_string(),
            fix: fix.to_string(),
            kind: FindingKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_finding_carries_fix_marker() {
        let finding = Finding::sql_injection(3, vec!["id".to_string()], "$sql = $id;");

        assert_eq!(finding.kind, FindingKind::SqlInjection);
        assert_eq!(finding.fix, PREPARED_STATEMENT_FIX);
        assert_eq!(finding.line, 3);
    }

    #[test]
    fn parse_error_finding_has_no_vars() {
        let finding = Finding::parse_error(7, "unexpected token `)`");

        assert!(finding.vars.is_empty());
        assert!(finding.fix.is_empty());
        assert_eq!(finding.code, "unexpected token `)`");
    }

    #[test]
    fn kind_tags_round_trip() {
        for kind in [
            FindingKind::SqlInjection,
            FindingKind::HtmlOutput,
            FindingKind::UnnecessaryEscape,
            FindingKind::ParseError,
            FindingKind::Other,
        ] {
            assert_eq!(FindingKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FindingKind::parse("bogus"), None);
    }

    #[test]
    fn findings_serialize_with_snake_case_kind() {
        let finding = Finding::html_output(
            1,
            vec!["name".to_string()],
            "echo $name;",
            "echo htmlspecialchars($name);",
        );

        let json = serde_json::to_string(&finding).unwrap();

        assert!(json.contains("\"kind\":\"html_output\""));
        assert!(json.contains("\"line\":1"));
    }
}
