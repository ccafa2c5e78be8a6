//! Explain command - describes finding kinds

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use ferret_core::FindingKind;

#[derive(Args, Debug)]
pub struct ExplainArgs {
    /// Finding kind tag (e.g. html_output, sql_injection)
    #[arg(value_name = "KIND")]
    pub kind: String,
}

impl ExplainArgs {
    pub fn run(&self) -> Result<()> {
        let Some(kind) = FindingKind::parse(&self.kind) else {
            bail!(
                "Unknown finding kind '{}'. Valid kinds: sql_injection, html_output, \
                 unnecessary_escape, parse_error, other",
                self.kind
            );
        };

        let (summary, detail) = describe(kind);
        println!("{}", kind.as_str().bold());
        println!("  {}", summary);
        println!();
        println!("  {}", detail);
        Ok(())
    }
}

fn describe(kind: FindingKind) -> (&'static str, &'static str) {
    match kind {
        FindingKind::SqlInjection => (
            "User-controlled data reaches SQL built by string concatenation.",
            "Escape functions do not help here. Switch to prepared statements and \
             bind the value as a parameter.",
        ),
        FindingKind::HtmlOutput => (
            "A variable reaches HTML output without escaping.",
            "Apply the suggested rewrite: wrap the reference in htmlspecialchars() \
             at the output site.",
        ),
        FindingKind::UnnecessaryEscape => (
            "htmlspecialchars() applied to a value used in a database context.",
            "Output-escaping is the wrong tool for SQL. Remove the escape call and \
             use prepared statements instead.",
        ),
        FindingKind::ParseError => (
            "The file could not be parsed; no analysis was performed.",
            "Fix the reported syntax error and run the check again.",
        ),
        FindingKind::Other => (
            "A user-controlled value is stored without escaping.",
            "Keep the assignment as is and escape with htmlspecialchars() at the \
             point where the value reaches HTML output.",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_kinds_have_descriptions() {
        for kind in [
            FindingKind::SqlInjection,
            FindingKind::HtmlOutput,
            FindingKind::UnnecessaryEscape,
            FindingKind::ParseError,
            FindingKind::Other,
        ] {
            let (summary, detail) = describe(kind);
            assert!(!summary.is_empty());
            assert!(!detail.is_empty());
        }
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let args = ExplainArgs {
            kind: "nonsense".to_string(),
        };
        assert!(args.run().is_err());
    }
}
