//! Pretty formatter for human-readable terminal output
//!
//! Displays findings with colors, the offending line, and the suggested fix.

use colored::{ColoredString, Colorize};
use ferret_core::{Finding, FindingKind};
use std::path::PathBuf;

pub struct PrettyFormatter;

impl Default for PrettyFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl PrettyFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(&self, results: &[(PathBuf, Vec<Finding>)]) -> String {
        let mut output = String::new();
        let mut total = 0usize;

        for (path, findings) in results {
            for finding in findings {
                total += 1;
                output.push_str(&self.format_finding(path, finding));
                output.push('\n');
            }
        }

        if total > 0 {
            output.push_str(&self.format_summary(results, total));
        } else {
            output.push_str(&format!("{}\n", "No findings.".green()));
        }

        output
    }

    fn format_finding(&self, path: &PathBuf, finding: &Finding) -> String {
        let mut lines = Vec::new();

        let header = format!(
            "{}: {}",
            self.colorize_kind(finding.kind),
            finding.vars.join(", ").bold()
        );
        lines.push(header);
        lines.push(format!(
            "  {} {}:{}",
            "-->".blue(),
            path.display(),
            finding.line
        ));
        lines.push(format!("  {} {}", "code:".dimmed(), finding.code));
        lines.push(format!("  {} {}", "fix:".green(), finding.fix));

        lines.join("\n") + "\n"
    }

    fn format_summary(&self, results: &[(PathBuf, Vec<Finding>)], total: usize) -> String {
        let files_with_findings = results.iter().filter(|(_, f)| !f.is_empty()).count();
        format!(
            "{} {} finding(s) in {} file(s)\n",
            "summary:".bold(),
            total,
            files_with_findings
        )
    }

    fn colorize_kind(&self, kind: FindingKind) -> ColoredString {
        match kind {
            FindingKind::SqlInjection => "sql_injection".red().bold(),
            FindingKind::HtmlOutput => "html_output".yellow().bold(),
            FindingKind::UnnecessaryEscape => "unnecessary_escape".blue().bold(),
            FindingKind::ParseError => "parse_error".magenta().bold(),
            FindingKind::Other => "other".cyan().bold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_results() -> Vec<(PathBuf, Vec<Finding>)> {
        vec![(
            PathBuf::from("index.php"),
            vec![Finding::html_output(
                3,
                vec!["name".to_string()],
                "echo $name;",
                "echo htmlspecialchars($name);",
            )],
        )]
    }

    #[test]
    fn format_includes_location_code_and_fix() {
        colored::control::set_override(false);
        let output = PrettyFormatter::new().format(&sample_results());

        assert!(output.contains("index.php:3"));
        assert!(output.contains("echo $name;"));
        assert!(output.contains("echo htmlspecialchars($name);"));
        assert!(output.contains("html_output"));
        assert!(output.contains("summary:"));
    }

    #[test]
    fn empty_results_report_no_findings() {
        colored::control::set_override(false);
        let output = PrettyFormatter::new().format(&[]);

        assert!(output.contains("No findings."));
    }
}
