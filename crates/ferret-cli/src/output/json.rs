//! JSON output formatter for programmatic integration

use anyhow::Result;
use ferret_core::{Finding, FindingKind};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
pub struct JsonOutput<'a> {
    pub version: &'static str,
    pub summary: JsonSummary,
    pub findings: Vec<JsonFinding<'a>>,
}

#[derive(Serialize)]
pub struct JsonSummary {
    pub total_files: usize,
    pub files_with_findings: usize,
    pub total_findings: usize,
    pub by_kind: KindCounts,
}

#[derive(Serialize, Default)]
pub struct KindCounts {
    pub sql_injection: usize,
    pub html_output: usize,
    pub unnecessary_escape: usize,
    pub parse_error: usize,
    pub other: usize,
}

#[derive(Serialize)]
pub struct JsonFinding<'a> {
    pub file: String,
    #[serde(flatten)]
    pub finding: &'a Finding,
}

pub struct JsonFormatter {
    total_files: usize,
}

impl JsonFormatter {
    pub fn new(total_files: usize) -> Self {
        Self { total_files }
    }

    pub fn format(&self, results: &[(PathBuf, Vec<Finding>)]) -> Result<String> {
        let mut by_kind = KindCounts::default();
        let mut findings = Vec::new();

        for (path, file_findings) in results {
            for finding in file_findings {
                match finding.kind {
                    FindingKind::SqlInjection => by_kind.sql_injection += 1,
                    FindingKind::HtmlOutput => by_kind.html_output += 1,
                    FindingKind::UnnecessaryEscape => by_kind.unnecessary_escape += 1,
                    FindingKind::ParseError => by_kind.parse_error += 1,
                    FindingKind::Other => by_kind.other += 1,
                }
                findings.push(JsonFinding {
                    file: path.to_string_lossy().to_string(),
                    finding,
                });
            }
        }

        let output = JsonOutput {
            version: env!("CARGO_PKG_VERSION"),
            summary: JsonSummary {
                total_files: self.total_files,
                files_with_findings: results.iter().filter(|(_, f)| !f.is_empty()).count(),
                total_findings: findings.len(),
                by_kind,
            },
            findings,
        };

        Ok(serde_json::to_string_pretty(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_output_has_summary_and_findings() {
        let results = vec![(
            PathBuf::from("a.php"),
            vec![
                Finding::sql_injection(2, vec!["id".to_string()], "$q = $id;"),
                Finding::html_output(
                    4,
                    vec!["name".to_string()],
                    "echo $name;",
                    "echo htmlspecialchars($name);",
                ),
            ],
        )];

        let output = JsonFormatter::new(1).format(&results).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["summary"]["total_files"], 1);
        assert_eq!(parsed["summary"]["total_findings"], 2);
        assert_eq!(parsed["summary"]["by_kind"]["sql_injection"], 1);
        assert_eq!(parsed["findings"][0]["file"], "a.php");
        assert_eq!(parsed["findings"][0]["kind"], "sql_injection");
        assert_eq!(parsed["findings"][1]["fix"], "echo htmlspecialchars($name);");
    }

    #[test]
    fn empty_results_serialize_cleanly() {
        let output = JsonFormatter::new(0).format(&[]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["summary"]["total_findings"], 0);
        assert!(parsed["findings"].as_array().unwrap().is_empty());
    }
}
