//! Analysis engine: per-file aggregation of findings
//!
//! Runs the fact collector, builds variable state, and walks the file line
//! by line merging per-variable rewrite candidates into at most one finding
//! per line. Database-context lines win over HTML-output lines.

use regex::Regex;
use tracing::debug;

use crate::config::Config;
use crate::context::{ContextClassifier, UseContext};
use crate::facts::Facts;
use crate::finding::Finding;
use crate::fix::{self, Rewriter};
use crate::parser::ParsedFile;
use crate::taint::{SanitizerRegistry, Shape, SinkRegistry, SourceRegistry, TaintTracker};

pub struct AnalysisEngine {
    sources: SourceRegistry,
    sinks: SinkRegistry,
    sanitizers: SanitizerRegistry,
    rewriter: Rewriter,
    special_assign: Regex,
    sql_enabled: bool,
    html_enabled: bool,
    advisory_enabled: bool,
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisEngine {
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        let sources = SourceRegistry::with_defaults();
        let sanitizers = SanitizerRegistry::with_defaults();
        let mut sinks = SinkRegistry::with_defaults();
        if let Some(keywords) = &config.vocab.sql_keywords {
            sinks = sinks.with_sql_keywords(keywords.clone());
        }

        let superglobals: Vec<&str> = sources.superglobals().collect();
        let special_assign = Regex::new(&format!(
            r"^\$(\w+)\s*=\s*\$(?:{})\s*\[[^\]]+\]\s*(?:\?\?[^;]+)?;$",
            superglobals.join("|")
        ))
        .expect("special assignment pattern");

        Self {
            sources,
            sinks,
            rewriter: Rewriter::with_sanitizers(&sanitizers),
            sanitizers,
            special_assign,
            sql_enabled: config.rules.sql.unwrap_or(true),
            html_enabled: config.rules.html.unwrap_or(true),
            advisory_enabled: config.rules.advisory.unwrap_or(true),
        }
    }

    pub fn analyze_source(&self, filename: &str, source: &str) -> Vec<Finding> {
        self.analyze(&ParsedFile::from_source(filename, source))
    }

    pub fn analyze_bytes(&self, filename: &str, bytes: &[u8]) -> Vec<Finding> {
        self.analyze(&ParsedFile::from_bytes(filename, bytes))
    }

    pub fn analyze(&self, file: &ParsedFile) -> Vec<Finding> {
        if file.source().is_empty() {
            return Vec::new();
        }

        let Some(ast) = file.ast() else {
            // a file that does not parse yields exactly the parse error
            let error = &file.errors()[0];
            return vec![Finding::parse_error(error.line, &error.message)];
        };

        let facts = Facts::collect(ast, &self.sources, &self.sinks, &self.sanitizers);
        let tracker = TaintTracker::new(&self.sources, &self.sanitizers);
        let states = tracker.build_state(file.index(), &facts);
        let contexts = ContextClassifier::new(ast, &self.sinks).variable_contexts();

        debug!(
            file = %file.metadata().filename,
            variables = states.len(),
            calls = facts.calls.len(),
            "analysis state ready"
        );

        let index = file.index();
        let mut findings = Vec::new();

        for line in 1..=index.line_count() {
            if index.is_skippable(line) {
                continue;
            }
            let code = index.trimmed(line);
            if code.is_empty() {
                continue;
            }

            let mut vars = known_vars_on_line(code, &states);
            if vars.is_empty() {
                continue;
            }

            // reference-required usages and bound arguments never get fixes
            let usage_vars: Vec<&str> = facts
                .usages_on(line)
                .flat_map(|u| u.vars.iter().map(String::as_str))
                .collect();
            let bound_vars: Vec<&str> = facts
                .calls_on(line)
                .filter(|c| self.sinks.is_bind_method(&c.name))
                .flat_map(|c| c.arg_vars.iter().map(String::as_str))
                .collect();
            vars.retain(|v| {
                !usage_vars.contains(&v.as_str()) && !bound_vars.contains(&v.as_str())
            });
            if vars.is_empty() {
                continue;
            }

            let sql_line = self.sinks.line_is_sqlish(code)
                || facts.calls_on(line).any(|c| c.is_sql);
            if sql_line {
                if !self.sql_enabled {
                    continue;
                }
                // query-holder variables are the container, not the data
                let involved: Vec<String> = vars
                    .iter()
                    .filter(|v| !self.sinks.is_sql_variable_name(v))
                    .cloned()
                    .collect();
                if involved.is_empty() {
                    continue;
                }
                let escaped = involved
                    .iter()
                    .any(|v| fix::is_escaped_on_line(code, v, &self.sanitizers));
                findings.push(if escaped {
                    Finding::unnecessary_escape(line, involved, code)
                } else {
                    Finding::sql_injection(line, involved, code)
                });
                continue;
            }

            if self.is_html_candidate(code) {
                if !self.html_enabled {
                    continue;
                }
                if let Some(finding) = self.html_finding(line, code, &vars, &states, &contexts)
                {
                    findings.push(finding);
                }
                continue;
            }

            if self.advisory_enabled {
                if let Some(finding) = self.advisory_finding(line, code, &states) {
                    findings.push(finding);
                }
            }
        }

        debug!(
            file = %file.metadata().filename,
            findings = findings.len(),
            "analysis complete"
        );
        findings
    }

    fn is_html_candidate(&self, code: &str) -> bool {
        let lower = code.to_ascii_lowercase();
        // `<?php echo $x; ?>` template lines count as output statements
        let stmt = lower
            .strip_prefix("<?php")
            .map(str::trim_start)
            .unwrap_or(&lower);
        starts_with_word(stmt, "echo")
            || starts_with_word(stmt, "print")
            || lower.contains("<?=")
            || lower.contains("->render(")
            || lower.contains("->display(")
            || lower.contains("->view(")
    }

    fn html_finding(
        &self,
        line: usize,
        code: &str,
        vars: &[String],
        states: &crate::taint::VariableMap,
        contexts: &std::collections::HashMap<(usize, String), UseContext>,
    ) -> Option<Finding> {
        let mut working = code.to_string();
        let mut fixed_vars: Vec<String> = Vec::new();

        for var in vars {
            let Some(state) = states.state(var) else {
                continue;
            };
            if state.secured {
                continue;
            }
            // a whole-array reference has no scalar rendering; element and
            // implode forms are still rewritable
            if state.shape == Shape::Array
                && !fix::has_indexed_occurrence(&working, var)
                && !fix::in_implode_call(&working, var)
            {
                continue;
            }
            match contexts.get(&(line, var.clone())) {
                Some(UseContext::ParameterDecl)
                | Some(UseContext::ReferenceRequired)
                | Some(UseContext::DatabaseBinding) => continue,
                _ => {}
            }
            let candidate = self.rewriter.rewrite(&working, var);
            if candidate != working {
                working = candidate;
                fixed_vars.push(var.clone());
            }
        }

        if working == code {
            return None;
        }
        Some(Finding::html_output(line, fixed_vars, code, &working))
    }

    /// A plain superglobal-element-to-scalar assignment gets a companion
    /// advisory: keep the assignment, escape at output time.
    fn advisory_finding(
        &self,
        line: usize,
        code: &str,
        states: &crate::taint::VariableMap,
    ) -> Option<Finding> {
        let capture = self.special_assign.captures(code)?;
        let name = capture[1].to_string();
        let state = states.state(&name)?;
        if state.secured {
            return None;
        }
        let fix = format!("{} // escape with htmlspecialchars() at output time", code);
        Some(Finding::advisory(line, vec![name], code, &fix))
    }
}

/// `$name` tokens on the line whose state exists, deduplicated in
/// first-appearance order.
fn known_vars_on_line(code: &str, states: &crate::taint::VariableMap) -> Vec<String> {
    let bytes = code.as_bytes();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && is_ident_start(bytes[i + 1]) {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && is_ident_byte(bytes[end]) {
                end += 1;
            }
            let name = &code[start..end];
            if states.contains(name) && !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
            i = end;
            continue;
        }
        i += 1;
    }
    out
}

fn starts_with_word(lower: &str, word: &str) -> bool {
    lower.starts_with(word)
        && lower[word.len()..]
            .bytes()
            .next()
            .map(|b| !b.is_ascii_alphanumeric() && b != b'_')
            .unwrap_or(true)
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{FindingKind, PREPARED_STATEMENT_FIX};

    fn analyze(code: &str) -> Vec<Finding> {
        AnalysisEngine::new().analyze_source("test.php", code)
    }

    #[test]
    fn empty_input_yields_no_findings() {
        assert!(analyze("").is_empty());
    }

    #[test]
    fn parse_failure_yields_single_parse_error() {
        let findings = analyze("<?php $x = ;\n$y = 1;\n");

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::ParseError);
        assert_eq!(findings[0].line, 1);
        assert!(findings[0].vars.is_empty());
    }

    #[test]
    fn tainted_echo_is_flagged_with_rewrite() {
        let findings = analyze("<?php\n$name = $_POST['n'];\necho $name;\n");

        let finding = findings.iter().find(|f| f.line == 3).expect("echo finding");
        assert_eq!(finding.kind, FindingKind::HtmlOutput);
        assert_eq!(finding.vars, vec!["name"]);
        assert_eq!(finding.code, "echo $name;");
        assert_eq!(finding.fix, "echo htmlspecialchars($name);");
    }

    #[test]
    fn whole_array_echo_is_suppressed() {
        let findings = analyze("<?php\n$items = array_map('trim', $raw);\necho $items;\n");

        assert!(findings.is_empty());
    }

    #[test]
    fn array_element_echo_is_still_flagged() {
        let findings = analyze("<?php\n$items = array_map('trim', $raw);\necho $items[0];\n");

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].fix, "echo htmlspecialchars($items[0]);");
    }

    #[test]
    fn bind_param_line_is_not_flagged() {
        let findings = analyze("<?php\n$id = $_GET['id'];\n$stmt->bind_param('s', $id);\n");

        assert!(
            findings.iter().all(|f| f.line != 3),
            "bind_param line must not be flagged: {:?}",
            findings
        );
    }

    #[test]
    fn sql_concatenation_recommends_prepared_statements() {
        let findings =
            analyze("<?php\n$sql = \"SELECT * FROM u WHERE id = \" . $id;\n");

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.kind, FindingKind::SqlInjection);
        assert_eq!(finding.vars, vec!["id"]);
        assert_eq!(finding.fix, PREPARED_STATEMENT_FIX);
    }

    #[test]
    fn escaped_variable_in_sql_is_unnecessary_escape() {
        let findings = analyze(
            "<?php\n$sql = \"SELECT * FROM u WHERE n = \" . htmlspecialchars($n);\n",
        );

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::UnnecessaryEscape);
        assert_eq!(findings[0].fix, PREPARED_STATEMENT_FIX);
    }

    #[test]
    fn secured_variable_is_not_flagged() {
        let findings = analyze(
            "<?php\n$name = $_POST['n'];\n$name = htmlspecialchars($name);\necho $name;\n",
        );

        assert!(findings.is_empty());
    }

    #[test]
    fn comment_lines_are_never_flagged() {
        let findings = analyze("<?php\n// echo $bad;\n# echo $bad;\n");

        assert!(findings.is_empty());
    }

    #[test]
    fn advisory_for_raw_superglobal_assignment() {
        let findings = analyze("<?php\n$name = $_POST['name'];\n");

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.kind, FindingKind::Other);
        assert_eq!(finding.vars, vec!["name"]);
        assert!(finding.fix.ends_with("// escape with htmlspecialchars() at output time"));
        assert!(finding.fix.starts_with(&finding.code));
    }

    #[test]
    fn at_most_one_finding_per_line() {
        let findings = analyze("<?php\n$a = $_GET['a'];\n$b = $_GET['b'];\necho $a . $b;\n");

        let lines: Vec<usize> = findings.iter().map(|f| f.line).collect();
        let mut deduped = lines.clone();
        deduped.dedup();
        assert_eq!(lines, deduped);

        let echo = findings.iter().find(|f| f.line == 4).unwrap();
        assert_eq!(echo.vars, vec!["a", "b"]);
        assert_eq!(
            echo.fix,
            "echo htmlspecialchars($a) . htmlspecialchars($b);"
        );
    }

    #[test]
    fn findings_are_ordered_by_line() {
        let findings = analyze(
            "<?php\n$a = $_GET['a'];\necho $a;\n$sql = \"SELECT x FROM t WHERE a = \" . $a;\n",
        );

        let lines: Vec<usize> = findings.iter().map(|f| f.line).collect();
        let mut sorted = lines.clone();
        sorted.sort_unstable();
        assert_eq!(lines, sorted);
    }

    #[test]
    fn config_can_disable_sql_findings() {
        let config: Config = toml::from_str("[rules]\nsql = false\n").unwrap();
        let engine = AnalysisEngine::with_config(&config);

        let findings = engine
            .analyze_source("t.php", "<?php\n$sql = \"SELECT * FROM u WHERE i = \" . $i;\n");

        assert!(findings.is_empty());
    }

    #[test]
    fn config_can_disable_advisories() {
        let config: Config = toml::from_str("[rules]\nadvisory = false\n").unwrap();
        let engine = AnalysisEngine::with_config(&config);

        let findings = engine.analyze_source("t.php", "<?php\n$name = $_POST['name'];\n");

        assert!(findings.is_empty());
    }

    #[test]
    fn template_render_argument_is_flagged() {
        let findings = analyze("<?php\n$bio = $_POST['bio'];\n$tpl->render($bio);\n");

        let finding = findings.iter().find(|f| f.line == 3).expect("render finding");
        assert_eq!(finding.kind, FindingKind::HtmlOutput);
        assert_eq!(finding.fix, "$tpl->render(htmlspecialchars($bio));");
    }

    #[test]
    fn php_tagged_echo_line_is_flagged() {
        let findings = analyze("<?php $n = $_GET['n']; ?>\n<?php echo $n; ?>\n");

        let finding = findings.iter().find(|f| f.line == 2).expect("echo finding");
        assert_eq!(finding.kind, FindingKind::HtmlOutput);
        assert_eq!(finding.fix, "<?php echo htmlspecialchars($n); ?>");
    }

    #[test]
    fn short_echo_template_line_is_flagged() {
        let findings = analyze("<?php $t = $_GET['t']; ?>\n<?= $t ?>\n");

        let short = findings.iter().find(|f| f.line == 2).unwrap();
        assert_eq!(short.fix, "<?= htmlspecialchars($t) ?>");
    }

    #[test]
    fn vars_appear_in_code_for_every_finding() {
        let findings = analyze(
            "<?php\n$a = $_GET['a'];\necho $a;\n$q = \"SELECT b FROM t WHERE a = \" . $a;\necho \"hi $a\";\n",
        );

        assert!(!findings.is_empty());
        for finding in &findings {
            for var in &finding.vars {
                assert!(
                    finding.code.contains(&format!("${}", var)),
                    "var {} missing from code {:?}",
                    var,
                    finding.code
                );
            }
        }
    }
}
