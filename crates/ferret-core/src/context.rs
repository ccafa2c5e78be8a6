//! Use-site context classification
//!
//! Walks parent links upward from a node to decide whether the position is
//! HTML output, database binding, a parameter declaration, or a
//! reference-required construct. Database binding wins when both it and HTML
//! output would match.

use std::collections::HashMap;

use crate::parser::{Ast, BinaryOp, NodeId, NodeKind};
use crate::taint::SinkRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseContext {
    HtmlOutput,
    DatabaseBinding,
    ParameterDecl,
    ReferenceRequired,
    Neutral,
}

impl UseContext {
    /// Merge priority when a variable occurs more than once on a line.
    fn rank(&self) -> u8 {
        match self {
            UseContext::DatabaseBinding => 4,
            UseContext::ParameterDecl => 3,
            UseContext::ReferenceRequired => 2,
            UseContext::HtmlOutput => 1,
            UseContext::Neutral => 0,
        }
    }
}

pub struct ContextClassifier<'a> {
    ast: &'a Ast,
    sinks: &'a SinkRegistry,
}

impl<'a> ContextClassifier<'a> {
    pub fn new(ast: &'a Ast, sinks: &'a SinkRegistry) -> Self {
        Self { ast, sinks }
    }

    pub fn classify(&self, id: NodeId) -> UseContext {
        if let NodeKind::Variable { name } = &self.ast.node(id).kind {
            if self.sinks.is_sql_variable_name(name) {
                return UseContext::DatabaseBinding;
            }
        }

        let mut found_html = false;
        let mut found_db = false;
        let mut prev = id;

        for ancestor in self.ast.ancestors(id) {
            match &self.ast.node(ancestor).kind {
                NodeKind::Echo { .. }
                | NodeKind::InterpolatedString { .. }
                | NodeKind::StringPart { .. } => found_html = true,
                NodeKind::MethodCall { method, args, .. } => {
                    if self.sinks.is_bind_method(method) && args.contains(&prev) {
                        return UseContext::ReferenceRequired;
                    }
                    if self.sinks.is_render_method(method) {
                        found_html = true;
                    }
                    if self.sinks.is_sql_method(method) {
                        found_db = true;
                    }
                }
                NodeKind::StaticCall { method, .. } => {
                    if self.sinks.is_sql_method(method) {
                        found_db = true;
                    }
                }
                NodeKind::FunctionCall { name, .. } => {
                    if name.eq_ignore_ascii_case("implode") {
                        found_db = true;
                    }
                }
                NodeKind::Binary {
                    op: BinaryOp::Concat,
                    ..
                } => {
                    if self.subtree_has_sql_keyword(ancestor) {
                        found_db = true;
                    }
                }
                NodeKind::Assign { value, .. } => {
                    if prev == *value && self.subtree_has_sql_keyword(*value) {
                        found_db = true;
                    }
                }
                NodeKind::Index { target, index } => {
                    if Some(prev) == *index {
                        if let NodeKind::Variable { name } = &self.ast.node(*target).kind {
                            if self.sinks.is_sql_collection_name(name) {
                                found_db = true;
                            }
                        }
                    }
                }
                NodeKind::Isset { .. }
                | NodeKind::Empty { .. }
                | NodeKind::Unset { .. }
                | NodeKind::IncDec { .. } => return UseContext::ReferenceRequired,
                NodeKind::Param { .. } => return UseContext::ParameterDecl,
                _ => {}
            }
            prev = ancestor;
        }

        if found_db {
            UseContext::DatabaseBinding
        } else if found_html {
            UseContext::HtmlOutput
        } else {
            UseContext::Neutral
        }
    }

    /// Strongest context per `(line, variable)` pair across all occurrences.
    pub fn variable_contexts(&self) -> HashMap<(usize, String), UseContext> {
        let mut map: HashMap<(usize, String), UseContext> = HashMap::new();
        for node in self.ast.nodes() {
            if let NodeKind::Variable { name } = &node.kind {
                let context = self.classify(node.id);
                let key = (node.line, name.clone());
                map.entry(key)
                    .and_modify(|existing| {
                        if context.rank() > existing.rank() {
                            *existing = context;
                        }
                    })
                    .or_insert(context);
            }
        }
        map
    }

    fn subtree_has_sql_keyword(&self, id: NodeId) -> bool {
        let mut text = String::new();
        self.subtree_text(id, &mut text);
        self.sinks.contains_sql_keyword(&text)
    }

    /// Literal-ish text of a subtree, concatenated with separating spaces.
    /// Nothing here pretty-prints real code; only literal fragments count
    /// toward keyword matches.
    fn subtree_text(&self, id: NodeId, out: &mut String) {
        let node = self.ast.node(id);
        match &node.kind {
            NodeKind::StringLiteral { value } => {
                out.push(' ');
                out.push_str(value);
            }
            NodeKind::StringPart { text } => {
                out.push(' ');
                out.push_str(text);
            }
            NodeKind::Constant { name } => {
                out.push(' ');
                out.push_str(name);
            }
            NodeKind::Number { raw } => {
                out.push(' ');
                out.push_str(raw);
            }
            NodeKind::Variable { name } => {
                out.push(' ');
                out.push('$');
                out.push_str(name);
            }
            _ => {}
        }
        for child in node.kind.children() {
            self.subtree_text(child, out);
        }
    }
}

/// Markers that identify a parenthesized span as a parameter declaration
/// when they appear shortly before the opening parenthesis.
pub const PARAM_CONTEXT_MARKERS: &[&str] =
    &["function", "fn", "public", "protected", "private", "static"];

/// How far back from the opening parenthesis the markers are searched.
pub const PARAM_CONTEXT_WINDOW: usize = 40;

/// True when the byte offset sits inside parentheses whose prefix looks like
/// a parameter declaration.
pub fn offset_in_param_context(line: &str, offset: usize) -> bool {
    match enclosing_open_paren(line, offset) {
        Some(open) => {
            let window_start = open.saturating_sub(PARAM_CONTEXT_WINDOW);
            let mut start = window_start;
            while start < open && !line.is_char_boundary(start) {
                start += 1;
            }
            let prefix = &line[start..open];
            PARAM_CONTEXT_MARKERS.iter().any(|m| prefix.contains(m))
        }
        None => false,
    }
}

/// True when every given occurrence offset is in a parameter declaration.
/// An empty occurrence list never counts as a parameter context.
pub fn all_in_param_context(line: &str, offsets: &[usize]) -> bool {
    !offsets.is_empty()
        && offsets
            .iter()
            .all(|&offset| offset_in_param_context(line, offset))
}

/// Byte offset of the nearest unclosed `(` left of `offset`, skipping
/// parentheses inside string literals.
fn enclosing_open_paren(line: &str, offset: usize) -> Option<usize> {
    let bytes = line.as_bytes();
    let limit = offset.min(bytes.len());
    let mut stack: Vec<usize> = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < limit {
        let byte = bytes[i];
        match quote {
            Some(q) => {
                if byte == b'\\' {
                    i += 2;
                    continue;
                }
                if byte == q {
                    quote = None;
                }
            }
            None => match byte {
                b'\'' | b'"' => quote = Some(byte),
                b'(' => stack.push(i),
                b')' => {
                    stack.pop();
                }
                _ => {}
            },
        }
        i += 1;
    }
    stack.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParsedFile;
    use crate::taint::SinkRegistry;

    fn classify_var(code: &str, var: &str) -> UseContext {
        let file = ParsedFile::from_source("test.php", code);
        assert!(file.is_ok(), "parse failed: {:?}", file.errors());
        let ast = file.ast().unwrap();
        let sinks = SinkRegistry::with_defaults();
        let classifier = ContextClassifier::new(ast, &sinks);
        let node = ast
            .nodes()
            .find(|n| matches!(&n.kind, NodeKind::Variable { name } if name == var))
            .unwrap_or_else(|| panic!("no variable {} in {}", var, code));
        classifier.classify(node.id)
    }

    #[test]
    fn echo_argument_is_html_output() {
        assert_eq!(
            classify_var("<?php echo $name;", "name"),
            UseContext::HtmlOutput
        );
    }

    #[test]
    fn interpolated_variable_is_html_output() {
        assert_eq!(
            classify_var(r#"<?php $m = "hi $name";"#, "name"),
            UseContext::HtmlOutput
        );
    }

    #[test]
    fn render_method_argument_is_html_output() {
        assert_eq!(
            classify_var("<?php $tpl->render($page);", "page"),
            UseContext::HtmlOutput
        );
    }

    #[test]
    fn query_method_argument_is_database_binding() {
        assert_eq!(
            classify_var("<?php $db->query($input);", "input"),
            UseContext::DatabaseBinding
        );
    }

    #[test]
    fn bind_param_argument_is_reference_required() {
        assert_eq!(
            classify_var("<?php $stmt->bind_param('s', $id);", "id"),
            UseContext::ReferenceRequired
        );
    }

    #[test]
    fn sql_keyword_concatenation_is_database_binding() {
        assert_eq!(
            classify_var(
                r#"<?php $q = "SELECT * FROM users WHERE id = " . $id;"#,
                "id"
            ),
            UseContext::DatabaseBinding
        );
    }

    #[test]
    fn sql_named_variable_is_database_binding() {
        assert_eq!(
            classify_var("<?php echo $sql;", "sql"),
            UseContext::DatabaseBinding
        );
    }

    #[test]
    fn implode_argument_is_database_binding() {
        assert_eq!(
            classify_var("<?php $w = implode(' AND ', $conds);", "conds"),
            UseContext::DatabaseBinding
        );
    }

    #[test]
    fn sql_collection_index_is_database_binding() {
        assert_eq!(
            classify_var("<?php $x = $filters[$key];", "key"),
            UseContext::DatabaseBinding
        );
    }

    #[test]
    fn database_wins_over_html_on_ties() {
        // echoed, but flowing into a query() call
        assert_eq!(
            classify_var("<?php echo $db->query($term);", "term"),
            UseContext::DatabaseBinding
        );
    }

    #[test]
    fn isset_argument_is_reference_required() {
        assert_eq!(
            classify_var("<?php if (isset($maybe)) {}", "maybe"),
            UseContext::ReferenceRequired
        );
    }

    #[test]
    fn incdec_target_is_reference_required() {
        assert_eq!(classify_var("<?php $n++;", "n"), UseContext::ReferenceRequired);
    }

    #[test]
    fn parameter_is_parameter_decl() {
        assert_eq!(
            classify_var("<?php function f($arg) { return 1; }", "arg"),
            UseContext::ParameterDecl
        );
    }

    #[test]
    fn plain_read_is_neutral() {
        assert_eq!(classify_var("<?php $a = $b;", "b"), UseContext::Neutral);
    }

    #[test]
    fn param_context_heuristic_matches_declarations() {
        let line = "function greet($name, $greeting) {";
        let offset = line.find("$name").unwrap();

        assert!(offset_in_param_context(line, offset));
        assert!(all_in_param_context(line, &[offset]));
    }

    #[test]
    fn param_context_heuristic_rejects_calls() {
        let line = "greet($name);";
        let offset = line.find("$name").unwrap();

        assert!(!offset_in_param_context(line, offset));
    }

    #[test]
    fn param_context_respects_method_modifiers() {
        let line = "    public function setName($name) {";
        let offset = line.find("$name").unwrap();

        assert!(offset_in_param_context(line, offset));
    }

    #[test]
    fn param_context_ignores_parens_in_strings() {
        let line = "echo 'function (' . $name;";
        let offset = line.find("$name").unwrap();

        assert!(!offset_in_param_context(line, offset));
    }

    #[test]
    fn empty_occurrence_list_is_not_param_context() {
        assert!(!all_in_param_context("function f($x) {}", &[]));
    }
}
