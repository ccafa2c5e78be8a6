//! AST fact collection
//!
//! One depth-first walk over the parsed tree produces three per-line fact
//! streams: variable shape/security facts, call facts, and usage facts. The
//! second analysis pass and the aggregator work from these streams instead of
//! re-walking the AST.

use crate::parser::{AssignOp, Ast, BinaryOp, NodeId, NodeKind};
use crate::taint::{SanitizerRegistry, Shape, SinkRegistry, SourceRegistry};

/// Functions whose return value is always an array.
pub const ARRAY_RETURNING_FUNCTIONS: &[&str] = &[
    "array_keys",
    "array_values",
    "array_map",
    "array_filter",
    "explode",
    "preg_split",
    "range",
    "glob",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Function,
    Method,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFact {
    pub line: usize,
    pub kind: CallKind,
    pub name: String,
    pub arg_vars: Vec<String>,
    pub is_sql: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageKind {
    Presence,
    Emptiness,
    Destroy,
    IncDec,
    Return,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageFact {
    pub line: usize,
    pub kind: UsageKind,
    pub vars: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableFact {
    pub line: usize,
    pub name: String,
    pub shape: Shape,
    pub secured: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
pub struct Facts {
    pub variables: Vec<VariableFact>,
    pub calls: Vec<CallFact>,
    pub usages: Vec<UsageFact>,
}

impl Facts {
    pub fn calls_on(&self, line: usize) -> impl Iterator<Item = &CallFact> {
        self.calls.iter().filter(move |c| c.line == line)
    }

    pub fn usages_on(&self, line: usize) -> impl Iterator<Item = &UsageFact> {
        self.usages.iter().filter(move |u| u.line == line)
    }

    pub fn collect(
        ast: &Ast,
        sources: &SourceRegistry,
        sinks: &SinkRegistry,
        sanitizers: &SanitizerRegistry,
    ) -> Facts {
        let mut collector = FactCollector {
            ast,
            sources,
            sinks,
            sanitizers,
            facts: Facts::default(),
        };
        collector.visit(ast.root());
        collector.facts
    }
}

struct FactCollector<'a> {
    ast: &'a Ast,
    sources: &'a SourceRegistry,
    sinks: &'a SinkRegistry,
    sanitizers: &'a SanitizerRegistry,
    facts: Facts,
}

impl FactCollector<'_> {
    fn visit(&mut self, id: NodeId) {
        let node = self.ast.node(id);
        match &node.kind {
            NodeKind::Assign { op, target, value } => {
                if let NodeKind::Variable { name } = &self.ast.node(*target).kind {
                    let fact = if *op == AssignOp::Assign {
                        self.assignment_fact(node.line, name, *value)
                    } else {
                        VariableFact {
                            line: node.line,
                            name: name.clone(),
                            shape: Shape::Unknown,
                            secured: false,
                            reason: None,
                        }
                    };
                    self.facts.variables.push(fact);
                }
            }
            NodeKind::Foreach {
                source, key, value, ..
            } => {
                if let NodeKind::Variable { name } = &self.ast.node(*source).kind {
                    self.push_shape_fact(node.line, name, Shape::Array, "foreach_source");
                }
                if let NodeKind::Variable { name } = &self.ast.node(*value).kind {
                    self.push_shape_fact(node.line, name, Shape::Scalar, "foreach_value");
                }
                if let Some(key) = key {
                    if let NodeKind::Variable { name } = &self.ast.node(*key).kind {
                        self.push_shape_fact(node.line, name, Shape::Scalar, "foreach_key");
                    }
                }
            }
            NodeKind::FunctionCall { name, args } => {
                if name.eq_ignore_ascii_case("is_array") {
                    if let Some(first) = args.first() {
                        if let NodeKind::Variable { name } = &self.ast.node(*first).kind {
                            self.push_shape_fact(
                                node.line,
                                name,
                                Shape::Array,
                                "checked_with_is_array",
                            );
                        }
                    }
                }
                let fact = CallFact {
                    line: node.line,
                    kind: CallKind::Function,
                    name: name.clone(),
                    arg_vars: self.collect_vars(args),
                    is_sql: self.sinks.is_sql_function(name),
                };
                self.facts.calls.push(fact);
            }
            NodeKind::MethodCall { method, args, .. } => {
                let fact = CallFact {
                    line: node.line,
                    kind: CallKind::Method,
                    name: method.clone(),
                    arg_vars: self.collect_vars(args),
                    is_sql: self.sinks.is_sql_method(method),
                };
                self.facts.calls.push(fact);
            }
            NodeKind::StaticCall { method, args, .. } => {
                let fact = CallFact {
                    line: node.line,
                    kind: CallKind::Static,
                    name: method.clone(),
                    arg_vars: self.collect_vars(args),
                    is_sql: self.sinks.is_sql_method(method),
                };
                self.facts.calls.push(fact);
            }
            NodeKind::Isset { args } => {
                self.push_usage(node.line, UsageKind::Presence, self.collect_vars(args));
            }
            NodeKind::Empty { arg } => {
                self.push_usage(node.line, UsageKind::Emptiness, self.collect_vars(&[*arg]));
            }
            NodeKind::Unset { args } => {
                self.push_usage(node.line, UsageKind::Destroy, self.collect_vars(args));
            }
            NodeKind::IncDec { target, .. } => {
                self.push_usage(node.line, UsageKind::IncDec, self.collect_vars(&[*target]));
            }
            NodeKind::Return { value } => {
                let vars = match value {
                    Some(value) => self.collect_vars(&[*value]),
                    None => Vec::new(),
                };
                self.push_usage(node.line, UsageKind::Return, vars);
            }
            _ => {}
        }

        for child in node.kind.children() {
            self.visit(child);
        }
    }

    /// Shape and security classification for a plain-assignment RHS.
    fn assignment_fact(&self, line: usize, name: &str, value: NodeId) -> VariableFact {
        let mut fact = VariableFact {
            line,
            name: name.to_string(),
            shape: Shape::Unknown,
            secured: false,
            reason: None,
        };
        match &self.ast.node(value).kind {
            NodeKind::ArrayLiteral { .. } => {
                fact.shape = Shape::Array;
                fact.reason = Some("array_literal".to_string());
            }
            NodeKind::Variable { name } if self.sources.is_superglobal(name) => {
                fact.shape = Shape::Array;
                fact.reason = Some("superglobal_assignment".to_string());
            }
            NodeKind::Index { .. } => {
                if let Some(base) = self.index_base(value) {
                    if let NodeKind::Variable { name } = &self.ast.node(base).kind {
                        if self.sources.is_superglobal(name) {
                            fact.shape = Shape::Scalar;
                            fact.reason = Some("superglobal_element_assignment".to_string());
                        }
                    }
                }
            }
            NodeKind::FunctionCall { name, .. } => {
                let lower = name.to_ascii_lowercase();
                if ARRAY_RETURNING_FUNCTIONS.contains(&lower.as_str()) {
                    fact.shape = Shape::Array;
                    fact.reason = Some(format!("assigned_from_{}", lower));
                } else if self.sanitizers.is_escape_function(name) {
                    fact.secured = true;
                    fact.reason = Some("secured_with_escape".to_string());
                }
            }
            NodeKind::Binary {
                op: BinaryOp::Coalesce,
                left,
                ..
            } => {
                if let NodeKind::FunctionCall { name, .. } = &self.ast.node(*left).kind {
                    if self.sanitizers.is_escape_function(name) {
                        fact.secured = true;
                        fact.reason = Some("secured_with_escape".to_string());
                    }
                }
            }
            _ => {}
        }
        fact
    }

    /// Base of an `$a[b][c]` chain.
    fn index_base(&self, mut id: NodeId) -> Option<NodeId> {
        loop {
            match &self.ast.node(id).kind {
                NodeKind::Index { target, .. } => id = *target,
                _ => return Some(id),
            }
        }
    }

    fn push_shape_fact(&mut self, line: usize, name: &str, shape: Shape, reason: &str) {
        self.facts.variables.push(VariableFact {
            line,
            name: name.to_string(),
            shape,
            secured: false,
            reason: Some(reason.to_string()),
        });
    }

    fn push_usage(&mut self, line: usize, kind: UsageKind, vars: Vec<String>) {
        if vars.is_empty() {
            return;
        }
        self.facts.usages.push(UsageFact { line, kind, vars });
    }

    /// Variable names reachable from the given expressions, deduplicated in
    /// first-seen order. Closure and class bodies are opaque.
    fn collect_vars(&self, roots: &[NodeId]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut stack: Vec<NodeId> = roots.to_vec();
        // reverse so the stack pops in source order
        stack.reverse();
        while let Some(id) = stack.pop() {
            let node = self.ast.node(id);
            match &node.kind {
                NodeKind::Variable { name } => {
                    if !out.iter().any(|n| n == name) {
                        out.push(name.clone());
                    }
                }
                NodeKind::FunctionDecl { .. } | NodeKind::ClassDecl { .. } => continue,
                _ => {}
            }
            let mut children = node.kind.children();
            children.reverse();
            stack.extend(children);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParsedFile;

    fn collect(code: &str) -> Facts {
        let file = ParsedFile::from_source("test.php", code);
        assert!(file.is_ok(), "parse failed: {:?}", file.errors());
        Facts::collect(
            file.ast().unwrap(),
            &SourceRegistry::with_defaults(),
            &SinkRegistry::with_defaults(),
            &SanitizerRegistry::with_defaults(),
        )
    }

    fn variable<'a>(facts: &'a Facts, name: &str) -> &'a VariableFact {
        facts
            .variables
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("no fact for {}", name))
    }

    #[test]
    fn superglobal_element_assignment_is_scalar() {
        let facts = collect("<?php $name = $_POST['name'];");

        let fact = variable(&facts, "name");
        assert_eq!(fact.shape, Shape::Scalar);
        assert_eq!(
            fact.reason.as_deref(),
            Some("superglobal_element_assignment")
        );
    }

    #[test]
    fn whole_superglobal_assignment_is_array() {
        let facts = collect("<?php $input = $_POST;");

        let fact = variable(&facts, "input");
        assert_eq!(fact.shape, Shape::Array);
        assert_eq!(fact.reason.as_deref(), Some("superglobal_assignment"));
    }

    #[test]
    fn array_literal_assignment_is_array() {
        let facts = collect("<?php $rows = ['a', 'b'];");

        let fact = variable(&facts, "rows");
        assert_eq!(fact.shape, Shape::Array);
        assert_eq!(fact.reason.as_deref(), Some("array_literal"));
    }

    #[test]
    fn array_returning_function_is_array() {
        let facts = collect("<?php $parts = explode(',', $csv);");

        let fact = variable(&facts, "parts");
        assert_eq!(fact.shape, Shape::Array);
        assert_eq!(fact.reason.as_deref(), Some("assigned_from_explode"));
    }

    #[test]
    fn escape_assignment_is_secured() {
        let facts = collect("<?php $safe = htmlspecialchars($_GET['q']);");

        let fact = variable(&facts, "safe");
        assert!(fact.secured);
        assert_eq!(fact.reason.as_deref(), Some("secured_with_escape"));
    }

    #[test]
    fn escape_with_null_coalesce_is_secured() {
        let facts = collect("<?php $safe = htmlspecialchars($_GET['q']) ?? '';");

        let fact = variable(&facts, "safe");
        assert!(fact.secured);
    }

    #[test]
    fn plain_assignment_has_unknown_shape() {
        let facts = collect("<?php $x = $y;");

        let fact = variable(&facts, "x");
        assert_eq!(fact.shape, Shape::Unknown);
        assert!(fact.reason.is_none());
        assert!(!fact.secured);
    }

    #[test]
    fn foreach_emits_source_and_binding_facts() {
        let facts = collect("<?php foreach ($rows as $key => $row) { echo $row; }");

        assert_eq!(variable(&facts, "rows").shape, Shape::Array);
        assert_eq!(variable(&facts, "key").shape, Shape::Scalar);
        assert_eq!(variable(&facts, "row").shape, Shape::Scalar);
        assert_eq!(
            variable(&facts, "rows").reason.as_deref(),
            Some("foreach_source")
        );
    }

    #[test]
    fn is_array_check_emits_array_fact() {
        let facts = collect("<?php if (is_array($items)) { echo 'yes'; }");

        let fact = variable(&facts, "items");
        assert_eq!(fact.shape, Shape::Array);
        assert_eq!(fact.reason.as_deref(), Some("checked_with_is_array"));
    }

    #[test]
    fn call_facts_carry_argument_variables() {
        let facts = collect("<?php mysqli_query($conn, $sql . $id);");

        let call = &facts.calls[0];
        assert_eq!(call.kind, CallKind::Function);
        assert!(call.is_sql);
        assert_eq!(call.arg_vars, vec!["conn", "sql", "id"]);
    }

    #[test]
    fn method_call_facts_classify_sql_methods() {
        let facts = collect("<?php $stmt->bind_param('s', $id);");

        let call = facts
            .calls
            .iter()
            .find(|c| c.name == "bind_param")
            .unwrap();
        assert_eq!(call.kind, CallKind::Method);
        assert!(call.is_sql);
        assert_eq!(call.arg_vars, vec!["id"]);
    }

    #[test]
    fn nested_argument_expressions_are_descended() {
        let facts = collect("<?php foo($a[$b], $c->d, bar($e), $f ? $g : $h);");

        let call = facts.calls.iter().find(|c| c.name == "foo").unwrap();
        assert_eq!(call.arg_vars, vec!["a", "b", "c", "e", "f", "g", "h"]);
    }

    #[test]
    fn usage_facts_for_reference_constructs() {
        let facts = collect("<?php if (isset($a) || empty($b)) { unset($c); $d++; }");

        let kinds: Vec<UsageKind> = facts.usages.iter().map(|u| u.kind).collect();
        assert!(kinds.contains(&UsageKind::Presence));
        assert!(kinds.contains(&UsageKind::Emptiness));
        assert!(kinds.contains(&UsageKind::Destroy));
        assert!(kinds.contains(&UsageKind::IncDec));
    }

    #[test]
    fn return_usage_lists_returned_vars() {
        let facts = collect("<?php function f($x) { return $x; }");

        let ret = facts
            .usages
            .iter()
            .find(|u| u.kind == UsageKind::Return)
            .unwrap();
        assert_eq!(ret.vars, vec!["x"]);
    }

    #[test]
    fn compound_assignment_emits_plain_fact() {
        let facts = collect("<?php $sql .= $clause;");

        let fact = variable(&facts, "sql");
        assert_eq!(fact.shape, Shape::Unknown);
        assert!(fact.reason.is_none());
    }
}
