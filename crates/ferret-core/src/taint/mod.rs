//! Taint and shape tracking
//!
//! Builds the per-file variable state in two line-oriented passes over the
//! source, merged with the facts the AST walk produced. The state never
//! leaves the per-file analysis; nothing here is shared across files.

pub mod sanitizers;
pub mod sinks;
pub mod sources;
pub mod state;

pub use sanitizers::{SanitizerRegistry, ESCAPE_FUNCTION};
pub use sinks::{
    SinkRegistry, BIND_METHODS, RENDER_METHODS, SQL_FUNCTIONS, SQL_KEYWORDS, SQL_METHODS,
};
pub use sources::{SourceRegistry, SUPERGLOBALS};
pub use state::{Shape, VariableMap, VariableState};

use regex::Regex;
use tracing::debug;

use crate::facts::Facts;
use crate::source::SourceIndex;

#[derive(Debug)]
pub struct TaintTracker {
    var_token: Regex,
    superglobal_assign: Regex,
    foreach_binding: Regex,
    secured_assign: Regex,
}

impl TaintTracker {
    pub fn new(sources: &SourceRegistry, sanitizers: &SanitizerRegistry) -> Self {
        let superglobals: Vec<&str> = sources.superglobals().collect();
        let alternation = superglobals.join("|");
        Self {
            var_token: Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("var token pattern"),
            superglobal_assign: Regex::new(&format!(
                r"^\s*\$(\w+)\s*=\s*\$({})\b(\s*\[)?",
                alternation
            ))
            .expect("superglobal assignment pattern"),
            foreach_binding: Regex::new(
                r"foreach\s*\(\s*\$(\w+)[^)]*?\bas\b\s*(?:&?\s*\$(\w+)\s*=>\s*)?&?\s*\$(\w+)",
            )
            .expect("foreach pattern"),
            secured_assign: Regex::new(&format!(
                r"^\s*\$(\w+)\s*=\s*{}\s*\(",
                regex::escape(sanitizers.escape_function())
            ))
            .expect("secured assignment pattern"),
        }
    }

    /// Seeding pass, fact merge, then the mark-secured pass.
    pub fn build_state(&self, index: &SourceIndex, facts: &Facts) -> VariableMap {
        let mut map = VariableMap::new();

        for (line, _) in index.iter() {
            if index.is_skippable(line) {
                continue;
            }
            let text = index.trimmed(line);

            for capture in self.var_token.captures_iter(text) {
                map.entry(&capture[1], line);
            }

            if let Some(capture) = self.superglobal_assign.captures(text) {
                let state = map.entry(&capture[1], line);
                if capture.get(3).is_some() {
                    state.upgrade_shape(Shape::Scalar);
                    state.add_reason("superglobal_element_assignment");
                } else {
                    state.upgrade_shape(Shape::Array);
                    state.add_reason("superglobal_assignment");
                }
            }

            if let Some(capture) = self.foreach_binding.captures(text) {
                let source = map.entry(&capture[1], line);
                source.upgrade_shape(Shape::Array);
                source.add_reason("foreach_source");
                if let Some(key) = capture.get(2) {
                    let key_state = map.entry(key.as_str(), line);
                    key_state.upgrade_shape(Shape::Scalar);
                    key_state.add_reason("foreach_key");
                }
                let value = map.entry(&capture[3], line);
                value.upgrade_shape(Shape::Scalar);
                value.add_reason("foreach_value");
            }
        }

        for fact in &facts.variables {
            let state = map.entry(&fact.name, fact.line);
            state.upgrade_shape(fact.shape);
            if let Some(reason) = &fact.reason {
                state.add_reason(reason.clone());
            }
            if fact.secured {
                state.secured = true;
            }
        }

        for (line, _) in index.iter() {
            if index.is_skippable(line) {
                continue;
            }
            let text = index.trimmed(line);
            if let Some(capture) = self.secured_assign.captures(text) {
                let name = capture[1].to_string();
                if map.contains(&name) {
                    map.mark_secured(&name, "secured_with_escape");
                }
            }
        }

        debug!(variables = map.len(), "variable state built");
        map
    }
}
