//! Output sanitizer: the HTML-escape function
//!
//! A single escaping function makes data safe for HTML output. Wrapping an
//! expression with it is the rewrite every HTML-context autofix applies.

pub const ESCAPE_FUNCTION: &str = "htmlspecialchars";

#[derive(Debug, Clone)]
pub struct SanitizerRegistry {
    escape_function: String,
}

impl Default for SanitizerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SanitizerRegistry {
    pub fn with_defaults() -> Self {
        Self {
            escape_function: ESCAPE_FUNCTION.to_string(),
        }
    }

    pub fn escape_function(&self) -> &str {
        &self.escape_function
    }

    /// PHP function names are case-insensitive.
    pub fn is_escape_function(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(&self.escape_function)
    }

    /// Wraps an expression in a call to the escape function.
    pub fn wrap(&self, expr: &str) -> String {
        format!("{}({})", self.escape_function, expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_function_matches_case_insensitively() {
        let registry = SanitizerRegistry::with_defaults();

        assert!(registry.is_escape_function("htmlspecialchars"));
        assert!(registry.is_escape_function("HTMLSpecialChars"));
        assert!(!registry.is_escape_function("htmlentities"));
    }

    #[test]
    fn wrap_produces_a_call() {
        let registry = SanitizerRegistry::with_defaults();

        assert_eq!(registry.wrap("$name"), "htmlspecialchars($name)");
        assert_eq!(
            registry.wrap("$row['id']"),
            "htmlspecialchars($row['id'])"
        );
    }
}
