//! Database and template sinks
//!
//! Knows which function and method names indicate database work, which
//! method names are template renderers, and how to spot SQL-looking text.
//! The SQL keyword list is deliberately overridable: bare words like `AND`
//! or `IN` match inside non-SQL prose, and callers may want a tighter list.

/// Free functions that execute or prepare database queries.
pub const SQL_FUNCTIONS: &[&str] = &[
    "mysqli_query",
    "mysql_query",
    "pdo_query",
    "mysqli_prepare",
    "mysqli_stmt_bind_param",
];

/// Method names (lowercased) that execute, prepare, or bind queries.
pub const SQL_METHODS: &[&str] = &[
    "query",
    "prepare",
    "execute",
    "bind_param",
    "bindvalue",
    "bindparam",
];

/// The subset of methods whose arguments are bound by reference.
pub const BIND_METHODS: &[&str] = &["bind_param", "bindparam"];

/// Template engine entry points that emit HTML.
pub const RENDER_METHODS: &[&str] = &["render", "display", "view"];

pub const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "WHERE", "FROM", "JOIN", "LEFT JOIN", "RIGHT JOIN",
    "INNER JOIN", "GROUP BY", "ORDER BY", "LIMIT", "OFFSET", "BETWEEN", "AND", "OR", "IN",
    "LIKE", "SUM", "COUNT", "COALESCE",
];

/// Variable names that hold collections of query fragments.
pub const SQL_COLLECTION_NAMES: &[&str] = &["filters", "conditions", "where", "clauses"];

/// Variable names that conventionally hold a query string or statement.
pub const SQL_VARIABLE_NAMES: &[&str] =
    &["query", "sql", "stmt", "filterquery", "wherequery", "searchquery"];

#[derive(Debug, Clone)]
pub struct SinkRegistry {
    sql_functions: Vec<String>,
    sql_methods: Vec<String>,
    bind_methods: Vec<String>,
    render_methods: Vec<String>,
    sql_keywords: Vec<String>,
    sql_collection_names: Vec<String>,
    sql_variable_names: Vec<String>,
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SinkRegistry {
    pub fn with_defaults() -> Self {
        Self {
            sql_functions: to_owned(SQL_FUNCTIONS),
            sql_methods: to_owned(SQL_METHODS),
            bind_methods: to_owned(BIND_METHODS),
            render_methods: to_owned(RENDER_METHODS),
            sql_keywords: to_owned(SQL_KEYWORDS),
            sql_collection_names: to_owned(SQL_COLLECTION_NAMES),
            sql_variable_names: to_owned(SQL_VARIABLE_NAMES),
        }
    }

    /// Replaces the SQL keyword list used by the syntactic predicate.
    pub fn with_sql_keywords(mut self, keywords: Vec<String>) -> Self {
        self.sql_keywords = keywords
            .into_iter()
            .map(|k| k.to_ascii_uppercase())
            .collect();
        self
    }

    pub fn is_sql_function(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.sql_functions.iter().any(|f| *f == lower)
    }

    pub fn is_sql_method(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.sql_methods.iter().any(|m| *m == lower)
    }

    pub fn is_bind_method(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.bind_methods.iter().any(|m| *m == lower)
    }

    pub fn is_render_method(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.render_methods.iter().any(|m| *m == lower)
    }

    pub fn is_sql_collection_name(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.sql_collection_names.iter().any(|n| *n == lower)
    }

    pub fn is_sql_variable_name(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.sql_variable_names.iter().any(|n| *n == lower)
    }

    /// Case-insensitive whole-word scan for any configured SQL keyword.
    pub fn contains_sql_keyword(&self, text: &str) -> bool {
        let upper = text.to_ascii_uppercase();
        self.sql_keywords
            .iter()
            .any(|keyword| contains_word(&upper, keyword))
    }

    /// Line-level predicate: does this line look like it builds or runs SQL?
    pub fn line_is_sqlish(&self, text: &str) -> bool {
        let upper = text.to_ascii_uppercase();
        if ["SELECT", "INSERT", "UPDATE", "DELETE"]
            .iter()
            .any(|k| contains_word(&upper, k))
        {
            return true;
        }
        text.contains("mysqli_query") || text.contains("->query(")
    }
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Whole-word containment with ASCII word boundaries on both sides. Both
/// `haystack` and `needle` are expected uppercased.
fn contains_word(haystack: &str, needle: &str) -> bool {
    let haystack_bytes = haystack.as_bytes();
    let mut search_from = 0;
    while let Some(found) = haystack[search_from..].find(needle) {
        let start = search_from + found;
        let end = start + needle.len();
        let boundary_before = start == 0 || !is_word_byte(haystack_bytes[start - 1]);
        let boundary_after =
            end >= haystack_bytes.len() || !is_word_byte(haystack_bytes[end]);
        if boundary_before && boundary_after {
            return true;
        }
        search_from = start + 1;
    }
    false
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
