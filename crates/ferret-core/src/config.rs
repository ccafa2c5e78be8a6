//! Configuration loading and parsing for ferret
//!
//! Provides functionality to load and parse `ferret.toml` configuration
//! files: per-category toggles and the overridable SQL keyword list.

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "ferret.toml";

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["rules", "vocab"];
const KNOWN_RULES_KEYS: &[&str] = &["sql", "html", "advisory"];
const KNOWN_VOCAB_KEYS: &[&str] = &["sql_keywords"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid TOML in '{path}': {message}")]
    ParseError { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Default)]
pub struct ConfigResult {
    pub config: Config,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub rules: RulesConfig,
    pub vocab: VocabConfig,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RulesConfig {
    /// Database-context findings (`sql_injection`, `unnecessary_escape`).
    pub sql: Option<bool>,
    /// HTML-output findings with rewrite fixes.
    pub html: Option<bool>,
    /// Advisory findings for raw superglobal-to-scalar assignments.
    pub advisory: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct VocabConfig {
    /// Overrides the SQL keyword list used by the syntactic predicate. The
    /// default list includes bare words like `AND` and `IN` that can match
    /// non-SQL prose.
    pub sql_keywords: Option<Vec<String>>,
}

pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Some(config_path);
        }
        if !current.pop() {
            return None;
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.message().to_string(),
    })
}

pub fn load_config_with_warnings(path: &Path) -> Result<ConfigResult, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.message().to_string(),
    })?;

    let warnings = detect_unknown_keys(&content);

    Ok(ConfigResult { config, warnings })
}

fn detect_unknown_keys(content: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    let table: toml::Table = match content.parse() {
        Ok(t) => t,
        Err(_) => return warnings,
    };

    for key in table.keys() {
        if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
            warnings.push(format!("Unknown configuration key '{}'", key));
        }
    }

    if let Some(toml::Value::Table(rules)) = table.get("rules") {
        for key in rules.keys() {
            if !KNOWN_RULES_KEYS.contains(&key.as_str()) {
                warnings.push(format!("Unknown configuration key 'rules.{}'", key));
            }
        }
    }

    if let Some(toml::Value::Table(vocab)) = table.get("vocab") {
        for key in vocab.keys() {
            if !KNOWN_VOCAB_KEYS.contains(&key.as_str()) {
                warnings.push(format!("Unknown configuration key 'vocab.{}'", key));
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_enables_everything() {
        let config = Config::default();

        assert_eq!(config.rules.sql, None);
        assert_eq!(config.rules.html, None);
        assert_eq!(config.vocab.sql_keywords, None);
    }

    #[test]
    fn parses_rules_section() {
        let config: Config = toml::from_str(
            r#"
            [rules]
            sql = true
            html = false
            "#,
        )
        .unwrap();

        assert_eq!(config.rules.sql, Some(true));
        assert_eq!(config.rules.html, Some(false));
        assert_eq!(config.rules.advisory, None);
    }

    #[test]
    fn parses_vocab_override() {
        let config: Config = toml::from_str(
            r#"
            [vocab]
            sql_keywords = ["SELECT", "INSERT"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.vocab.sql_keywords,
            Some(vec!["SELECT".to_string(), "INSERT".to_string()])
        );
    }

    #[test]
    fn unknown_keys_produce_warnings() {
        let warnings = detect_unknown_keys(
            r#"
            surprise = 1

            [rules]
            sql = true
            loud = true
            "#,
        );

        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("surprise"));
        assert!(warnings[1].contains("rules.loud"));
    }

    #[test]
    fn empty_config_parses() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }
}
