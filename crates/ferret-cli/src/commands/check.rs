//! Check command - analyzes PHP files for findings

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use ferret_core::config::{find_config_file, load_config_with_warnings, Config};
use ferret_core::{AnalysisEngine, Finding};
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process;

use crate::output::json::JsonFormatter;
use crate::output::pretty::PrettyFormatter;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// PHP files to analyze (directories are not walked)
    #[arg(value_name = "FILES", required = true)]
    pub files: Vec<PathBuf>,

    /// Output format for findings (pretty, text, json)
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable debug logging on stderr
    #[arg(long)]
    pub verbose: bool,
}

impl CheckArgs {
    pub fn run(&self) -> Result<()> {
        self.configure_colors();
        if self.verbose {
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(std::io::stderr)
                .init();
        }

        for file in &self.files {
            if file.is_dir() {
                bail!(
                    "'{}' is a directory; ferret analyzes explicit files only",
                    file.display()
                );
            }
        }

        let config = self.load_config();
        let engine = AnalysisEngine::with_config(&config);

        let results: Vec<(PathBuf, Vec<Finding>)> = self
            .files
            .par_iter()
            .map(|file| {
                let bytes = fs::read(file)
                    .with_context(|| format!("failed to read '{}'", file.display()))?;
                let findings = engine.analyze_bytes(&file.to_string_lossy(), &bytes);
                Ok((file.clone(), findings))
            })
            .collect::<Result<Vec<_>>>()?;

        let total: usize = results.iter().map(|(_, f)| f.len()).sum();

        match self.format.as_str() {
            "json" => {
                let formatter = JsonFormatter::new(self.files.len());
                println!("{}", formatter.format(&results)?);
            }
            "text" => Self::output_text(&results),
            "pretty" => {
                let formatter = PrettyFormatter::new();
                print!("{}", formatter.format(&results));
            }
            other => bail!("Invalid format '{}'. Valid values: pretty, text, json", other),
        }

        if total > 0 {
            process::exit(1);
        }
        Ok(())
    }

    fn load_config(&self) -> Config {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let Some(path) = find_config_file(&cwd) else {
            return Config::default();
        };
        match load_config_with_warnings(&path) {
            Ok(result) => {
                for warning in &result.warnings {
                    eprintln!("{} {}", "warning:".yellow().bold(), warning);
                }
                result.config
            }
            Err(error) => {
                eprintln!("{} {}", "warning:".yellow().bold(), error);
                Config::default()
            }
        }
    }

    fn configure_colors(&self) {
        let no_color_env = std::env::var("NO_COLOR").is_ok();
        if self.no_color || no_color_env {
            colored::control::set_override(false);
        }
    }

    fn output_text(results: &[(PathBuf, Vec<Finding>)]) {
        for (path, findings) in results {
            for finding in findings {
                println!(
                    "{}:{}: [{}] {} -> {}",
                    path.display(),
                    finding.line,
                    finding.kind.as_str(),
                    finding.code,
                    finding.fix
                );
            }
        }
    }
}
