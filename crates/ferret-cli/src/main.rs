//! Ferret CLI - Command-line interface for the ferret PHP security analyzer
//!
//! Scans PHP files for unescaped output of user-controlled values and
//! SQL built by string concatenation, and prints concrete rewrite fixes.

mod commands;
mod output;

use clap::Parser;
use commands::Commands;

#[derive(Parser, Debug)]
#[command(
    name = "ferret",
    author,
    version,
    about = "PHP output-escaping and SQL-injection analyzer with autofixes",
    long_about = "Ferret scans PHP source files for user-controlled values that reach\n\
                  HTML output unescaped, suggests htmlspecialchars() rewrites, and\n\
                  recommends prepared statements for SQL built by concatenation."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => args.run(),
        Commands::Explain(args) => args.run(),
    }
}
