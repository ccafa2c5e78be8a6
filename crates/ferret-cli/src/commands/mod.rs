//! CLI subcommands

mod check;
mod explain;

pub use check::CheckArgs;
pub use explain::ExplainArgs;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze PHP files for unescaped output and SQL injection
    Check(CheckArgs),
    /// Explain a finding kind and its recommended remediation
    Explain(ExplainArgs),
}
