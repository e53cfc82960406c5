pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "arbot",
    about = "arbot operator CLI",
    long_about = "Inspect arbot configuration, check collaborator readiness, and dry-run the extraction rules.",
    after_help = "Examples:\n  arbot config\n  arbot doctor --json\n  arbot extract \"invoices from January 1 to January 10 for company code 898\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and probe the configured collaborator endpoints")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print what the extraction rules read from an utterance, without network calls")]
    Extract {
        #[arg(help = "The user utterance to analyse")]
        utterance: String,
        #[arg(long, value_name = "YYYY", help = "Fiscal year already known from the session")]
        fiscal_year: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Extract { utterance, fiscal_year } => {
            commands::extract::run(&utterance, fiscal_year.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
