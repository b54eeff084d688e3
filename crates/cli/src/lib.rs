pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "capplan",
    about = "Capacity-planning assistant operator CLI",
    long_about = "Inspect configuration, check readiness, list the assistant's tools and ask it questions.",
    after_help = "Examples:\n  capplan doctor --json\n  capplan config\n  capplan tools\n  capplan ask \"Who is over-allocated this week?\" --context capacity"
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
    #[command(about = "Validate config, model gateway setup and tool registry readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the tool definitions advertised to the model as JSON")]
    Tools,
    #[command(about = "Ask one question and stream the answer")]
    Ask {
        #[arg(help = "The question to ask")]
        query: String,
        #[arg(long, help = "View the question is asked from (dashboard|capacity|resources|projects|timeline)")]
        context: Option<String>,
        #[arg(long = "conversation", help = "Continue an existing conversation id")]
        conversation_id: Option<String>,
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
        Command::Tools => commands::tools::run(),
        Command::Ask { query, context, conversation_id } => {
            commands::ask::run(commands::ask::AskArgs { query, context, conversation_id })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
