pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "tutor",
    about = "Personal learning tutor CLI",
    long_about = "Talk to the guardrail-gated learning tutor, run its safety checks, and inspect configuration.",
    after_help = "Examples:\n  tutor doctor --json\n  tutor ask \"How do fractions work?\"\n  tutor chat --save session_log.txt\n  tutor guardrails \"My SSN is 123-45-6789\""
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
    #[command(about = "Validate config, credential readiness, guardrails, and the public directory")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Send one message through the guardrails to the tutor")]
    Ask {
        message: String,
        #[arg(long, help = "OpenAI API key for this run only")]
        api_key: Option<String>,
    },
    #[command(about = "Start an interactive tutoring session")]
    Chat {
        #[arg(long, help = "OpenAI API key for this session only")]
        api_key: Option<String>,
        #[arg(long, value_name = "FILE", help = "Write the session log here on exit")]
        save: Option<PathBuf>,
    },
    #[command(about = "Run the configured guardrails against text and print every result")]
    Guardrails {
        text: String,
        #[arg(long, help = "OpenAI API key for this run only")]
        api_key: Option<String>,
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
        Command::Ask { message, api_key } => commands::ask::run(&message, api_key.as_deref()),
        Command::Chat { api_key, save } => {
            commands::chat::run(api_key.as_deref(), save.as_deref())
        }
        Command::Guardrails { text, api_key } => {
            commands::guardrails::run(&text, api_key.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn chat_accepts_save_path() {
        let cli = Cli::try_parse_from(["tutor", "chat", "--save", "log.txt"]).expect("parse");
        assert!(matches!(
            cli.command,
            Command::Chat { api_key: None, save: Some(ref path) } if path.as_os_str() == "log.txt"
        ));
    }

    #[test]
    fn ask_requires_message() {
        assert!(Cli::try_parse_from(["tutor", "ask"]).is_err());
        let cli = Cli::try_parse_from(["tutor", "ask", "hi", "--api-key", "sk-x"]).expect("parse");
        assert!(matches!(cli.command, Command::Ask { ref message, api_key: Some(_) } if message == "hi"));
    }
}
