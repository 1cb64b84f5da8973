pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use trout_core::Visibility;
use tracing_subscriber::EnvFilter;

use crate::commands::release::ReleaseArgs;

#[derive(Debug, Parser)]
#[command(
    name = "trout",
    about = "Trout operator CLI",
    long_about = "Apply migrations, inspect configuration, and release stored shout-outs without going through Slack.",
    after_help = "Examples:\n  trout migrate\n  trout pending\n  trout release --visibility public --channel C0123 --operator U0456"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Count unreleased public and private shout-outs")]
    Pending,
    #[command(about = "Release unreleased shout-outs of one visibility into a channel")]
    Release {
        #[arg(long, help = "public or private")]
        visibility: Visibility,
        #[arg(long = "channel", help = "Channel that receives public threads and the count notice")]
        channel_id: String,
        #[arg(long, help = "Slack user id that sees the ephemeral count notice")]
        operator: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Pending => commands::pending::run(),
        Command::Release { visibility, channel_id, operator } => {
            commands::release::run(ReleaseArgs { visibility, channel_id, operator })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Pipeline diagnostics go to stderr so stdout stays a single JSON line.
pub(crate) fn init_stderr_logging(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
