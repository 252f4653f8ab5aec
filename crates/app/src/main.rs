use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::OutputFormat;
use config::Config;

/// Import bank-statement CSV exports, skipping files that were already imported.
#[derive(Parser)]
#[command(name = "tally", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Transform every new statement and record it in the hash ledger (default).
    Import {
        /// Bank profile to apply; overrides BANK_INSTITUTION.
        #[arg(long)]
        institution: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
    },
    /// List statements not yet in the hash ledger without importing them.
    Discover,
    /// Delete the hash ledger so every statement is imported again.
    Forget,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::new()?;
    let mut stdout = std::io::stdout().lock();

    match cli.command.unwrap_or(Command::Import {
        institution: None,
        format: OutputFormat::default(),
    }) {
        Command::Import { institution, format } => {
            let institution = institution.unwrap_or_else(|| config.institution.clone());
            let rates = commands::load_rates(&config)?;
            let summary = commands::import(&config, &institution, &rates, format, &mut stdout)?;
            if summary.failed > 0 {
                anyhow::bail!("{} statement(s) failed to import", summary.failed);
            }
        }
        Command::Discover => {
            commands::discover(&config, &mut stdout)?;
        }
        Command::Forget => commands::forget(&config)?,
    }
    Ok(())
}
