use anyhow::Result;
use clap::Parser;
use telecue::cli::{
    handle_jobs_command, handle_record_command, handle_script_command, Cli, CliCommand,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Record(args)) => handle_record_command(args).await,
        Some(CliCommand::Script(args)) => handle_script_command(args).await,
        Some(CliCommand::Jobs(args)) => handle_jobs_command(args).await,
        Some(CliCommand::Version) => {
            println!("telecue {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => Ok(()),
    }
}
