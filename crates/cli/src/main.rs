use crate::{
    error::CliError,
    runner::{Overrides, RunReport},
    shutdown::ExitCode,
};
use clap::Parser;
use commands::Commands;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;
mod conn;
mod error;
mod output;
mod runner;
mod shutdown;

#[derive(Parser)]
#[command(name = "pager", version = "0.1.0", about = "Paginated SQL reader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = match execute(cli.command).await {
        Ok(()) => ExitCode::Success,
        Err(CliError::ShutdownRequested) => ExitCode::ShutdownRequested,
        Err(err) => {
            error!("{err}");
            ExitCode::GeneralError
        }
    };

    std::process::exit(code.as_i32());
}

async fn execute(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Run {
            config,
            page_size,
            max_pages,
            json,
        } => {
            let settings = runner::load(
                &config,
                Overrides {
                    page_size,
                    max_pages,
                },
            )?;

            let cancel = CancellationToken::new();
            shutdown::register_handlers(cancel.clone());

            match runner::run(settings, cancel).await? {
                RunReport::Sequential(Some(summary)) => output::print_summary(&summary, json)?,
                RunReport::Sequential(None) => {}
                RunReport::Partitioned(outcomes) => {
                    output::print_outcomes(&outcomes, json)?;
                    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
                    if failed > 0 {
                        return Err(CliError::RangesFailed(failed, outcomes.len()));
                    }
                }
            }
        }
        Commands::Render { config } => {
            let settings = runner::load(&config, Overrides::default())?;
            let (text, fingerprint) = runner::render(&settings)?;
            println!("{text}");
            println!("fingerprint: {fingerprint}");
        }
        Commands::TestConn { driver, url } => {
            conn::ping(driver, &url).await?;
        }
    }

    Ok(())
}
