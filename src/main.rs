use clap::Parser;
use frollo_sync::args::{Args, Command};
use frollo_sync::{commands, Config, Mode, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().home().path();

    // This allows for running the program without hitting Frollo or PocketSmith. When
    // FROLLO_SYNC_IN_TEST_MODE is set and non-zero in length, then the mode will be Mode::Test,
    // otherwise it will be Mode::Live.
    let mode = Mode::from_env();

    let _: () = match args.command() {
        Command::Init => commands::init(home).await?.print(),

        Command::Sync(sync_args) => {
            let config = Config::load(home).await?;
            commands::sync(config, sync_args, mode).await?.print()
        }

        Command::Accounts(accounts_args) => {
            let config = Config::load(home).await?;
            commands::accounts(config, accounts_args, mode)
                .await?
                .print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            // The library and the binary share the crate name `frollo_sync`.
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), level))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
