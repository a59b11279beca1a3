use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use rb_core::config::Settings;
use rb_core::error::AppError;
use ragbench_lib::cli::Cli;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let out = ragbench_lib::run(cli, settings)?;
    let text = serde_json::to_string_pretty(&out).context("failed to encode command output")?;
    println!("{text}");
    Ok(())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            let code = err.downcast_ref::<AppError>().map(ragbench_lib::exit_code).unwrap_or(2);
            ExitCode::from(code)
        }
    }
}
