//! `snapsafe-bench`: run a randomized workload against the MVCC core and
//! emit aggregate statistics.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use snapsafe_harness::{run, HarnessError, HarnessParams};
use snapsafe_types::Protocol;

#[derive(Debug, Parser)]
#[command(name = "snapsafe-bench", about = "SnapSafe MVCC workload driver")]
struct Cli {
    /// JSON parameter file; defaults apply for every field it omits.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Override the isolation protocol (si | si-ssn).
    #[arg(long)]
    protocol: Option<String>,

    /// Write the JSON report to this file as well as stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run_cli(&Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("snapsafe-bench: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: &Cli) -> Result<(), HarnessError> {
    let mut params = match &cli.params {
        Some(path) => HarnessParams::load(path)?,
        None => HarnessParams::default(),
    };

    if let Some(name) = &cli.protocol {
        params.protocol =
            Protocol::from_name(name).ok_or_else(|| HarnessError::InvalidParam {
                field: "protocol",
                detail: format!("unknown protocol {name:?} (expected si | si-ssn)"),
            })?;
    }
    params.validate()?;

    tracing::info!(
        protocol = %params.protocol,
        n_workers = params.n_workers,
        n_items = params.n_items,
        txns_per_worker = params.txns_per_worker,
        ops_per_txn = params.ops_per_txn,
        read_ratio = params.read_ratio,
        seed = params.seed,
        "starting workload"
    );

    let report = run(&params);
    let rendered = serde_json::to_string_pretty(&report)?;
    println!("{rendered}");

    if let Some(path) = &cli.output {
        std::fs::write(path, &rendered)?;
    }
    Ok(())
}
