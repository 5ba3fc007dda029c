//! `esotime`: the thin CLI front end that spawns a guest process and
//! wires it to an ELRPC [`Runtime`](elrpc_runtime::Runtime) over stdio.
//!
//! Out of scope per spec.md §1 ("the thin command-line front-end ...
//! referenced only by interface"), included here because a runnable
//! crate needs an entry point (SPEC_FULL.md §2).

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use elrpc_runtime::{ProcessGuest, Runtime};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "esotime")]
#[command(about = "Host runtime for ELRPC guest processes")]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Spawn CMD as a guest process and bridge it to this process over a
    /// length-framed ELRPC stream (spec §6 "CLI surface").
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        cmd: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build the tokio runtime");

    let Command::Run { cmd } = cli.command;
    let exit_code = rt.block_on(run_guest(cmd));
    ExitCode::from(exit_code)
}

/// Spawn `cmd[0] cmd[1..]` as the guest, start the runtime, and wait for
/// the guest to exit, propagating its exit code (spec §6: "Exit code 0
/// on clean guest termination, nonzero on guest failure").
async fn run_guest(cmd: Vec<String>) -> u8 {
    let (program, args) = cmd.split_first().expect("clap enforces a non-empty CMD");

    let mut guest = ProcessGuest::new(program, args);
    let runtime = Arc::new(Runtime::new());

    if let Err(e) = runtime.start(&mut guest) {
        tracing::error!(error = %e, program = %program, "failed to start guest process");
        return 1;
    }

    match runtime.wait(&mut guest).await {
        Ok(status) => {
            if status.success() {
                tracing::info!("esotime: OK");
                0
            } else {
                tracing::error!(?status, "esotime: guest exited with a failure status");
                status.code().map(|c| c as u8).unwrap_or(1)
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed waiting on guest process");
            1
        }
    }
}
