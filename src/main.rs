//! Dynamic kernel dispatch harness.
//!
//! Loads each configured compute module, dispatches the shared
//! `vector_square` entry point against one pair of device buffers for a
//! configured number of passes, copies the result back, and verifies it
//! bit-exactly. Any load, resolve, device, or verification failure exits
//! nonzero; success prints a single `PASSED` summary line.
//!
//! ```bash
//! modsquare libfoo1.so libfoo2.so --passes 2 -n 1000000 --grid 512 --block 256
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use modsquare::{HarnessConfig, LaunchConfig, Orchestrator, RunReport, SyncMode};

/// Validate elementwise squaring across dynamically loaded compute modules.
#[derive(Parser)]
#[command(name = "modsquare")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Loadable module binaries to dispatch, in order.
    modules: Vec<PathBuf>,

    /// Element count of the input/output buffers.
    #[arg(short = 'n', long, default_value_t = 1_000_000)]
    elements: usize,

    /// Number of passes over the module list.
    #[arg(long, default_value_t = 2)]
    passes: u32,

    /// Blocks in the launch grid.
    #[arg(long, default_value_t = 512)]
    grid: u32,

    /// Threads per block.
    #[arg(long, default_value_t = 256)]
    block: u32,

    /// Synchronize after every module invocation instead of once at the end.
    #[arg(long)]
    sync_each: bool,

    /// Device ordinal to run on (requires the `cuda` feature).
    #[arg(long, default_value_t = 0)]
    device: usize,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> modsquare::Result<RunReport> {
    let config = HarnessConfig::builder()
        .elements(cli.elements)
        .passes(cli.passes)
        .launch(LaunchConfig::new(cli.grid, cli.block))
        .modules(cli.modules.iter().cloned())
        .sync(if cli.sync_each {
            SyncMode::PerModule
        } else {
            SyncMode::EndOfRun
        })
        .build()?;

    #[cfg(feature = "cuda")]
    {
        let runtime = modsquare::CudaRuntime::new(cli.device)?;
        Orchestrator::new(&runtime, config).run()
    }
    #[cfg(not(feature = "cuda"))]
    {
        if cli.device != 0 {
            return Err(modsquare::HarnessError::InvalidConfig(
                "device selection requires the `cuda` feature".to_string(),
            ));
        }
        let runtime = modsquare::HostRuntime::new();
        Orchestrator::new(&runtime, config).run()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(report) => {
            println!(
                "PASSED: {} elements, {} passes, {} modules, {} dynamic launches",
                report.elements, report.passes, report.modules, report.launches
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("FAILED: {e}");
            ExitCode::FAILURE
        }
    }
}
