use std::io::{BufRead, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use jtag_walk::cable::{self, CableKind};
use jtag_walk::classify::{classify_steps, ConnectivityReport};
use jtag_walk::config::WalkConfig;
use jtag_walk::database::PartDatabase;
use jtag_walk::driver::ScanChain;
use jtag_walk::session::{Checkpoint, Interruptible, NoPause, Pacer, SessionContext, SessionOutcome};
use jtag_walk::statemachine::JtagSM;

#[derive(Parser, Debug)]
#[command(name = "jtag-walk")]
#[command(about = "Find pin-to-pin connections by walking EXTEST outputs and watching SAMPLE inputs")]
#[command(version)]
struct Args {
    /// Chain position of the part whose outputs are driven (EXTEST)
    #[arg(long, default_value_t = 0)]
    extest: usize,

    /// Name for the EXTEST part in logs
    #[arg(long)]
    extestalias: Option<String>,

    /// Chain position of the part whose inputs are watched (SAMPLE/PRELOAD)
    #[arg(long, default_value_t = 0)]
    sample: usize,

    /// Name for the SAMPLE part in logs
    #[arg(long)]
    samplealias: Option<String>,

    /// 1 for debug logging
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    debug: u8,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, env = "JTAG_WALK_CABLE")]
    cable: Option<CableKind>,

    /// TCK frequency in hertz
    #[arg(long)]
    clock: Option<u32>,

    /// urJTAG data directory holding the part files
    #[arg(long, env = "JTAG_WALK_DATABASE")]
    database: Option<PathBuf>,

    /// Run a single session without waiting for the operator
    #[arg(long)]
    no_pause: bool,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

/// Waits for enter on stdin at every checkpoint except individual steps.  `q` or end of input
/// stops the session; Ctrl-C stops it at any checkpoint through `Interruptible`.
struct StdinGate;

impl Pacer for StdinGate {
    fn checkpoint(&mut self, at: Checkpoint) -> ControlFlow<()> {
        if matches!(at, Checkpoint::Step { .. }) {
            return ControlFlow::Continue(());
        }
        eprint!("\nPress enter to {at} (q to quit) ");
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => ControlFlow::Break(()),
            Ok(_) if line.trim().eq_ignore_ascii_case("q") => ControlFlow::Break(()),
            Ok(_) => ControlFlow::Continue(()),
        }
    }
}

fn print_report(report: &ConnectivityReport, json: bool, title: &str) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", "=".repeat(80));
        println!("{title}");
        print!("{report}");
        println!("{}", "=".repeat(80));
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if args.debug == 1 {
        EnvFilter::new("jtag_walk=debug")
    } else {
        EnvFilter::new("jtag_walk=info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => WalkConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => WalkConfig::default(),
    };
    if let Some(cable) = args.cable {
        config.cable = cable;
    }
    if let Some(clock) = args.clock {
        config.clock_hz = clock;
    }
    if let Some(database) = &args.database {
        config.database = database.clone();
    }
    if args.no_pause {
        config.pause = false;
    }
    debug!(?config, "configuration");

    let cable = cable::open(config.cable, config.clock_hz)
        .with_context(|| format!("opening {} cable", config.cable))?;
    let sm = JtagSM::new(cable).context("resetting the chain")?;
    let chain = ScanChain::connect(sm).context("detecting the chain")?;

    let extest_alias = args
        .extestalias
        .unwrap_or_else(|| format!("part {}", args.extest));
    let sample_alias = args
        .samplealias
        .unwrap_or_else(|| format!("part {}", args.sample));
    let database = PartDatabase::new(&config.database);
    let mut session = SessionContext::setup(
        chain,
        &database,
        (args.extest, &extest_alias),
        (args.sample, &sample_alias),
    )
    .context("identifying the parts")?;

    // Ctrl-C stops at the next checkpoint, so the chain is reset and the partial summary kept
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        eprintln!("\ninterrupted, stopping at the next checkpoint");
        flag.store(true, Ordering::SeqCst);
    })
    .context("installing the Ctrl-C handler")?;

    let partial = if config.pause {
        let mut gate = Interruptible::new(interrupted, StdinGate);
        session.run_until_stopped(&mut gate, |report| {
            if let Err(err) = print_report(report, args.json, "SUMMARY") {
                tracing::error!(%err, "cannot print report");
            }
        })?
    } else {
        match session.run(&mut Interruptible::new(interrupted, NoPause))? {
            SessionOutcome::Completed(report) => {
                print_report(&report, args.json, "SUMMARY")?;
                return Ok(());
            }
            SessionOutcome::Cancelled(summary) => {
                info!("session stopped");
                summary
            }
        }
    };
    if !partial.is_empty() {
        let report = classify_steps(partial.steps());
        print_report(&report, args.json, "SUMMARY (incomplete session)")?;
    }
    Ok(())
}
