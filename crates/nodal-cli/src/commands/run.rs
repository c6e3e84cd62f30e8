//! Run a request script against a live engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use clap::Args;
use nodal_config::EngineConfig;
use nodal_engine::{Client, Command, Engine, Processor};

use crate::output::JsonClient;
use crate::script;

/// Client id the script's requests are issued under.
const SCRIPT_CLIENT: u64 = 1;

#[derive(Args)]
pub struct RunArgs {
    /// Request script (TOML)
    script: PathBuf,

    /// Give up if responses have not all arrived after this many seconds
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Exit with an error if any request failed
    #[arg(long)]
    strict: bool,
}

pub fn run(args: RunArgs, config: EngineConfig) -> anyhow::Result<()> {
    let requests = script::load(&args.script)?;
    let expected = requests.len();
    tracing::info!(
        "run: {} requests from {}",
        expected,
        args.script.display()
    );

    let (engine, processor) = Engine::builder(config.clone())
        .build()
        .context("failed to start engine")?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let rt_running = Arc::new(AtomicBool::new(true));
    let driver = {
        let rt_running = Arc::clone(&rt_running);
        let config = config.clone();
        thread::Builder::new()
            .name("nodal-rt".to_string())
            .spawn(move || drive(processor, &config, &rt_running))
            .context("failed to spawn real-time driver")?
    };

    let client = Arc::new(JsonClient::stdout(SCRIPT_CLIENT));
    let origin: Arc<dyn Client> = client.clone();
    for request in requests {
        let timestamp = config.frames_for(request.at);
        engine.submit(Command::from_client(
            &origin,
            request.id,
            timestamp,
            request.payload,
        ))?;
    }

    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    let interval = config.housekeeping_interval();
    while client.responses() < expected && running.load(Ordering::SeqCst) {
        if Instant::now() >= deadline {
            tracing::warn!(
                "run: timed out with {} of {} responses",
                client.responses(),
                expected
            );
            break;
        }
        engine.housekeeping();
        thread::sleep(interval.min(Duration::from_millis(10)));
    }

    rt_running.store(false, Ordering::Release);
    if driver.join().is_err() {
        tracing::warn!("run: real-time driver panicked");
    }
    let report = engine.housekeeping();
    engine.shutdown();

    let failures = client.failures();
    eprintln!(
        "{} responses ({} failed), {} commands executed, {} deferrals",
        client.responses(),
        failures,
        report.stats.executed,
        report.stats.deferred
    );

    if client.responses() < expected {
        anyhow::bail!("{} requests never completed", expected - client.responses());
    }
    if args.strict && failures > 0 {
        anyhow::bail!("{failures} requests failed");
    }
    Ok(())
}

/// Stands in for an audio callback: runs one cycle per block period
/// against a monotonic schedule.
fn drive(mut processor: Processor, config: &EngineConfig, running: &AtomicBool) {
    let period = config.cycle_duration();
    let mut next = Instant::now();
    while running.load(Ordering::Acquire) {
        processor.run_cycle(config.block_size);
        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }
}
