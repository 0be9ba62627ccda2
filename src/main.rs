use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, sleep_until, Duration, Instant};

use ride_range::analysis::{AnalysisGateway, AnalysisLimits, CannedGateway, GeminiGateway};
use ride_range::config::{AnalysisCredentials, EngineConfig};
use ride_range::dashboard;
use ride_range::engine::{EngineEvent, TripEngine};
use ride_range::geo_sampler::{PositionSource, SimulatedSource};
use ride_range::live_status::TripSnapshot;
use ride_range::mileage::MileageHistory;
use ride_range::range::FuelState;
use ride_range::runtime::{Command, SharedSnapshot, TripRuntime};
use ride_range::storage::{ReplaySource, TripLog};
use ride_range::voice::ConsoleVoice;

#[derive(Parser, Debug)]
#[command(name = "ride_range")]
#[command(about = "Motorcycle trip range estimator with voice coaching", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Engine config (JSON); defaults are used when the file is missing
    #[arg(long, default_value = "ride_range.json")]
    config: PathBuf,

    /// Fuel added at the last refill, in liters
    #[arg(long)]
    refill: Option<f64>,

    /// Bike efficiency in km per liter
    #[arg(long, default_value = "40")]
    efficiency: f64,

    /// Simulated riding speed in km/h
    #[arg(long, default_value = "50")]
    sim_speed: f64,

    /// Simulated heading in degrees clockwise from north
    #[arg(long, default_value = "0")]
    sim_bearing: f64,

    /// Replay a recorded trip log (.json or .json.gz) instead of simulating
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Replay time compression
    #[arg(long, default_value = "1.0")]
    replay_speed: f64,

    /// Start with voice alerts off
    #[arg(long)]
    mute: bool,

    /// Serve the status dashboard on this port
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Record a reserve-switch mileage reading when the run ends
    #[arg(long)]
    reserve_at_end: bool,

    /// Output directory
    #[arg(long, default_value = "ride_range_sessions")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("[{}] Ride Range Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!("  Source: {}", match &args.replay {
        Some(path) => format!("replay {}", path.display()),
        None => format!("simulated {:.0} km/h", args.sim_speed),
    });
    println!("  Output Dir: {}", args.output_dir.display());

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    let config = EngineConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    let status_interval = Duration::from_secs(2);

    let source: Box<dyn PositionSource> = match &args.replay {
        Some(path) => {
            let recorded = TripLog::load(path)
                .with_context(|| format!("loading trip log {}", path.display()))?;
            println!("[{}] Replaying {} fixes", ts_now(), recorded.fixes.len());
            Box::new(ReplaySource::from_log(&recorded, args.replay_speed))
        }
        None => Box::new(SimulatedSource::new(
            (12.9716, 77.5946),
            args.sim_bearing,
            args.sim_speed / 3.6,
            Duration::from_secs(1),
        )),
    };

    let limits = AnalysisLimits::from(&config);
    let credentials = AnalysisCredentials::from_env();
    let gateway: Arc<dyn AnalysisGateway> = if credentials.api_key.is_some() {
        Arc::new(GeminiGateway::new(credentials, limits).context("creating analysis client")?)
    } else {
        log::info!("No API key, using offline coaching replies");
        Arc::new(CannedGateway::with_limits(limits))
    };

    let engine = TripEngine::new(config, source, ConsoleVoice::new());
    let shared: SharedSnapshot = Arc::new(RwLock::new(TripSnapshot::new()));
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let (handle, runtime_task) = TripRuntime::new(engine, gateway)
        .with_events(events_tx)
        .with_shared_snapshot(shared.clone())
        .spawn();

    if let Some(port) = args.dashboard_port {
        let dashboard_state = shared.clone();
        tokio::spawn(async move {
            if let Err(e) = dashboard::start_dashboard(dashboard_state, port).await {
                log::error!("Dashboard stopped: {:#}", e);
            }
        });
    }

    let fuel = args.refill.map(|liters| FuelState::new(liters, args.efficiency));
    if let Some(fuel) = fuel {
        handle.send(Command::Refill(fuel)).await?;
    }
    if args.mute {
        handle.send(Command::SetVoice(false)).await?;
    }
    handle.send(Command::Start).await?;

    let mut trip_log = TripLog::new(fuel);
    let mut status_ticker = interval(status_interval);
    let status_path = args.output_dir.join("live_status.json");

    let deadline = async {
        if args.duration > 0 {
            sleep_until(Instant::now() + Duration::from_secs(args.duration)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    println!("[{}] Tracking...", ts_now());

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => {
                match event {
                    EngineEvent::Position(fix) => trip_log.record_fix(fix),
                    EngineEvent::LowFuel(metrics) => println!(
                        "[{}] Low fuel: {:.2} L left, about {:.0} km",
                        ts_now(), metrics.remaining_fuel_liters, metrics.remaining_range_km
                    ),
                    EngineEvent::TrackingFailed(e) => eprintln!("[{}] {}", ts_now(), e.user_message()),
                    EngineEvent::CoachingReady { trigger, outcome } => {
                        println!("[{}] Coaching ({:?}): {}", ts_now(), trigger, outcome.message())
                    }
                    EngineEvent::Notice(message) => println!("[{}] {}", ts_now(), message),
                    EngineEvent::Spoke(_) | EngineEvent::AnalysisRequested { .. } => {}
                }
            }
            _ = status_ticker.tick() => {
                let current = shared.read().await.clone();
                if let Err(e) = current.save(&status_path) {
                    log::warn!("Could not write {}: {}", status_path.display(), e);
                }
            }
            _ = &mut deadline => {
                println!("[{}] Duration reached, stopping...", ts_now());
                break;
            }
            _ = &mut ctrl_c => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
        }
    }

    if args.reserve_at_end {
        match handle.reserve_reached().await {
            Ok(result) => {
                println!(
                    "[{}] Reserve mileage: {:.1} km/l over {:.1} km",
                    ts_now(), result.average_km_per_liter, result.distance_km
                );
                let history_path = args.output_dir.join("mileage_history.json");
                let mut history = MileageHistory::load(&history_path)?;
                history.record(result);
                history.save(&history_path)?;
            }
            Err(e) => eprintln!("[{}] Reserve mileage not recorded: {}", ts_now(), e.user_message()),
        }
    }

    handle.send(Command::Shutdown).await?;
    let engine = runtime_task.await.context("trip runtime panicked")?;

    while let Ok(event) = events_rx.try_recv() {
        if let EngineEvent::Position(fix) = event {
            trip_log.record_fix(fix);
        }
    }
    let summary = engine.snapshot();
    trip_log.finish(engine.window().samples(), summary.clone());

    let log_path = args
        .output_dir
        .join(format!("trip_{}.json.gz", ts_now_clean()));
    trip_log.save(&log_path)?;
    summary.save(&args.output_dir.join("live_status_final.json"))?;

    println!("\n=== Trip Summary ===");
    println!("Distance: {:.2} km", summary.distance_km);
    println!("Fixes recorded: {}", trip_log.fixes.len());
    println!("Speed samples: {}", summary.samples_buffered);
    if let Some(remaining) = summary.remaining_range_km {
        println!("Remaining range: {:.0} km", remaining);
    }
    println!("Trip log: {}", log_path.display());

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
