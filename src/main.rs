use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use kartbox::{
    display::{format_time, lap_table},
    gps_link::{GpsLink, LinkMode},
    CommandPanel, CsvSessionLog, KartboxError, LogWorker, OrchestratorConfig, Result,
    SessionArchive, SessionOrchestrator, SystemConfig, TerminalDisplay,
};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Session storage directory
    #[arg(short, long, global = true)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the timer against a GPS byte source
    Run {
        /// Serial device, NMEA log file or `-` for stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Replay the input one line at a time with this pause
        #[arg(long)]
        replay_delay_ms: Option<u64>,

        /// Print snapshots as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// List recorded sessions
    Sessions,
    /// Print the lap history of a session
    Laps { name: String },
    /// Delete all recorded sessions
    Purge,
}

fn run(config: &SystemConfig, input: Option<&Path>, replay_delay_ms: Option<u64>) -> Result<()> {
    let storage = config.storage_dir()?;
    let worker = LogWorker::spawn(CsvSessionLog::open(&storage)?)?;
    let display = TerminalDisplay::stdout(config.display.json);
    let mut orchestrator =
        SessionOrchestrator::new(OrchestratorConfig::from(config), worker, display);

    let mode = match replay_delay_ms {
        Some(ms) => LinkMode::Replay {
            delay: Duration::from_millis(ms),
        },
        None => LinkMode::Stream {
            chunk: config.gps.read_chunk,
        },
    };
    let gps_on_stdin = input.is_none_or(|path| path.as_os_str() == "-");
    let mut link = GpsLink::open(input, mode, config.gps.update_rate_hz)?;
    let panel = if gps_on_stdin {
        None
    } else {
        Some(CommandPanel::stdin(config.long_press_ms)?)
    };

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .map_err(|source| KartboxError::Signal { source })?;

    info!("=== Kartbox lap timer ===");
    info!(
        "Storage: {}, gate {} m, min lap {} ms, GPS {} Hz",
        storage.display(),
        config.timing.gate_radius_m,
        config.timing.min_lap_time_ms,
        config.gps.update_rate_hz
    );
    if panel.is_some() {
        info!("Commands: m = mode, l = set line, r = reset, s = save session");
    }

    let start = Instant::now();
    let poll = Duration::from_millis(config.poll_interval_ms.max(1));

    while running.load(Ordering::SeqCst) {
        let bytes = link.poll(poll);
        let events = panel.as_ref().map(CommandPanel::drain).unwrap_or_default();
        let now_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        orchestrator.tick(now_ms, &bytes, &events);

        if link.is_closed() {
            info!("GPS input ended");
            break;
        }
    }

    println!();
    let engine = orchestrator.engine();
    info!(
        "Laps: {}, best: {}",
        engine.lap_count(),
        engine.best_lap_ms().map_or_else(|| "-".to_string(), format_time)
    );
    let laps: Vec<_> = engine.laps().copied().collect();
    for row in lap_table(&laps) {
        println!("{row}");
    }
    orchestrator.shutdown();
    Ok(())
}

fn sessions(config: &SystemConfig) -> Result<()> {
    let archive = SessionArchive::new(config.storage_dir()?);
    let names = archive.list()?;
    if names.is_empty() {
        println!("No recorded sessions");
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn laps(config: &SystemConfig, name: &str) -> Result<()> {
    let archive = SessionArchive::new(config.storage_dir()?);
    let laps = archive.load_laps(name)?;

    println!("{:>4}  {:>10}  {:>8}", "LAP", "TIME", "AVG KM/H");
    for row in lap_table(&laps) {
        println!("{row}");
    }
    Ok(())
}

fn purge(config: &SystemConfig) -> Result<()> {
    let removed = SessionArchive::new(config.storage_dir()?).delete_all()?;
    println!("Deleted {removed} files");
    Ok(())
}

fn main() {
    colog::init();

    let cli = Args::parse();
    let result = SystemConfig::load(cli.config.as_deref()).and_then(|mut config| {
        if let Some(storage) = cli.storage.clone() {
            config.storage_dir = Some(storage);
        }
        match &cli.command {
            Commands::Run {
                input,
                replay_delay_ms,
                json,
            } => {
                config.display.json |= *json;
                run(&config, input.as_deref(), *replay_delay_ms)
            }
            Commands::Sessions => sessions(&config),
            Commands::Laps { name } => laps(&config, name),
            Commands::Purge => purge(&config),
        }
    });

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
