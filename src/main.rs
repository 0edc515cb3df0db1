use clap::{Parser, Subcommand};
use motion_logger::codec;
use motion_logger::export::{self, FileSink, StdoutSink, TextSink};
use motion_logger::sensor::SimulatedSource;
use motion_logger::stats::FeatureSummary;
use motion_logger::{Config, FeatureStore, Reading, Recorder, SqliteStore, TransportMode};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "motion-logger")]
#[command(about = "Motion sensor feature logger for transport-mode datasets", long_about = None)]
struct Args {
    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a session from simulated sensors
    Record {
        /// Duration in seconds (0 = until Ctrl-C)
        #[arg(long, default_value = "0")]
        seconds: u64,

        /// Transport mode label for the session
        #[arg(long, default_value = "standing")]
        mode: String,
    },
    /// Show the newest stored rows
    Recent {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Export all rows as CSV
    Export {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Summary statistics of the stored dataset
    Stats,
    /// Delete all stored rows
    Clear,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Command::Config = args.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let db_path = config.database_file();
    log::debug!("Using database {}", db_path.display());
    let store = Arc::new(SqliteStore::open(&db_path)?);

    match args.command {
        Command::Record { seconds, mode } => {
            let mode: TransportMode = mode.parse()?;
            record(config, store, seconds, mode).await?;
        }
        Command::Recent { limit } => {
            for reading in store.select_recent(limit)? {
                println!("{}", describe(&reading));
            }
        }
        Command::Export { output } => {
            let mut sink: Box<dyn TextSink> = match &output {
                Some(path) => Box::new(FileSink::new(path)),
                None => Box::new(StdoutSink),
            };
            let rows = export::export_to(store.as_ref(), sink.as_mut())?;
            if rows == 0 {
                eprintln!("No data to export");
            } else if let Some(path) = output {
                eprintln!("Exported {} row(s) to {}", rows, path.display());
            }
        }
        Command::Stats => {
            let readings = store
                .select_all_for_export()?
                .iter()
                .map(codec::from_row)
                .collect::<Result<Vec<_>, _>>()?;
            print!("{}", FeatureSummary::from_readings(&readings));
        }
        Command::Clear => {
            store.clear()?;
            println!("Dataset cleared");
        }
        Command::Config => {}
    }

    Ok(())
}

async fn record(
    config: Config,
    store: Arc<SqliteStore>,
    seconds: u64,
    mode: TransportMode,
) -> Result<(), Box<dyn Error>> {
    let mut recorder = Recorder::new(config, store, SimulatedSource::phone());
    recorder.set_transport_mode(mode);
    recorder.start()?;

    if seconds == 0 {
        log::info!("Recording until Ctrl-C");
        tokio::signal::ctrl_c().await?;
    } else {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
            result = tokio::signal::ctrl_c() => result?,
        }
    }

    // Joins worker threads, keep it off the async workers
    let (recorder, result) = tokio::task::spawn_blocking(move || {
        let result = recorder.stop();
        (recorder, result)
    })
    .await?;
    result?;

    let stats = recorder.stats();
    println!(
        "Recorded {} row(s) over {} tick(s), {} failed",
        stats.rows_persisted, stats.ticks, stats.persist_failures
    );
    Ok(())
}

fn describe(reading: &Reading) -> String {
    let location = match reading.location {
        Some(c) => format!("{:.6},{:.6}", c.latitude, c.longitude),
        None => "-".to_string(),
    };
    let time = chrono::DateTime::from_timestamp_millis(reading.timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| reading.timestamp.to_string());

    format!(
        "{}  {:<8} |a| {:>7.4}  |g| {:>7.4}  {:>7.2} km/h  {}",
        time,
        reading.transport_mode.as_str(),
        reading.magnitude,
        reading.gyro_magnitude,
        reading.speed_kmph(),
        location
    )
}
