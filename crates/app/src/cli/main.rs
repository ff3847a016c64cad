//! Sixband CLI Application

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sixband_core::domain::{
    AtomicParameterStore, AudioEnumerator, ChainCoefficients, ConfigManager, ConfigWatcher,
    DeviceId, ParamId, ParameterStore, ParametricEq, ProcessSpec, SixbandConfig,
};
use sixband_infra::analyzer;
use sixband_infra::audio::{CpalEnumerator, EqStream, SignalGenerator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sixband")]
#[command(about = "A six-stage stereo parametric equalizer", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every parameter with its range, default and current value
    Params {
        /// Override a parameter, e.g. --set MIDPEAKGAIN=6
        #[arg(long = "set", value_name = "ID=VALUE", value_parser = parse_assignment)]
        set: Vec<(ParamId, f32)>,
    },

    /// Print the analytic frequency response
    Response {
        /// Number of log-spaced points between 20 Hz and 20 kHz
        #[arg(long, default_value_t = 31)]
        points: usize,

        #[arg(long, default_value_t = 48000)]
        sample_rate: u32,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,

        #[arg(long = "set", value_name = "ID=VALUE", value_parser = parse_assignment)]
        set: Vec<(ParamId, f32)>,
    },

    /// Measure the response by running an impulse through the equalizer
    Measure {
        #[arg(long, default_value_t = 8192)]
        fft_size: usize,

        #[arg(long, default_value_t = 31)]
        points: usize,

        #[arg(long, default_value_t = 48000)]
        sample_rate: u32,

        #[arg(long)]
        json: bool,

        #[arg(long = "set", value_name = "ID=VALUE", value_parser = parse_assignment)]
        set: Vec<(ParamId, f32)>,
    },

    /// List output devices
    Devices,

    /// Play a test signal through the equalizer
    Play {
        /// Configuration file (defaults to the user config)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<f64>,

        /// Start with the equalizer bypassed
        #[arg(long)]
        bypass: bool,

        #[arg(long = "set", value_name = "ID=VALUE", value_parser = parse_assignment)]
        set: Vec<(ParamId, f32)>,
    },
}

/// Parse `ID=VALUE` into a parameter assignment
fn parse_assignment(s: &str) -> Result<(ParamId, f32), String> {
    let (id, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ID=VALUE, got '{s}'"))?;
    let id: ParamId = id.parse().map_err(|e| format!("{e}"))?;
    let value: f32 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for {id}: {e}"))?;
    Ok((id, value))
}

/// `count` log-spaced frequencies from 20 Hz to 20 kHz
fn log_frequencies(count: usize) -> Vec<f64> {
    let count = count.max(2);
    let (low, high) = (20.0_f64.ln(), 20000.0_f64.ln());
    (0..count)
        .map(|i| (low + (high - low) * i as f64 / (count - 1) as f64).exp())
        .collect()
}

fn store_with(set: &[(ParamId, f32)]) -> anyhow::Result<Arc<AtomicParameterStore>> {
    let store = Arc::new(AtomicParameterStore::new());
    store.apply(set.iter().copied())?;
    Ok(store)
}

#[derive(Serialize)]
struct ResponseRow {
    frequency: f64,
    magnitude_db: f64,
}

#[derive(Serialize)]
struct MeasureRow {
    frequency: f64,
    measured_db: f64,
    analytic_db: f64,
}

fn list_params(set: &[(ParamId, f32)]) -> anyhow::Result<()> {
    let store = store_with(set)?;

    println!(
        "{:<16} {:<18} {:>9} {:>9} {:>6} {:>9} {:>9}",
        "ID", "NAME", "MIN", "MAX", "STEP", "DEFAULT", "VALUE"
    );
    for id in ParamId::ALL {
        let range = id.range();
        println!(
            "{:<16} {:<18} {:>9} {:>9} {:>6} {:>9} {:>9} {}",
            id.id(),
            id.name(),
            range.min,
            range.max,
            range.step,
            range.default,
            store.value(id),
            id.unit()
        );
        if id.is_choice() {
            println!("{:<16} choices: {}", "", id.choices().join(", "));
        }
    }
    Ok(())
}

fn print_response(
    points: usize,
    sample_rate: u32,
    json: bool,
    set: &[(ParamId, f32)],
) -> anyhow::Result<()> {
    let store = store_with(set)?;
    let settings = store.snapshot();
    let sample_rate = f64::from(sample_rate);
    let coeffs = ChainCoefficients::design(&settings, sample_rate);
    if !coeffs.is_finite() {
        anyhow::bail!("designed coefficients are not finite");
    }

    let rows: Vec<ResponseRow> = log_frequencies(points)
        .into_iter()
        .map(|frequency| ResponseRow {
            frequency,
            magnitude_db: coeffs.magnitude_db(frequency, sample_rate),
        })
        .collect();

    if json {
        let out = serde_json::json!({
            "sample_rate": sample_rate,
            "settings": settings,
            "response": rows,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{:>10}  {:>9}", "FREQ (Hz)", "GAIN (dB)");
        for row in rows {
            println!("{:>10.1}  {:>9.2}", row.frequency, row.magnitude_db);
        }
    }
    Ok(())
}

fn measure_response(
    fft_size: usize,
    points: usize,
    sample_rate: u32,
    json: bool,
    set: &[(ParamId, f32)],
) -> anyhow::Result<()> {
    let store = store_with(set)?;
    let mut eq = ParametricEq::new(store);
    eq.prepare(ProcessSpec::stereo(f64::from(sample_rate), 512))?;

    let measured = analyzer::measure(&mut eq, fft_size)?;
    let mut rows = Vec::with_capacity(points);
    for frequency in log_frequencies(points) {
        if let Some(point) = measured.nearest(frequency) {
            rows.push(MeasureRow {
                frequency: point.frequency,
                measured_db: point.magnitude_db,
                analytic_db: eq.magnitude_db(point.frequency)?,
            });
        }
    }
    rows.dedup_by(|a, b| a.frequency == b.frequency);

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!(
            "{:>10}  {:>12}  {:>12}",
            "FREQ (Hz)", "MEASURED dB", "ANALYTIC dB"
        );
        for row in rows {
            println!(
                "{:>10.1}  {:>12.2}  {:>12.2}",
                row.frequency, row.measured_db, row.analytic_db
            );
        }
    }
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    let enumerator = CpalEnumerator::new();
    let default_id = enumerator.default_output_device().ok().map(|d| d.id);

    for device in enumerator.output_devices()? {
        let marker = if Some(&device.id) == default_id.as_ref() {
            "*"
        } else {
            " "
        };
        let rates: Vec<String> = device
            .sample_rates
            .iter()
            .map(|r| r.hz().to_string())
            .collect();
        println!("{} {}  [{} Hz]", marker, device.name, rates.join(", "));
    }
    Ok(())
}

async fn load_play_config(path: Option<PathBuf>) -> anyhow::Result<(SixbandConfig, PathBuf)> {
    match path {
        Some(path) => {
            let config = SixbandConfig::load_from_file(&path)
                .await
                .with_context(|| format!("failed to load {}", path.display()))?;
            Ok((config, path))
        }
        None => {
            let manager = ConfigManager::new(ConfigManager::default_config_dir()?);
            let config = manager.load().await;
            Ok((config, manager.config_path().to_path_buf()))
        }
    }
}

/// Write the config's parameter table, then `overrides`, as one transaction
///
/// Command-line overrides win over the file, including on every reload.
fn apply_with_overrides(
    config: &SixbandConfig,
    store: &AtomicParameterStore,
    overrides: &[(ParamId, f32)],
) -> anyhow::Result<usize> {
    let mut changes = config.parameter_changes()?;
    changes.extend_from_slice(overrides);
    Ok(store.apply(changes)?)
}

async fn reload_parameters(
    path: &Path,
    store: &AtomicParameterStore,
    overrides: &[(ParamId, f32)],
) {
    match SixbandConfig::load_from_file(path).await {
        Ok(config) => match apply_with_overrides(&config, store, overrides) {
            Ok(count) => info!(count, "Reloaded parameters"),
            Err(e) => warn!(error = %e, "Ignoring parameter table"),
        },
        Err(e) => warn!(error = %e, "Failed to reload configuration"),
    }
}

async fn play(
    config_path: Option<PathBuf>,
    seconds: Option<f64>,
    bypass: bool,
    set: &[(ParamId, f32)],
) -> anyhow::Result<()> {
    let (config, config_path) = load_play_config(config_path).await?;

    let store = Arc::new(AtomicParameterStore::new());
    apply_with_overrides(&config, &store, set)?;

    let stream_config = config.stream_config();
    let generator = SignalGenerator::new(
        config.output.signal,
        config.output.frequency_hz,
        config.output.level_db,
        f64::from(stream_config.sample_rate.hz()),
    );

    let device_id = (!config.output.device.is_empty())
        .then(|| DeviceId::new(config.output.device.clone()));

    let enumerator = CpalEnumerator::new();
    let stream = EqStream::open(
        &enumerator,
        device_id.as_ref(),
        Some(&stream_config),
        store.clone(),
        generator,
    )?;
    stream.set_bypass(bypass);

    let watch_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let watcher = ConfigWatcher::new(watch_dir).await?;
    let mut changes = watcher.subscribe();

    info!(path = %config_path.display(), "Playing; edit the config file to change parameters");

    let deadline = async {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs_f64(s.max(0.0))).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut health = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = &mut deadline => break,
            _ = health.tick() => {
                for error in stream.take_errors() {
                    warn!(%error, "Stream reported an error");
                }
            }
            changed = changes.recv() => match changed {
                Ok(path) if path.file_name() == config_path.file_name() => {
                    debug!(path = %path.display(), "Config file changed");
                    reload_parameters(&config_path, &store, set).await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Config events lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Params { set } => list_params(&set),
        Commands::Response {
            points,
            sample_rate,
            json,
            set,
        } => print_response(points, sample_rate, json, &set),
        Commands::Measure {
            fft_size,
            points,
            sample_rate,
            json,
            set,
        } => measure_response(fft_size, points, sample_rate, json, &set),
        Commands::Devices => list_devices(),
        Commands::Play {
            config,
            seconds,
            bypass,
            set,
        } => play(config, seconds, bypass, &set).await,
    }
}
