//! EmoBand Agent CLI
//!
//! Runs the monitor against a simulated band or replays captured telemetry.

use chrono::Local;
use clap::{Parser, Subcommand};
use crossbeam_channel::Sender;
use emoband_agent::{
    config::Config,
    constants::{
        CCCD_UUID, CHARACTERISTIC_UUID, CONNECTION_TIMEOUT_MS, DATA_STALE_MS, MAX_ATTEMPTS,
        PREDICTION_HISTORY, RETRY_BACKOFF_MS, SERVICE_UUID, WINDOW_CAPACITY,
    },
    core::{
        Classifier, EmotionalState, InferenceError, LinearModel, Pipeline, PipelineEvent,
        ScalerTable, StabilizerStrategy, TelemetrySample, UnavailableClassifier,
    },
    link::{
        simulated::fragment, AlwaysAvailable, ConnectionManager, ConnectionState, DeviceHandle,
        LinkError, SimulatedDevice, SimulatedTransport,
    },
    monitor::{self, Monitor, MonitorEvent, TelemetryListener},
    stats::create_shared_stats,
    VERSION,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emoband")]
#[command(version = VERSION)]
#[command(about = "Emotional-state monitor for the EmoBand wearable", long_about = None)]
struct Cli {
    /// Linear model artifact (overrides the configuration file)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Scaler artifact (overrides the configuration file)
    #[arg(long, global = true)]
    scaler: Option<PathBuf>,

    /// Label stabilization strategy (majority or hysteresis)
    #[arg(long, global = true)]
    stabilizer: Option<StabilizerStrategy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor against a simulated band
    Simulate {
        /// Advertised name of the simulated band
        #[arg(long, default_value = "ESP32_EmotionBand")]
        name: String,

        /// Milliseconds between telemetry records
        #[arg(long, default_value = "2000")]
        interval_ms: u64,

        /// Notification payload size in bytes
        #[arg(long, default_value = "20")]
        fragment_size: usize,

        /// Every n-th record reports the band as not worn
        #[arg(long)]
        not_worn_every: Option<u64>,

        /// Drop the link after this many records
        #[arg(long)]
        drop_after: Option<u64>,

        /// How many times the link may be dropped
        #[arg(long, default_value = "1")]
        max_drops: u32,

        /// Stop sending after this many records without disconnecting
        #[arg(long)]
        silent_after: Option<u64>,

        /// Hide the telemetry service (protocol mismatch)
        #[arg(long)]
        no_telemetry_service: bool,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Feed a captured telemetry stream through the pipeline
    Replay {
        /// File containing concatenated telemetry records
        file: PathBuf,

        /// Fragment size used to split the capture
        #[arg(long, default_value = "20")]
        fragment_size: usize,
    },

    /// Show configuration
    Config,

    /// Change which paired devices count as the band and save it
    SetDevice {
        /// Exact device name preferred over fragment matches
        #[arg(long)]
        name: Option<String>,

        /// Comma-separated name fragments (e.g. "ESP32,EmotionBand")
        #[arg(long)]
        fragments: Option<String>,
    },

    /// Show protocol constants and model availability
    Status,
}

fn main() {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });
    if cli.model.is_some() {
        config.model_path = cli.model;
    }
    if cli.scaler.is_some() {
        config.scaler_path = cli.scaler;
    }
    if let Some(strategy) = cli.stabilizer {
        config.stabilizer = strategy;
    }

    init_tracing(&config.log_filter);

    match cli.command {
        Commands::Simulate {
            name,
            interval_ms,
            fragment_size,
            not_worn_every,
            drop_after,
            max_drops,
            silent_after,
            no_telemetry_service,
            duration,
        } => {
            let mut device = SimulatedDevice::new(DeviceHandle::new("SIM:00:00:00:00:01", name));
            device.sample_interval = Duration::from_millis(interval_ms);
            device.fragment_size = fragment_size;
            device.not_worn_every = not_worn_every;
            device.drop_after = drop_after;
            device.max_drops = max_drops;
            device.silent_after = silent_after;
            device.exposes_telemetry = !no_telemetry_service;
            cmd_simulate(&config, device, duration.map(Duration::from_secs));
        }
        Commands::Replay {
            file,
            fragment_size,
        } => {
            cmd_replay(&config, &file, fragment_size);
        }
        Commands::Config => {
            cmd_config(&config);
        }
        Commands::SetDevice { name, fragments } => {
            cmd_set_device(name, fragments.as_deref());
        }
        Commands::Status => {
            cmd_status(&config);
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_classifier(config: &Config) -> Box<dyn Classifier + Send> {
    match &config.model_path {
        Some(path) => match LinearModel::load(path) {
            Ok(model) => Box::new(model),
            Err(e) => {
                eprintln!("Warning: Could not load model {path:?}: {e}");
                Box::new(UnavailableClassifier)
            }
        },
        None => Box::new(UnavailableClassifier),
    }
}

fn load_scaler(config: &Config) -> ScalerTable {
    match &config.scaler_path {
        Some(path) => ScalerTable::load(path).unwrap_or_else(|e| {
            eprintln!("Warning: Could not load scaler {path:?}, using bundled values: {e}");
            ScalerTable::default()
        }),
        None => ScalerTable::default(),
    }
}

/// Prints monitor output to the terminal.
struct ConsoleListener {
    /// Used to stop the monitor once the link has failed for good
    control: Sender<MonitorEvent>,
}

fn stamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

impl TelemetryListener for ConsoleListener {
    fn on_link_state(&mut self, from: ConnectionState, to: ConnectionState) {
        println!("[{}] Link: {from} -> {to}", stamp());
    }

    fn on_connected(&mut self, device: &DeviceHandle) {
        println!("[{}] Connected to {device}", stamp());
    }

    fn on_disconnected(&mut self, error: &LinkError, attempts: u32) {
        println!(
            "[{}] Disconnected ({error}), attempt {attempts}/{MAX_ATTEMPTS}",
            stamp()
        );
    }

    fn on_link_failed(&mut self, error: &LinkError) {
        eprintln!("[{}] Could not connect: {error}", stamp());
        let _ = self.control.send(MonitorEvent::Shutdown);
    }

    fn on_sample(&mut self, sample: &TelemetrySample) {
        println!(
            "[{}] bpm {:.0} | hrv {:.1} | temp {:.2} | {:?}",
            stamp(),
            sample.bpm,
            sample.hrv,
            sample.temp,
            sample.motion()
        );
    }

    fn on_not_worn(&mut self, _sample: &TelemetrySample) {
        println!("[{}] Band not worn", stamp());
    }

    fn on_state_change(&mut self, old: Option<EmotionalState>, new: EmotionalState) {
        match old {
            Some(old) => println!("[{}] State: {old} -> {new}", stamp()),
            None => println!("[{}] State: {new}", stamp()),
        }
    }

    fn on_decode_error(&mut self, raw: &str) {
        eprintln!("[{}] Undecodable record: {raw}", stamp());
    }

    fn on_inference_error(&mut self, error: &InferenceError) {
        eprintln!("[{}] {error}", stamp());
    }
}

fn cmd_simulate(config: &Config, device: SimulatedDevice, duration: Option<Duration>) {
    println!("EmoBand Agent v{VERSION}");
    println!();
    println!("Simulated band: {}", device.handle);
    println!("  Record interval: {}ms", device.sample_interval.as_millis());
    println!("  Fragment size: {} bytes", device.fragment_size);
    println!("  Stabilizer: {:?}", config.stabilizer);
    if config.model_path.is_none() {
        println!("  No model configured; full windows will report inference errors");
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let (tx, rx) = monitor::channel();
    let transport = SimulatedTransport::new(vec![device], tx.clone());
    let manager = ConnectionManager::new(transport, AlwaysAvailable, config.device.matcher());
    let pipeline = Pipeline::new(load_classifier(config), load_scaler(config), config.stabilizer);

    let stats = create_shared_stats();
    let mut monitor = Monitor::with_stats(manager, pipeline, rx, stats.clone());
    monitor.subscribe(Box::new(ConsoleListener {
        control: tx.clone(),
    }));

    ctrlc_handler(tx.clone());

    if let Some(duration) = duration {
        let stop = tx.clone();
        std::thread::spawn(move || {
            std::thread::sleep(duration);
            let _ = stop.send(MonitorEvent::Shutdown);
        });
    }

    if tx.send(MonitorEvent::Connect).is_err() {
        eprintln!("Error: monitor channel closed");
        std::process::exit(1);
    }
    monitor.run();

    println!();
    println!("{}", stats.summary());
}

fn cmd_replay(config: &Config, file: &Path, fragment_size: usize) {
    let capture = match std::fs::read(file) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {file:?}: {e}");
            std::process::exit(1);
        }
    };

    let stats = create_shared_stats();
    let mut pipeline = Pipeline::new(load_classifier(config), load_scaler(config), config.stabilizer)
        .with_stats(stats.clone());

    println!(
        "Replaying {} bytes from {:?} in {}-byte fragments",
        capture.len(),
        file,
        fragment_size
    );
    println!();

    let mut index = 0usize;
    for payload in fragment(&capture, fragment_size) {
        for event in pipeline.ingest(payload) {
            match event {
                PipelineEvent::Sample {
                    sample,
                    filled,
                    capacity,
                } => {
                    index += 1;
                    println!(
                        "#{index:<4} bpm {:.0} | temp {:.2} | window {filled}/{capacity}",
                        sample.bpm, sample.temp
                    );
                }
                PipelineEvent::NotWorn(_) => {
                    index += 1;
                    println!("#{index:<4} not worn");
                }
                PipelineEvent::DecodeError(e) => eprintln!("      {e}"),
                PipelineEvent::Classified {
                    instantaneous,
                    stable,
                    ..
                } => {
                    let name = stable
                        .and_then(EmotionalState::from_label)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("      label {instantaneous:?} -> stable {name}");
                }
                PipelineEvent::InferenceError(e) => eprintln!("      {e}"),
            }
        }
    }

    let remainder = pipeline.reassembler().remainder();
    if !remainder.is_empty() {
        println!();
        println!("Unterminated trailing data: {remainder}");
    }

    println!();
    println!("{}", stats.summary());
}

fn cmd_config(config: &Config) {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_set_device(name: Option<String>, fragments: Option<&str>) {
    let mut config = Config::load().unwrap_or_default();
    if let Some(name) = name {
        config.device.canonical_name = name;
    }
    if let Some(fragments) = fragments {
        config.device = config.device.with_fragments_csv(fragments);
    }
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!(
        "Device match saved: \"{}\" or any of {:?}",
        config.device.canonical_name, config.device.name_fragments
    );
}

fn cmd_status(config: &Config) {
    println!("EmoBand Agent Status");
    println!("====================");
    println!();
    println!("Protocol:");
    println!("  Service:        {SERVICE_UUID}");
    println!("  Characteristic: {CHARACTERISTIC_UUID}");
    println!("  Descriptor:     {CCCD_UUID}");
    println!();
    println!("Link policy:");
    println!("  Max attempts: {MAX_ATTEMPTS}");
    println!("  Retry backoff: {RETRY_BACKOFF_MS}ms");
    println!("  Connection timeout: {CONNECTION_TIMEOUT_MS}ms");
    println!("  Stale link after: {DATA_STALE_MS}ms");
    println!();
    println!("Classification:");
    println!("  Window: {WINDOW_CAPACITY} samples");
    println!("  Stabilizer: {:?} (history {PREDICTION_HISTORY})", config.stabilizer);
    println!(
        "  Device match: \"{}\" or any of {:?}",
        config.device.canonical_name, config.device.name_fragments
    );

    let model = match &config.model_path {
        Some(path) => match LinearModel::load(path) {
            Ok(_) => format!("{path:?} ✓"),
            Err(e) => format!("{path:?} ✗ ({e})"),
        },
        None => "not configured".to_string(),
    };
    println!("  Model: {model}");

    let scaler = match &config.scaler_path {
        Some(path) => match ScalerTable::load(path) {
            Ok(_) => format!("{path:?} ✓"),
            Err(e) => format!("{path:?} ✗ ({e})"),
        },
        None => "bundled".to_string(),
    };
    println!("  Scaler: {scaler}");
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(control: Sender<MonitorEvent>) {
    ctrlc::set_handler(move || {
        let _ = control.send(MonitorEvent::Shutdown);
    })
    .expect("Error setting Ctrl+C handler");
}
