//! EmoBand Agent - client-side engine for a wearable biosignal band.
//!
//! This library keeps a link to one companion sensor band, rebuilds
//! telemetry records from fragmented notifications, and turns a rolling
//! window of readings into a stable emotional-state label.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Monitor                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  data   ┌─────────────┐   ┌─────────────┐      │
//! │  │  Connection  │────────▶│ Reassembler │──▶│   Decoder   │      │
//! │  │   Manager    │         └─────────────┘   └──────┬──────┘      │
//! │  └──────▲───────┘                                  │ worn        │
//! │         │ fresh sample                             ▼             │
//! │         └─────────────────────────────────  ┌─────────────┐      │
//! │                                             │   Window    │      │
//! │  ┌──────────────┐   ┌─────────────┐         └──────┬──────┘      │
//! │  │  Stabilizer  │◀──│ Classifier  │◀───────────────┘ (full)      │
//! │  └──────┬───────┘   └─────────────┘                              │
//! │         ▼                                                        │
//! │   TelemetryListener subscribers                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use emoband_agent::core::{Pipeline, ScalerTable, StabilizerStrategy, UnavailableClassifier};
//! use emoband_agent::link::{AlwaysAvailable, ConnectionManager, DeviceHandle};
//! use emoband_agent::link::{SimulatedDevice, SimulatedTransport};
//! use emoband_agent::monitor::{self, Monitor, MonitorEvent};
//! use emoband_agent::config::DeviceMatchConfig;
//!
//! let (tx, rx) = monitor::channel();
//! let device = SimulatedDevice::new(DeviceHandle::new("SIM:01", "ESP32_EmotionBand"));
//! let transport = SimulatedTransport::new(vec![device], tx.clone());
//! let manager = ConnectionManager::new(
//!     transport,
//!     AlwaysAvailable,
//!     DeviceMatchConfig::default().matcher(),
//! );
//! let pipeline = Pipeline::new(
//!     UnavailableClassifier,
//!     ScalerTable::default(),
//!     StabilizerStrategy::MajorityVote,
//! );
//!
//! let mut monitor = Monitor::new(manager, pipeline, rx);
//! tx.send(MonitorEvent::Connect).unwrap();
//! monitor.run();
//! ```

pub mod config;
pub mod constants;
pub mod core;
pub mod link;
pub mod monitor;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, DeviceMatchConfig};
pub use core::{
    Classifier, EmotionalState, Inference, InferenceError, Pipeline, PipelineEvent,
    StabilizerStrategy, TelemetrySample,
};
pub use link::{ConnectionManager, ConnectionState, DeviceHandle, LinkError, Transport};
pub use monitor::{Monitor, MonitorEvent, TelemetryListener};
pub use stats::{SessionStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
