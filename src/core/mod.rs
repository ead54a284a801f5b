//! Telemetry processing core.
//!
//! This module contains:
//! - Frame reassembly of fragmented notifications
//! - Telemetry record decoding
//! - The rolling feature window and standardization
//! - The classifier seam and label stabilization

pub mod classifier;
pub mod framing;
pub mod pipeline;
pub mod stabilizer;
pub mod telemetry;
pub mod window;

// Re-export commonly used types
pub use classifier::{
    Classifier, EmotionalState, Inference, InferenceError, LinearModel, UnavailableClassifier,
};
pub use framing::Reassembler;
pub use pipeline::{Pipeline, PipelineEvent};
pub use stabilizer::{Hysteresis, LabelStabilizer, MajorityVote, StabilizerStrategy};
pub use telemetry::{decode, DecodeError, MotionLevel, TelemetrySample, WearState};
pub use window::{FeatureVector, FeatureWindow, ScalerError, ScalerTable, WindowStatus};
