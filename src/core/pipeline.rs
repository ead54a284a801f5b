//! Telemetry processing pipeline.
//!
//! ```text
//! fragments ─▶ Reassembler ─▶ decode ─▶ wear gate ─▶ FeatureWindow
//!                                                        │ (full)
//!                                  LabelStabilizer ◀─ Classifier ◀─ standardize
//! ```
//!
//! Decode and inference failures are reported as events and never stop the
//! stream. Samples taken while the band is not worn are reported but never
//! reach the window or the stabilizer.

use crate::core::classifier::{Classifier, Inference, InferenceError};
use crate::core::framing::Reassembler;
use crate::core::stabilizer::{LabelStabilizer, StabilizerStrategy};
use crate::core::telemetry::{self, DecodeError, TelemetrySample};
use crate::core::window::{FeatureVector, FeatureWindow, ScalerTable, WindowStatus};
use crate::stats::SharedStats;
use tracing::{debug, warn};

/// Something the pipeline produced while handling input.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A worn sample was admitted to the window.
    Sample {
        sample: TelemetrySample,
        filled: usize,
        capacity: usize,
    },
    /// A sample arrived while the band was not worn.
    NotWorn(TelemetrySample),
    /// A reassembled message could not be decoded.
    DecodeError(DecodeError),
    /// A full window was classified.
    Classified {
        features: FeatureVector,
        inference: Inference,
        instantaneous: Option<u8>,
        stable: Option<u8>,
    },
    /// A full window could not be classified; the stable label is unchanged.
    InferenceError(InferenceError),
}

/// Reassembly, decoding, windowing, classification and stabilization.
pub struct Pipeline<C> {
    reassembler: Reassembler,
    window: FeatureWindow,
    scaler: ScalerTable,
    classifier: C,
    stabilizer: LabelStabilizer,
    stats: Option<SharedStats>,
}

impl<C: Classifier> Pipeline<C> {
    pub fn new(classifier: C, scaler: ScalerTable, strategy: StabilizerStrategy) -> Self {
        Self {
            reassembler: Reassembler::new(),
            window: FeatureWindow::new(),
            scaler,
            classifier,
            stabilizer: LabelStabilizer::new(strategy),
            stats: None,
        }
    }

    /// Count activity into shared session statistics.
    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Replace the window, e.g. with a smaller one for tests.
    pub fn with_window(mut self, window: FeatureWindow) -> Self {
        self.window = window;
        self
    }

    /// Feed one raw transport fragment.
    pub fn ingest(&mut self, fragment: &[u8]) -> Vec<PipelineEvent> {
        if let Some(stats) = &self.stats {
            stats.record_fragment();
        }

        let messages = self.reassembler.ingest_bytes(fragment);
        if let Some(stats) = &self.stats {
            stats.record_messages(messages.len() as u64);
        }

        let mut events = Vec::new();
        for message in &messages {
            events.extend(self.process_message(message));
        }
        events
    }

    /// Decode one complete message and push it through the rest of the chain.
    pub fn process_message(&mut self, message: &str) -> Vec<PipelineEvent> {
        match telemetry::decode(message) {
            Ok(sample) => self.process_sample(sample),
            Err(e) => {
                warn!(raw = %e.raw, reason = %e.reason, "dropping undecodable message");
                if let Some(stats) = &self.stats {
                    stats.record_decode_error();
                }
                vec![PipelineEvent::DecodeError(e)]
            }
        }
    }

    /// Gate, window and, when the window is full, classify a decoded sample.
    pub fn process_sample(&mut self, sample: TelemetrySample) -> Vec<PipelineEvent> {
        if let Some(stats) = &self.stats {
            stats.record_sample();
        }

        if !sample.is_worn() {
            debug!("band not worn, sample held out of the window");
            if let Some(stats) = &self.stats {
                stats.record_not_worn();
            }
            return vec![PipelineEvent::NotWorn(sample)];
        }

        let status = self.window.accept(&sample);
        let mut events = Vec::with_capacity(2);

        match status {
            WindowStatus::Pending { filled, capacity } => {
                debug!(filled, capacity, "window filling");
                events.push(PipelineEvent::Sample {
                    sample,
                    filled,
                    capacity,
                });
            }
            WindowStatus::Ready(features) => {
                let capacity = self.window.capacity();
                events.push(PipelineEvent::Sample {
                    sample,
                    filled: capacity,
                    capacity,
                });
                events.push(self.classify(features));
            }
        }

        events
    }

    fn classify(&mut self, features: FeatureVector) -> PipelineEvent {
        if !features.is_finite() {
            debug!(?features, "skipping window with non-finite features");
            return self.inference_failed(InferenceError::NonFiniteFeatures);
        }

        let standardized = self.scaler.standardize(&features);
        match self.classifier.infer(&standardized) {
            Ok(inference) => {
                let binary = self.stabilizer.strategy() == StabilizerStrategy::Hysteresis;
                if let Err(e) = inference.check(binary) {
                    return self.inference_failed(e);
                }
                let instantaneous = inference.label();
                let stable = self.stabilizer.observe(&inference);
                if let Some(stats) = &self.stats {
                    stats.record_window_classified();
                }
                debug!(?instantaneous, ?stable, "window classified");
                PipelineEvent::Classified {
                    features: standardized,
                    inference,
                    instantaneous,
                    stable,
                }
            }
            Err(e) => self.inference_failed(e),
        }
    }

    fn inference_failed(&mut self, error: InferenceError) -> PipelineEvent {
        warn!(%error, "inference failed, keeping previous label");
        if let Some(stats) = &self.stats {
            stats.record_inference_error();
        }
        PipelineEvent::InferenceError(error)
    }

    /// Start a new measurement context: drop partial messages and window contents.
    ///
    /// The committed label is kept so a display can bridge a quick reconnect.
    pub fn reset_context(&mut self) {
        self.reassembler.clear();
        self.window.clear();
    }

    /// Forget the committed label and prediction history.
    pub fn invalidate_label(&mut self) {
        self.stabilizer.reset();
    }

    pub fn stable_label(&self) -> Option<u8> {
        self.stabilizer.stable()
    }

    pub fn window(&self) -> &FeatureWindow {
        &self.window
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    pub fn strategy(&self) -> StabilizerStrategy {
        self.stabilizer.strategy()
    }
}
