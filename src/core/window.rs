//! Rolling feature window and standardization.
//!
//! Worn samples are calibrated into classifier units and pushed into a
//! fixed-capacity ring buffer. Once the buffer is full, every accepted
//! sample yields a 10-element feature vector in the order the classifier was
//! trained on:
//!
//! ```text
//! [acc_x_mean, acc_y_mean, acc_z_mean, temp_mean, bvp_mean,
//!  acc_x_std,  acc_y_std,  acc_z_std,  temp_std,  bvp_std]
//! ```
//!
//! Standard deviations are population deviations. The BVP mean slot is always
//! exactly 0.0: the shipped model was trained with that feature zeroed, and
//! its weights depend on it. Only change it together with a retrained model.

use crate::constants::{ACC_SCALE, BVP_SCALE, TEMP_OFFSET, WINDOW_CAPACITY};
use crate::core::telemetry::TelemetrySample;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use std::path::Path;

/// Number of features fed to the classifier.
pub const FEATURE_COUNT: usize = 10;

/// Feature names in vector order.
pub const FEATURE_ORDER: [&str; FEATURE_COUNT] = [
    "acc_x_mean",
    "acc_y_mean",
    "acc_z_mean",
    "temp_mean",
    "bvp_mean",
    "acc_x_std",
    "acc_y_std",
    "acc_z_std",
    "temp_std",
    "bvp_std",
];

/// Index of the forced-zero BVP mean feature.
pub const BVP_MEAN_INDEX: usize = 4;

/// An ordered feature vector (raw or standardized).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// True when no feature is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

/// One calibrated reading held in the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibratedSample {
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    pub temp: f64,
    pub bvp: f64,
}

impl CalibratedSample {
    /// Convert band units into training units. A missing BVP reading counts as 0.
    pub fn from_sample(sample: &TelemetrySample) -> Self {
        Self {
            acc_x: sample.acc_x * ACC_SCALE,
            acc_y: sample.acc_y * ACC_SCALE,
            acc_z: sample.acc_z * ACC_SCALE,
            temp: sample.temp + TEMP_OFFSET,
            bvp: sample.bvp.unwrap_or(0.0) * BVP_SCALE,
        }
    }
}

/// Result of admitting one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowStatus {
    /// Fewer than `capacity` samples buffered so far.
    Pending { filled: usize, capacity: usize },
    /// The window is full; features are unstandardized.
    Ready(FeatureVector),
}

/// Fixed-capacity ring buffer of calibrated samples.
#[derive(Debug, Clone)]
pub struct FeatureWindow {
    samples: VecDeque<CalibratedSample>,
    capacity: usize,
}

impl FeatureWindow {
    /// Create a window holding `WINDOW_CAPACITY` samples.
    pub fn new() -> Self {
        Self::with_capacity(WINDOW_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Calibrate and push a sample, evicting the oldest beyond capacity.
    pub fn accept(&mut self, sample: &TelemetrySample) -> WindowStatus {
        self.push(CalibratedSample::from_sample(sample))
    }

    /// Push an already calibrated sample.
    pub fn push(&mut self, sample: CalibratedSample) -> WindowStatus {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);

        if self.samples.len() < self.capacity {
            WindowStatus::Pending {
                filled: self.samples.len(),
                capacity: self.capacity,
            }
        } else {
            WindowStatus::Ready(self.features())
        }
    }

    /// Compute the raw feature vector over the current contents.
    pub fn features(&self) -> FeatureVector {
        let channel = |f: fn(&CalibratedSample) -> f64| -> Vec<f64> {
            self.samples.iter().map(f).collect()
        };

        let acc_x = channel(|s| s.acc_x);
        let acc_y = channel(|s| s.acc_y);
        let acc_z = channel(|s| s.acc_z);
        let temp = channel(|s| s.temp);
        let bvp = channel(|s| s.bvp);

        FeatureVector([
            (&acc_x).mean(),
            (&acc_y).mean(),
            (&acc_z).mean(),
            (&temp).mean(),
            0.0,
            (&acc_x).population_std_dev(),
            (&acc_y).population_std_dev(),
            (&acc_z).population_std_dev(),
            (&temp).population_std_dev(),
            (&bvp).population_std_dev(),
        ])
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget all samples (new measurement context).
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for FeatureWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-feature standardization constants from the model's training run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalerTable {
    means: [f64; FEATURE_COUNT],
    stds: [f64; FEATURE_COUNT],
}

/// Scaler shipped with the bundled three-class model.
pub const DEFAULT_MEANS: [f64; FEATURE_COUNT] = [
    28.41, 4.87, 21.93, 34.62, 0.0, 6.28, 5.91, 7.44, 0.071, 38.6,
];

pub const DEFAULT_STDS: [f64; FEATURE_COUNT] = [
    19.84, 27.06, 25.13, 1.72, 1.0, 7.65, 6.12, 7.93, 0.058, 29.4,
];

impl ScalerTable {
    /// Build a table. Zero deviations are replaced by 1.0.
    pub fn new(means: [f64; FEATURE_COUNT], stds: [f64; FEATURE_COUNT]) -> Self {
        let mut stds = stds;
        for s in stds.iter_mut() {
            if *s == 0.0 {
                *s = 1.0;
            }
        }
        Self { means, stds }
    }

    /// The table that leaves features unchanged.
    pub fn identity() -> Self {
        Self::new([0.0; FEATURE_COUNT], [1.0; FEATURE_COUNT])
    }

    /// Parse a scaler artifact (`{"means": [...], "stds": [...]}`).
    pub fn from_json(json: &str) -> Result<Self, ScalerError> {
        let artifact: ScalerArtifact =
            serde_json::from_str(json).map_err(|e| ScalerError::Parse(e.to_string()))?;

        let means = to_array("means", &artifact.means)?;
        let stds = to_array("stds", &artifact.stds)?;

        if let Some(order) = artifact.feature_order {
            if order.iter().map(String::as_str).ne(FEATURE_ORDER.iter().copied()) {
                return Err(ScalerError::FeatureOrder(order));
            }
        }

        Ok(Self::new(means, stds))
    }

    /// Load a scaler artifact from disk.
    pub fn load(path: &Path) -> Result<Self, ScalerError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ScalerError::Io(e.to_string()))?;
        Self::from_json(&content)
    }

    /// `(feature[i] - means[i]) / stds[i]` for every feature.
    pub fn standardize(&self, features: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = (features.0[i] - self.means[i]) / self.stds[i];
        }
        FeatureVector(out)
    }

    pub fn means(&self) -> &[f64; FEATURE_COUNT] {
        &self.means
    }

    pub fn stds(&self) -> &[f64; FEATURE_COUNT] {
        &self.stds
    }
}

impl Default for ScalerTable {
    fn default() -> Self {
        Self::new(DEFAULT_MEANS, DEFAULT_STDS)
    }
}

#[derive(Debug, Deserialize)]
struct ScalerArtifact {
    means: Vec<f64>,
    stds: Vec<f64>,
    #[serde(default)]
    feature_order: Option<Vec<String>>,
}

fn to_array(field: &'static str, values: &[f64]) -> Result<[f64; FEATURE_COUNT], ScalerError> {
    values
        .try_into()
        .map_err(|_| ScalerError::WrongLength {
            field,
            len: values.len(),
        })
}

/// Errors loading a scaler artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalerError {
    WrongLength { field: &'static str, len: usize },
    FeatureOrder(Vec<String>),
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ScalerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalerError::WrongLength { field, len } => {
                write!(f, "Scaler field '{field}' has {len} entries, expected {FEATURE_COUNT}")
            }
            ScalerError::FeatureOrder(order) => {
                write!(f, "Scaler feature order does not match: {order:?}")
            }
            ScalerError::Io(e) => write!(f, "IO error: {e}"),
            ScalerError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for ScalerError {}
