//! Label stabilization.
//!
//! Instantaneous predictions flicker from window to window. The stabilizer
//! turns them into one committed label. Two strategies exist:
//!
//! - **Majority vote** (default, three-class model): the most frequent label
//!   among the last five predictions, ties to the smallest label.
//! - **Hysteresis** (binary models): an exponential moving average of the
//!   positive-class probability that flips to positive above
//!   `STRESS_THRESHOLD` and back to negative below `NORMAL_THRESHOLD`,
//!   holding in between.
//!
//! Inference errors are never recorded; the committed label simply stays.

use crate::constants::{
    HYSTERESIS_ALPHA, NORMAL_THRESHOLD, PREDICTION_HISTORY, STRESS_THRESHOLD,
};
use crate::core::classifier::{Inference, CLASS_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Selectable stabilization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilizerStrategy {
    #[default]
    MajorityVote,
    Hysteresis,
}

impl std::str::FromStr for StabilizerStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "majority" | "majority_vote" | "vote" => Ok(StabilizerStrategy::MajorityVote),
            "hysteresis" => Ok(StabilizerStrategy::Hysteresis),
            other => Err(format!("unknown stabilizer strategy '{other}'")),
        }
    }
}

/// Majority vote over a bounded prediction history.
#[derive(Debug, Clone)]
pub struct MajorityVote {
    history: VecDeque<u8>,
    capacity: usize,
    stable: Option<u8>,
}

impl MajorityVote {
    pub fn new() -> Self {
        Self::with_capacity(PREDICTION_HISTORY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            stable: None,
        }
    }

    /// Record one label. Anything outside `0..CLASS_COUNT`, including the
    /// `-1` error signal, is ignored.
    pub fn observe(&mut self, label: i32) -> Option<u8> {
        let Some(label) = u8::try_from(label)
            .ok()
            .filter(|&l| usize::from(l) < CLASS_COUNT)
        else {
            return self.stable;
        };

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(label);
        self.stable = majority(&self.history);
        self.stable
    }

    pub fn stable(&self) -> Option<u8> {
        self.stable
    }

    pub fn history(&self) -> impl Iterator<Item = u8> + '_ {
        self.history.iter().copied()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.stable = None;
    }
}

impl Default for MajorityVote {
    fn default() -> Self {
        Self::new()
    }
}

/// Most frequent label; ties go to the smallest label.
fn majority(history: &VecDeque<u8>) -> Option<u8> {
    let mut counts = [0usize; CLASS_COUNT];
    for &label in history {
        counts[label as usize] += 1;
    }

    let mut best: Option<(u8, usize)> = None;
    for (label, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        match best {
            Some((_, top)) if count <= top => {}
            _ => best = Some((label as u8, count)),
        }
    }
    best.map(|(label, _)| label)
}

/// Moving-average hysteresis for binary classifiers.
#[derive(Debug, Clone)]
pub struct Hysteresis {
    alpha: f64,
    upper: f64,
    lower: f64,
    average: Option<f64>,
    positive: bool,
}

impl Hysteresis {
    pub fn new() -> Self {
        Self::with_thresholds(HYSTERESIS_ALPHA, STRESS_THRESHOLD, NORMAL_THRESHOLD)
    }

    pub fn with_thresholds(alpha: f64, upper: f64, lower: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            upper,
            lower,
            average: None,
            positive: false,
        }
    }

    /// Fold one positive-class probability into the average.
    pub fn observe(&mut self, probability: f64) -> u8 {
        if probability.is_nan() {
            return self.stable();
        }

        let average = match self.average {
            Some(prev) => self.alpha * probability + (1.0 - self.alpha) * prev,
            None => probability,
        };
        self.average = Some(average);

        if !self.positive && average > self.upper {
            self.positive = true;
        } else if self.positive && average < self.lower {
            self.positive = false;
        }
        self.stable()
    }

    pub fn stable(&self) -> u8 {
        u8::from(self.positive)
    }

    pub fn average(&self) -> Option<f64> {
        self.average
    }

    pub fn reset(&mut self) {
        self.average = None;
        self.positive = false;
    }
}

impl Default for Hysteresis {
    fn default() -> Self {
        Self::new()
    }
}

/// The label stabilizer used by the pipeline, holding one concrete strategy.
#[derive(Debug, Clone)]
pub enum LabelStabilizer {
    MajorityVote(MajorityVote),
    Hysteresis(Hysteresis),
}

impl LabelStabilizer {
    pub fn new(strategy: StabilizerStrategy) -> Self {
        match strategy {
            StabilizerStrategy::MajorityVote => LabelStabilizer::MajorityVote(MajorityVote::new()),
            StabilizerStrategy::Hysteresis => LabelStabilizer::Hysteresis(Hysteresis::new()),
        }
    }

    pub fn strategy(&self) -> StabilizerStrategy {
        match self {
            LabelStabilizer::MajorityVote(_) => StabilizerStrategy::MajorityVote,
            LabelStabilizer::Hysteresis(_) => StabilizerStrategy::Hysteresis,
        }
    }

    /// Feed one inference and return the committed label.
    pub fn observe(&mut self, inference: &Inference) -> Option<u8> {
        match self {
            LabelStabilizer::MajorityVote(vote) => match inference.label() {
                Some(label) => vote.observe(i32::from(label)),
                None => vote.stable(),
            },
            LabelStabilizer::Hysteresis(band) => match inference.positive_probability() {
                Some(p) => Some(band.observe(p)),
                None => band.average().map(|_| band.stable()),
            },
        }
    }

    /// The committed label, if any has been committed yet.
    pub fn stable(&self) -> Option<u8> {
        match self {
            LabelStabilizer::MajorityVote(vote) => vote.stable(),
            LabelStabilizer::Hysteresis(band) => band.average().map(|_| band.stable()),
        }
    }

    /// Forget history and the committed label.
    pub fn reset(&mut self) {
        match self {
            LabelStabilizer::MajorityVote(vote) => vote.reset(),
            LabelStabilizer::Hysteresis(band) => band.reset(),
        }
    }
}

impl Default for LabelStabilizer {
    fn default() -> Self {
        Self::new(StabilizerStrategy::default())
    }
}
