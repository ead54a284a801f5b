//! Classifier seam.
//!
//! The emotional-state model is an external collaborator consumed as a pure
//! function from a standardized feature vector to either a label or a class
//! distribution. `LinearModel` is a multinomial logistic regression read from
//! a JSON artifact; any other runtime plugs in through [`Classifier`].

use crate::core::window::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of emotional-state classes.
pub const CLASS_COUNT: usize = 3;

/// Emotional state labels, using the training label mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmotionalState {
    Baseline = 0,
    Amusement = 1,
    Stress = 2,
}

impl EmotionalState {
    pub fn from_label(label: u8) -> Option<Self> {
        match label {
            0 => Some(EmotionalState::Baseline),
            1 => Some(EmotionalState::Amusement),
            2 => Some(EmotionalState::Stress),
            _ => None,
        }
    }

    pub fn label(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            EmotionalState::Baseline => "baseline",
            EmotionalState::Amusement => "amusement",
            EmotionalState::Stress => "stress",
        }
    }
}

impl std::fmt::Display for EmotionalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Output of one inference.
#[derive(Debug, Clone, PartialEq)]
pub enum Inference {
    /// The model produced a class index directly.
    Label(u8),
    /// The model produced a score per class.
    Distribution(Vec<f64>),
}

impl Inference {
    /// The instantaneous label: the label itself, or the argmax of the
    /// distribution with ties going to the lowest index.
    pub fn label(&self) -> Option<u8> {
        match self {
            Inference::Label(label) => Some(*label),
            Inference::Distribution(scores) => {
                let mut best: Option<(usize, f64)> = None;
                for (i, &score) in scores.iter().enumerate() {
                    if score.is_nan() {
                        continue;
                    }
                    match best {
                        Some((_, top)) if score <= top => {}
                        _ => best = Some((i, score)),
                    }
                }
                best.and_then(|(i, _)| u8::try_from(i).ok())
            }
        }
    }

    /// Probability of the positive class for a binary model.
    ///
    /// A two-entry distribution reports its second entry, a one-entry
    /// distribution its only entry, a wider one everything but class 0, and a
    /// bare label counts as certain.
    pub fn positive_probability(&self) -> Option<f64> {
        match self {
            Inference::Label(label) => Some(if *label > 0 { 1.0 } else { 0.0 }),
            Inference::Distribution(scores) => match scores.as_slice() {
                [] => None,
                [p] => Some(*p),
                [_, p] => Some(*p),
                [baseline, ..] => Some(1.0 - baseline),
            },
        }
    }

    /// Reject output outside the class contract: labels must be below
    /// `CLASS_COUNT`, distributions must have `CLASS_COUNT` finite scores.
    /// With `binary` set, one- and two-score distributions are accepted too.
    pub fn check(&self, binary: bool) -> Result<(), InferenceError> {
        match self {
            Inference::Label(label) if usize::from(*label) >= CLASS_COUNT => Err(
                InferenceError::InvalidOutput(format!("label {label} outside 0..{CLASS_COUNT}")),
            ),
            Inference::Label(_) => Ok(()),
            Inference::Distribution(scores) => {
                let width_ok =
                    scores.len() == CLASS_COUNT || (binary && matches!(scores.len(), 1 | 2));
                if !width_ok {
                    return Err(InferenceError::InvalidOutput(format!(
                        "expected {CLASS_COUNT} scores, got {}",
                        scores.len()
                    )));
                }
                if scores.iter().any(|s| !s.is_finite()) {
                    return Err(InferenceError::InvalidOutput(
                        "non-finite class score".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Errors from the classifier collaborator. Never fatal to the link.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceError {
    ModelUnavailable,
    Runtime(String),
    InvalidOutput(String),
    NonFiniteFeatures,
}

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceError::ModelUnavailable => write!(f, "Classifier model is not available"),
            InferenceError::Runtime(e) => write!(f, "Inference failed: {e}"),
            InferenceError::InvalidOutput(e) => write!(f, "Invalid model output: {e}"),
            InferenceError::NonFiniteFeatures => {
                write!(f, "Feature vector contains non-finite values")
            }
        }
    }
}

impl std::error::Error for InferenceError {}

/// A model mapping a standardized feature vector to a prediction.
///
/// Takes `&mut self` so a single window instance never runs inference
/// concurrently with itself.
pub trait Classifier {
    fn infer(&mut self, features: &FeatureVector) -> Result<Inference, InferenceError>;
}

impl Classifier for Box<dyn Classifier + Send> {
    fn infer(&mut self, features: &FeatureVector) -> Result<Inference, InferenceError> {
        (**self).infer(features)
    }
}

/// Stand-in used when no model is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableClassifier;

impl Classifier for UnavailableClassifier {
    fn infer(&mut self, _features: &FeatureVector) -> Result<Inference, InferenceError> {
        Err(InferenceError::ModelUnavailable)
    }
}

/// Multinomial logistic regression over the standardized features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: [[f64; FEATURE_COUNT]; CLASS_COUNT],
    pub bias: [f64; CLASS_COUNT],
}

impl LinearModel {
    pub fn from_json(json: &str) -> Result<Self, InferenceError> {
        serde_json::from_str(json).map_err(|e| InferenceError::InvalidOutput(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| InferenceError::Runtime(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Softmax class probabilities.
    pub fn probabilities(&self, features: &FeatureVector) -> [f64; CLASS_COUNT] {
        let mut logits = self.bias;
        for (logit, row) in logits.iter_mut().zip(self.weights.iter()) {
            *logit += row
                .iter()
                .zip(features.values().iter())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        }

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut exp = logits.map(|l| (l - max).exp());
        let total: f64 = exp.iter().sum();
        for p in exp.iter_mut() {
            *p /= total;
        }
        exp
    }
}

impl Classifier for LinearModel {
    fn infer(&mut self, features: &FeatureVector) -> Result<Inference, InferenceError> {
        let probs = self.probabilities(features);
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(InferenceError::InvalidOutput(format!("{probs:?}")));
        }
        Ok(Inference::Distribution(probs.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_argmax_ties_prefer_lowest_index() {
        let inference = Inference::Distribution(vec![0.2, 0.4, 0.4]);
        assert_eq!(inference.label(), Some(1));

        let inference = Inference::Distribution(vec![0.5, 0.5, 0.0]);
        assert_eq!(inference.label(), Some(0));
    }

    #[test]
    fn test_empty_distribution_has_no_label() {
        assert_eq!(Inference::Distribution(vec![]).label(), None);
        assert_eq!(Inference::Distribution(vec![f64::NAN]).label(), None);
    }

    #[test]
    fn test_check_rejects_out_of_contract_output() {
        assert!(Inference::Label(2).check(false).is_ok());
        assert!(matches!(
            Inference::Label(7).check(false),
            Err(InferenceError::InvalidOutput(_))
        ));
        assert!(matches!(
            Inference::Distribution(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.9]).check(false),
            Err(InferenceError::InvalidOutput(_))
        ));
        assert!(Inference::Distribution(vec![0.1, 0.9]).check(false).is_err());
        assert!(Inference::Distribution(vec![0.1, 0.9]).check(true).is_ok());
        assert!(Inference::Distribution(vec![0.1, f64::INFINITY, 0.2])
            .check(false)
            .is_err());
    }

    #[test]
    fn test_positive_probability() {
        assert_eq!(Inference::Distribution(vec![0.8]).positive_probability(), Some(0.8));
        assert_eq!(
            Inference::Distribution(vec![0.25, 0.75]).positive_probability(),
            Some(0.75)
        );
        assert_eq!(Inference::Label(1).positive_probability(), Some(1.0));
        assert_eq!(Inference::Label(0).positive_probability(), Some(0.0));
    }

    #[test]
    fn test_linear_model_softmax() {
        let mut weights = [[0.0; FEATURE_COUNT]; CLASS_COUNT];
        weights[2][0] = 2.0;
        let mut model = LinearModel {
            weights,
            bias: [0.0; CLASS_COUNT],
        };

        let mut x = [0.0; FEATURE_COUNT];
        x[0] = 3.0;
        let probs = model.probabilities(&FeatureVector(x));
        assert_abs_diff_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(probs[2] > probs[0]);
        assert_eq!(model.infer(&FeatureVector(x)).unwrap().label(), Some(2));

        // All logits equal -> uniform, tie goes to class 0
        let uniform = model.infer(&FeatureVector([0.0; FEATURE_COUNT])).unwrap();
        assert_eq!(uniform.label(), Some(0));
    }

    #[test]
    fn test_linear_model_json() {
        let json = format!(
            r#"{{"weights": [{row},{row},{row}], "bias": [0.1, 0.2, 0.3]}}"#,
            row = "[0,0,0,0,0,0,0,0,0,0]"
        );
        let model = LinearModel::from_json(&json).unwrap();
        assert_eq!(model.bias, [0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_unavailable_classifier() {
        let mut classifier = UnavailableClassifier;
        assert_eq!(
            classifier.infer(&FeatureVector([0.0; FEATURE_COUNT])),
            Err(InferenceError::ModelUnavailable)
        );
    }

    #[test]
    fn test_boxed_classifier() {
        let mut classifier: Box<dyn Classifier + Send> = Box::new(UnavailableClassifier);
        assert!(classifier.infer(&FeatureVector([0.0; FEATURE_COUNT])).is_err());
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(EmotionalState::from_label(2), Some(EmotionalState::Stress));
        assert_eq!(EmotionalState::from_label(3), None);
        assert_eq!(EmotionalState::Amusement.label(), 1);
    }
}
