//! Integration tests for reassembly, windowing and stabilization.

use approx::assert_abs_diff_eq;
use emoband_agent::constants::{ACC_SCALE, TEMP_OFFSET, WINDOW_CAPACITY};
use emoband_agent::core::window::{BVP_MEAN_INDEX, FEATURE_COUNT};
use emoband_agent::core::{
    decode, Classifier, FeatureVector, FeatureWindow, Inference, InferenceError, MajorityVote,
    Pipeline, PipelineEvent, Reassembler, ScalerTable, StabilizerStrategy, WindowStatus,
};
use emoband_agent::link::simulated::synthetic_record;
use proptest::prelude::*;

struct Constant(u8);

impl Classifier for Constant {
    fn infer(&mut self, _features: &FeatureVector) -> Result<Inference, InferenceError> {
        Ok(Inference::Label(self.0))
    }
}

fn split_at_points(stream: &[u8], points: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = points
        .iter()
        .map(|p| p % (stream.len() + 1))
        .collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut fragments = Vec::new();
    let mut start = 0;
    for cut in cuts {
        fragments.push(stream[start..cut].to_vec());
        start = cut;
    }
    fragments.push(stream[start..].to_vec());
    fragments
}

proptest! {
    #[test]
    fn fragmentation_does_not_change_messages(
        count in 1usize..8,
        points in proptest::collection::vec(any::<usize>(), 0..40),
    ) {
        let records: Vec<String> = (0..count as u64)
            .map(|i| synthetic_record(i, i % 3 != 0))
            .collect();
        let stream = records.concat().into_bytes();

        let mut whole = Reassembler::new();
        let expected = whole.ingest_bytes(&stream);
        prop_assert_eq!(&expected, &records);

        let mut pieces = Reassembler::new();
        let mut got = Vec::new();
        for fragment in split_at_points(&stream, &points) {
            got.extend(pieces.ingest_bytes(&fragment));
        }
        prop_assert_eq!(got, expected);
        prop_assert_eq!(pieces.buffered_len(), 0);
    }

    #[test]
    fn identity_scaler_leaves_features_alone(
        values in proptest::array::uniform10(-1.0e6f64..1.0e6),
    ) {
        let features = FeatureVector(values);
        prop_assert_eq!(ScalerTable::identity().standardize(&features), features);
    }
}

#[test]
fn partial_message_is_retained_verbatim() {
    let mut reassembler = Reassembler::new();
    assert!(reassembler.ingest("{a:1,b:2").is_empty());
    assert_eq!(reassembler.remainder(), "{a:1,b:2");
}

#[test]
fn window_gates_on_fifteen_samples() {
    assert_eq!(WINDOW_CAPACITY, 15);
    let mut window = FeatureWindow::new();
    for i in 0..14 {
        let sample = decode(&synthetic_record(i, true)).unwrap();
        assert!(matches!(window.accept(&sample), WindowStatus::Pending { .. }));
    }
    let sample = decode(&synthetic_record(14, true)).unwrap();
    assert!(matches!(window.accept(&sample), WindowStatus::Ready(_)));

    // Full window keeps producing vectors as it slides
    let sample = decode(&synthetic_record(15, true)).unwrap();
    assert!(matches!(window.accept(&sample), WindowStatus::Ready(_)));
    assert_eq!(window.len(), 15);
}

#[test]
fn features_use_population_deviation_and_zero_bvp_mean() {
    let mut window = FeatureWindow::with_capacity(2);
    let low = r#"{"acc_x":1,"acc_y":0,"acc_z":0,"temp":30,"bvp":10,"finger":1}"#;
    let high = r#"{"acc_x":3,"acc_y":0,"acc_z":0,"temp":32,"bvp":30,"finger":1}"#;
    window.accept(&decode(low).unwrap());
    let WindowStatus::Ready(features) = window.accept(&decode(high).unwrap()) else {
        panic!("window should be full");
    };

    assert_abs_diff_eq!(features.0[0], 2.0 * ACC_SCALE, epsilon = 1e-9);
    assert_abs_diff_eq!(features.0[3], 31.0 + TEMP_OFFSET, epsilon = 1e-9);
    assert_eq!(features.0[BVP_MEAN_INDEX], 0.0);
    // Population deviation of {1, 3} is 1
    assert_abs_diff_eq!(features.0[5], ACC_SCALE, epsilon = 1e-9);
    assert_abs_diff_eq!(features.0[8], 1.0, epsilon = 1e-9);
    assert!(features.0[9] > 0.0);
}

#[test]
fn standardization_is_exact() {
    let mut means = [0.0; FEATURE_COUNT];
    let mut stds = [1.0; FEATURE_COUNT];
    means[3] = 3.0;
    stds[3] = 2.0;
    let mut values = [0.0; FEATURE_COUNT];
    values[3] = 5.0;

    let out = ScalerTable::new(means, stds).standardize(&FeatureVector(values));
    assert_abs_diff_eq!(out.0[3], 1.0, epsilon = 1e-6);
}

#[test]
fn scaler_artifact_replaces_zero_deviation() {
    let json = r#"{
        "means": [0,0,0,0,0,0,0,0,0,0],
        "stds":  [1,1,1,1,0,1,1,1,1,1],
        "feature_order": ["acc_x_mean","acc_y_mean","acc_z_mean","temp_mean","bvp_mean",
                          "acc_x_std","acc_y_std","acc_z_std","temp_std","bvp_std"],
        "win_sec": 30
    }"#;
    let scaler = ScalerTable::from_json(json).unwrap();
    assert_eq!(scaler.stds()[BVP_MEAN_INDEX], 1.0);
}

#[test]
fn majority_vote_examples() {
    let mut vote = MajorityVote::new();
    let stable: Vec<_> = [2, 2, 1, 2, 0].iter().map(|&l| vote.observe(l)).collect();
    assert_eq!(stable.last(), Some(&Some(2)));

    let mut vote = MajorityVote::new();
    let mut last = None;
    for label in [1, 1, 0, 0, 2] {
        last = vote.observe(label);
    }
    assert_eq!(last, Some(0));
}

#[test]
fn not_worn_samples_never_enter_window_or_label() {
    let mut pipeline = Pipeline::new(
        Constant(2),
        ScalerTable::identity(),
        StabilizerStrategy::MajorityVote,
    );

    for i in 0..14 {
        pipeline.ingest(synthetic_record(i, true).as_bytes());
    }
    assert_eq!(pipeline.window().len(), 14);

    for i in 0..5 {
        let events = pipeline.ingest(synthetic_record(100 + i, false).as_bytes());
        assert!(matches!(events.as_slice(), [PipelineEvent::NotWorn(_)]));
    }
    assert_eq!(pipeline.window().len(), 14);
    assert_eq!(pipeline.stable_label(), None);

    let events = pipeline.ingest(synthetic_record(14, true).as_bytes());
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Classified { stable: Some(2), .. })));
}

#[test]
fn inference_errors_keep_the_stable_label() {
    struct Flaky(u32);

    impl Classifier for Flaky {
        fn infer(&mut self, _features: &FeatureVector) -> Result<Inference, InferenceError> {
            self.0 += 1;
            if self.0 % 2 == 0 {
                Err(InferenceError::Runtime("busy".into()))
            } else {
                Ok(Inference::Distribution(vec![0.1, 0.7, 0.2]))
            }
        }
    }

    let mut pipeline = Pipeline::new(Flaky(0), ScalerTable::identity(), StabilizerStrategy::MajorityVote)
        .with_window(FeatureWindow::with_capacity(1));

    pipeline.ingest(synthetic_record(0, true).as_bytes());
    assert_eq!(pipeline.stable_label(), Some(1));

    let events = pipeline.ingest(synthetic_record(1, true).as_bytes());
    assert!(matches!(events.last(), Some(PipelineEvent::InferenceError(_))));
    assert_eq!(pipeline.stable_label(), Some(1));
}

#[test]
fn hysteresis_strategy_for_binary_models() {
    struct Binary(Vec<f64>);

    impl Classifier for Binary {
        fn infer(&mut self, _features: &FeatureVector) -> Result<Inference, InferenceError> {
            let p = self.0.remove(0);
            Ok(Inference::Distribution(vec![1.0 - p, p]))
        }
    }

    let probabilities = vec![0.2, 0.9, 0.9, 0.9, 0.9, 0.5, 0.5];
    let mut pipeline = Pipeline::new(
        Binary(probabilities),
        ScalerTable::identity(),
        StabilizerStrategy::Hysteresis,
    )
    .with_window(FeatureWindow::with_capacity(1));

    let mut stable = Vec::new();
    for i in 0..7 {
        for event in pipeline.ingest(synthetic_record(i, true).as_bytes()) {
            if let PipelineEvent::Classified { stable: s, .. } = event {
                stable.push(s);
            }
        }
    }
    // EMA: .2 .41 .557 .66 .732 (> .7 flips) .662 .614 (held inside the band)
    assert_eq!(
        stable,
        vec![Some(0), Some(0), Some(0), Some(0), Some(1), Some(1), Some(1)]
    );
}
