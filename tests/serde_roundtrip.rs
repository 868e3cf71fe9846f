//! Problem definitions and results survive JSON persistence.

mod common;

use nroy::{
    diagnose, generate_design, Design, DesignConfig, DiagnosticsConfig, DiagnosticsReport,
    ParameterSpace, Target, TargetSet, TrainingSet,
};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

#[test]
fn problem_definition_roundtrip() {
    let space = ParameterSpace::new([("beta", 0.1, 1.0), ("gamma", 0.05, 0.5)]).unwrap();
    let targets = TargetSet::new([
        ("peak", Target::observation(420.0, 20.0)),
        ("final", Target::interval(800.0, 900.0)),
    ])
    .unwrap();

    let json = serde_json::to_string(&space).unwrap();
    assert_eq!(serde_json::from_str::<ParameterSpace>(&json).unwrap(), space);
    let json = serde_json::to_string(&targets).unwrap();
    let restored: TargetSet = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, targets);
    assert_eq!(restored.names().collect::<Vec<_>>(), ["peak", "final"]);
}

#[test]
fn invalid_spaces_are_rejected_on_load() {
    let degenerate = r#"{"parameters":[{"name":"a","range":{"lower":1.0,"upper":1.0}}]}"#;
    assert!(serde_json::from_str::<ParameterSpace>(degenerate).is_err());

    let duplicate = r#"{"parameters":[
        {"name":"a","range":{"lower":0.0,"upper":1.0}},
        {"name":"a","range":{"lower":0.0,"upper":2.0}}
    ]}"#;
    let err = serde_json::from_str::<ParameterSpace>(duplicate).unwrap_err();
    assert!(err.to_string().contains("duplicate name 'a'"), "{err}");

    let empty = r#"{"parameters":[]}"#;
    assert!(serde_json::from_str::<ParameterSpace>(empty).is_err());
}

#[test]
fn invalid_targets_are_rejected_on_load() {
    let negative_sigma =
        r#"{"targets":[{"name":"I","target":{"kind":"observation","value":10.0,"sigma":-2.0}}]}"#;
    let err = serde_json::from_str::<TargetSet>(negative_sigma).unwrap_err();
    assert!(err.to_string().contains("sigma -2 must be positive"), "{err}");

    let inverted =
        r#"{"targets":[{"name":"I","target":{"kind":"interval","min":5.0,"max":1.0}}]}"#;
    assert!(serde_json::from_str::<TargetSet>(inverted).is_err());
}

#[test]
fn invalid_training_sets_are_rejected_on_load() {
    let empty = r#"{"parameter_names":["a"],"output_names":["y"],"points":[]}"#;
    assert!(serde_json::from_str::<TrainingSet>(empty).is_err());

    let ragged = r#"{"parameter_names":["a","b"],"output_names":["y"],
        "points":[{"parameters":[0.5],"outputs":[1.0]}]}"#;
    assert!(serde_json::from_str::<TrainingSet>(ragged).is_err());
}

#[test]
fn training_runs_roundtrip() {
    let runs = common::runs(1, 12);
    let json = serde_json::to_string_pretty(&runs).unwrap();
    let restored: TrainingSet = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.len(), 12);
    assert_eq!(restored.output_names(), runs.output_names());
    for (a, b) in restored.points().iter().zip(runs.points()) {
        for (x, y) in a.outputs().iter().zip(b.outputs()) {
            assert!((x - y).abs() <= 1e-15 * y.abs().max(1.0));
        }
    }
}

#[test]
fn results_roundtrip() {
    let set = common::fitted(30);
    let targets = common::targets();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(17);
    let design = generate_design(
        &set,
        &targets,
        &common::space(),
        8,
        3.0,
        &DesignConfig::default(),
        &mut rng,
    )
    .unwrap();
    let restored: Design = serde_json::from_str(&serde_json::to_string(&design).unwrap()).unwrap();
    assert_eq!(restored.requested, design.requested);
    assert_eq!(restored.yields, design.yields);
    assert_eq!(restored.len(), design.len());

    let report = diagnose(
        &set,
        &common::runs(101, 20),
        &targets,
        3.0,
        &DiagnosticsConfig::default(),
    )
    .unwrap();
    let restored: DiagnosticsReport =
        serde_json::from_str(&serde_json::to_string(&report).unwrap()).unwrap();
    assert_eq!(restored.failing(), report.failing());
    for (a, b) in restored.emulators.iter().zip(&report.emulators) {
        assert_eq!(a.output(), b.output());
        assert_eq!(a.comparison.flagged, b.comparison.flagged);
        assert_eq!(a.standardized.verdict, b.standardized.verdict);
    }
}
