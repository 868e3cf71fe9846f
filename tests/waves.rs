//! End-to-end history matching waves.

mod common;

use nroy::{
    Config, CorrectionOutcome, DiagnosticsConfig, Error, Phase, StopReason, Target, TargetSet,
    TrainingPoint, WaveOrchestrator,
};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

fn config() -> Config {
    Config::quick()
        .match_rate_stop(None)
        .stop_on_diminishing_returns(false)
        .diagnostics(
            DiagnosticsConfig::default()
                .accept_unresolved(true)
                .drop_fraction(1.0),
        )
}

fn volume(orch: &WaveOrchestrator) -> f64 {
    // same seed every time: identical sample points across waves
    orch.volume_fraction(&mut Xoshiro256PlusPlus::seed_from_u64(1234))
        .unwrap()
}

#[test]
fn waves_shrink_the_nroy_region() {
    let mut orch = WaveOrchestrator::new(common::space(), common::targets(), config());
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(8);
    let mut points = orch.initial_design(30, &mut rng);
    let mut volumes = vec![1.0];

    for _ in 0..3 {
        match orch.run_wave(&common::simulator, &points, &mut rng) {
            Ok(Phase::CollectingTrainingData) => {
                volumes.push(volume(&orch));
                points = orch.next_points().to_vec();
            }
            Ok(_) | Err(Error::EmptyNroy { .. }) => break,
            Err(e) => panic!("wave failed: {e}"),
        }
    }

    assert!(orch.waves().len() >= 2, "only {} waves ran", orch.waves().len());
    for pair in volumes.windows(2) {
        assert!(pair[1] <= pair[0], "volume grew: {volumes:?}");
    }
    assert!(volumes[1] < 0.5);

    for pair in orch.waves().windows(2) {
        pair[0].space.check_narrowing(&pair[1].space).unwrap();
    }
    orch.initial_space().check_narrowing(orch.space()).unwrap();

    let region = orch.nroy_region().unwrap();
    assert_eq!(region.depth(), orch.waves().len());
}

#[test]
fn impossible_targets_terminate_with_empty_nroy() {
    let targets = TargetSet::new([
        ("f1", Target::observation(100.0, 0.01)),
        ("f2", Target::observation(100.0, 0.01)),
    ])
    .unwrap();
    let mut orch = WaveOrchestrator::new(common::space(), targets, config());
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
    let points = orch.initial_design(30, &mut rng);

    let err = orch.run_wave(&common::simulator, &points, &mut rng).unwrap_err();
    assert_eq!(err, Error::EmptyNroy { wave: 0 });
    assert_eq!(orch.phase(), Phase::Terminated(StopReason::EmptyNroy));
    assert_eq!(orch.waves().len(), 1);
    assert_eq!(orch.waves()[0].match_rate, 0.0);

    assert!(matches!(
        orch.run_wave(&common::simulator, &points, &mut rng),
        Err(Error::InvalidTransition { .. })
    ));
}

fn loose_targets() -> TargetSet {
    let [f1, f2] = common::model(&common::TRUTH);
    TargetSet::new([
        ("f1", Target::observation(f1, 100.0)),
        ("f2", Target::observation(f2, 100.0)),
    ])
    .unwrap()
}

#[test]
fn loose_targets_are_matched_immediately() {
    let config = config().match_rate_stop(Some(0.95));
    let mut orch = WaveOrchestrator::new(common::space(), loose_targets(), config);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(6);
    let points = orch.initial_design(30, &mut rng);

    let phase = orch.run_wave(&common::simulator, &points, &mut rng).unwrap();
    assert_eq!(phase, Phase::Terminated(StopReason::TargetsMatched));
    assert_eq!(orch.waves()[0].match_rate, 1.0);
    assert!(orch.design().is_none());
}

#[test]
fn small_emulator_variance_means_diminishing_returns() {
    let config = config().stop_on_diminishing_returns(true);
    let mut orch = WaveOrchestrator::new(common::space(), loose_targets(), config);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(6);
    let points = orch.initial_design(30, &mut rng);

    let phase = orch.run_wave(&common::simulator, &points, &mut rng).unwrap();
    assert_eq!(phase, Phase::Terminated(StopReason::DiminishingReturns));
    assert!(orch
        .waves()[0]
        .is_diminishing(orch.targets(), orch.config().uncertainty_ratio)
        .unwrap());
}

#[test]
fn manual_steps_follow_the_phase_machine() {
    let mut orch = WaveOrchestrator::new(common::space(), common::targets(), config());
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
    let points = orch.initial_design(24, &mut rng);
    let runs = common::runs(1, 24).points().to_vec();

    assert_eq!(orch.submit_runs(runs).unwrap(), 24);
    assert_eq!(orch.pending_runs().len(), 24);
    assert!(points.iter().all(|p| orch.space().contains(p)));

    orch.fit().unwrap();
    assert_eq!(orch.phase(), Phase::Validating);
    assert!(matches!(
        orch.submit_runs(Vec::new()),
        Err(Error::InvalidTransition { .. })
    ));

    orch.discard_fit().unwrap();
    assert_eq!(orch.phase(), Phase::CollectingTrainingData);
    orch.fit().unwrap();
    let wave = orch.validate().unwrap();
    assert_eq!(wave.index, 0);
    assert_eq!(wave.training.len() + wave.validation.len(), 24);
    assert_eq!(orch.phase(), Phase::GeneratingDesign);

    orch.generate_design(&mut rng).unwrap();
    assert_eq!(orch.phase(), Phase::Advancing);
    orch.advance().unwrap();
    assert_eq!(orch.phase(), Phase::CollectingTrainingData);
    assert_eq!(orch.wave_index(), 1);
    assert!(orch.pending_runs().is_empty());
}

#[test]
fn unresolved_misclassification_needs_explicit_acceptance() {
    // Run 1 lands in the validation half. Its f1 output sits far from the
    // smooth surface the emulator learns, and an interval target around it
    // makes the simulator match while the emulator rules the point out.
    let mut runs = common::runs(1, 24).points().to_vec();
    let x = runs[1].parameters().to_vec();
    let [f1, f2] = common::model(&x);
    let spiked = f1 + 10.0;
    runs[1] = TrainingPoint::new(x, vec![spiked, f2]);

    let targets = TargetSet::new([
        ("f1", Target::interval(spiked - 0.5, spiked + 0.5)),
        ("f2", Target::interval(-100.0, 100.0)),
    ])
    .unwrap();
    let config = Config::quick()
        .match_rate_stop(None)
        .stop_on_diminishing_returns(false)
        .diagnostics(
            DiagnosticsConfig::default()
                .drop_fraction(1.0)
                .max_inflation_iterations(0),
        );
    let mut orch = WaveOrchestrator::new(common::space(), targets, config);
    orch.submit_runs(runs).unwrap();
    orch.fit().unwrap();

    assert!(matches!(
        orch.accept_unresolved(),
        Err(Error::InvalidTransition { .. })
    ));

    let err = orch.validate().unwrap_err();
    assert_eq!(
        err,
        Error::MisclassificationUnresolved {
            outputs: vec!["f1".to_string()]
        }
    );
    assert_eq!(orch.phase(), Phase::Validating);
    assert!(orch.waves().is_empty());

    let wave = orch.accept_unresolved().unwrap();
    assert_eq!(wave.index, 0);
    assert!(wave.dropped.is_empty());
    let f1_correction = wave.corrections.iter().find(|c| c.output == "f1").unwrap();
    assert!(matches!(
        f1_correction.outcome,
        CorrectionOutcome::CapExceeded {
            iterations: 0,
            remaining,
            ..
        } if remaining >= 1
    ));
    assert_eq!(orch.phase(), Phase::GeneratingDesign);
    assert_eq!(orch.waves().len(), 1);
}
