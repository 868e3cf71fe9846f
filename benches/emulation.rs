use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nroy::{
    fit_emulators, DesignConfig, EmulatorOptions, NroyRegion, ParameterSpace, Target, TargetSet,
    TrainingPoint, TrainingSet,
};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

fn model(x: &[f64]) -> Vec<f64> {
    vec![
        (3.0 * x[0]).sin() + 2.0 * x[1] * x[1],
        4.0 * x[0] * x[1] + 0.5 * (2.0 * x[1]).cos(),
    ]
}

fn problem() -> (ParameterSpace, TargetSet, TrainingSet) {
    let space = ParameterSpace::new([("a", 0.0, 1.0), ("b", 0.0, 1.0)]).unwrap();
    let truth = model(&[0.4, 0.6]);
    let targets = TargetSet::new([
        ("f1", Target::observation(truth[0], 0.05)),
        ("f2", Target::observation(truth[1], 0.05)),
    ])
    .unwrap();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
    let points = (0..40)
        .map(|_| {
            let x = space.sample_uniform(&mut rng);
            let y = model(&x);
            TrainingPoint::new(x, y)
        })
        .collect();
    let training = TrainingSet::for_problem(&space, &targets, points).unwrap();
    (space, targets, training)
}

fn bench_emulation(c: &mut Criterion) {
    let (space, targets, training) = problem();
    let options = EmulatorOptions::default();
    let emulators = fit_emulators(&training, &space, &targets, &options).unwrap();
    let region = NroyRegion::single(&emulators, &targets, 3.0, 1).unwrap();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
    let candidates: Vec<Vec<f64>> = (0..1_000).map(|_| space.sample_uniform(&mut rng)).collect();

    let mut group = c.benchmark_group("emulation");
    group.sample_size(20);
    group.bench_function("fit_two_outputs", |b| {
        b.iter(|| black_box(fit_emulators(&training, &space, &targets, &options).unwrap().len()));
    });
    group.bench_function("score_1000_points", |b| {
        b.iter(|| black_box(region.scores(&candidates)));
    });
    group.bench_function("design_20_points", |b| {
        b.iter(|| {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
            let design = nroy::DesignGenerator::new(&region, &space, DesignConfig::default())
                .generate(20, &mut rng);
            black_box(design.len())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_emulation);
criterion_main!(benches);
