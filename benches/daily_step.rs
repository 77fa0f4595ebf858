use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tracenet::{ParametersValues, ParametersValuesBuilder, Simulation};

static SEED: u64 = 123;

fn parameters(neighbourhood_count: usize, residents_per_neighbourhood: usize) -> ParametersValues {
    ParametersValuesBuilder::default()
        .neighbourhood_count(neighbourhood_count)
        .residents_per_neighbourhood(residents_per_neighbourhood)
        .rewire_probability(0.1)
        .initial_infection_rate(0.05)
        .app_usage_rate(0.7)
        .quarantine_probability(0.9)
        .seed(SEED)
        .build()
        .expect("valid benchmark parameters")
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("daily step 3x10", |bencher| {
        bencher.iter_batched(
            || Simulation::new(parameters(3, 10)).expect("simulation setup"),
            |mut simulation| {
                for day in 0..30 {
                    simulation.run_day(day);
                }
                black_box(simulation)
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("daily step 10x50", |bencher| {
        bencher.iter_batched(
            || Simulation::new(parameters(10, 50)).expect("simulation setup"),
            |mut simulation| {
                for day in 0..30 {
                    simulation.run_day(day);
                }
                black_box(simulation)
            },
            BatchSize::LargeInput,
        );
    });

    c.bench_function("full run 3x10", |bencher| {
        bencher.iter_with_large_drop(|| {
            let mut simulation = Simulation::new(parameters(3, 10)).expect("simulation setup");
            simulation.run();
            simulation
        });
    });
}

criterion_group!(daily_step_benches, criterion_benchmark);
criterion_main!(daily_step_benches);
