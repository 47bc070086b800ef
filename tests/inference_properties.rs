//! Simulation checks of interval coverage and p-value behaviour.

use hurdle_effect::{
    BootstrapOptions, Coefficients, CountFamily, FitOptions, HurdleDesigns, InferenceOptions,
    IntervalMethod, ModelSpecification, SimulationOptions, Strata, jackknife, population_effect,
    run_bootstrap, simulate_hurdle, summarize,
};

struct Run {
    percentile_covers: bool,
    bca_covers: bool,
    p_value: f64,
}

fn run(options: &SimulationOptions, truth: f64, replicates: usize, with_bca: bool) -> Run {
    let dataset = simulate_hurdle(options).expect("simulate");
    let spec = ModelSpecification::new(&["Age", "Sex"], &["Age"], CountFamily::Poisson)
        .expect("spec");
    let designs = HurdleDesigns::build(&dataset, &spec).expect("designs");
    let strata = Strata::from_arms(&designs.arms).expect("strata");
    let bootstrap = BootstrapOptions {
        replicates,
        seed: options.seed.wrapping_mul(31),
        parallel: true,
    };
    let distribution = run_bootstrap(
        &designs,
        &strata,
        CountFamily::Poisson,
        FitOptions::default(),
        bootstrap,
    )
    .expect("bootstrap");

    let percentile =
        summarize(&distribution, None, InferenceOptions::default()).expect("percentile");
    let bca_covers = if with_bca {
        let leave_one_out = jackknife(&designs, CountFamily::Poisson, FitOptions::default(), true);
        let bca = summarize(
            &distribution,
            Some(&leave_one_out),
            InferenceOptions {
                method: IntervalMethod::Bca,
                ..InferenceOptions::default()
            },
        )
        .expect("bca");
        bca.interval.contains(truth)
    } else {
        false
    };

    Run {
        percentile_covers: percentile.interval.contains(truth),
        bca_covers,
        p_value: percentile.p_value,
    }
}

#[test]
fn percentile_and_bca_intervals_cover_the_true_effect() {
    let base = SimulationOptions::default();
    let truth = population_effect(&base, 200_000, 99);
    let datasets = 25;

    let runs = (0..datasets)
        .map(|k| {
            let options = SimulationOptions {
                seed: 1_000 + k,
                ..base
            };
            run(&options, truth, 300, true)
        })
        .collect::<Vec<_>>();

    let percentile = runs.iter().filter(|run| run.percentile_covers).count();
    let bca = runs.iter().filter(|run| run.bca_covers).count();
    assert!(percentile * 4 >= datasets as usize * 3, "percentile covered {percentile}/{datasets}");
    assert!(bca * 4 >= datasets as usize * 3, "bca covered {bca}/{datasets}");
}

#[test]
fn p_values_are_small_under_a_strong_effect() {
    let strong = SimulationOptions {
        count: Coefficients {
            intervention: 1.0,
            ..SimulationOptions::default().count
        },
        ..SimulationOptions::default()
    };
    for seed in 0..3 {
        let options = SimulationOptions { seed, ..strong };
        let result = run(&options, 1.0, 200, false);
        assert!(result.p_value < 0.01, "p = {}", result.p_value);
        assert!(!result.percentile_covers);
    }
}

#[test]
fn p_values_spread_out_under_no_effect() {
    let null = SimulationOptions {
        count: Coefficients {
            intervention: 0.0,
            ..SimulationOptions::default().count
        },
        ..SimulationOptions::default()
    };
    let p_values = (0..20)
        .map(|seed| {
            let options = SimulationOptions {
                seed: 500 + seed,
                ..null
            };
            run(&options, 1.0, 200, false).p_value
        })
        .collect::<Vec<_>>();

    assert!(p_values.iter().all(|p| (0.0..=1.0).contains(p)));
    let mean = p_values.iter().sum::<f64>() / 20.0;
    assert!((0.25..=0.75).contains(&mean), "mean p-value {mean}");
    assert!(p_values.iter().any(|&p| p > 0.5));
}
