use hurdle_effect::{
    AnalysisConfig, BootstrapOptions, InferenceOptions, IntervalMethod, ModelSpecification,
    SimulationOptions, analyze, population_effect, render_inference_tables, simulate_hurdle,
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let simulation = SimulationOptions::default();
    let dataset = simulate_hurdle(&simulation).expect("simulate");
    let truth = population_effect(&simulation, 200_000, 1);

    let spec =
        ModelSpecification::from_names(&["Age", "Sex"], &["Age"], "poisson").expect("spec");

    for method in [IntervalMethod::Percentile, IntervalMethod::Bca] {
        let config = AnalysisConfig {
            bootstrap: BootstrapOptions {
                replicates: 2_000,
                ..BootstrapOptions::default()
            },
            inference: InferenceOptions {
                method,
                ..InferenceOptions::default()
            },
            ..AnalysisConfig::default()
        };
        let result = analyze(&dataset, &spec, &config).expect("analysis");
        let tables = render_inference_tables(&result);
        println!("Average intervention effect ({method})\n\n{}", tables.effect);
        println!("\nBootstrap diagnostics\n\n{}", tables.diagnostics);
    }
    println!("\nPopulation effect of the simulating model: {truth:.4}");
}
