use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;

use clap::{Args, Command, FromArgMatches as _};
use log::info;

use crate::error::TraceNetError;
use crate::log::{set_log_level, LevelFilter};
use crate::parameters::{load_parameters_from_json, ParametersValues};
use crate::report::{RunRecord, SimulationResults};
use crate::simulation::Simulation;

/// Command line arguments of the `tracenet` binary
#[derive(Args, Debug, Clone, Default)]
pub struct BaseArgs {
    /// Optional path to a JSON parameters file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Base random seed; run r uses seed + r. Overrides the config file
    #[arg(short, long)]
    pub random_seed: Option<u64>,

    /// Number of independent runs per parameter set
    #[arg(short = 'n', long, default_value_t = 100)]
    pub runs: usize,

    /// Days per run. Overrides the config file
    #[arg(short, long)]
    pub days: Option<usize>,

    /// Number of worker threads
    #[arg(short, long, default_value_t = 1)]
    pub threads: usize,

    /// Directory for result files. Without it results are only summarised on stdout
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Enable logging at the given level (error, warn, info, debug, trace)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Sweep over these app usage rates
    #[arg(long, value_delimiter = ',')]
    pub app_usage_rates: Vec<f64>,

    /// Sweep over these quarantine probabilities
    #[arg(long, value_delimiter = ',')]
    pub quarantine_probabilities: Vec<f64>,
}

fn create_tracenet_cli() -> Command {
    let cli = Command::new("tracenet")
        .about("Small-world epidemic simulation with app-based contact tracing");
    BaseArgs::augment_args(cli)
}

/// Runs `runs` independent simulations of `parameters.max_days` days on up to `threads` threads.
/// Run `r` is seeded with `parameters.seed + r`; records are returned in run order.
///
/// # Errors
/// Returns `TraceNetError::ConfigurationError` for invalid parameters, or an error if a worker
/// thread panics.
pub fn run_batch(
    parameters: &ParametersValues,
    runs: usize,
    threads: usize,
) -> Result<Vec<RunRecord>, TraceNetError> {
    parameters.validate()?;
    let threads = threads.clamp(1, runs.max(1));

    let run_one = |run: usize| -> Result<RunRecord, TraceNetError> {
        let mut run_parameters = parameters.clone();
        run_parameters.seed = parameters.seed.wrapping_add(run as u64);
        let mut simulation = Simulation::new(run_parameters)?;
        simulation.run();
        Ok(simulation.record())
    };

    let mut records: Vec<Option<RunRecord>> = vec![None; runs];
    thread::scope(|scope| -> Result<(), TraceNetError> {
        let handles: Vec<_> = (0..threads)
            .map(|worker| {
                scope.spawn(move || {
                    (worker..runs)
                        .step_by(threads)
                        .map(|run| run_one(run).map(|record| (run, record)))
                        .collect::<Result<Vec<_>, TraceNetError>>()
                })
            })
            .collect();
        for handle in handles {
            let finished = handle
                .join()
                .map_err(|_| TraceNetError::TraceNetError("simulation thread panicked".into()))??;
            for (run, record) in finished {
                records[run] = Some(record);
            }
        }
        Ok(())
    })?;

    Ok(records.into_iter().flatten().collect())
}

/// One point of a parameter sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepPoint {
    pub parameters: ParametersValues,
    /// File stem for the results of this point.
    pub file_stem: String,
}

/// The cartesian product of `app_usage_rates` and `quarantine_probabilities` applied to `base`.
/// An empty list keeps the base value; with both lists empty there is a single point.
#[must_use]
pub fn sweep_points(
    base: &ParametersValues,
    app_usage_rates: &[f64],
    quarantine_probabilities: &[f64],
) -> Vec<SweepPoint> {
    if app_usage_rates.is_empty() && quarantine_probabilities.is_empty() {
        return vec![SweepPoint {
            parameters: base.clone(),
            file_stem: "simulation_results".to_string(),
        }];
    }

    let app_usage_rates = if app_usage_rates.is_empty() {
        vec![base.app_usage_rate]
    } else {
        app_usage_rates.to_vec()
    };
    let quarantine_probabilities = if quarantine_probabilities.is_empty() {
        vec![base.quarantine_probability]
    } else {
        quarantine_probabilities.to_vec()
    };

    let mut points = Vec::with_capacity(app_usage_rates.len() * quarantine_probabilities.len());
    for &app_usage_rate in &app_usage_rates {
        for &quarantine_probability in &quarantine_probabilities {
            let mut parameters = base.clone();
            parameters.app_usage_rate = app_usage_rate;
            parameters.quarantine_probability = quarantine_probability;
            points.push(SweepPoint {
                parameters,
                file_stem: format!(
                    "simulation_results_A={app_usage_rate}_Q={quarantine_probability}"
                ),
            });
        }
    }
    points
}

/// Results of one sweep point.
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    pub point: SweepPoint,
    pub results: SimulationResults,
}

fn summarise(outcome: &BatchOutcome) -> String {
    let means = outcome.results.mean_daily_counts();
    let final_removed = means.last().map_or(0.0, |counts| counts.removed);
    let peak_infected = means
        .iter()
        .map(|counts| counts.infected)
        .fold(0.0, f64::max);
    let precision = outcome
        .results
        .quarantine_precision()
        .map_or_else(|| "n/a".to_string(), |p| format!("{p:.3}"));
    format!(
        "{}: {} runs, mean removed {final_removed:.2} of {}, mean peak infected {peak_infected:.2}, quarantine precision {precision}",
        outcome.point.file_stem,
        outcome.results.runs(),
        outcome.results.n_total,
    )
}

fn write_outcome(outcome: &BatchOutcome, output_dir: &Path) -> Result<(), TraceNetError> {
    let stem = &outcome.point.file_stem;
    outcome
        .results
        .write_json(&output_dir.join(format!("{stem}.json")))?;
    outcome
        .results
        .write_daily_counts_csv(&output_dir.join(format!("{stem}_daily_counts.csv")))?;
    Ok(())
}

/// Parses the command line and runs every sweep point.
///
/// # Errors
/// Returns an error if argument parsing, configuration, a run or writing results fails.
pub fn run_with_args() -> Result<Vec<BatchOutcome>, Box<dyn std::error::Error>> {
    let matches = create_tracenet_cli().get_matches();
    let args = BaseArgs::from_arg_matches(&matches)?;
    Ok(run_with_args_internal(&args)?)
}

/// Resolves the run parameters from the config file and the command line overrides.
///
/// # Errors
/// Returns an error if the config file cannot be read or the result is invalid.
pub fn resolve_parameters(args: &BaseArgs) -> Result<ParametersValues, TraceNetError> {
    let mut parameters = match &args.config {
        Some(path) => {
            info!("loading parameters from {}", path.display());
            load_parameters_from_json(path)?
        }
        None => ParametersValues::default(),
    };
    if let Some(seed) = args.random_seed {
        parameters.seed = seed;
    }
    if let Some(days) = args.days {
        parameters.max_days = days;
    }
    parameters.validate()?;
    Ok(parameters)
}

fn run_with_args_internal(args: &BaseArgs) -> Result<Vec<BatchOutcome>, TraceNetError> {
    if let Some(level) = &args.log_level {
        let level = LevelFilter::from_str(level)
            .map_err(|_| TraceNetError::InvalidArgument(format!("unknown log level {level}")))?;
        set_log_level(level);
    }

    let base = resolve_parameters(args)?;
    let points = sweep_points(&base, &args.app_usage_rates, &args.quarantine_probabilities);
    for point in &points {
        point.parameters.validate()?;
    }

    let mut outcomes = Vec::with_capacity(points.len());
    for point in points {
        info!(
            "running {} x {} days for {}",
            args.runs, point.parameters.max_days, point.file_stem
        );
        let records = run_batch(&point.parameters, args.runs, args.threads)?;
        let results = SimulationResults::from_records(
            &records,
            point.parameters.max_days,
            point.parameters.population_size(),
        );
        let outcome = BatchOutcome { point, results };
        if let Some(output_dir) = &args.output_dir {
            write_outcome(&outcome, output_dir)?;
        }
        println!("{}", summarise(&outcome));
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParametersValuesBuilder;
    use tempfile::tempdir;

    fn small_parameters() -> ParametersValues {
        ParametersValuesBuilder::default()
            .max_days(30)
            .initial_infection_rate(0.1)
            .seed(7)
            .build()
            .unwrap()
    }

    fn args() -> BaseArgs {
        BaseArgs {
            runs: 3,
            threads: 1,
            days: Some(20),
            ..BaseArgs::default()
        }
    }

    #[test]
    fn batch_is_independent_of_thread_count() {
        let parameters = small_parameters();
        let sequential = run_batch(&parameters, 5, 1).unwrap();
        let parallel = run_batch(&parameters, 5, 3).unwrap();
        assert_eq!(sequential.len(), 5);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn batch_runs_use_consecutive_seeds() {
        let parameters = small_parameters();
        let batch = run_batch(&parameters, 2, 2).unwrap();

        let mut second = parameters.clone();
        second.seed = 8;
        let mut simulation = Simulation::new(second).unwrap();
        simulation.run();
        assert_eq!(batch[1], simulation.record());
    }

    #[test]
    fn batch_rejects_invalid_parameters() {
        let mut parameters = small_parameters();
        parameters.connection_degree = 5;
        assert!(matches!(
            run_batch(&parameters, 2, 1),
            Err(TraceNetError::ConfigurationError(_))
        ));
    }

    #[test]
    fn zero_runs_is_empty() {
        assert!(run_batch(&small_parameters(), 0, 4).unwrap().is_empty());
    }

    #[test]
    fn sweep_is_a_cartesian_product() {
        let base = ParametersValues::default();
        let points = sweep_points(&base, &[0.25, 0.75], &[0.5, 1.0]);
        let stems: Vec<&str> = points.iter().map(|p| p.file_stem.as_str()).collect();
        assert_eq!(
            stems,
            vec![
                "simulation_results_A=0.25_Q=0.5",
                "simulation_results_A=0.25_Q=1",
                "simulation_results_A=0.75_Q=0.5",
                "simulation_results_A=0.75_Q=1",
            ]
        );
        assert_eq!(points[3].parameters.app_usage_rate, 0.75);
        assert_eq!(points[3].parameters.quarantine_probability, 1.0);

        let points = sweep_points(&base, &[], &[0.2]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].parameters.app_usage_rate, base.app_usage_rate);

        let points = sweep_points(&base, &[], &[]);
        assert_eq!(points[0].file_stem, "simulation_results");
        assert_eq!(points[0].parameters, base);
    }

    #[test]
    fn command_line_overrides_config() {
        let temp_dir = tempdir().unwrap();
        let config = temp_dir.path().join("config.json");
        std::fs::write(&config, r#"{"seed": 3, "max_days": 50, "rewire_probability": 0.1}"#)
            .unwrap();

        let parameters = resolve_parameters(&BaseArgs {
            config: Some(config.clone()),
            ..args()
        })
        .unwrap();
        assert_eq!(parameters.max_days, 20);
        assert_eq!(parameters.seed, 3);
        assert_eq!(parameters.rewire_probability, 0.1);

        let parameters = resolve_parameters(&BaseArgs {
            config: Some(config),
            random_seed: Some(11),
            days: None,
            ..args()
        })
        .unwrap();
        assert_eq!(parameters.seed, 11);
        assert_eq!(parameters.max_days, 50);
    }

    #[test]
    fn writes_one_file_pair_per_point() {
        let temp_dir = tempdir().unwrap();
        let outcomes = run_with_args_internal(&BaseArgs {
            output_dir: Some(temp_dir.path().to_path_buf()),
            app_usage_rates: vec![0.0, 1.0],
            ..args()
        })
        .unwrap();
        assert_eq!(outcomes.len(), 2);
        for stem in ["simulation_results_A=0_Q=0.5", "simulation_results_A=1_Q=0.5"] {
            assert!(temp_dir.path().join(format!("{stem}.json")).exists());
            assert!(temp_dir
                .path()
                .join(format!("{stem}_daily_counts.csv"))
                .exists());
        }
        assert_eq!(outcomes[0].results.runs(), 3);
        assert_eq!(outcomes[0].results.num_days, 20);
    }

    #[test]
    fn sweep_values_are_validated() {
        let result = run_with_args_internal(&BaseArgs {
            quarantine_probabilities: vec![0.5, 1.5],
            ..args()
        });
        assert!(matches!(result, Err(TraceNetError::ConfigurationError(_))));
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let result = run_with_args_internal(&BaseArgs {
            log_level: Some("loud".to_string()),
            ..args()
        });
        assert!(matches!(result, Err(TraceNetError::InvalidArgument(_))));
    }
}
