use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use heatgrid_eval::{
    BatchReport, CancellationToken, CityId, CityScope, Dataset, DependenceConfig, HoldoutConfig,
    ResponsePeriod, SelectionConfig, WorkerPool, bootstrap_partial_dependence, compute_swing,
    evaluate_leave_one_city_out, evaluate_n, fit_scoped_models, partial_dependence,
    select_features, select_features_for_scopes,
};
use heatgrid_io::{DatasetReader, ExperimentName, ResultWriter, read_partial_dependence};
use heatgrid_models::{
    DEFAULT_SEED, GamConfig, GradientBoostingConfig, ModelFamily, ModelSuite, RandomForestConfig,
};

#[derive(Parser)]
#[command(name = "heatgrid")]
#[command(about = "Spatial holdout evaluation of land-surface-temperature models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility (fresh entropy for splits when omitted)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Upper bound on worker threads (defaults to min(50, cores))
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Input table and output location shared by every subcommand that reads cells.
#[derive(Args, Debug, Clone)]
struct InputArgs {
    /// Path to the grid-cell CSV file
    #[arg(long)]
    data: PathBuf,

    /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
    #[arg(long)]
    experiment: String,

    /// Output directory for result files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Columns to drop before modelling (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "area")]
    skip_columns: Vec<String>,
}

/// Hyperparameters of the fitted model families.
#[derive(Args, Debug, Clone)]
struct ModelArgs {
    /// Boosting rounds for the gradient-boosted trees
    #[arg(long, default_value_t = 500)]
    gbrt_estimators: usize,

    /// Shrinkage per boosting round
    #[arg(long, default_value_t = 0.1)]
    gbrt_learning_rate: f64,

    /// Trees in the random forest
    #[arg(long, default_value_t = 500)]
    rf_trees: usize,

    /// Smoothing penalty of the additive model
    #[arg(long, default_value_t = 0.6)]
    gam_lam: f64,
}

impl ModelArgs {
    fn gradient_boosting(&self, seed: u64) -> GradientBoostingConfig {
        GradientBoostingConfig::new()
            .with_n_estimators(self.gbrt_estimators)
            .with_learning_rate(self.gbrt_learning_rate)
            .with_seed(seed)
    }

    fn suite(&self, seed: u64) -> ModelSuite {
        ModelSuite::new()
            .with_gradient_boosting(self.gradient_boosting(seed))
            .with_random_forest(RandomForestConfig::new().with_n_trees(self.rf_trees))
            .with_gam(GamConfig::new().with_lam(self.gam_lam))
            .with_seed(seed)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PeriodArg {
    Day,
    Night,
}

impl From<PeriodArg> for ResponsePeriod {
    fn from(period: PeriodArg) -> Self {
        match period {
            PeriodArg::Day => ResponsePeriod::Day,
            PeriodArg::Night => ResponsePeriod::Night,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Score every model family on repeated random spatial holdouts
    Holdout {
        #[command(flatten)]
        input: InputArgs,

        /// Number of independent holdout trials
        #[arg(long, default_value_t = 100)]
        trials: usize,

        /// Target fraction of rows held out per trial
        #[arg(long, default_value_t = 0.2)]
        test_fraction: f64,

        /// Model families to score (comma-separated labels; defaults to all)
        #[arg(long, value_delimiter = ',', value_parser = parse_family)]
        models: Vec<ModelFamily>,

        #[command(flatten)]
        model_args: ModelArgs,
    },

    /// Score every model family with each city held out in turn
    CityHoldout {
        #[command(flatten)]
        input: InputArgs,

        /// Cities to hold out (comma-separated; defaults to every city)
        #[arg(long, value_delimiter = ',')]
        cities: Vec<String>,

        /// Model families to score (comma-separated labels; defaults to all)
        #[arg(long, value_delimiter = ',', value_parser = parse_family)]
        models: Vec<ModelFamily>,

        #[command(flatten)]
        model_args: ModelArgs,
    },

    /// Sweep partial dependence on the full data and bootstrap replicates
    Dependence {
        #[command(flatten)]
        input: InputArgs,

        /// Features to sweep (comma-separated)
        #[arg(
            long,
            value_delimiter = ',',
            default_value = "alb_mean,bldg,tree_mean"
        )]
        features: Vec<String>,

        /// Grid points per feature
        #[arg(long, default_value_t = heatgrid_eval::DEFAULT_RESOLUTION)]
        resolution: usize,

        /// Number of group-bootstrap replicates (0 = full data only)
        #[arg(long, default_value_t = 0)]
        bootstrap: usize,

        /// Model families to sweep (comma-separated labels; defaults to all fitted)
        #[arg(long, value_delimiter = ',', value_parser = parse_family)]
        models: Vec<ModelFamily>,

        #[command(flatten)]
        model_args: ModelArgs,
    },

    /// Derive swing importance from a partial-dependence table
    Swing {
        /// Path to a partial-dependence CSV written by `dependence`
        #[arg(long)]
        pd: PathBuf,

        /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Rank covariates by greedy forward selection
    Select {
        #[command(flatten)]
        input: InputArgs,

        /// Holdout trials averaged per candidate
        #[arg(long, default_value_t = 25)]
        trials: usize,

        /// Target fraction of rows held out per trial
        #[arg(long, default_value_t = 0.25)]
        test_fraction: f64,

        /// Restrict to one city (defaults to pooled data plus every city)
        #[arg(long)]
        city: Option<String>,

        /// Restrict to one response (defaults to both)
        #[arg(long, value_enum)]
        period: Option<PeriodArg>,

        /// Boosting rounds for the candidate models
        #[arg(long, default_value_t = 500)]
        gbrt_estimators: usize,
    },

    /// Fit gradient-boosted trees per scope and report importances
    FitScoped {
        #[command(flatten)]
        input: InputArgs,

        /// Covariates to fit on (comma-separated; defaults to all)
        #[arg(long, value_delimiter = ',')]
        features: Vec<String>,

        #[command(flatten)]
        model_args: ModelArgs,
    },
}

// --- JSON summaries printed to stdout ---

#[derive(Serialize)]
struct EvaluationOutput {
    experiment: String,
    n_rows: usize,
    n_units: usize,
    n_records: usize,
    n_failures: usize,
    results_path: String,
}

#[derive(Serialize)]
struct DependenceOutput {
    experiment: String,
    n_rows: usize,
    n_boot: usize,
    n_records: usize,
    n_failures: usize,
    paths: Vec<String>,
}

#[derive(Serialize)]
struct SwingOutput {
    experiment: String,
    n_input_records: usize,
    n_swings: usize,
    swing_path: String,
}

#[derive(Serialize)]
struct SelectionOutput {
    experiment: String,
    traces: Vec<TraceSummary>,
    selection_path: String,
}

#[derive(Serialize)]
struct TraceSummary {
    scope: String,
    period: ResponsePeriod,
    completed: bool,
    features: Vec<String>,
}

#[derive(Serialize)]
struct ScopedOutput {
    experiment: String,
    models: Vec<ScopedSummary>,
    models_path: String,
}

#[derive(Serialize)]
struct ScopedSummary {
    scope: String,
    period: ResponsePeriod,
    r2: f64,
    mae: f64,
}

fn parse_family(label: &str) -> Result<ModelFamily, String> {
    label.parse().map_err(|e: heatgrid_models::ModelError| e.to_string())
}

fn load_dataset(input: &InputArgs) -> Result<Dataset> {
    let dataset = DatasetReader::new(&input.data)
        .with_skipped_columns(input.skip_columns.clone())
        .read()
        .context("failed to read input CSV")?;
    info!(
        n_rows = dataset.len(),
        n_covariates = dataset.covariate_names().len(),
        n_cities = dataset.cities().len(),
        "dataset loaded"
    );
    Ok(dataset)
}

fn open_writer(output_dir: &Path, experiment: &str) -> Result<ResultWriter> {
    let name = ExperimentName::new(experiment.to_owned())?;
    ResultWriter::new(output_dir, name).context("failed to prepare output directory")
}

fn warn_failures<R>(report: &BatchReport<R>) {
    for failure in &report.failures {
        warn!(unit = %failure.unit, error = %failure.error, "unit failed");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let pool = WorkerPool::new(cli.threads).context("failed to configure worker pool")?;
    info!(n_workers = pool.n_workers(), "worker pool configured");
    let cancel = CancellationToken::new();
    let seed = cli.seed;
    let model_seed = seed.unwrap_or(DEFAULT_SEED);

    match cli.command {
        Command::Holdout {
            input,
            trials,
            test_fraction,
            models,
            model_args,
        } => {
            let dataset = load_dataset(&input)?;
            let writer = open_writer(&input.output_dir, &input.experiment)?;

            let mut config = HoldoutConfig::new()
                .with_test_fraction(test_fraction)
                .with_suite(model_args.suite(model_seed));
            if !models.is_empty() {
                config = config.with_families(models);
            }

            let report = evaluate_n(&dataset, trials, &config, &pool, seed)
                .context("random holdout evaluation failed")?;
            warn_failures(&report);
            let path = writer.write_holdout_results(&report.records)?;

            let output = EvaluationOutput {
                experiment: input.experiment,
                n_rows: dataset.len(),
                n_units: trials,
                n_records: report.records.len(),
                n_failures: report.failures.len(),
                results_path: path.display().to_string(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::CityHoldout {
            input,
            cities,
            models,
            model_args,
        } => {
            let dataset = load_dataset(&input)?;
            let writer = open_writer(&input.output_dir, &input.experiment)?;

            let cities: Vec<CityId> = if cities.is_empty() {
                dataset.cities()
            } else {
                cities.into_iter().map(CityId::new).collect()
            };
            let mut config = HoldoutConfig::new().with_suite(model_args.suite(model_seed));
            if !models.is_empty() {
                config = config.with_families(models);
            }

            let report = evaluate_leave_one_city_out(&dataset, &cities, &config, &pool)
                .context("leave-one-city-out evaluation failed")?;
            warn_failures(&report);
            let path = writer.write_city_holdout_results(&report.records)?;

            let output = EvaluationOutput {
                experiment: input.experiment,
                n_rows: dataset.len(),
                n_units: cities.len(),
                n_records: report.records.len(),
                n_failures: report.failures.len(),
                results_path: path.display().to_string(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Dependence {
            input,
            features,
            resolution,
            bootstrap,
            models,
            model_args,
        } => {
            let dataset = load_dataset(&input)?;
            let writer = open_writer(&input.output_dir, &input.experiment)?;

            let mut config = DependenceConfig::new()
                .with_features(features)
                .with_resolution(resolution)
                .with_suite(model_args.suite(model_seed));
            if !models.is_empty() {
                config = config.with_families(models);
            }

            let mut report = pool
                .install(|| partial_dependence(&dataset, &config, None))
                .context("partial dependence failed")?;
            if bootstrap > 0 {
                let replicates = bootstrap_partial_dependence(
                    &dataset,
                    bootstrap,
                    &config,
                    &pool,
                    seed,
                    &cancel,
                )
                .context("bootstrap partial dependence failed")?;
                report.merge(replicates);
            }
            warn_failures(&report);
            let paths = writer.write_partial_dependence(&report.records)?;

            let output = DependenceOutput {
                experiment: input.experiment,
                n_rows: dataset.len(),
                n_boot: bootstrap,
                n_records: report.records.len(),
                n_failures: report.failures.len(),
                paths: paths.iter().map(|p| p.display().to_string()).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Swing {
            pd,
            experiment,
            output_dir,
        } => {
            let writer = open_writer(&output_dir, &experiment)?;
            let records =
                read_partial_dependence(&pd).context("failed to read partial dependence CSV")?;
            let swings = compute_swing(&records);
            let path = writer.write_swing(&swings)?;

            let output = SwingOutput {
                experiment,
                n_input_records: records.len(),
                n_swings: swings.len(),
                swing_path: path.display().to_string(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Select {
            input,
            trials,
            test_fraction,
            city,
            period,
            gbrt_estimators,
        } => {
            let dataset = load_dataset(&input)?;
            let writer = open_writer(&input.output_dir, &input.experiment)?;

            let config = SelectionConfig::new()
                .with_holdout_trials(trials)
                .with_test_fraction(test_fraction)
                .with_gradient_boosting(
                    GradientBoostingConfig::new()
                        .with_n_estimators(gbrt_estimators)
                        .with_seed(model_seed),
                );

            let traces = if city.is_none() && period.is_none() {
                select_features_for_scopes(&dataset, &config, &pool, seed, &cancel)
                    .context("feature selection failed")?
            } else {
                let scope = city.map_or(CityScope::All, |c| CityScope::City(CityId::new(c)));
                let periods: Vec<ResponsePeriod> = match period {
                    Some(p) => vec![p.into()],
                    None => ResponsePeriod::BOTH.to_vec(),
                };
                periods
                    .into_iter()
                    .map(|p| {
                        select_features(&dataset, &scope, p, &config, &pool, seed, &cancel)
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .context("feature selection failed")?
            };
            let path = writer.write_selection(&traces)?;

            let output = SelectionOutput {
                experiment: input.experiment,
                traces: traces
                    .iter()
                    .map(|t| TraceSummary {
                        scope: t.scope.to_string(),
                        period: t.period,
                        completed: t.completed,
                        features: t.features(),
                    })
                    .collect(),
                selection_path: path.display().to_string(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::FitScoped {
            input,
            features,
            model_args,
        } => {
            let dataset = load_dataset(&input)?;
            let writer = open_writer(&input.output_dir, &input.experiment)?;

            let selected = (!features.is_empty()).then_some(features.as_slice());
            let models = fit_scoped_models(
                &dataset,
                selected,
                &model_args.gradient_boosting(model_seed),
                &pool,
            )
            .context("scoped model fitting failed")?;
            let path = writer.write_scoped_models(&models)?;

            let output = ScopedOutput {
                experiment: input.experiment,
                models: models
                    .iter()
                    .map(|m| ScopedSummary {
                        scope: m.scope.to_string(),
                        period: m.period,
                        r2: m.r2,
                        mae: m.mae,
                    })
                    .collect(),
                models_path: path.display().to_string(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
