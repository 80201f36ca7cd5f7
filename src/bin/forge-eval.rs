#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use forge_eval::dataset::decode_case;
use forge_eval::gateway::{ResilientInvoker, TracingUsageSink};
use forge_eval::metrics::{MetricInput, MetricSuite};
use forge_eval::parse::parse_recommendations;
use forge_eval::report::render_report_markdown;
use forge_eval::runner::CaseRunner;
use forge_eval::{
    Catalog, DatasetStore, EvalSettings, FileDatasetStore, JsonlResultsSink, RunConfig,
    RunOrchestrator, RunReport,
};

#[derive(Parser)]
#[command(name = "forge-eval", version, about = "Recommendation evaluation harness")]
struct Cli {
    /// Debug-level logging
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a dataset through the model and score every case (LLM calls)
    Run {
        /// Dataset name, resolved as <dataset-dir>/<name>.json or .jsonl
        #[arg(long)]
        dataset: String,
        #[arg(long, default_value = "datasets")]
        dataset_dir: PathBuf,
        /// Catalog JSON file; the built-in catalog is used when omitted
        #[arg(long)]
        catalog: Option<PathBuf>,
        #[arg(long)]
        experiment: Option<String>,
        /// Append per-case results to this JSONL file
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write the report here instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ReportFormat::Md)]
        format: ReportFormat,
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
        /// Only run the first N cases
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum aggregate case score (0 to 1) to count as passed
        #[arg(long)]
        pass_threshold: Option<f64>,
    },
    /// Score a saved model output against one test case (no LLM calls)
    Score {
        #[arg(long)]
        output_file: PathBuf,
        /// Test case JSON (flat or dataset-item shape)
        #[arg(long)]
        case: PathBuf,
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Print the rendered tool catalog
    Catalog {
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Md,
    Json,
}

fn setup_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Catalog::from_path(path)?),
        None => Ok(Catalog::builtin()),
    }
}

fn render(report: &RunReport, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Md => Ok(render_report_markdown(report)),
        ReportFormat::Json => serde_json::to_string_pretty(report),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            dataset,
            dataset_dir,
            catalog,
            experiment,
            out,
            report,
            format,
            concurrency,
            limit,
            pass_threshold,
        } => {
            if concurrency == 0 {
                return Err("--concurrency must be >= 1".into());
            }
            if pass_threshold.is_some_and(|t| !(0.0..=1.0).contains(&t)) {
                return Err("--pass-threshold must be between 0 and 1".into());
            }
            let settings = EvalSettings::from_env()?;
            let catalog = Arc::new(load_catalog(catalog.as_deref())?);

            let store = FileDatasetStore::new(dataset_dir);
            let mut cases = store.fetch(&dataset).await?;
            if let Some(limit) = limit {
                cases.truncate(limit);
            }

            let invoker = ResilientInvoker::new(
                settings.adapter()?,
                Arc::new(TracingUsageSink),
                settings.invoker_config(),
            );
            let runner =
                CaseRunner::new(Arc::new(invoker), catalog.clone(), settings.runner_config());
            let orchestrator = RunOrchestrator::new(
                runner,
                MetricSuite::standard(&catalog),
                RunConfig {
                    experiment_name: experiment.unwrap_or_else(|| format!("forge-eval-{dataset}")),
                    call_delay: settings.call_delay,
                    concurrency,
                    pass_threshold: pass_threshold.unwrap_or(settings.pass_threshold),
                    ..Default::default()
                },
            );

            let cancel = Arc::new(AtomicBool::new(false));
            let signal_flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received; finishing in-flight cases");
                    signal_flag.store(true, AtomicOrdering::Relaxed);
                }
            });

            let (run_report, sink_error) = match out {
                Some(path) => {
                    let sink = JsonlResultsSink::new(path);
                    match orchestrator
                        .run_and_submit(&cases, Some(cancel.as_ref()), &sink)
                        .await
                    {
                        Ok(run_report) => (run_report, None),
                        Err(err) => {
                            let (run_report, source) = err.into_parts();
                            (run_report, Some(source))
                        }
                    }
                }
                None => (orchestrator.run(&cases, Some(cancel.as_ref())).await, None),
            };

            // The report is published even when submission failed.
            let rendered = render(&run_report, format)?;
            match report {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    eprintln!("[run] report written to {}", path.display());
                }
                None => println!("{rendered}"),
            }
            if let Some(err) = sink_error {
                return Err(format!("results sink failed: {err}").into());
            }
        }
        Commands::Score {
            output_file,
            case,
            catalog,
        } => {
            let catalog = load_catalog(catalog.as_deref())?;
            let output = std::fs::read_to_string(&output_file)?;
            let case_value: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(&case)?)?;
            let case = decode_case(case_value, 0)?;

            let recommendations = parse_recommendations(&output);
            let scores = MetricSuite::standard(&catalog).score_all(&MetricInput {
                recommendations: &recommendations,
                expected: &case.expected_traits,
                profile: &case.user_profile,
            });
            println!("{}", serde_json::to_string_pretty(&scores)?);
        }
        Commands::Catalog { catalog } => {
            let catalog = load_catalog(catalog.as_deref())?;
            println!("{}", catalog.render());
        }
    }

    Ok(())
}
