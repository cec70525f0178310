use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueHint};
use faultgate::config::PipelineConfig;
use faultgate::frame::{Cell, Frame};
use faultgate::ml::estimator::{ModelBundle, ModelRegistry, TargetMapping};
use faultgate::observability::{MetricsCollector, log_snapshot};
use faultgate::pipeline::{RunOutcome, TrainPipeline};
use faultgate::schema::SchemaConfig;
use faultgate::store::DocumentStore;
use faultgate::sync::MirrorSync;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    configure_tracing()?;
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Train => train(config),
        Commands::Predict { input, output } => predict(config, input, output),
        Commands::ValidateConfig => validate_config(config),
    }
}

#[derive(Parser)]
#[command(
    name = "faultgate",
    about = "Retraining pipeline for the sensor fault classifier",
    version
)]
struct Cli {
    /// Pipeline configuration file. Defaults are used when omitted.
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full retraining pipeline once.
    Train,
    /// Classify a CSV of sensor records with the promoted model.
    Predict {
        /// Input CSV with the schema's feature columns.
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,
        /// Where to write the annotated CSV. Defaults to predictions.csv
        /// next to the input.
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },
    /// Check the pipeline and schema configuration without running anything.
    ValidateConfig,
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn train(config: PipelineConfig) -> Result<()> {
    let schema = SchemaConfig::load(&config.schema_path)?;
    let store = DocumentStore::new(&config.store_root, &config.database);
    let sync = MirrorSync::new(&config.mirror_root);
    let mut pipeline = TrainPipeline::new(config, schema, &store, &sync);

    let result = pipeline.start_run();
    log_snapshot(&MetricsCollector::global().snapshot());
    match result {
        Ok(RunOutcome::Promoted { timestamp, artifact }) => {
            info!(timestamp = timestamp.as_str(), "Training run succeeded");
            println!(
                "Training successful. Model promoted to {}",
                artifact.saved_model_path.display()
            );
            Ok(())
        }
        Ok(RunOutcome::AlreadyRunning) => {
            println!("Training pipeline is already running.");
            Ok(())
        }
        // Gate rejections stop promotion on purpose; report and exit clean.
        Err(err) if err.is_gate_rejection() => {
            println!("Model rejected: {err}");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "Training run failed");
            Err(err.into())
        }
    }
}

fn predict(config: PipelineConfig, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let schema = SchemaConfig::load(&config.schema_path)?;
    let registry = ModelRegistry::new(&config.saved_model_dir);
    let Some(model_path) = registry.best_model_path()? else {
        println!("Model is unavailable. Run training first.");
        return Ok(());
    };
    let bundle = ModelBundle::load(&model_path)?;

    let raw = Frame::read_csv(&input)
        .with_context(|| format!("Failed to read prediction input: {}", input.display()))?;
    let mut features = raw.drop_columns(&schema.drop_columns);
    if features.has_column(&schema.target_column) {
        let (_, without_target) = features.take_column(&schema.target_column)?;
        features = without_target;
    }
    let predictions = bundle.predict_frame(&features)?;

    let mut columns = features.columns().to_vec();
    columns.push("predicted_class".to_string());
    let mut annotated = Frame::new(columns);
    for (row, prediction) in features.rows().iter().zip(&predictions) {
        let mut cells = row.clone();
        cells.push(Cell::Text(TargetMapping::decode(*prediction).to_string()));
        annotated.push_row(cells)?;
    }

    let output = output.unwrap_or_else(|| {
        input
            .parent()
            .map(|p| p.join("predictions.csv"))
            .unwrap_or_else(|| PathBuf::from("predictions.csv"))
    });
    annotated.write_csv(&output)?;
    info!(
        model = %model_path.display(),
        rows = predictions.len(),
        "Predictions written"
    );
    println!("Predictions written to {}", output.display());
    Ok(())
}

fn validate_config(config: PipelineConfig) -> Result<()> {
    config.check()?;
    let schema = SchemaConfig::load(&config.schema_path)?;
    println!("Pipeline configuration OK.");
    println!(
        "Schema OK: {} columns, {} numerical, target '{}'.",
        schema.columns.len(),
        schema.numerical_columns.len(),
        schema.target_column
    );
    Ok(())
}
