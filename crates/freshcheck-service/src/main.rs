//! freshcheck
//!
//! Command-line front end for the produce freshness classifier: manage model
//! artifacts and their promotion history, classify images with the active
//! model, and retrain it on labeled samples.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use freshcheck_classifiers::loader::{self, UploadContext};
use freshcheck_classifiers::{preprocess, LabelMap};
use freshcheck_core::{ColorMode, Error, ImageGeometry, Status};
use freshcheck_registry::{FileRegistry, ModelRegistry};
use freshcheck_service::{describe_metrics, ConfigOverrides, FreshnessService, ServiceConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "freshcheck")]
#[command(about = "Produce freshness classifier and model registry", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "freshcheck.yaml", env = "FRESHCHECK_CONFIG")]
    config: PathBuf,

    /// Registry directory
    #[arg(short, long, env = "FRESHCHECK_REGISTRY")]
    registry: Option<PathBuf>,

    /// Abort retraining after this many seconds
    #[arg(long)]
    retrain_timeout: Option<u64>,

    /// Do not record classifications
    #[arg(long)]
    no_record: bool,

    /// Training epochs for retrainable backends
    #[arg(long)]
    epochs: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store an uploaded model (artifact envelope or native model)
    Upload {
        file: PathBuf,

        /// Artifact name (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,

        /// Labels for a bare model, in index order
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,

        #[command(flatten)]
        geometry: GeometryArgs,

        /// Recorded performance score
        #[arg(long, default_value_t = 0.0)]
        performance: f64,

        /// Promote the stored artifact right away
        #[arg(long)]
        promote: bool,
    },

    /// Build an image-model envelope from a safetensors weights file
    Pack {
        weights: PathBuf,

        /// Labels in index order
        #[arg(long, value_delimiter = ',', required = true)]
        labels: Vec<String>,

        #[command(flatten)]
        geometry: GeometryArgs,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List stored artifacts
    List,

    /// Show one artifact
    Show { id: u64 },

    /// Remove an artifact
    Erase { id: u64 },

    /// Make an artifact active
    Promote { id: u64 },

    /// Show promotion history
    History {
        /// A single entry
        id: Option<u64>,

        /// Check the hash chain
        #[arg(long)]
        verify: bool,
    },

    /// Show the active artifact
    Active,

    /// Classify an image with the active model
    Classify { image: PathBuf },

    /// Retrain the active model and store the result
    Retrain {
        /// Labeled sample as LABEL=PATH, repeatable
        #[arg(long = "sample", value_parser = parse_sample, required = true)]
        samples: Vec<(String, PathBuf)>,

        /// Name of the new artifact
        #[arg(long)]
        name: Option<String>,
    },

    /// Show recorded predictions
    Predictions {
        /// A single prediction
        id: Option<u64>,
    },
}

#[derive(Args, Debug)]
struct GeometryArgs {
    /// Input width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Input height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Colour mode: L, RGB or RGBA
    #[arg(long)]
    mode: Option<ColorMode>,
}

impl GeometryArgs {
    /// Geometry from the flags, defaults filling any that are missing
    fn resolve(&self) -> Option<ImageGeometry> {
        if self.width.is_none() && self.height.is_none() && self.mode.is_none() {
            return None;
        }
        let default = ImageGeometry::default();
        Some(ImageGeometry::new(
            self.width.unwrap_or(default.width),
            self.height.unwrap_or(default.height),
            self.mode.unwrap_or(default.color_mode),
        ))
    }
}

fn parse_sample(value: &str) -> std::result::Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((label, path)) if !label.is_empty() && !path.is_empty() => {
            Ok((label.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected LABEL=PATH, got '{}'", value)),
    }
}

fn label_map(labels: &[String]) -> Result<Option<LabelMap>> {
    if labels.is_empty() {
        return Ok(None);
    }
    Ok(Some(LabelMap::from_labels(labels.iter().cloned())?))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);
    describe_metrics();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            exit_code(&e)
        }
    }
}

/// Exit code for the response class of an error
fn exit_code(err: &anyhow::Error) -> ExitCode {
    let status = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map_or(Status::BadRequest, Error::status);

    match status {
        Status::Ok => ExitCode::SUCCESS,
        Status::BadRequest => ExitCode::from(2),
        Status::NotFound => ExitCode::from(3),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let overrides = ConfigOverrides {
        registry_dir: cli.registry.clone(),
        retrain_timeout_secs: cli.retrain_timeout,
        record_predictions: cli.no_record.then_some(false),
        epochs: cli.epochs,
    };
    let config = ServiceConfig::load(&cli.config, &overrides)?;

    // packing is offline and does not touch the registry
    if let Command::Pack {
        weights,
        labels,
        geometry,
        output,
    } = &cli.command
    {
        let bytes = tokio::fs::read(weights)
            .await
            .with_context(|| format!("reading {}", weights.display()))?;
        let labels = LabelMap::from_labels(labels.iter().cloned())?;
        let envelope = loader::pack_image_model(bytes, labels, geometry.resolve().unwrap_or_default())?;
        tokio::fs::write(output, envelope)
            .await
            .with_context(|| format!("writing {}", output.display()))?;
        info!(output = %output.display(), "Packed image model");
        return Ok(());
    }

    let registry: Arc<dyn ModelRegistry> = Arc::new(FileRegistry::open(&config.registry_dir).await?);
    let service = FreshnessService::new(registry.clone(), config);

    match cli.command {
        Command::Upload {
            file,
            name,
            labels,
            geometry,
            performance,
            promote,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let name = name.unwrap_or_else(|| {
                file.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "uploaded".to_string())
            });
            let context = UploadContext {
                labels: label_map(&labels)?,
                geometry: geometry.resolve(),
            };

            let id = service.upload(&name, &bytes, &context, performance).await?;
            if promote {
                service.promote(id).await?;
            }
            print_json(&serde_json::json!({ "id": id, "promoted": promote }))
        }
        Command::Pack { .. } => Ok(()),
        Command::List => print_json(&registry.artifacts().await?),
        Command::Show { id } => {
            let record = registry.artifact(id).await?;
            let labels: Vec<(usize, &str)> = record.artifact.labels().iter().collect();
            print_json(&serde_json::json!({
                "summary": record.summary(),
                "labels": labels,
                "payload_bytes": record.artifact.payload().len(),
                "payload_sha256": record.artifact.payload_digest(),
            }))
        }
        Command::Erase { id } => {
            if !registry.erase(id).await? {
                return Err(Error::not_found(format!("artifact {}", id)).into());
            }
            print_json(&serde_json::json!({ "erased": id }))
        }
        Command::Promote { id } => print_json(&service.promote(id).await?),
        Command::History { id, verify } => {
            if verify {
                let intact = registry.verify_history().await?;
                print_json(&serde_json::json!({ "intact": intact }))?;
                if !intact {
                    return Err(Error::storage("version history failed verification").into());
                }
                return Ok(());
            }
            match id {
                Some(id) => print_json(&registry.history_entry(id).await?),
                None => print_json(&registry.history().await?),
            }
        }
        Command::Active => match registry.active_artifact().await? {
            Some(record) => print_json(&record.summary()),
            None => Err(Error::not_found("no active model").into()),
        },
        Command::Classify { image } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("reading {}", image.display()))?;
            print_json(&service.classify_one(&bytes).await?)
        }
        Command::Retrain { samples, name } => {
            let mut labeled = Vec::with_capacity(samples.len());
            for (label, path) in samples {
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                labeled.push((label, preprocess::decode_image(&bytes)?));
            }
            let id = service.retrain_active(labeled, name).await?;
            print_json(&serde_json::json!({ "id": id }))
        }
        Command::Predictions { id } => match id {
            Some(id) => {
                let record = registry.prediction(id).await?;
                print_json(&serde_json::json!({
                    "prediction": record,
                    "image_bytes": record.image.len(),
                }))
            }
            None => print_json(&registry.predictions().await?),
        },
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("freshcheck=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("freshcheck=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
