use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::{extract_face_points, ComparisonResult, JsonExtractor, ScrfdExtractor};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod compare;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "facematch", about = "Compare two faces by facial landmark distance")]
struct Cli {
    /// TOML configuration file (defaults to $FACEMATCH_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Mean landmark distance below which two faces match, in canvas units
    #[arg(long, global = true)]
    threshold: Option<f64>,
    /// Canvas width both images are mapped into
    #[arg(long, global = true)]
    canvas_width: Option<f64>,
    /// Canvas height both images are mapped into
    #[arg(long, global = true)]
    canvas_height: Option<f64>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two face images using the SCRFD detector
    Compare {
        reference: PathBuf,
        candidate: PathBuf,
        /// SCRFD ONNX model (defaults to <model_dir>/<scrfd_model>)
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Compare two recorded detection documents
    CompareJson {
        reference: PathBuf,
        candidate: PathBuf,
    },
    /// Print the canvas landmark points detected in one image
    Detect {
        image: PathBuf,
        #[arg(long)]
        model: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    if let Some(width) = cli.canvas_width {
        config.canvas_width = width;
    }
    if let Some(height) = cli.canvas_height {
        config.canvas_height = height;
    }
    config.validate()?;

    match cli.command {
        Commands::Compare { reference, candidate, model } => {
            let extractor = load_scrfd(&config, model.as_deref())?;
            let result = compare::run_comparison(
                extractor,
                compare::load_image,
                reference,
                candidate,
                config.canvas(),
                config.scorer(),
            )
            .await?;
            report(&result, cli.json)?;
        }
        Commands::CompareJson { reference, candidate } => {
            let result = compare::run_comparison(
                JsonExtractor,
                compare::load_detections,
                reference,
                candidate,
                config.canvas(),
                config.scorer(),
            )
            .await?;
            report(&result, cli.json)?;
        }
        Commands::Detect { image, model } => {
            let mut extractor = load_scrfd(&config, model.as_deref())?;
            let canvas = config.canvas();
            let input = compare::load_image(&image, canvas)?;
            let points = extract_face_points(&mut extractor, &input, canvas)
                .with_context(|| format!("image {}", image.display()))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&points)?);
            } else {
                for (i, p) in points.iter().enumerate() {
                    println!("{i}: ({:.2}, {:.2})", p.x, p.y);
                }
            }
        }
    }

    Ok(())
}

fn load_scrfd(config: &Config, model: Option<&Path>) -> Result<ScrfdExtractor> {
    let path = model.map(Path::to_path_buf).unwrap_or_else(|| config.scrfd_model_path());
    ScrfdExtractor::load(&path).with_context(|| format!("loading SCRFD model {}", path.display()))
}

fn report(result: &ComparisonResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        let verdict = if result.is_same() { "same person" } else { "different person" };
        println!(
            "{verdict}: mean distance {:.4} over {} landmarks (threshold {})",
            result.mean_distance, result.point_count, result.threshold
        );
    }
    Ok(())
}
