//! IDC Grad-CAM CLI
//!
//! Terminal client for the IDC inference server, plus local inference and
//! model initialisation helpers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use image::RgbImage;
use tracing::info;

use idc_gradcam::backend::{backend_name, default_device, DefaultBackend};
use idc_gradcam::client::{
    ConnectionStatus, IdcClient, SampleGallery, BACKEND_URL_ENV, DEFAULT_BACKEND_URL,
    DEFAULT_SAMPLES_DIR,
};
use idc_gradcam::inference::preprocess::decode_image;
use idc_gradcam::inference::{DefaultEngine, Diagnosis};
use idc_gradcam::model::{self, IdcClassifierConfig, DEFAULT_GRADCAM_LAYER};
use idc_gradcam::overlay;
use idc_gradcam::utils::format_millis;
use idc_gradcam::utils::logging::{init_logging, LogConfig};

/// IDC Detection with Grad-CAM
///
/// Sends histopathology tiles to the inference server and saves the
/// Grad-CAM overlay it returns.
#[derive(Parser, Debug)]
#[command(name = "idc")]
#[command(version)]
#[command(about = "IDC detection with Grad-CAM explanations", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Inference server base URL
    #[arg(long, global = true, env = BACKEND_URL_ENV, default_value = DEFAULT_BACKEND_URL)]
    backend_url: String,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether the inference server is reachable
    Status,

    /// List the sample gallery
    Samples {
        /// Directory holding sample images
        #[arg(long, default_value = DEFAULT_SAMPLES_DIR)]
        samples_dir: PathBuf,
    },

    /// Send an image to the server and save the Grad-CAM overlay
    Predict {
        /// Image to upload (takes priority over --sample)
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Name of a sample image from the gallery
        #[arg(short, long)]
        sample: Option<String>,

        /// Directory holding sample images
        #[arg(long, default_value = DEFAULT_SAMPLES_DIR)]
        samples_dir: PathBuf,

        /// Directory for gradcam.png and comparison.png
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },

    /// Run the full pipeline locally, without the server
    Infer {
        /// Image to analyse
        #[arg(short, long)]
        image: PathBuf,

        /// Path to the model record (.mpk)
        #[arg(short, long)]
        model: PathBuf,

        /// Model config JSON (defaults to the file next to the record)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Convolutional layer to explain
        #[arg(long, default_value = DEFAULT_GRADCAM_LAYER)]
        layer: String,

        /// Directory for gradcam.png and comparison.png
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },

    /// Write a randomly initialised model record and config
    InitModel {
        /// Output path of the model record
        #[arg(short, long, default_value = "Model/idc_classifier.mpk")]
        output: PathBuf,

        /// Random seed for weight initialisation
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Square input size
        #[arg(long, default_value = "128")]
        input_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::quiet()
    };
    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Status => {
            let client = IdcClient::new(&cli.backend_url)?;
            print_status(&client, client.status().await);
        }

        Commands::Samples { samples_dir } => {
            cmd_samples(&samples_dir)?;
        }

        Commands::Predict {
            image,
            sample,
            samples_dir,
            output,
        } => {
            let client = IdcClient::new(&cli.backend_url)?;
            cmd_predict(&client, image, sample, &samples_dir, &output).await?;
        }

        Commands::Infer {
            image,
            model,
            config,
            layer,
            output,
        } => {
            cmd_infer(&image, &model, config.as_deref(), &layer, &output)?;
        }

        Commands::InitModel {
            output,
            seed,
            input_size,
        } => {
            cmd_init_model(&output, seed, input_size)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════╗
 ║   IDC Detection with Grad-CAM                    ║
 ║   Breast histopathology classification in Rust   ║
 ╚══════════════════════════════════════════════════╝
  "#
        .magenta()
    );
}

fn print_status(client: &IdcClient, status: ConnectionStatus) {
    match status {
        ConnectionStatus::Connected => {
            println!("{} ({})", "Backend Connected".green().bold(), client.url())
        }
        ConnectionStatus::NotReachable => {
            println!("{} ({})", "Backend Not Reachable".red().bold(), client.url())
        }
    }
    println!();
}

fn print_diagnosis(diagnosis: Diagnosis, malignant: f32, benign: f32) {
    let label = match diagnosis {
        Diagnosis::Malignant => "Malignant".red().bold(),
        Diagnosis::Benign => "Benign".green().bold(),
    };
    println!("{}", "Prediction Result:".cyan().bold());
    println!("  Prediction:            {}", label);
    println!("  Malignant Probability: {:.3}", malignant);
    println!("  Benign Probability:    {:.3}", benign);
}

/// Save the overlay and the original/overlay comparison
fn write_outputs(dir: &Path, original: &RgbImage, overlay_image: &RgbImage) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;

    let gradcam_path = dir.join("gradcam.png");
    std::fs::write(&gradcam_path, overlay::encode_png(overlay_image)?)?;

    let comparison_path = dir.join("comparison.png");
    let comparison = overlay::side_by_side(original, overlay_image);
    std::fs::write(&comparison_path, overlay::encode_png(&comparison)?)?;

    println!();
    println!("  Grad-CAM:   {}", gradcam_path.display());
    println!("  Comparison: {}", comparison_path.display());
    Ok(())
}

fn cmd_samples(samples_dir: &Path) -> Result<()> {
    let gallery = match SampleGallery::scan(samples_dir) {
        Ok(gallery) => gallery,
        Err(e) => {
            println!("{} {}", "Error:".red(), e);
            return Ok(());
        }
    };

    println!(
        "{} {} ({} images)",
        "Sample gallery:".cyan().bold(),
        gallery.dir.display(),
        gallery.len()
    );
    for sample in &gallery.samples {
        println!("  {}", sample.name);
    }
    Ok(())
}

async fn cmd_predict(
    client: &IdcClient,
    image: Option<PathBuf>,
    sample: Option<String>,
    samples_dir: &Path,
    output: &Path,
) -> Result<()> {
    print_status(client, client.status().await);

    let (bytes, filename) = if let Some(path) = image {
        println!("{}", "Using uploaded image".cyan());
        let bytes =
            std::fs::read(&path).with_context(|| format!("Failed to read image {:?}", path))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        (bytes, filename)
    } else if let Some(name) = sample {
        let gallery = SampleGallery::scan(samples_dir)?;
        let sample = gallery.find(&name)?;
        println!("{} {}", "Using sample image:".cyan(), sample.name);
        (sample.read()?, sample.name.clone())
    } else {
        println!(
            "{} Provide an image with --image or pick one with --sample",
            "Note:".yellow()
        );
        return Ok(());
    };

    info!("Uploading {} ({} bytes) to {}", filename, bytes.len(), client.predict_url());

    let response = match client.predict(bytes.clone(), &filename).await {
        Ok(response) => response,
        Err(e) => {
            info!("Prediction request failed: {}", e);
            println!(
                "{} Backend returned an error. Check server logs.",
                "Error:".red()
            );
            return Ok(());
        }
    };

    println!();
    print_diagnosis(
        response.prediction,
        response.malignant_probability,
        response.benign_probability,
    );

    let overlay_image = overlay::decode_png_base64(&response.gradcam)?;
    let original = decode_image(&bytes)?;
    write_outputs(output, &original, &overlay_image)
}

fn cmd_infer(
    image: &Path,
    model_path: &Path,
    config_path: Option<&Path>,
    layer: &str,
    output: &Path,
) -> Result<()> {
    println!("{}", "Inference Configuration:".cyan().bold());
    println!("  Input:   {}", image.display());
    println!("  Model:   {}", model_path.display());
    println!("  Layer:   {}", layer);
    println!("  Backend: {}", backend_name());
    println!();

    let bytes =
        std::fs::read(image).with_context(|| format!("Failed to read image {:?}", image))?;

    println!("{}", "Loading model...".cyan());
    let engine = DefaultEngine::load(model_path, config_path, layer, default_device())?;

    println!("{}", "Running inference...".cyan());
    let result = engine.run(&bytes)?;

    println!();
    print_diagnosis(
        result.prediction.diagnosis,
        result.prediction.malignant_probability,
        result.prediction.benign_probability,
    );
    println!("  Time:                  {}", format_millis(result.elapsed_ms));

    write_outputs(output, &result.original, &result.overlay)
}

fn cmd_init_model(output: &Path, seed: u64, input_size: usize) -> Result<()> {
    let config = IdcClassifierConfig::new(input_size);
    let device = default_device();

    let model = model::init_model::<DefaultBackend>(&config, seed, &device)?;
    model::save_model(&model, &config, output)?;

    println!(
        "{} Initialised model (seed {}, input {}x{}) at {}",
        "Done:".green(),
        seed,
        input_size,
        input_size,
        output.with_extension("mpk").display()
    );
    println!(
        "{} Weights are random; predictions are not clinically meaningful.",
        "Note:".yellow()
    );
    Ok(())
}
