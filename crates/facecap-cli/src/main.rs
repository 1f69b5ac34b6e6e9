use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facecap::{Config, FaceCaptureSession};
use facecap_core::{FaceDetector, ScrfdDetector};
use facecap_hw::Camera;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facecap", about = "Face-gated still capture")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List V4L2 capture devices
    Devices,
    /// Run face detection on an image file and print the result as JSON
    Detect {
        image: PathBuf,
    },
    /// Wait for a face on the camera, capture a still and save it
    Capture {
        /// Where to write the final image (format from the extension)
        #[arg(short, long)]
        output: PathBuf,
        /// Give up if no face is seen within this many seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
        /// Also print the image as base64 JPEG
        #[arg(long)]
        base64: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Detect { image } => {
            let img = image::open(&image)
                .with_context(|| format!("failed to open {}", image.display()))?;
            let mut detector = load_detector(&config)?;
            let faces = detector.detect(&img)?;
            let detection =
                facecap_core::detect_presence(&mut detector, &img, config.preview_padding);
            let report = serde_json::json!({
                "image": image.display().to_string(),
                "width": img.width(),
                "height": img.height(),
                "present": detection.present,
                "bounds": detection.bounds,
                "faces": faces,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Capture {
            output,
            timeout_secs,
            base64,
        } => {
            let detector = load_detector(&config)?;
            let camera = Camera::open(&config.camera_device, &config.camera_options())
                .with_context(|| format!("failed to open {}", config.camera_device))?;
            tracing::info!(
                device = %camera.device_path,
                width = camera.width,
                height = camera.height,
                "camera ready"
            );

            let session = FaceCaptureSession::new(Box::new(detector), config.pipeline_options());
            session.bind(Box::new(camera))?;

            println!("Look at the camera...");
            let mut gate = session.subscribe();
            tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                gate.wait_for(|s| s.face_detected),
            )
            .await
            .context("no face detected before timeout")??;

            let result = session.capture().await;
            session.shutdown();
            let image = match result {
                Ok(image) => image,
                Err(e) => anyhow::bail!("{}", e.user_message()),
            };

            image
                .image
                .save(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "Saved {}x{} image to {} (crop: {:?})",
                image.width(),
                image.height(),
                output.display(),
                image.crop
            );
            if base64 {
                println!("{}", image.to_base64_jpeg(90)?);
            }
        }
    }

    Ok(())
}

fn load_detector(config: &Config) -> Result<ScrfdDetector> {
    let path = config.scrfd_model_path();
    let detector = ScrfdDetector::load(&path, config.detector_options())?;
    tracing::info!(path = %path, "SCRFD detector loaded");
    Ok(detector)
}
