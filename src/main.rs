use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use uav_scout::capture::ReplayCamera;
use uav_scout::config::ScoutConfig;
use uav_scout::detection::ColorBlobDetector;
use uav_scout::link::{UdpLink, VehicleLink};
use uav_scout::system::Pipeline;

#[derive(Parser)]
#[command(name = "uav-scout")]
#[command(about = "Capture, detect, georeference and relay imagery on a UAV companion computer")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, default_value = "scout.yaml")]
    config: PathBuf,

    /// Override capture.rate_hz
    #[arg(long)]
    rate: Option<f64>,

    /// Override detection.model_path
    #[arg(long)]
    model: Option<PathBuf>,

    /// Override vehicle.address
    #[arg(long)]
    vehicle: Option<String>,

    /// Stop after this many seconds instead of running until killed
    #[arg(long)]
    run_for: Option<u64>,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut config = ScoutConfig::load(&cli.config)?;
    if let Some(rate) = cli.rate {
        config.capture.rate_hz = rate;
    }
    if let Some(model) = cli.model {
        config.detection.model_path = model;
    }
    if let Some(address) = cli.vehicle {
        config.vehicle.address = Some(address);
    }
    config.validate().context("Invalid configuration")?;

    let detector = ColorBlobDetector::load(&config.detection.model_path)?;
    let target_class = config
        .detection
        .target_class
        .clone()
        .unwrap_or_else(|| detector.model().class.clone());
    let camera = ReplayCamera::open(&config.capture.replay_dir)?;
    info!(
        frames = camera.len(),
        dir = %config.capture.replay_dir.display(),
        "replay camera ready"
    );

    let link: Option<Arc<dyn VehicleLink>> = match config.vehicle.address {
        Some(_) => Some(UdpLink::connect(&config.vehicle)?),
        None => None,
    };

    let pipeline = Pipeline::start(
        &config,
        Box::new(camera),
        Box::new(detector),
        target_class,
        link,
    )?;

    match cli.run_for {
        Some(secs) => {
            std::thread::sleep(Duration::from_secs(secs));
            drop(pipeline);
        }
        None => pipeline.join(),
    }
    info!("uav-scout stopped");
    Ok(())
}
