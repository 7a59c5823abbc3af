use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ct_seg_rs::{
    app::{self, SegmentationApp},
    collect_sample_images, onnx_model_cache, run_segmentation, Cli, Command, Config,
    SegmentationModel,
};

fn main() -> Result<()> {
    // stdout carries `infer` and `samples` output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ct_seg_rs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config;
    info!(
        model_path = %config.model_path.display(),
        input_dir = %config.input_dir.display(),
        "starting"
    );

    match cli.command.unwrap_or(Command::Gui) {
        Command::Gui => {
            let cache = onnx_model_cache(&config);
            open_window(SegmentationApp::new(config, cache))
        }
        Command::Infer { image, no_window } => infer(config, image, no_window),
        Command::Samples => {
            for path in collect_sample_images(config.sample_dir()?) {
                println!("{}", path.display());
            }
            Ok(())
        }
    }
}

fn infer(config: Config, image: Option<PathBuf>, no_window: bool) -> Result<()> {
    let path = image.unwrap_or_else(|| config.default_sample());
    let cache = onnx_model_cache(&config);

    let segmentation = run_segmentation(&cache, &path, config.threshold, &config.overlay_style())
        .with_context(|| format!("Failed to segment image: {}", path.display()))?;

    let (width, height) = segmentation.mask.dimensions();
    println!(
        "{}: {}x{}x{} mask, {} positive pixels",
        path.display(),
        width,
        height,
        segmentation.mask.channels(),
        segmentation.positive_pixels()
    );

    if no_window {
        return Ok(());
    }
    open_window(SegmentationApp::new(config, cache).with_segmentation(path, segmentation))
}

fn open_window<M: SegmentationModel + 'static>(app: SegmentationApp<M>) -> Result<()> {
    app::run(app).map_err(|e| anyhow!("Failed to run window: {e}"))
}
