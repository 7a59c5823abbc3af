use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use image::Rgb;

use crate::errors::{CtSegError, Result};
use crate::overlay::OverlayStyle;
use crate::postprocess::DEFAULT_THRESHOLD;
use crate::preprocess::DEFAULT_IMAGE_SIZE;

/// Sample shown by `infer` when no image is given.
pub const DEFAULT_SAMPLE: &str = "bjorke_1.png";

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open the segmentation window (default)
    Gui,
    /// Segment a single image and show the result
    Infer {
        /// Image to segment, defaults to `<input-dir>/bjorke_1.png`
        image: Option<PathBuf>,

        /// Print the summary without opening a window
        #[arg(long)]
        no_window: bool,
    },
    /// List the sample images found under the input directory
    Samples,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct Config {
    #[arg(short, long, global = true, default_value = "final_swinunetr.onnx")]
    pub model_path: PathBuf,

    #[arg(short, long, global = true, default_value = "examples")]
    pub input_dir: PathBuf,

    /// Fallback input size for models with dynamic spatial axes
    #[arg(long, global = true, default_value_t = DEFAULT_IMAGE_SIZE, value_parser = check_image_size)]
    pub image_size: u32,

    #[arg(short, long, global = true, default_value_t = DEFAULT_THRESHOLD, value_parser = check_threshold)]
    pub threshold: f32,

    #[arg(short, long, global = true, default_value_t = 0)]
    pub device_id: i32,

    #[arg(long, global = true, default_value = "red", value_parser = parse_color)]
    pub overlay_color: Rgb<u8>,

    #[arg(long, global = true, default_value_t = 0.8, value_parser = check_alpha)]
    pub overlay_alpha: f32,
}

impl Default for Config {
    fn default() -> Self {
        let style = OverlayStyle::default();
        Self {
            model_path: PathBuf::from("final_swinunetr.onnx"),
            input_dir: PathBuf::from("examples"),
            image_size: DEFAULT_IMAGE_SIZE,
            threshold: DEFAULT_THRESHOLD,
            device_id: 0,
            overlay_color: style.color,
            overlay_alpha: style.alpha,
        }
    }
}

impl Config {
    pub const fn overlay_style(&self) -> OverlayStyle {
        OverlayStyle {
            color: self.overlay_color,
            alpha: self.overlay_alpha,
        }
    }

    pub fn default_sample(&self) -> PathBuf {
        self.input_dir.join(DEFAULT_SAMPLE)
    }

    /// The input directory, which must exist for the sample listing.
    pub fn sample_dir(&self) -> Result<&Path> {
        if self.input_dir.is_dir() {
            Ok(&self.input_dir)
        } else {
            Err(CtSegError::Configuration {
                message: format!(
                    "input directory does not exist: {}",
                    self.input_dir.display()
                ),
            })
        }
    }
}

fn check_image_size(s: &str) -> std::result::Result<u32, String> {
    let value: u32 = s.parse().map_err(|e| format!("`{s}` is not a size: {e}"))?;
    if value > 0 {
        Ok(value)
    } else {
        Err("image size must be greater than 0".to_string())
    }
}

fn check_threshold(s: &str) -> std::result::Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("`{s}` is not a number: {e}"))?;
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(format!("{value} is outside (0, 1)"))
    }
}

fn check_alpha(s: &str) -> std::result::Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("`{s}` is not a number: {e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is outside [0, 1]"))
    }
}

fn parse_color(s: &str) -> std::result::Result<Rgb<u8>, String> {
    let named = match s.to_lowercase().as_str() {
        "red" => Some([255, 0, 0]),
        "green" => Some([0, 255, 0]),
        "blue" => Some([0, 0, 255]),
        "yellow" => Some([255, 255, 0]),
        "cyan" => Some([0, 255, 255]),
        "magenta" => Some([255, 0, 255]),
        _ => None,
    };
    if let Some(rgb) = named {
        return Ok(Rgb(rgb));
    }

    let hex = s
        .strip_prefix('#')
        .filter(|h| h.len() == 6 && h.is_ascii())
        .ok_or_else(|| format!("{s} is not a colour name or #rrggbb"))?;
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("{s} is not a valid colour: {e}"))
    };
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() -> std::result::Result<(), clap::Error> {
        let cli = Cli::try_parse_from(["ct-seg-rs"])?;

        assert_eq!(cli.command, None);
        assert_eq!(cli.config, Config::default());
        assert_eq!(cli.config.default_sample(), Path::new("examples/bjorke_1.png"));
        Ok(())
    }

    #[test]
    fn test_infer_with_flags() -> std::result::Result<(), clap::Error> {
        let cli = Cli::try_parse_from([
            "ct-seg-rs",
            "infer",
            "scans/slice.png",
            "--no-window",
            "--threshold",
            "0.3",
            "--overlay-color",
            "#00ff80",
        ])?;

        assert_eq!(
            cli.command,
            Some(Command::Infer {
                image: Some(PathBuf::from("scans/slice.png")),
                no_window: true,
            })
        );
        assert!((cli.config.threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(cli.config.overlay_color, Rgb([0, 255, 128]));
        Ok(())
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(Cli::try_parse_from(["ct-seg-rs", "--threshold", "1.5"]).is_err());
        assert!(Cli::try_parse_from(["ct-seg-rs", "--overlay-alpha", "-0.1"]).is_err());
        assert!(Cli::try_parse_from(["ct-seg-rs", "--overlay-color", "#12345"]).is_err());
        assert!(Cli::try_parse_from(["ct-seg-rs", "--image-size", "0"]).is_err());
    }

    #[test]
    fn test_image_size_flag() -> std::result::Result<(), clap::Error> {
        let cli = Cli::try_parse_from(["ct-seg-rs", "samples", "--image-size", "256"])?;
        assert_eq!(cli.config.image_size, 256);
        Ok(())
    }

    #[test]
    fn test_sample_dir_must_exist() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::TempDir::new()?;
        let config = Config {
            input_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        assert_eq!(config.sample_dir()?, temp_dir.path());

        let missing = Config {
            input_dir: temp_dir.path().join("missing"),
            ..Config::default()
        };
        assert!(matches!(
            missing.sample_dir(),
            Err(CtSegError::Configuration { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("Yellow"), Ok(Rgb([255, 255, 0])));
        assert_eq!(parse_color("#0A0b0C"), Ok(Rgb([10, 11, 12])));
        assert!(parse_color("purple").is_err());
        assert!(parse_color("#zzzzzz").is_err());
    }
}
