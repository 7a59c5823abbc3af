pub mod app;
pub mod cache;
pub mod config;
pub mod errors;
pub mod model;
pub mod overlay;
pub mod postprocess;
pub mod preprocess;
pub mod traits;

pub mod mocks;

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{DynamicImage, GrayImage, RgbImage};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

pub use cache::ModelCache;
pub use config::{Cli, Command, Config};
pub use errors::{CtSegError, Result};
pub use model::OnnxModel;
pub use overlay::{draw_segmentation_mask, OverlayStyle};
pub use postprocess::{threshold, Mask};
pub use preprocess::{load_image, preprocess, resize_for_display};
pub use traits::SegmentationModel;

/// Everything the window shows for one image.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Input resized with the same parameters as the model input.
    pub original: RgbImage,
    pub mask: Mask,
    pub overlay: RgbImage,
}

impl Segmentation {
    /// Black/white rendering of the displayed mask plane.
    pub fn mask_image(&self) -> GrayImage {
        self.mask.to_luma_image(0).unwrap_or_default()
    }

    /// Positive pixels in the displayed mask plane.
    pub fn positive_pixels(&self) -> usize {
        self.mask.count_positive_in(0)
    }
}

/// Decode, preprocess, forward pass and threshold for one image at a time.
pub struct InferencePipeline<M: SegmentationModel> {
    model: M,
    threshold: f32,
}

impl<M: SegmentationModel> InferencePipeline<M> {
    pub const fn new(model: M, threshold: f32) -> Self {
        Self { model, threshold }
    }

    pub const fn model(&self) -> &M {
        &self.model
    }

    /// Segments the image at `path` into a `(size, size, C)` boolean mask.
    ///
    /// The file is decoded before the model is touched, so an unreadable path
    /// fails with `FileAccess` without running a forward pass.
    pub fn infer(&self, path: &Path) -> Result<Mask> {
        let image = load_image(path)?;
        self.infer_image(&image)
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn infer_image(&self, image: &DynamicImage) -> Result<Mask> {
        let tensor = preprocess(image, self.model.image_size(), self.model.input_channels())?;
        debug!(shape = ?tensor.shape(), "input tensor ready");

        let started = Instant::now();
        let output = self.model.predict(tensor.view())?;
        debug!(
            shape = ?output.shape(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "forward pass finished"
        );

        threshold(output.view(), self.threshold)
    }

    /// Runs [`Self::infer`] and composes the three display panels.
    pub fn segment(&self, path: &Path, style: &OverlayStyle) -> Result<Segmentation> {
        let image = load_image(path)?;
        self.segment_image(&image, style)
    }

    #[instrument(skip_all)]
    pub fn segment_image(&self, image: &DynamicImage, style: &OverlayStyle) -> Result<Segmentation> {
        let mask = self.infer_image(image)?;

        let original = resize_for_display(image, self.model.image_size());
        let plane = mask.plane(0).ok_or_else(|| {
            CtSegError::inference("mask plane selection", "model output has no channels")
        })?;
        let overlay = draw_segmentation_mask(&original, plane, style)?;

        Ok(Segmentation {
            original,
            mask,
            overlay,
        })
    }
}

/// Loads the ONNX model described by `config` into a lazy cache.
pub fn onnx_model_cache(config: &Config) -> ModelCache<OnnxModel> {
    let model_path = config.model_path.clone();
    let device_id = config.device_id;
    let image_size = config.image_size;
    ModelCache::new(move || OnnxModel::new(&model_path, device_id, image_size))
}

/// One pipeline run against a cached model, as triggered by the window.
///
/// The image is decoded before the cache is asked for the model, so a bad
/// path never loads it.
pub fn run_segmentation<M: SegmentationModel>(
    cache: &ModelCache<M>,
    path: &Path,
    threshold: f32,
    style: &OverlayStyle,
) -> Result<Segmentation> {
    let image = load_image(path)?;
    let pipeline = InferencePipeline::new(cache.get_or_load()?, threshold);
    let segmentation = pipeline.segment_image(&image, style)?;

    info!(
        path = %path.display(),
        positive_pixels = segmentation.positive_pixels(),
        "segmentation finished"
    );
    Ok(segmentation)
}

/// Every supported image under `input_dir`, sorted by path.
pub fn collect_sample_images(input_dir: &Path) -> Vec<PathBuf> {
    let mut images: Vec<_> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported_image_format(e.path()))
        .map(|e| e.into_path())
        .collect();
    images.sort();
    images
}

/// Whether `path` has an extension the enabled image decoders read.
pub fn is_supported_image_format(path: &Path) -> bool {
    image::ImageFormat::from_path(path).is_ok_and(|format| format.reading_enabled())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockSegmentationModel;
    use image::Rgb;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_supported_formats() {
        let test_cases = vec![
            ("slice.png", true),
            ("slice.PNG", true),
            ("slice.jpg", true),
            ("notes.txt", false),
            ("slice", false),
        ];

        for (filename, expected) in test_cases {
            assert_eq!(
                is_supported_image_format(Path::new(filename)),
                expected,
                "{filename}"
            );
        }
    }

    #[test]
    fn test_collect_sample_images() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let nested = temp_dir.path().join("patient_2");
        fs::create_dir_all(&nested)?;
        RgbImage::new(8, 8).save(temp_dir.path().join("b.png"))?;
        RgbImage::new(8, 8).save(nested.join("a.png"))?;
        fs::write(temp_dir.path().join("README.txt"), "not an image")?;

        let samples = collect_sample_images(temp_dir.path());

        assert_eq!(
            samples,
            vec![temp_dir.path().join("b.png"), nested.join("a.png")]
        );
        Ok(())
    }

    #[test]
    fn test_segment_composes_panels() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("slice.png");
        RgbImage::from_fn(64, 48, |x, _| {
            if x < 32 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
        .save(&path)?;

        let pipeline = InferencePipeline::new(MockSegmentationModel::new(32, 3), 0.5);
        let segmentation = pipeline.segment(&path, &OverlayStyle::default())?;

        assert_eq!(segmentation.original.dimensions(), (32, 32));
        assert_eq!(segmentation.overlay.dimensions(), (32, 32));
        assert_eq!(segmentation.mask_image().dimensions(), (32, 32));
        assert_eq!(segmentation.overlay.get_pixel(0, 16), &Rgb([0, 0, 0]));
        assert_eq!(segmentation.overlay.get_pixel(31, 16), &Rgb([255, 51, 51]));
        Ok(())
    }

    #[test]
    fn test_positive_pixels_follow_displayed_plane() -> Result<()> {
        let output = ndarray::Array4::from_shape_fn((1, 2, 4, 4), |(_, c, y, _)| {
            if (c == 0 && y == 0) || c == 1 {
                1.0
            } else {
                0.0
            }
        });
        let mask = threshold(output.view(), 0.5)?;
        let segmentation = Segmentation {
            original: RgbImage::new(4, 4),
            mask,
            overlay: RgbImage::new(4, 4),
        };

        assert_eq!(segmentation.mask.count_positive(), 20);
        assert_eq!(segmentation.positive_pixels(), 4);
        assert_eq!(
            segmentation.positive_pixels(),
            segmentation.mask_image().pixels().filter(|p| p[0] == 255).count()
        );
        Ok(())
    }
}
