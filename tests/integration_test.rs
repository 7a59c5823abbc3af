use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, Rgb, RgbImage};
use tempfile::TempDir;

use ct_seg_rs::{
    mocks::MockSegmentationModel, preprocess, run_segmentation, CtSegError, InferencePipeline,
    ModelCache, OverlayStyle, SegmentationModel,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Dark slice with a bright square lesion in the upper-left quarter.
fn write_slice(dir: &Path, name: &str, width: u32, height: u32) -> Result<PathBuf, image::ImageError> {
    let path = dir.join(name);
    GrayImage::from_fn(width, height, |x, y| {
        if x < width / 2 && y < height / 2 {
            Luma([230])
        } else {
            Luma([20])
        }
    })
    .save(&path)?;
    Ok(path)
}

#[test]
fn test_end_to_end_mask_shape() -> TestResult {
    let temp_dir = TempDir::new()?;
    let path = write_slice(temp_dir.path(), "bjorke_1.png", 512, 512)?;

    let pipeline = InferencePipeline::new(MockSegmentationModel::new(224, 3), 0.5);
    let mask = pipeline.infer(&path)?;

    assert_eq!(mask.view().dim(), (224, 224, 1));
    assert!(mask.count_positive() > 0);
    assert!(mask.count_positive() < 224 * 224);
    Ok(())
}

#[test]
fn test_repeated_inference_is_identical() -> TestResult {
    let temp_dir = TempDir::new()?;
    let path = write_slice(temp_dir.path(), "slice.png", 300, 180)?;

    let pipeline = InferencePipeline::new(MockSegmentationModel::new(224, 1), 0.5);
    let first = pipeline.infer(&path)?;
    let second = pipeline.infer(&path)?;

    assert_eq!(first, second);
    assert_eq!(pipeline.model().predict_calls(), 2);
    Ok(())
}

#[test]
fn test_missing_image_never_reaches_model() -> TestResult {
    let temp_dir = TempDir::new()?;
    let missing = temp_dir.path().join("missing.png");

    let pipeline = InferencePipeline::new(MockSegmentationModel::new(224, 3), 0.5);
    let result = pipeline.infer(&missing);

    assert!(matches!(result, Err(CtSegError::FileAccess { .. })));
    assert_eq!(pipeline.model().predict_calls(), 0);
    Ok(())
}

#[test]
fn test_undecodable_image_is_file_access_error() -> TestResult {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("broken.png");
    std::fs::write(&path, b"definitely not a png")?;

    let pipeline = InferencePipeline::new(MockSegmentationModel::new(224, 3), 0.5);
    assert!(matches!(
        pipeline.infer(&path),
        Err(CtSegError::FileAccess { .. })
    ));
    Ok(())
}

#[test]
fn test_missing_image_does_not_load_model() -> TestResult {
    let temp_dir = TempDir::new()?;
    let cache: ModelCache<MockSegmentationModel> = ModelCache::new(|| {
        Err(CtSegError::Configuration {
            message: "loader must not run".to_string(),
        })
    });

    let result = run_segmentation(
        &cache,
        &temp_dir.path().join("missing.png"),
        0.5,
        &OverlayStyle::default(),
    );

    assert!(matches!(result, Err(CtSegError::FileAccess { .. })));
    assert!(!cache.is_loaded());
    Ok(())
}

#[test]
fn test_run_segmentation_panels_share_dimensions() -> TestResult {
    let temp_dir = TempDir::new()?;
    let path = write_slice(temp_dir.path(), "slice.png", 96, 160)?;
    let cache = ModelCache::new(|| Ok(MockSegmentationModel::new(224, 3)));

    let segmentation = run_segmentation(&cache, &path, 0.5, &OverlayStyle::default())?;

    assert_eq!(segmentation.original.dimensions(), (224, 224));
    assert_eq!(segmentation.mask.dimensions(), (224, 224));
    assert_eq!(segmentation.overlay.dimensions(), (224, 224));
    // lesion quarter is highlighted, background untouched
    assert_ne!(segmentation.overlay.get_pixel(10, 10), segmentation.original.get_pixel(10, 10));
    assert_eq!(segmentation.overlay.get_pixel(200, 200), segmentation.original.get_pixel(200, 200));
    assert!(cache.is_loaded());
    Ok(())
}

#[test]
fn test_preprocess_boundary_sizes() -> TestResult {
    let model = MockSegmentationModel::new(224, 3);
    for (width, height) in [(1, 1), (223, 225), (1024, 64)] {
        let image = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([9, 99, 199])));
        let tensor = preprocess(&image, model.image_size(), model.input_channels())?;

        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }
    Ok(())
}
