use std::path::Path;

use image::{imageops, imageops::FilterType, DynamicImage, RgbImage};
use ndarray::prelude::*;
use nshare::{AsNdarray2, AsNdarray3};

use crate::errors::{CtSegError, Result};

/// Default side length of the square model input.
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Antialiased filter shared by the model input and the display copy.
///
/// Both resizes must use it so image and mask stay pixel-aligned.
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

const MAX_INTENSITY: f32 = u8::MAX as f32;

/// Decodes an image file.
///
/// # Errors
///
/// `FileAccess` when the file is missing, unreadable or not decodable.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| CtSegError::FileAccess {
        path: path.to_path_buf(),
        source: Box::new(e),
    })
}

/// Builds the `(1, C, size, size)` model input with values in `[0, 1]`.
///
/// `channels` selects luminance (1) or RGB (3) decoding of the raster.
pub fn preprocess(image: &DynamicImage, image_size: u32, channels: usize) -> Result<Array4<f32>> {
    let tensor = match channels {
        1 => {
            let luma = imageops::resize(&image.to_luma8(), image_size, image_size, RESIZE_FILTER);
            to_unit_tensor(luma.as_ndarray2().insert_axis(Axis(0)))
        }
        3 => {
            let rgb = imageops::resize(&image.to_rgb8(), image_size, image_size, RESIZE_FILTER);
            to_unit_tensor(rgb.as_ndarray3())
        }
        n => {
            return Err(CtSegError::Validation {
                field: "input_channels".to_string(),
                reason: format!("must be 1 or 3, model expects {n}"),
            })
        }
    };
    Ok(tensor)
}

/// RGB copy of `image` resized exactly like the model input, for display.
pub fn resize_for_display(image: &DynamicImage, image_size: u32) -> RgbImage {
    imageops::resize(&image.to_rgb8(), image_size, image_size, RESIZE_FILTER)
}

fn to_unit_tensor(view: ArrayView3<'_, u8>) -> Array4<f32> {
    view.mapv(|v| f32::from(v) / MAX_INTENSITY)
        .insert_axis(Axis(0))
}
