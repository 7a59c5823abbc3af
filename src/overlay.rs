use image::{Rgb, RgbImage};
use ndarray::ArrayView2;

use crate::errors::{CtSegError, Result};

/// Highlight colour and opacity used when drawing a mask over an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub color: Rgb<u8>,
    /// Weight of `color` in masked pixels, in `[0, 1]`.
    pub alpha: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: Rgb([255, 0, 0]),
            alpha: 0.8,
        }
    }
}

/// Blends `style.color` into every pixel of `image` where `mask` is set.
///
/// Unmasked pixels are copied unchanged.
///
/// # Errors
///
/// `Validation` when image and mask dimensions differ.
pub fn draw_segmentation_mask(
    image: &RgbImage,
    mask: ArrayView2<'_, bool>,
    style: &OverlayStyle,
) -> Result<RgbImage> {
    let (height, width) = mask.dim();
    if image.dimensions() != (width as u32, height as u32) {
        return Err(CtSegError::Validation {
            field: "mask".to_string(),
            reason: format!(
                "dimensions do not match image: image {}x{}, mask {width}x{height}",
                image.width(),
                image.height()
            ),
        });
    }

    let alpha = style.alpha.clamp(0.0, 1.0);
    let mut overlay = image.clone();
    for (x, y, pixel) in overlay.enumerate_pixels_mut() {
        if mask[[y as usize, x as usize]] {
            *pixel = blend(*pixel, style.color, alpha);
        }
    }
    Ok(overlay)
}

fn blend(base: Rgb<u8>, color: Rgb<u8>, alpha: f32) -> Rgb<u8> {
    let Rgb([r, g, b]) = base;
    let Rgb([cr, cg, cb]) = color;
    let mix = |c: u8, h: u8| {
        (f32::from(c) * (1.0 - alpha) + f32::from(h) * alpha)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Rgb([mix(r, cr), mix(g, cg), mix(b, cb)])
}
