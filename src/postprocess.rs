use image::{GrayImage, Luma};
use ndarray::prelude::*;

use crate::errors::{CtSegError, Result};

/// Default decision level applied to the raw model output.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Boolean segmentation mask laid out as `(height, width, channel)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Array3<bool>,
}

impl Mask {
    pub fn new(data: Array3<bool>) -> Self {
        Self {
            data: data.as_standard_layout().into_owned(),
        }
    }

    /// `(width, height)`, matching `image::GenericImageView::dimensions`.
    pub fn dimensions(&self) -> (u32, u32) {
        let (height, width, _) = self.data.dim();
        (width as u32, height as u32)
    }

    pub fn channels(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn view(&self) -> ArrayView3<'_, bool> {
        self.data.view()
    }

    /// One `(height, width)` plane of the mask.
    pub fn plane(&self, channel: usize) -> Option<ArrayView2<'_, bool>> {
        (channel < self.channels()).then(|| self.data.index_axis(Axis(2), channel))
    }

    /// Positive elements across every plane.
    pub fn count_positive(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// Positive pixels in one plane, zero for a missing plane.
    pub fn count_positive_in(&self, channel: usize) -> usize {
        self.plane(channel)
            .map_or(0, |plane| plane.iter().filter(|v| **v).count())
    }

    /// Black/white rendering of one plane.
    pub fn to_luma_image(&self, channel: usize) -> Option<GrayImage> {
        let plane = self.plane(channel)?;
        let (width, height) = self.dimensions();
        Some(GrayImage::from_fn(width, height, |x, y| {
            if plane[[y as usize, x as usize]] {
                Luma([u8::MAX])
            } else {
                Luma([0])
            }
        }))
    }
}

/// Turns a raw `(1, C, H, W)` model output into a mask.
///
/// The batch axis is dropped, axes are reordered to `(H, W, C)` and every
/// element strictly above `level` becomes `true`.
pub fn threshold(output: ArrayView4<'_, f32>, level: f32) -> Result<Mask> {
    let batch = output.len_of(Axis(0));
    if batch != 1 {
        return Err(CtSegError::inference(
            "output thresholding",
            format!("expected a batch of 1, model returned {batch}"),
        ));
    }

    let hwc = output.index_axis(Axis(0), 0).permuted_axes([1, 2, 0]);
    Ok(Mask::new(hwc.mapv(|v| v > level)))
}
