use std::sync::Arc;

use crate::errors::Result;
use ndarray::prelude::*;

/// Abstraction over the segmentation network.
///
/// The pipeline only depends on this trait, so tests drive it with
/// [`crate::mocks::MockSegmentationModel`] instead of an ONNX session.
pub trait SegmentationModel: Send + Sync {
    /// Spatial side length of the square model input.
    fn image_size(&self) -> u32;

    /// Number of input channels (1 for luminance, 3 for RGB).
    fn input_channels(&self) -> usize;

    /// Raw forward pass on a `(N, C, H, W)` tensor.
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for Arc<M> {
    fn image_size(&self) -> u32 {
        (**self).image_size()
    }

    fn input_channels(&self) -> usize {
        (**self).input_channels()
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        (**self).predict(tensor)
    }
}
