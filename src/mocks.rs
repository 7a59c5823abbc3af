use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::Result;
use crate::traits::SegmentationModel;
use ndarray::prelude::*;

/// Deterministic stand-in for the segmentation network.
///
/// The single output channel is the mean intensity over the input channels,
/// so bright regions come out positive after thresholding at 0.5.
#[derive(Debug)]
pub struct MockSegmentationModel {
    pub image_size: u32,
    pub channels: usize,
    calls: AtomicUsize,
}

impl MockSegmentationModel {
    pub const fn new(image_size: u32, channels: usize) -> Self {
        Self {
            image_size,
            channels,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of forward passes run so far.
    pub fn predict_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn image_size(&self) -> u32 {
        self.image_size
    }

    fn input_channels(&self) -> usize {
        self.channels
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mean = tensor.mean_axis(Axis(1)).unwrap_or_else(|| {
            let shape = tensor.shape();
            Array3::zeros((shape[0], shape[2], shape[3]))
        });
        Ok(mean.insert_axis(Axis(1)))
    }
}

/// Mock sized like the production model.
pub const fn create_mock_model() -> MockSegmentationModel {
    MockSegmentationModel::new(224, 3)
}
