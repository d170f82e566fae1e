//! Pre/post-processing around a single forward pass
//!
//! An 8-bit HWC image becomes a (1, 3, H, W) tensor in [0, 1], goes through
//! the model once, and comes back as an 8-bit HWC image of the same size.

use std::time::Instant;

use tracing::debug;

use super::tensor::{Hwc, HwcImage, Nchw};
use super::FilterModel;
use crate::error::{FilterError, Result};

const SCALE: f32 = 255.0;

/// Steps 1-3: scale to [0, 1], reorder to CHW, add the batch axis.
pub fn to_model_input(image: &HwcImage) -> Nchw {
    image.map(|&v| v as f32 / SCALE).to_chw().into_batch()
}

/// Steps 6-8: drop the batch axis, reorder to HWC, clip to [0, 1] and
/// rescale to 8 bits.
pub fn from_model_output(output: Nchw) -> HwcImage {
    let hwc: Hwc<f32> = output.into_chw().to_hwc();
    hwc.map(|&v| quantize(v))
}

/// Clip to [0, 1], scale to [0, 255] and round to the nearest integer.
/// NaN maps to 0.
fn quantize(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * SCALE).round() as u8
}

/// Run `model` over `image` and return the filtered image.
pub fn run(model: &dyn FilterModel, image: &HwcImage) -> Result<HwcImage> {
    let (height, width, _) = image.dim();
    let input = to_model_input(image);

    let start = Instant::now();
    let output = model.forward(input)?;
    debug!(
        "Forward pass {}x{} on {} took {:?}",
        width,
        height,
        model.device(),
        start.elapsed()
    );

    if output.spatial() != (height, width) {
        return Err(FilterError::ShapeMismatch {
            expected: vec![1, 3, height, width],
            actual: output.shape().to_vec(),
        });
    }

    Ok(from_model_output(output))
}

/// All-black input of the given size, used to probe a freshly loaded model.
pub fn blank_input(height: usize, width: usize) -> Nchw {
    Nchw::zeros(height, width)
}
