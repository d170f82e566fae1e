//! Typed image and tensor layouts
//!
//! Axis order is part of the type: `Hwc` for decoded images, `Chw` for a
//! single planar tensor, `Nchw` for what a model consumes. Conversions between
//! them are the only way to reorder axes.

use image::RgbImage;
use ndarray::{Array3, Array4, Axis};

use crate::error::{FilterError, Result};

/// Number of colour channels every filter works on (RGB).
pub const CHANNELS: usize = 3;

/// Height-width-channel array.
#[derive(Debug, Clone, PartialEq)]
pub struct Hwc<A>(Array3<A>);

/// Channel-height-width array.
#[derive(Debug, Clone, PartialEq)]
pub struct Chw<A>(Array3<A>);

/// Batch of one channel-height-width `f32` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Nchw(Array4<f32>);

/// 8-bit RGB image buffer, shape (height, width, 3).
pub type HwcImage = Hwc<u8>;

impl<A> Hwc<A> {
    /// Wrap an array already laid out as (height, width, channels).
    pub fn from_array(array: Array3<A>) -> Result<Self> {
        let (height, width, channels) = array.dim();
        if channels != CHANNELS {
            return Err(FilterError::InvalidImage(format!(
                "expected {CHANNELS} channels, got {channels}"
            )));
        }
        if height == 0 || width == 0 {
            return Err(FilterError::InvalidImage(format!(
                "empty image ({height}x{width})"
            )));
        }
        Ok(Self(array))
    }

    /// (height, width, channels)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.0.dim()
    }

    pub fn as_array(&self) -> &Array3<A> {
        &self.0
    }

    pub fn map<B, F: FnMut(&A) -> B>(&self, f: F) -> Hwc<B> {
        Hwc(self.0.map(f))
    }
}

impl<A: Clone> Hwc<A> {
    /// Reorder (H, W, C) to (C, H, W).
    pub fn to_chw(&self) -> Chw<A> {
        Chw(self.0.view().permuted_axes([2, 0, 1]).as_standard_layout().into_owned())
    }
}

impl<A> Chw<A> {
    pub fn dim(&self) -> (usize, usize, usize) {
        self.0.dim()
    }
}

impl<A: Clone> Chw<A> {
    /// Reorder (C, H, W) to (H, W, C).
    pub fn to_hwc(&self) -> Hwc<A> {
        Hwc(self.0.view().permuted_axes([1, 2, 0]).as_standard_layout().into_owned())
    }
}

impl Chw<f32> {
    /// Insert the leading batch axis.
    pub fn into_batch(self) -> Nchw {
        Nchw(self.0.insert_axis(Axis(0)))
    }
}

impl Nchw {
    /// Wrap a raw model output. Only a batch of exactly one 3-channel tensor
    /// is accepted.
    pub fn from_array(array: Array4<f32>) -> Result<Self> {
        let (batch, channels, _, _) = array.dim();
        if batch != 1 || channels != CHANNELS {
            return Err(FilterError::ShapeMismatch {
                expected: vec![1, CHANNELS],
                actual: array.shape().to_vec(),
            });
        }
        Ok(Self(array))
    }

    /// Build from a flat buffer and a shape as reported by an inference runtime.
    pub fn from_shape_vec(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let dims: [usize; 4] = shape.try_into().map_err(|_| FilterError::ShapeMismatch {
            expected: vec![1, CHANNELS, 0, 0],
            actual: shape.to_vec(),
        })?;
        Self::from_array(Array4::from_shape_vec(dims, data)?)
    }

    /// A zero tensor of shape (1, 3, height, width).
    pub fn zeros(height: usize, width: usize) -> Self {
        Self(Array4::zeros((1, CHANNELS, height, width)))
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    /// (height, width)
    pub fn spatial(&self) -> (usize, usize) {
        let (_, _, h, w) = self.0.dim();
        (h, w)
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.0
    }

    /// Contiguous row-major view of the data.
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.0.as_slice()
    }

    /// Drop the batch axis.
    pub fn into_chw(self) -> Chw<f32> {
        Chw(self.0.index_axis_move(Axis(0), 0))
    }
}

impl TryFrom<RgbImage> for HwcImage {
    type Error = FilterError;

    fn try_from(image: RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        let array = Array3::from_shape_vec(
            (height as usize, width as usize, CHANNELS),
            image.into_raw(),
        )?;
        Hwc::from_array(array)
    }
}

impl HwcImage {
    /// Convert back to an `image` buffer for encoding.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let (height, width, _) = self.dim();
        let raw: Vec<u8> = self.0.as_standard_layout().iter().copied().collect();
        RgbImage::from_raw(width as u32, height as u32, raw).ok_or_else(|| {
            FilterError::Encode(format!("buffer does not fit {width}x{height} RGB image"))
        })
    }

    /// Image filled with one colour.
    pub fn filled(height: usize, width: usize, rgb: [u8; 3]) -> Self {
        Hwc(Array3::from_shape_fn((height, width, CHANNELS), |(_, _, c)| rgb[c]))
    }
}
