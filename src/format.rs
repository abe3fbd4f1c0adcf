//! Pixel formats and frame geometry
//!
//! The format metadata the memory path needs: enough to size a frame's
//! backing storage and to pick channel extractors for interleaved formats.
//! Decoding and color conversion live downstream and are not modeled here.

use anyhow::Result;

use crate::pool::{FrameBuffer, FrameElement, FramePool};
use crate::split::Splitter;

/// Pixel formats the frame pipeline handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit grayscale
    Y8,
    /// 16-bit grayscale
    Y16,
    /// 16-bit depth
    Z16,
    /// Interleaved 8-bit left/right stereo pair
    Y8I,
    /// Packed 12-bit left/right stereo pair
    Y12I,
    /// 24-bit color
    Rgb8,
    /// Packed 4:2:2 luma/chroma
    Yuyv,
}

impl PixelFormat {
    /// Storage bits per pixel
    pub fn bits_per_pixel(self) -> usize {
        match self {
            PixelFormat::Y8 => 8,
            PixelFormat::Y16 | PixelFormat::Z16 | PixelFormat::Y8I | PixelFormat::Yuyv => 16,
            PixelFormat::Y12I | PixelFormat::Rgb8 => 24,
        }
    }

    /// Whether this format carries two interleaved channels that the
    /// splitter can separate
    pub fn is_dual_channel(self) -> bool {
        matches!(self, PixelFormat::Y8I | PixelFormat::Y12I)
    }
}

/// Geometry and format of one incoming frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDesc {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
}

impl FrameDesc {
    /// Describe a frame
    pub fn new(width: usize, height: usize, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /// Pixels per frame
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Frame size in bytes
    pub fn byte_size(&self) -> usize {
        self.pixel_count() * self.format.bits_per_pixel() / 8
    }
}

/// One Y8I pixel: left and right infrared samples interleaved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Y8IPixel {
    pub left: u8,
    pub right: u8,
}

// Two bytes, any values valid
unsafe impl FrameElement for Y8IPixel {}

/// Split an interleaved Y8I frame into separate left and right planes,
/// both allocated from `pool`.
///
/// This is the standard demultiplex step for dual-infrared stream formats:
/// one buffer per eye, ready for display or recording.
pub fn deinterleave_y8i(
    pool: &FramePool<u8>,
    splitter: &Splitter,
    source: &[Y8IPixel],
) -> Result<(FrameBuffer<u8>, FrameBuffer<u8>)> {
    let mut left = pool.acquire(source.len())?;
    let mut right = pool.acquire(source.len())?;
    splitter.split(
        left.as_mut_slice(),
        right.as_mut_slice(),
        source,
        |p| p.left,
        |p| p.right,
    )?;
    Ok((left, right))
}
