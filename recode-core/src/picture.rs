//! Pixel layouts and picture buffers.
//!
//! Pictures are stored as one contiguous allocation holding every plane
//! back to back with no row padding. Chroma planes of subsampled layouts
//! round their dimensions up, so odd sizes keep their last column/row.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TranscodeError};

// ============================================================================
// Pixel Layouts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelLayout {
    // YUV planar
    Yuv420p,  // Y plane, U and V at quarter size
    Yuv422p,  // Y plane, U and V at half width
    Yuv444p,  // three full-size planes
    Gray8,    // Y plane only

    // YUV packed
    Yuyv422,  // Y0 U Y1 V per pixel pair

    // RGB packed
    Rgb555,   // 16-bit little-endian, 5-5-5
    Rgb565,   // 16-bit little-endian, 5-6-5
    Rgb24,    // R G B
    Rgba32,   // B G R A (little-endian 0xAARRGGBB word)
}

/// Geometry of one plane at a given picture size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneShape {
    /// Elements per row. An element is one sample for planar layouts, one
    /// pixel for packed RGB and one pixel pair for packed YUV.
    pub columns: usize,
    pub rows: usize,
    pub element_bytes: usize,
    /// log2 of horizontal pixels per element
    pub h_shift: u32,
    /// log2 of vertical pixels per row
    pub v_shift: u32,
}

impl PlaneShape {
    pub fn row_bytes(&self) -> usize {
        self.columns * self.element_bytes
    }

    pub fn len(&self) -> usize {
        self.row_bytes() * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn subsampled(len: usize, shift: u32) -> usize {
    (len + (1 << shift) - 1) >> shift
}

impl PixelLayout {
    /// (element bytes, h_shift, v_shift) for each plane
    fn plane_descs(&self) -> &'static [(usize, u32, u32)] {
        match self {
            Self::Yuv420p => &[(1, 0, 0), (1, 1, 1), (1, 1, 1)],
            Self::Yuv422p => &[(1, 0, 0), (1, 1, 0), (1, 1, 0)],
            Self::Yuv444p => &[(1, 0, 0), (1, 0, 0), (1, 0, 0)],
            Self::Gray8 => &[(1, 0, 0)],
            Self::Yuyv422 => &[(4, 1, 0)],
            Self::Rgb555 | Self::Rgb565 => &[(2, 0, 0)],
            Self::Rgb24 => &[(3, 0, 0)],
            Self::Rgba32 => &[(4, 0, 0)],
        }
    }

    pub fn plane_count(&self) -> usize {
        self.plane_descs().len()
    }

    pub fn plane_shape(&self, index: usize, width: u32, height: u32) -> Option<PlaneShape> {
        let &(element_bytes, h_shift, v_shift) = self.plane_descs().get(index)?;
        Some(PlaneShape {
            columns: subsampled(width as usize, h_shift),
            rows: subsampled(height as usize, v_shift),
            element_bytes,
            h_shift,
            v_shift,
        })
    }

    pub fn plane_shapes(&self, width: u32, height: u32) -> Vec<PlaneShape> {
        (0..self.plane_count())
            .filter_map(|i| self.plane_shape(i, width, height))
            .collect()
    }

    /// Calculate buffer size needed
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        self.plane_shapes(width, height).iter().map(PlaneShape::len).sum()
    }

    pub fn is_yuv(&self) -> bool {
        matches!(
            self,
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p | Self::Gray8 | Self::Yuyv422
        )
    }

    pub fn is_rgb(&self) -> bool {
        matches!(self, Self::Rgb555 | Self::Rgb565 | Self::Rgb24 | Self::Rgba32)
    }

    /// Planar 8-bit layouts, the ones line filters can work on sample by sample.
    pub fn is_planar(&self) -> bool {
        matches!(self, Self::Yuv420p | Self::Yuv422p | Self::Yuv444p | Self::Gray8)
    }
}

// ============================================================================
// Picture
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub layout: PixelLayout,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds, 0 when unknown
    pub pts: i64,
    /// Extra half-frame intervals this picture is shown for (telecine)
    pub repeat_pict: u32,
}

impl Picture {
    pub fn new(layout: PixelLayout, width: u32, height: u32) -> Self {
        Self {
            layout,
            width,
            height,
            data: vec![0u8; layout.buffer_size(width, height)],
            pts: 0,
            repeat_pict: 0,
        }
    }

    /// Wraps a raw frame. Trailing bytes beyond the layout size are ignored.
    pub fn from_bytes(layout: PixelLayout, width: u32, height: u32, bytes: &[u8]) -> Result<Self> {
        let needed = layout.buffer_size(width, height);
        if bytes.len() < needed {
            return Err(TranscodeError::FrameTooSmall {
                needed,
                got: bytes.len(),
            });
        }
        Ok(Self {
            layout,
            width,
            height,
            data: bytes[..needed].to_vec(),
            pts: 0,
            repeat_pict: 0,
        })
    }

    pub fn shape(&self, index: usize) -> Option<PlaneShape> {
        self.layout.plane_shape(index, self.width, self.height)
    }

    fn plane_range(&self, index: usize) -> Range<usize> {
        let mut offset = 0;
        for (i, shape) in self.layout.plane_shapes(self.width, self.height).iter().enumerate() {
            if i == index {
                return offset..offset + shape.len();
            }
            offset += shape.len();
        }
        offset..offset
    }

    /// Get plane data slice
    pub fn plane(&self, index: usize) -> &[u8] {
        let range = self.plane_range(index);
        &self.data[range]
    }

    /// Get mutable plane data slice
    pub fn plane_mut(&mut self, index: usize) -> &mut [u8] {
        let range = self.plane_range(index);
        &mut self.data[range]
    }

    /// All planes at once, for stages that write several planes per pixel.
    pub fn planes_mut(&mut self) -> Vec<&mut [u8]> {
        let shapes = self.layout.plane_shapes(self.width, self.height);
        let mut rest = self.data.as_mut_slice();
        let mut planes = Vec::with_capacity(shapes.len());
        for shape in shapes {
            let (plane, tail) = rest.split_at_mut(shape.len());
            planes.push(plane);
            rest = tail;
        }
        planes
    }

    /// Copies pixels and timing from a picture of identical geometry.
    pub fn copy_from(&mut self, other: &Picture) {
        self.data.copy_from_slice(&other.data);
        self.pts = other.pts;
        self.repeat_pict = other.repeat_pict;
    }
}
