//! Crop and resize.
//!
//! The cropped source rectangle is resampled plane by plane to the output
//! size. Source indices and weights are precomputed once per plane.
//! Layouts whose elements are 8-bit channels are filtered bilinearly, the
//! 16-bit RGB ones are sampled nearest-neighbour.

use crate::config::CropMargins;
use crate::error::{Result, TranscodeError};
use crate::picture::{Picture, PixelLayout};

/// Fixed-point weight denominator
const ONE: u32 = 256;

/// Source position of every output column or row of one plane.
#[derive(Debug, Clone)]
struct AxisMap {
    near: Vec<usize>,
    far: Vec<usize>,
    /// Weight of `far`, out of [`ONE`]
    frac: Vec<u32>,
}

impl AxisMap {
    fn new(offset: usize, src_len: usize, dst_len: usize, interpolate: bool) -> Self {
        let src_len = src_len.max(1);
        let ratio = src_len as f32 / dst_len.max(1) as f32;
        let mut map = Self {
            near: Vec::with_capacity(dst_len),
            far: Vec::with_capacity(dst_len),
            frac: Vec::with_capacity(dst_len),
        };
        for i in 0..dst_len {
            let (index, frac) = if interpolate {
                let pos = i as f32 * ratio;
                let index = pos as usize;
                (index, ((pos - index as f32) * ONE as f32) as u32)
            } else {
                (i * src_len / dst_len, 0)
            };
            let index = index.min(src_len - 1);
            map.near.push(offset + index);
            map.far.push(offset + (index + 1).min(src_len - 1));
            map.frac.push(frac);
        }
        map
    }
}

#[derive(Debug, Clone)]
struct PlaneMap {
    x: AxisMap,
    y: AxisMap,
    element_bytes: usize,
    src_row_bytes: usize,
    dst_row_bytes: usize,
}

pub struct Scaler {
    layout: PixelLayout,
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
    planes: Vec<PlaneMap>,
}

impl Scaler {
    /// Maps the `crop`ped area of a `src_width` x `src_height` picture onto
    /// `dst_width` x `dst_height`.
    pub fn new(
        layout: PixelLayout,
        src_width: u32,
        src_height: u32,
        crop: CropMargins,
        dst_width: u32,
        dst_height: u32,
    ) -> Self {
        let interpolate = !matches!(layout, PixelLayout::Rgb555 | PixelLayout::Rgb565);
        let crop_width = src_width.saturating_sub(crop.left + crop.right).max(1);
        let crop_height = src_height.saturating_sub(crop.top + crop.bottom).max(1);

        let planes = layout
            .plane_shapes(src_width, src_height)
            .into_iter()
            .zip(layout.plane_shapes(dst_width, dst_height))
            .map(|(src, dst)| {
                let left = (crop.left >> src.h_shift) as usize;
                let top = (crop.top >> src.v_shift) as usize;
                let columns = (crop_width as usize >> src.h_shift)
                    .max(1)
                    .min(src.columns.saturating_sub(left).max(1));
                let rows = (crop_height as usize >> src.v_shift)
                    .max(1)
                    .min(src.rows.saturating_sub(top).max(1));
                PlaneMap {
                    x: AxisMap::new(left.min(src.columns.saturating_sub(1)), columns, dst.columns, interpolate),
                    y: AxisMap::new(top.min(src.rows.saturating_sub(1)), rows, dst.rows, interpolate),
                    element_bytes: src.element_bytes,
                    src_row_bytes: src.row_bytes(),
                    dst_row_bytes: dst.row_bytes(),
                }
            })
            .collect();

        Self {
            layout,
            src_width,
            src_height,
            dst_width,
            dst_height,
            planes,
        }
    }

    pub fn scale(&self, src: &Picture, dst: &mut Picture) -> Result<()> {
        if src.layout != self.layout || dst.layout != self.layout {
            return Err(TranscodeError::UnsupportedConversion {
                from: src.layout,
                to: dst.layout,
            });
        }
        if (src.width, src.height) != (self.src_width, self.src_height)
            || (dst.width, dst.height) != (self.dst_width, self.dst_height)
        {
            return Err(TranscodeError::FrameTooSmall {
                needed: self.layout.buffer_size(self.dst_width, self.dst_height),
                got: dst.data.len(),
            });
        }

        for (index, (out, map)) in dst.planes_mut().into_iter().zip(&self.planes).enumerate() {
            scale_plane(src.plane(index), out, map);
        }
        dst.pts = src.pts;
        dst.repeat_pict = src.repeat_pict;
        Ok(())
    }
}

fn scale_plane(src: &[u8], dst: &mut [u8], map: &PlaneMap) {
    let eb = map.element_bytes;
    for (dy, ((&y1, &y2), &fy)) in map.y.near.iter().zip(&map.y.far).zip(&map.y.frac).enumerate() {
        let row1 = y1 * map.src_row_bytes;
        let row2 = y2 * map.src_row_bytes;
        let out_row = dy * map.dst_row_bytes;

        for (dx, ((&x1, &x2), &fx)) in map.x.near.iter().zip(&map.x.far).zip(&map.x.frac).enumerate() {
            let out = out_row + dx * eb;
            if fx == 0 && fy == 0 {
                let i = row1 + x1 * eb;
                dst[out..out + eb].copy_from_slice(&src[i..i + eb]);
                continue;
            }
            for c in 0..eb {
                let v00 = src[row1 + x1 * eb + c] as u32;
                let v01 = src[row1 + x2 * eb + c] as u32;
                let v10 = src[row2 + x1 * eb + c] as u32;
                let v11 = src[row2 + x2 * eb + c] as u32;

                let v0 = v00 * (ONE - fx) + v01 * fx;
                let v1 = v10 * (ONE - fx) + v11 * fx;
                let v = (v0 * (ONE - fy) + v1 * fy + ONE * ONE / 2) / (ONE * ONE);
                dst[out + c] = v.min(255) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(layout: PixelLayout, width: u32, height: u32) -> Picture {
        let mut picture = Picture::new(layout, width, height);
        picture.data.iter_mut().enumerate().for_each(|(i, v)| *v = i as u8);
        picture
    }

    #[test]
    fn same_size_without_crop_is_a_copy() {
        let src = numbered(PixelLayout::Yuv420p, 8, 6);
        let scaler = Scaler::new(PixelLayout::Yuv420p, 8, 6, CropMargins::default(), 8, 6);
        let mut dst = Picture::new(PixelLayout::Yuv420p, 8, 6);
        scaler.scale(&src, &mut dst).unwrap();
        assert_eq!(dst.data, src.data);
    }

    #[test]
    fn symmetric_crop_extracts_the_inner_rectangle() {
        let mut src = Picture::new(PixelLayout::Gray8, 8, 8);
        for (y, row) in src.data.chunks_exact_mut(8).enumerate() {
            for (x, v) in row.iter_mut().enumerate() {
                *v = (y * 10 + x) as u8;
            }
        }
        let crop = CropMargins::uniform(2);
        let scaler = Scaler::new(PixelLayout::Gray8, 8, 8, crop, 4, 4);
        let mut dst = Picture::new(PixelLayout::Gray8, 4, 4);
        scaler.scale(&src, &mut dst).unwrap();
        assert_eq!(&dst.data[..4], &[22, 23, 24, 25]);
        assert_eq!(&dst.data[12..], &[52, 53, 54, 55]);
    }

    #[test]
    fn crop_on_subsampled_planes_is_halved() {
        let src = numbered(PixelLayout::Yuv420p, 320, 240);
        let scaler = Scaler::new(PixelLayout::Yuv420p, 320, 240, CropMargins::uniform(8), 304, 224);
        let mut dst = Picture::new(PixelLayout::Yuv420p, 304, 224);
        scaler.scale(&src, &mut dst).unwrap();
        // first chroma sample comes from (4, 4) of the 160-wide U plane
        assert_eq!(dst.plane(1)[0], src.plane(1)[4 * 160 + 4]);
        assert_eq!(dst.plane(0)[0], src.plane(0)[8 * 320 + 8]);
    }

    #[test]
    fn upscale_interpolates() {
        let mut src = Picture::new(PixelLayout::Gray8, 2, 1);
        src.data.copy_from_slice(&[0, 100]);
        let scaler = Scaler::new(PixelLayout::Gray8, 2, 1, CropMargins::default(), 4, 1);
        let mut dst = Picture::new(PixelLayout::Gray8, 4, 1);
        scaler.scale(&src, &mut dst).unwrap();
        assert_eq!(dst.data, vec![0, 50, 100, 100]);
    }

    #[test]
    fn packed_16_bit_rgb_uses_nearest() {
        let mut src = Picture::new(PixelLayout::Rgb565, 2, 1);
        src.data.copy_from_slice(&[0x00, 0xF8, 0x1F, 0x00]);
        let scaler = Scaler::new(PixelLayout::Rgb565, 2, 1, CropMargins::default(), 4, 1);
        let mut dst = Picture::new(PixelLayout::Rgb565, 4, 1);
        scaler.scale(&src, &mut dst).unwrap();
        assert_eq!(dst.data, vec![0x00, 0xF8, 0x00, 0xF8, 0x1F, 0x00, 0x1F, 0x00]);
    }
}
