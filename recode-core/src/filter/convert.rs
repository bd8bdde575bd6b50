//! Pixel layout conversion.
//!
//! Every conversion goes through three full-resolution planes: Y/U/V, or
//! R/G/B when both ends are RGB. Chroma is upsampled by replication on the
//! way in and downsampled by averaging on the way out. Colour math is
//! BT.601 limited range.

use crate::error::{Result, TranscodeError};
use crate::picture::{Picture, PixelLayout};

// ============================================================================
// Color Space
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    BT601, // SD (NTSC/PAL)
    BT709, // HD
}

impl ColorSpace {
    /// Returns (Wr, Wb) where Wg = 1 - Wr - Wb
    pub fn coefficients(&self) -> (f32, f32) {
        match self {
            Self::BT601 => (0.299, 0.114),
            Self::BT709 => (0.2126, 0.0722),
        }
    }

    pub fn yuv_to_rgb_matrix(&self) -> [[f32; 3]; 3] {
        let (wr, wb) = self.coefficients();
        let wg = 1.0 - wr - wb;

        // R = Y + 2*(1-Wr)*Cr
        // G = Y - 2*Wb*(1-Wb)/Wg*Cb - 2*Wr*(1-Wr)/Wg*Cr
        // B = Y + 2*(1-Wb)*Cb
        let cr_r = 2.0 * (1.0 - wr);
        let cb_g = -2.0 * wb * (1.0 - wb) / wg;
        let cr_g = -2.0 * wr * (1.0 - wr) / wg;
        let cb_b = 2.0 * (1.0 - wb);

        [[1.0, 0.0, cr_r], [1.0, cb_g, cr_g], [1.0, cb_b, 0.0]]
    }
}

/// Limited-range chroma (16..240) expanded to full swing
const CHROMA_SCALE: f32 = 255.0 / 224.0;

#[inline]
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (y as u8, u as u8, v as u8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    Yuv,
    Rgb,
}

pub struct PixelConverter {
    src_layout: PixelLayout,
    dst_layout: PixelLayout,
    width: usize,
    height: usize,
    domain: Domain,
    // Pre-computed lookup tables
    y_table: [i32; 256],
    u_table_g: [i32; 256],
    u_table_b: [i32; 256],
    v_table_r: [i32; 256],
    v_table_g: [i32; 256],
    /// Full resolution intermediate planes
    planes: [Vec<u8>; 3],
}

impl PixelConverter {
    pub fn new(src_layout: PixelLayout, dst_layout: PixelLayout, width: u32, height: u32) -> Self {
        let domain = if src_layout.is_rgb() && dst_layout.is_rgb() {
            Domain::Rgb
        } else {
            Domain::Yuv
        };
        let pixels = width as usize * height as usize;
        let mut converter = Self {
            src_layout,
            dst_layout,
            width: width as usize,
            height: height as usize,
            domain,
            y_table: [0; 256],
            u_table_g: [0; 256],
            u_table_b: [0; 256],
            v_table_r: [0; 256],
            v_table_g: [0; 256],
            planes: [vec![0; pixels], vec![0; pixels], vec![0; pixels]],
        };
        converter.build_tables(ColorSpace::BT601);
        converter
    }

    fn build_tables(&mut self, color_space: ColorSpace) {
        let matrix = color_space.yuv_to_rgb_matrix();

        for i in 0..256 {
            let y = (i as i32) - 16;
            let uv = (i as f32 - 128.0) * CHROMA_SCALE;

            // 298/256 ≈ 255/219
            self.y_table[i] = (y * 298) >> 8;

            self.u_table_g[i] = (uv * matrix[1][1] * 256.0) as i32;
            self.u_table_b[i] = (uv * matrix[2][1] * 256.0) as i32;
            self.v_table_r[i] = (uv * matrix[0][2] * 256.0) as i32;
            self.v_table_g[i] = (uv * matrix[1][2] * 256.0) as i32;
        }
    }

    #[inline]
    fn yuv_to_rgb(&self, y: u8, u: u8, v: u8) -> (u8, u8, u8) {
        let (y, u, v) = (y as usize, u as usize, v as usize);
        let y_contrib = self.y_table[y];
        let r = (y_contrib + (self.v_table_r[v] >> 8)).clamp(0, 255) as u8;
        let g = (y_contrib + (self.u_table_g[u] >> 8) + (self.v_table_g[v] >> 8)).clamp(0, 255) as u8;
        let b = (y_contrib + (self.u_table_b[u] >> 8)).clamp(0, 255) as u8;
        (r, g, b)
    }

    /// Convert `src` into `dst`; both must match the converter's layouts and size.
    pub fn convert(&mut self, src: &Picture, dst: &mut Picture) -> Result<()> {
        if src.layout != self.src_layout || dst.layout != self.dst_layout {
            return Err(TranscodeError::UnsupportedConversion {
                from: src.layout,
                to: dst.layout,
            });
        }
        if src.width as usize != self.width
            || src.height as usize != self.height
            || dst.width != src.width
            || dst.height != src.height
        {
            let needed = self.dst_layout.buffer_size(self.width as u32, self.height as u32);
            return Err(TranscodeError::FrameTooSmall {
                needed,
                got: dst.data.len().min(src.data.len()),
            });
        }

        self.unpack(src);
        self.pack(dst);
        dst.pts = src.pts;
        dst.repeat_pict = src.repeat_pict;
        Ok(())
    }

    // ========================================================================
    // Unpack
    // ========================================================================

    fn unpack(&mut self, src: &Picture) {
        let (w, h) = (self.width, self.height);
        match self.src_layout {
            PixelLayout::Yuv420p | PixelLayout::Yuv422p | PixelLayout::Yuv444p => {
                self.planes[0].copy_from_slice(src.plane(0));
                for index in 1..3 {
                    let Some(shape) = src.shape(index) else { continue };
                    let chroma = src.plane(index);
                    let dst = &mut self.planes[index];
                    for y in 0..h {
                        let row = (y >> shape.v_shift) * shape.columns;
                        for x in 0..w {
                            dst[y * w + x] = chroma[row + (x >> shape.h_shift)];
                        }
                    }
                }
            }
            PixelLayout::Gray8 => {
                self.planes[0].copy_from_slice(src.plane(0));
                self.planes[1].fill(128);
                self.planes[2].fill(128);
            }
            PixelLayout::Yuyv422 => {
                let packed = src.plane(0);
                let pairs = (w + 1) / 2;
                for y in 0..h {
                    for x in 0..w {
                        let pair = (y * pairs + x / 2) * 4;
                        let i = y * w + x;
                        self.planes[0][i] = packed[pair + (x & 1) * 2];
                        self.planes[1][i] = packed[pair + 1];
                        self.planes[2][i] = packed[pair + 3];
                    }
                }
            }
            PixelLayout::Rgb555 | PixelLayout::Rgb565 | PixelLayout::Rgb24 | PixelLayout::Rgba32 => {
                let layout = self.src_layout;
                let packed = src.plane(0);
                let to_yuv = self.domain == Domain::Yuv;
                for i in 0..w * h {
                    let (r, g, b) = read_rgb(layout, packed, i);
                    let (p0, p1, p2) = if to_yuv { rgb_to_yuv(r, g, b) } else { (r, g, b) };
                    self.planes[0][i] = p0;
                    self.planes[1][i] = p1;
                    self.planes[2][i] = p2;
                }
            }
        }
    }

    // ========================================================================
    // Pack
    // ========================================================================

    fn pack(&self, dst: &mut Picture) {
        let (w, h) = (self.width, self.height);
        match self.dst_layout {
            PixelLayout::Yuv420p | PixelLayout::Yuv422p | PixelLayout::Yuv444p => {
                let shapes = dst.layout.plane_shapes(dst.width, dst.height);
                for (index, (plane, shape)) in dst.planes_mut().into_iter().zip(shapes).enumerate() {
                    if index == 0 {
                        plane.copy_from_slice(&self.planes[0]);
                        continue;
                    }
                    let src = &self.planes[index];
                    let (bw, bh) = (1usize << shape.h_shift, 1usize << shape.v_shift);
                    for cy in 0..shape.rows {
                        for cx in 0..shape.columns {
                            let mut sum = 0u32;
                            let mut count = 0u32;
                            for y in cy * bh..((cy + 1) * bh).min(h) {
                                for x in cx * bw..((cx + 1) * bw).min(w) {
                                    sum += src[y * w + x] as u32;
                                    count += 1;
                                }
                            }
                            plane[cy * shape.columns + cx] = ((sum + count / 2) / count.max(1)) as u8;
                        }
                    }
                }
            }
            PixelLayout::Gray8 => dst.plane_mut(0).copy_from_slice(&self.planes[0]),
            PixelLayout::Yuyv422 => {
                let packed = dst.plane_mut(0);
                let pairs = (w + 1) / 2;
                for y in 0..h {
                    for pair in 0..pairs {
                        let x0 = pair * 2;
                        let x1 = (x0 + 1).min(w - 1);
                        let (i0, i1) = (y * w + x0, y * w + x1);
                        let avg = |p: &[u8]| ((p[i0] as u16 + p[i1] as u16 + 1) / 2) as u8;
                        let out = (y * pairs + pair) * 4;
                        packed[out] = self.planes[0][i0];
                        packed[out + 1] = avg(&self.planes[1]);
                        packed[out + 2] = self.planes[0][i1];
                        packed[out + 3] = avg(&self.planes[2]);
                    }
                }
            }
            PixelLayout::Rgb555 | PixelLayout::Rgb565 | PixelLayout::Rgb24 | PixelLayout::Rgba32 => {
                let layout = self.dst_layout;
                let packed = dst.plane_mut(0);
                for i in 0..w * h {
                    let (a, b, c) = (self.planes[0][i], self.planes[1][i], self.planes[2][i]);
                    let rgb = match self.domain {
                        Domain::Yuv => self.yuv_to_rgb(a, b, c),
                        Domain::Rgb => (a, b, c),
                    };
                    write_rgb(layout, packed, i, rgb);
                }
            }
        }
    }
}

#[inline]
fn expand5(v: u16) -> u8 {
    ((v << 3) | (v >> 2)) as u8
}

#[inline]
fn expand6(v: u16) -> u8 {
    ((v << 2) | (v >> 4)) as u8
}

fn read_rgb(layout: PixelLayout, packed: &[u8], i: usize) -> (u8, u8, u8) {
    match layout {
        PixelLayout::Rgb24 => (packed[i * 3], packed[i * 3 + 1], packed[i * 3 + 2]),
        PixelLayout::Rgba32 => (packed[i * 4 + 2], packed[i * 4 + 1], packed[i * 4]),
        PixelLayout::Rgb565 => {
            let v = u16::from_le_bytes([packed[i * 2], packed[i * 2 + 1]]);
            (expand5(v >> 11), expand6((v >> 5) & 0x3F), expand5(v & 0x1F))
        }
        _ => {
            let v = u16::from_le_bytes([packed[i * 2], packed[i * 2 + 1]]);
            (expand5((v >> 10) & 0x1F), expand5((v >> 5) & 0x1F), expand5(v & 0x1F))
        }
    }
}

fn write_rgb(layout: PixelLayout, packed: &mut [u8], i: usize, (r, g, b): (u8, u8, u8)) {
    match layout {
        PixelLayout::Rgb24 => packed[i * 3..i * 3 + 3].copy_from_slice(&[r, g, b]),
        PixelLayout::Rgba32 => packed[i * 4..i * 4 + 4].copy_from_slice(&[b, g, r, 255]),
        PixelLayout::Rgb565 => {
            let v = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
            packed[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
        }
        _ => {
            let v = ((r as u16 >> 3) << 10) | ((g as u16 >> 3) << 5) | (b as u16 >> 3);
            packed[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
        }
    }
}
