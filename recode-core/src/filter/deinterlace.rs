//! Line deinterlacing for planar YUV/gray pictures.
//!
//! Every plane is filtered on its own with the same field choice. Comb
//! detection runs on the luma plane.

use crate::config::DeinterlaceMode;
use crate::picture::Picture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrder {
    TopFirst,
    BottomFirst,
}

impl FieldOrder {
    /// Row parity of the field that is kept as is
    fn kept_parity(&self) -> usize {
        match self {
            Self::TopFirst => 0,
            Self::BottomFirst => 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InterlaceInfo {
    pub is_interlaced: bool,
    pub field_order: FieldOrder,
    pub comb_factor: f32,
}

pub struct InterlaceDetector {
    avg_comb: f32,
    frame_count: u32,
    detected_order: Option<FieldOrder>,
}

impl Default for InterlaceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl InterlaceDetector {
    pub fn new() -> Self {
        Self {
            avg_comb: 0.0,
            frame_count: 0,
            detected_order: None,
        }
    }

    /// Inspect one luma plane of `stride` x `rows` samples.
    pub fn analyze(&mut self, luma: &[u8], stride: usize, rows: usize) -> InterlaceInfo {
        let comb_factor = comb_factor(luma, stride, rows);

        self.avg_comb = (self.avg_comb * self.frame_count as f32 + comb_factor)
            / (self.frame_count + 1) as f32;
        self.frame_count += 1;

        let field_order = match self.detected_order {
            Some(order) if self.frame_count >= 10 => order,
            _ => {
                let order = detect_field_order(luma, stride, rows);
                self.detected_order = Some(order);
                order
            }
        };

        InterlaceInfo {
            is_interlaced: comb_factor > 15.0,
            field_order,
            comb_factor,
        }
    }

    pub fn average_comb(&self) -> f32 {
        self.avg_comb
    }
}

fn comb_factor(luma: &[u8], stride: usize, rows: usize) -> f32 {
    if rows < 3 {
        return 0.0;
    }
    let mut comb_sum = 0i64;
    let mut samples = 0u64;

    for y in 1..rows - 1 {
        for x in (0..stride).step_by(4) {
            let idx = y * stride + x;
            let above = luma[idx - stride] as i32;
            let current = luma[idx] as i32;
            let below = luma[idx + stride] as i32;
            comb_sum += (2 * current - above - below).abs() as i64;
            samples += 1;
        }
    }

    if samples > 0 {
        comb_sum as f32 / samples as f32
    } else {
        0.0
    }
}

fn detect_field_order(luma: &[u8], stride: usize, rows: usize) -> FieldOrder {
    if rows < 5 {
        return FieldOrder::TopFirst;
    }
    let mut top_motion = 0i64;
    let mut bottom_motion = 0i64;

    for y in 2..rows - 2 {
        for x in (0..stride).step_by(8) {
            let idx = y * stride + x;
            let current = luma[idx] as i32;
            let two_up = luma[idx - 2 * stride] as i32;
            let two_down = luma[idx + 2 * stride] as i32;
            let diff = (2 * current - two_up - two_down).abs() as i64;
            if y % 2 == 0 {
                top_motion += diff;
            } else {
                bottom_motion += diff;
            }
        }
    }

    if bottom_motion > top_motion * 110 / 100 {
        FieldOrder::BottomFirst
    } else {
        FieldOrder::TopFirst
    }
}

pub struct Deinterlacer {
    mode: DeinterlaceMode,
    detector: InterlaceDetector,
    prev: Option<Picture>,
}

impl Deinterlacer {
    pub fn new(mode: DeinterlaceMode) -> Self {
        Self {
            mode,
            detector: InterlaceDetector::new(),
            prev: None,
        }
    }

    /// Deinterlaces `src` into `dst`, which has the same layout and size.
    /// Returns false when the picture was copied unfiltered.
    pub fn process(&mut self, src: &Picture, dst: &mut Picture) -> bool {
        let Some(luma) = src.shape(0) else {
            dst.copy_from(src);
            return false;
        };
        let info = self.detector.analyze(src.plane(0), luma.row_bytes(), luma.rows);

        let mode = match self.mode {
            DeinterlaceMode::Auto if !info.is_interlaced => None,
            DeinterlaceMode::Auto => Some(DeinterlaceMode::Yadif),
            other => Some(other),
        };

        let filtered = match mode {
            None => {
                dst.copy_from(src);
                false
            }
            Some(mode) => {
                let keep = info.field_order.kept_parity();
                let prev = self.prev.as_ref();
                for (index, out) in dst.planes_mut().into_iter().enumerate() {
                    let Some(shape) = src.shape(index) else { continue };
                    let stride = shape.row_bytes();
                    let current = src.plane(index);
                    match mode {
                        DeinterlaceMode::Bob => bob(current, out, stride, shape.rows, keep),
                        DeinterlaceMode::Yadif => {
                            let previous = prev.map(|p| p.plane(index)).unwrap_or(current);
                            yadif(current, previous, out, stride, shape.rows, keep)
                        }
                        _ => blend(current, out, stride, shape.rows),
                    }
                }
                dst.pts = src.pts;
                dst.repeat_pict = src.repeat_pict;
                true
            }
        };

        match self.prev.as_mut() {
            Some(prev) => prev.copy_from(src),
            None => self.prev = Some(src.clone()),
        }
        filtered
    }
}

/// Rebuilds the dropped field by averaging its neighbours.
fn bob(src: &[u8], dst: &mut [u8], stride: usize, rows: usize, keep: usize) {
    if rows < 2 {
        dst.copy_from_slice(src);
        return;
    }
    for y in 0..rows {
        let line = y * stride..(y + 1) * stride;
        if y % 2 == keep {
            dst[line.clone()].copy_from_slice(&src[line]);
            continue;
        }
        let above = if y > 0 { y - 1 } else { 1 };
        let below = if y < rows - 1 { y + 1 } else { rows - 2 };
        for x in 0..stride {
            let a = src[above * stride + x] as u16;
            let b = src[below * stride + x] as u16;
            dst[y * stride + x] = ((a + b) / 2) as u8;
        }
    }
}

/// [1 2 1] vertical low-pass over every line.
fn blend(src: &[u8], dst: &mut [u8], stride: usize, rows: usize) {
    if rows < 3 {
        dst.copy_from_slice(src);
        return;
    }
    dst[..stride].copy_from_slice(&src[..stride]);
    for y in 1..rows - 1 {
        for x in 0..stride {
            let above = src[(y - 1) * stride + x] as u16;
            let current = src[y * stride + x] as u16;
            let below = src[(y + 1) * stride + x] as u16;
            dst[y * stride + x] = ((above + 2 * current + below) / 4) as u8;
        }
    }
    let last = (rows - 1) * stride;
    dst[last..].copy_from_slice(&src[last..]);
}

/// Spatial or temporal interpolation of the dropped field, whichever edge
/// is weaker.
fn yadif(src: &[u8], prev: &[u8], dst: &mut [u8], stride: usize, rows: usize, keep: usize) {
    for y in 0..rows {
        if y % 2 == keep {
            let line = y * stride..(y + 1) * stride;
            dst[line.clone()].copy_from_slice(&src[line]);
            continue;
        }
        for x in 0..stride {
            let idx = y * stride + x;
            let c = src[idx] as i32;
            let d = if y > 0 { src[idx - stride] as i32 } else { c };
            let e = if y < rows - 1 { src[idx + stride] as i32 } else { c };

            let p_c = prev[idx] as i32;
            let p_d = if y > 0 { prev[idx - stride] as i32 } else { p_c };
            let p_e = if y < rows - 1 { prev[idx + stride] as i32 } else { p_c };

            let spatial = (d + e) / 2;
            let temporal = (p_d + p_e) / 2;
            let edge_h = (d - e).abs();
            let edge_t = ((d - p_d).abs() + (e - p_e).abs()) / 2;

            let result = if edge_t < edge_h { temporal } else { spatial };
            dst[idx] = result.clamp(0, 255) as u8;
        }
    }
}
