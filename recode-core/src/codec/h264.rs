//! H.264 decoding through openh264.

use openh264::decoder::Decoder;
use openh264::formats::YUVSource;
use tracing::debug;

use super::{CodecError, FrameTimestampTagger, VideoDecodeOutput, VideoDecoder, VideoDecoderParams};
use crate::format::Rational;
use crate::picture::{Picture, PixelLayout};

pub struct OpenH264Decoder {
    decoder: Decoder,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl OpenH264Decoder {
    pub fn new(params: &VideoDecoderParams) -> Result<Self, CodecError> {
        let mut decoder =
            Decoder::new().map_err(|e| CodecError::Backend(format!("OpenH264 init: {:?}", e)))?;

        // Annex B parameter sets in the extra bytes go in ahead of the stream
        if is_annexb(&params.extra) {
            if let Err(e) = decoder.decode(&params.extra) {
                debug!("openh264 rejected stream headers: {:?}", e);
            }
        }

        Ok(Self {
            decoder,
            width: params.width,
            height: params.height,
            frame_count: 0,
        })
    }
}

fn is_annexb(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 0, 1]) || data.starts_with(&[0, 0, 1])
}

/// MP4-style length-prefixed NAL units to Annex B.
fn to_annexb(data: &[u8]) -> Vec<u8> {
    if is_annexb(data) {
        return data.to_vec();
    }

    let mut annexb = Vec::with_capacity(data.len() + 32);
    let mut offset = 0;
    while offset + 4 <= data.len() {
        let nalu_len = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        offset += 4;
        if offset + nalu_len > data.len() {
            break;
        }
        annexb.extend_from_slice(&[0, 0, 0, 1]);
        annexb.extend_from_slice(&data[offset..offset + nalu_len]);
        offset += nalu_len;
    }

    if annexb.is_empty() {
        data.to_vec()
    } else {
        annexb
    }
}

/// Copies `rows` rows of `columns` bytes out of a strided plane.
fn copy_plane(dst: &mut [u8], src: &[u8], stride: usize, columns: usize, rows: usize) {
    for (row, out) in dst.chunks_exact_mut(columns).take(rows).enumerate() {
        let start = row * stride;
        if let Some(line) = src.get(start..start + columns) {
            out.copy_from_slice(line);
        }
    }
}

impl VideoDecoder for OpenH264Decoder {
    fn decode(
        &mut self,
        data: &[u8],
        tagger: &dyn FrameTimestampTagger,
    ) -> Result<VideoDecodeOutput, CodecError> {
        let annexb = to_annexb(data);

        let yuv = match self.decoder.decode(&annexb) {
            Ok(Some(yuv)) => yuv,
            Ok(None) => {
                return Ok(VideoDecodeOutput {
                    consumed: data.len(),
                    picture: None,
                })
            }
            Err(e) => return Err(CodecError::InvalidData(format!("OpenH264 decode error: {:?}", e))),
        };

        let (width, height) = yuv.dimensions();
        let (y_stride, u_stride, v_stride) = yuv.strides();

        let mut picture = Picture::new(PixelLayout::Yuv420p, width as u32, height as u32);
        tagger.tag(&mut picture);
        let shapes = PixelLayout::Yuv420p.plane_shapes(width as u32, height as u32);
        let sources = [(yuv.y(), y_stride), (yuv.u(), u_stride), (yuv.v(), v_stride)];
        for ((plane, shape), (src, stride)) in picture.planes_mut().into_iter().zip(&shapes).zip(sources) {
            copy_plane(plane, src, stride, shape.columns, shape.rows);
        }

        self.width = width as u32;
        self.height = height as u32;
        self.frame_count += 1;

        Ok(VideoDecodeOutput {
            consumed: data.len(),
            picture: Some(picture),
        })
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pixel_layout(&self) -> PixelLayout {
        PixelLayout::Yuv420p
    }

    fn frame_rate(&self) -> Option<Rational> {
        None
    }

    fn name(&self) -> &str {
        "openh264"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefixed_nal_units_get_start_codes() {
        let avcc = [0, 0, 0, 2, 0x67, 0x42, 0, 0, 0, 1, 0x68];
        assert_eq!(to_annexb(&avcc), vec![0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x68]);
        let annexb = [0, 0, 1, 0x65, 0x88];
        assert_eq!(to_annexb(&annexb), annexb.to_vec());
    }

    #[test]
    fn strided_planes_are_packed() {
        let src = [1, 2, 9, 9, 3, 4, 9, 9];
        let mut dst = [0u8; 4];
        copy_plane(&mut dst, &src, 4, 2, 2);
        assert_eq!(dst, [1, 2, 3, 4]);
    }
}
