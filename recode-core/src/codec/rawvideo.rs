//! Uncompressed video "encoder": emits the picture planes as they are.

use super::{CodecError, EncodedPicture, PictureType, VideoEncoder, VideoEncoderParams};
use crate::picture::{Picture, PixelLayout};

pub struct RawVideoEncoder {
    layout: PixelLayout,
    width: u32,
    height: u32,
}

impl RawVideoEncoder {
    pub fn new(params: &VideoEncoderParams) -> Result<Self, CodecError> {
        if params.width == 0 || params.height == 0 {
            return Err(CodecError::InvalidParameters(format!(
                "picture size {}x{}",
                params.width, params.height
            )));
        }
        Ok(Self {
            layout: params.layout,
            width: params.width,
            height: params.height,
        })
    }
}

impl VideoEncoder for RawVideoEncoder {
    fn encode(&mut self, picture: &Picture) -> Result<Option<EncodedPicture>, CodecError> {
        if picture.layout != self.layout || picture.width != self.width || picture.height != self.height {
            return Err(CodecError::InvalidData(format!(
                "{:?} {}x{} picture, encoder is {:?} {}x{}",
                picture.layout, picture.width, picture.height, self.layout, self.width, self.height
            )));
        }
        Ok(Some(EncodedPicture {
            data: picture.data.clone(),
            coded_pts: picture.pts,
            picture_type: PictureType::I,
        }))
    }

    fn delay(&self) -> u32 {
        0
    }

    fn pixel_layout(&self) -> PixelLayout {
        self.layout
    }

    fn name(&self) -> &str {
        "rawvideo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MbDecision;
    use crate::format::Rational;
    use crate::registry::CodecId;

    fn params(layout: PixelLayout) -> VideoEncoderParams {
        VideoEncoderParams {
            codec: CodecId::RawVideo,
            width: 4,
            height: 2,
            bitrate: 0,
            bitrate_tolerance: None,
            frame_rate: Rational::new(25, 1),
            gop_size: 50,
            max_b_frames: 0,
            qmin: 2,
            qmax: 31,
            mb_decision: MbDecision::Simple,
            layout,
        }
    }

    #[test]
    fn emits_intra_pictures_with_their_pts() {
        let mut encoder = RawVideoEncoder::new(&params(PixelLayout::Yuv420p)).unwrap();
        let mut picture = Picture::new(PixelLayout::Yuv420p, 4, 2);
        picture.data.iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);
        picture.pts = 40_000;
        let out = encoder.encode(&picture).unwrap().unwrap();
        assert_eq!(out.data, picture.data);
        assert_eq!(out.coded_pts, 40_000);
        assert_eq!(out.picture_type, PictureType::I);
        assert_eq!(encoder.delay(), 0);
    }

    #[test]
    fn rejects_mismatched_pictures() {
        let mut encoder = RawVideoEncoder::new(&params(PixelLayout::Rgb24)).unwrap();
        let picture = Picture::new(PixelLayout::Yuv420p, 4, 2);
        assert!(encoder.encode(&picture).is_err());
        assert!(RawVideoEncoder::new(&VideoEncoderParams { width: 0, ..params(PixelLayout::Rgb24) }).is_err());
    }
}
