//! # Codec Seam
//!
//! Engines only talk to codecs through the traits in this module, and
//! obtain instances from a [`CodecProvider`].
//!
//! ## Built-in codecs ([`BuiltinCodecs`]):
//! 1. PCM and G.711 (A-law / µ-law) encode, native
//! 2. Raw video encode, native
//! 3. G.711, MPEG audio, AAC, Vorbis, FLAC decode through symphonia
//! 4. H.264 decode through openh264 (`software-decode` feature)
//! 5. Vorbis encode through libvorbis (`vorbis-encode` feature)

pub mod pcm;
pub mod rawvideo;
pub mod symphonia_audio;

#[cfg(feature = "software-decode")]
pub mod h264;

#[cfg(feature = "vorbis-encode")]
pub mod vorbis;

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::config::MbDecision;
use crate::format::Rational;
use crate::picture::{Picture, PixelLayout};
use crate::registry::CodecId;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Unsupported codec: {0}")]
    Unsupported(String),
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u16),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Codec backend error: {0}")]
    Backend(String),
}

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone)]
pub struct AudioDecoderParams {
    pub codec: CodecId,
    pub sample_rate: u32,
    pub channels: u16,
    pub block_align: u32,
    pub bitrate: u32,
    pub extra: Bytes,
}

#[derive(Debug, Clone)]
pub struct AudioEncoderParams {
    pub codec: CodecId,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
}

#[derive(Debug, Clone)]
pub struct VideoDecoderParams {
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    pub extra: Bytes,
}

#[derive(Debug, Clone)]
pub struct VideoEncoderParams {
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub bitrate_tolerance: Option<u32>,
    pub frame_rate: Rational,
    pub gop_size: u32,
    pub max_b_frames: u32,
    pub qmin: u32,
    pub qmax: u32,
    pub mb_decision: MbDecision,
    /// Input layout the encoder expects
    pub layout: PixelLayout,
}

// ============================================================================
// Audio
// ============================================================================

/// Bytes taken from the input and bytes produced by one decode call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeProgress {
    pub consumed: usize,
    pub written: usize,
}

pub trait AudioDecoder: Send {
    /// Decode from `input` into `output` as interleaved native-endian s16.
    /// Never writes more than `output.len()` bytes.
    fn decode(&mut self, input: &[u8], output: &mut [u8]) -> Result<DecodeProgress, CodecError>;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Get decoder name for debugging
    fn name(&self) -> &str;
}

/// One compressed audio packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    pub data: Vec<u8>,
    /// Sample frames the packet covers
    pub samples: u64,
}

pub trait AudioEncoder: Send {
    /// Samples per channel consumed by every `encode` call
    fn frame_size(&self) -> usize;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Encode one frame of interleaved native-endian s16 samples, appending
    /// every finished packet to `out`. An encoder that buffers internally
    /// may append nothing.
    fn encode(&mut self, frame: &[u8], out: &mut Vec<EncodedAudio>) -> Result<(), CodecError>;

    /// Packets a decoder needs before any audio, sent once ahead of the
    /// first audio packet
    fn headers(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    /// Sample frames accepted but not yet returned in a packet
    fn delay(&self) -> u64 {
        0
    }

    fn name(&self) -> &str;
}

// ============================================================================
// Video
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    I,
    P,
    B,
}

impl PictureType {
    /// Pictures other pictures predict from
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::I | Self::P)
    }
}

/// Stamps a picture with the timestamp of the compressed unit being
/// decoded. Decoders call it when they acquire the picture buffer, before
/// any reordering, so the stamp follows the picture.
pub trait FrameTimestampTagger {
    fn tag(&self, picture: &mut Picture);
}

#[derive(Debug, Default)]
pub struct VideoDecodeOutput {
    pub consumed: usize,
    pub picture: Option<Picture>,
}

pub trait VideoDecoder: Send {
    fn decode(
        &mut self,
        data: &[u8],
        tagger: &dyn FrameTimestampTagger,
    ) -> Result<VideoDecodeOutput, CodecError>;

    /// Coded width, known once the stream headers were seen
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn pixel_layout(&self) -> PixelLayout;

    fn frame_rate(&self) -> Option<Rational>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPicture {
    pub data: Vec<u8>,
    /// Pts of the picture this output belongs to, as the encoder reports it
    pub coded_pts: i64,
    pub picture_type: PictureType,
}

pub trait VideoEncoder: Send {
    /// `None` when the encoder buffered the picture without output.
    fn encode(&mut self, picture: &Picture) -> Result<Option<EncodedPicture>, CodecError>;

    /// Pictures of reordering delay between input and output
    fn delay(&self) -> u32;

    fn pixel_layout(&self) -> PixelLayout;

    fn name(&self) -> &str;
}

// ============================================================================
// Provider
// ============================================================================

pub trait CodecProvider: Send + Sync {
    /// Provider name for error reports
    fn name(&self) -> &str;

    fn has_decoder(&self, codec: CodecId) -> bool;

    fn has_encoder(&self, codec: CodecId) -> bool;

    fn audio_decoder(&self, params: &AudioDecoderParams) -> Result<Box<dyn AudioDecoder>, CodecError>;

    fn audio_encoder(&self, params: &AudioEncoderParams) -> Result<Box<dyn AudioEncoder>, CodecError>;

    fn video_decoder(&self, params: &VideoDecoderParams) -> Result<Box<dyn VideoDecoder>, CodecError>;

    fn video_encoder(&self, params: &VideoEncoderParams) -> Result<Box<dyn VideoEncoder>, CodecError>;
}

/// Codecs available without any embedder-supplied backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCodecs;

impl CodecProvider for BuiltinCodecs {
    fn name(&self) -> &str {
        "builtin"
    }

    fn has_decoder(&self, codec: CodecId) -> bool {
        match codec {
            CodecId::H264 => cfg!(feature = "software-decode"),
            other => symphonia_audio::supports(other),
        }
    }

    fn has_encoder(&self, codec: CodecId) -> bool {
        match codec {
            CodecId::RawVideo => true,
            CodecId::Vorbis => cfg!(feature = "vorbis-encode"),
            other => pcm::PcmEncoding::for_codec(other).is_some(),
        }
    }

    fn audio_decoder(&self, params: &AudioDecoderParams) -> Result<Box<dyn AudioDecoder>, CodecError> {
        debug!(codec = ?params.codec, rate = params.sample_rate, channels = params.channels, "opening audio decoder");
        match params.codec {
            codec if symphonia_audio::supports(codec) => {
                Ok(Box::new(symphonia_audio::SymphoniaDecoder::new(params)?))
            }
            codec => Err(CodecError::Unsupported(format!("{codec:?} decoding"))),
        }
    }

    fn audio_encoder(&self, params: &AudioEncoderParams) -> Result<Box<dyn AudioEncoder>, CodecError> {
        debug!(codec = ?params.codec, rate = params.sample_rate, channels = params.channels, "opening audio encoder");
        match params.codec {
            #[cfg(feature = "vorbis-encode")]
            CodecId::Vorbis => Ok(Box::new(vorbis::VorbisEncoder::new(params)?)),
            codec => match pcm::PcmEncoding::for_codec(codec) {
                Some(encoding) => Ok(Box::new(pcm::PcmEncoder::new(encoding, params)?)),
                None => Err(CodecError::Unsupported(format!("{codec:?} encoding"))),
            },
        }
    }

    fn video_decoder(&self, params: &VideoDecoderParams) -> Result<Box<dyn VideoDecoder>, CodecError> {
        debug!(codec = ?params.codec, width = params.width, height = params.height, "opening video decoder");
        match params.codec {
            #[cfg(feature = "software-decode")]
            CodecId::H264 => Ok(Box::new(h264::OpenH264Decoder::new(params)?)),
            codec => Err(CodecError::Unsupported(format!("{codec:?} decoding"))),
        }
    }

    fn video_encoder(&self, params: &VideoEncoderParams) -> Result<Box<dyn VideoEncoder>, CodecError> {
        debug!(codec = ?params.codec, width = params.width, height = params.height, "opening video encoder");
        match params.codec {
            CodecId::RawVideo => Ok(Box::new(rawvideo::RawVideoEncoder::new(params)?)),
            codec => Err(CodecError::Unsupported(format!("{codec:?} encoding"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_capabilities() {
        let codecs = BuiltinCodecs;
        assert!(codecs.has_encoder(CodecId::PcmAlaw));
        assert!(codecs.has_encoder(CodecId::PcmS16Le));
        assert!(codecs.has_encoder(CodecId::RawVideo));
        assert!(!codecs.has_encoder(CodecId::Mpeg4));
        assert_eq!(codecs.has_encoder(CodecId::Vorbis), cfg!(feature = "vorbis-encode"));
        assert!(!codecs.has_encoder(CodecId::Aac));

        assert!(codecs.has_decoder(CodecId::PcmMulaw));
        assert!(codecs.has_decoder(CodecId::Mp3));
        assert!(!codecs.has_decoder(CodecId::Wmv2));
    }

    #[test]
    fn only_i_and_p_are_references() {
        assert!(PictureType::I.is_reference());
        assert!(PictureType::P.is_reference());
        assert!(!PictureType::B.is_reference());
    }
}
