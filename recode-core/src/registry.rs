//! # Format/Codec Registry
//!
//! Static lookup from container-level FourCCs to codec identifiers and
//! pixel layouts. Read-only for the life of the process.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TranscodeError};
use crate::format::FourCC;
use crate::picture::PixelLayout;

/// Codec implementation identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecId {
    // Audio
    Mp2,
    Mp3,
    Ac3,
    WmaV1,
    WmaV2,
    Vorbis,
    Aac,
    Flac,
    PcmAlaw,
    PcmMulaw,
    PcmS16Le,
    PcmS16Be,
    PcmU8,
    PcmS8,

    // Video
    Mpeg1Video,
    Mpeg2Video,
    Mpeg4,
    MsMpeg4V1,
    MsMpeg4V2,
    MsMpeg4V3,
    H263,
    H263I,
    H264,
    HuffYuv,
    Wmv1,
    Wmv2,
    Mjpeg,
    MjpegB,
    DvVideo,
    Svq1,
    Svq3,
    RawVideo,
}

impl CodecId {
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            Self::Mp2
                | Self::Mp3
                | Self::Ac3
                | Self::WmaV1
                | Self::WmaV2
                | Self::Vorbis
                | Self::Aac
                | Self::Flac
                | Self::PcmAlaw
                | Self::PcmMulaw
                | Self::PcmS16Le
                | Self::PcmS16Be
                | Self::PcmU8
                | Self::PcmS8
        )
    }
}

/// Per-destination encoder behaviour the engines need to know about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecCapabilities {
    /// Whether the encoder accepts the interpolated, possibly
    /// non-monotonic presentation timestamps set on input pictures.
    /// Encoders without this capability get pts 0 on every picture.
    pub tolerates_nonmonotonic_pts: bool,
}

const fn fcc(code: &[u8; 4]) -> FourCC {
    FourCC::new(*code)
}

static CODEC_TABLE: &[(FourCC, CodecId)] = &[
    // audio
    (fcc(b"mpga"), CodecId::Mp2),
    (fcc(b"mp3 "), CodecId::Mp3),
    (fcc(b"a52 "), CodecId::Ac3),
    (fcc(b"ac3 "), CodecId::Ac3),
    (fcc(b"wma1"), CodecId::WmaV1),
    (fcc(b"wma2"), CodecId::WmaV2),
    (fcc(b"vorb"), CodecId::Vorbis),
    (fcc(b"mp4a"), CodecId::Aac),
    (fcc(b"flac"), CodecId::Flac),
    (fcc(b"alaw"), CodecId::PcmAlaw),
    (fcc(b"ulaw"), CodecId::PcmMulaw),
    (fcc(b"mlaw"), CodecId::PcmMulaw),
    (fcc(b"s16l"), CodecId::PcmS16Le),
    (fcc(b"s16b"), CodecId::PcmS16Be),
    (fcc(b"u8  "), CodecId::PcmU8),
    (fcc(b"s8  "), CodecId::PcmS8),
    // video
    (fcc(b"mpgv"), CodecId::Mpeg1Video),
    (fcc(b"mp1v"), CodecId::Mpeg1Video),
    (fcc(b"mp2v"), CodecId::Mpeg2Video),
    (fcc(b"mp4v"), CodecId::Mpeg4),
    (fcc(b"DIV1"), CodecId::MsMpeg4V1),
    (fcc(b"DIV2"), CodecId::MsMpeg4V2),
    (fcc(b"DIV3"), CodecId::MsMpeg4V3),
    (fcc(b"H263"), CodecId::H263),
    (fcc(b"I263"), CodecId::H263I),
    (fcc(b"h264"), CodecId::H264),
    (fcc(b"avc1"), CodecId::H264),
    (fcc(b"huff"), CodecId::HuffYuv),
    (fcc(b"WMV1"), CodecId::Wmv1),
    (fcc(b"WMV2"), CodecId::Wmv2),
    (fcc(b"MJPG"), CodecId::Mjpeg),
    (fcc(b"mjpb"), CodecId::MjpegB),
    (fcc(b"dvsl"), CodecId::DvVideo),
    (fcc(b"SVQ1"), CodecId::Svq1),
    (fcc(b"SVQ3"), CodecId::Svq3),
    // raw video, only used as an encoding target
    (fcc(b"I420"), CodecId::RawVideo),
    (fcc(b"I422"), CodecId::RawVideo),
    (fcc(b"I444"), CodecId::RawVideo),
    (fcc(b"RV15"), CodecId::RawVideo),
    (fcc(b"RV16"), CodecId::RawVideo),
    (fcc(b"RV24"), CodecId::RawVideo),
    (fcc(b"RV32"), CodecId::RawVideo),
    (fcc(b"YUY2"), CodecId::RawVideo),
];

static CODECS: Lazy<HashMap<FourCC, CodecId>> =
    Lazy::new(|| CODEC_TABLE.iter().copied().collect());

static RAW_AUDIO: &[FourCC] = &[fcc(b"s8  "), fcc(b"u8  "), fcc(b"s16l"), fcc(b"s16b")];

/// Resolve a FourCC to its codec. Unknown identifiers abort creation of
/// that one session.
pub fn resolve(fourcc: FourCC) -> Result<CodecId> {
    CODECS
        .get(&fourcc)
        .copied()
        .ok_or(TranscodeError::UnknownCodec(fourcc))
}

/// Pixel layout of an uncompressed video FourCC.
pub fn chroma_layout(fourcc: FourCC) -> Option<PixelLayout> {
    match fourcc.as_bytes() {
        b"I420" => Some(PixelLayout::Yuv420p),
        b"I422" => Some(PixelLayout::Yuv422p),
        b"I444" => Some(PixelLayout::Yuv444p),
        b"RV15" => Some(PixelLayout::Rgb555),
        b"RV16" => Some(PixelLayout::Rgb565),
        b"RV24" => Some(PixelLayout::Rgb24),
        b"RV32" => Some(PixelLayout::Rgba32),
        b"GREY" => Some(PixelLayout::Gray8),
        b"YUY2" => Some(PixelLayout::Yuyv422),
        _ => None,
    }
}

/// Raw PCM sources are normalized in place of decoding.
pub fn is_raw_audio(fourcc: FourCC) -> bool {
    RAW_AUDIO.contains(&fourcc)
}

/// Raw video sources are wrapped as pictures in place of decoding.
pub fn is_raw_video(fourcc: FourCC) -> bool {
    chroma_layout(fourcc).is_some()
}

/// FourCC a destination is announced downstream as.
pub fn canonical_destination(fourcc: FourCC) -> FourCC {
    match fourcc.as_bytes() {
        b"mp3 " => fcc(b"mpga"),
        b"mp1v" | b"mp2v" => fcc(b"mpgv"),
        _ => fourcc,
    }
}

pub fn capabilities(fourcc: FourCC) -> CodecCapabilities {
    let canonical = canonical_destination(fourcc);
    CodecCapabilities {
        tolerates_nonmonotonic_pts: canonical == fcc(b"mpgv"),
    }
}
