//! Elementary stream formats.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ============================================================================
// FourCC
// ============================================================================

/// Four-byte format identifier. Short names are padded with spaces, so
/// `"mp3"` and `"mp3 "` are the same code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FourCC([u8; 4]);

impl FourCC {
    pub const fn new(code: [u8; 4]) -> Self {
        Self(code)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl FromStr for FourCC {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 4 || !s.is_ascii() {
            return Err(format!("invalid fourcc {s:?}"));
        }
        let mut code = *b"    ";
        code[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self(code))
    }
}

impl TryFrom<String> for FourCC {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FourCC> for String {
    fn from(fourcc: FourCC) -> Self {
        fourcc.to_string()
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{self}'")
    }
}

// ============================================================================
// Rational
// ============================================================================

/// Frame rate as `num / den` frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }
}

// ============================================================================
// Stream formats
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamCategory {
    Audio,
    Video,
    /// Subtitles, data, anything this core never transcodes
    Other,
}

/// Format of one elementary stream. Audio fields are zero for video
/// streams and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsFormat {
    pub category: StreamCategory,
    pub fourcc: FourCC,
    pub sample_rate: u32,
    pub channels: u16,
    pub block_align: u32,
    pub bitrate: u32,
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate of raw video sources
    pub frame_rate: Option<Rational>,
    /// Codec-specific header bytes (VOL, Vorbis headers, ...)
    pub extra: Bytes,
}

impl EsFormat {
    pub fn audio(fourcc: FourCC, sample_rate: u32, channels: u16) -> Self {
        Self {
            category: StreamCategory::Audio,
            fourcc,
            sample_rate,
            channels,
            block_align: 0,
            bitrate: 0,
            width: 0,
            height: 0,
            frame_rate: None,
            extra: Bytes::new(),
        }
    }

    pub fn video(fourcc: FourCC, width: u32, height: u32) -> Self {
        Self {
            category: StreamCategory::Video,
            fourcc,
            sample_rate: 0,
            channels: 0,
            block_align: 0,
            bitrate: 0,
            width,
            height,
            frame_rate: None,
            extra: Bytes::new(),
        }
    }

    pub fn other(fourcc: FourCC) -> Self {
        Self {
            category: StreamCategory::Other,
            ..Self::video(fourcc, 0, 0)
        }
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_block_align(mut self, block_align: u32) -> Self {
        self.block_align = block_align;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: Rational) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    pub fn with_extra(mut self, extra: impl Into<Bytes>) -> Self {
        self.extra = extra.into();
        self
    }
}

/// Source and destination format of a transcoded stream.
///
/// The destination is fixed at session creation except for video
/// dimensions, patched once from the first decoded picture, and the audio
/// channel count, lowered by the source clamp and the stereo fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub source: EsFormat,
    pub destination: EsFormat,
}

impl StreamDescriptor {
    pub fn category(&self) -> StreamCategory {
        self.source.category
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_fourcc_is_space_padded() {
        let fcc: FourCC = "mp3".parse().unwrap();
        assert_eq!(fcc, FourCC::new(*b"mp3 "));
        assert_eq!(fcc.to_string(), "mp3 ");
        assert!("toolong".parse::<FourCC>().is_err());
        assert!("".parse::<FourCC>().is_err());
    }

    #[test]
    fn fourcc_serializes_as_string() {
        let fcc = FourCC::new(*b"I420");
        let json = serde_json::to_string(&fcc).unwrap();
        assert_eq!(json, "\"I420\"");
        let back: FourCC = serde_json::from_str("\"u8\"").unwrap();
        assert_eq!(back, FourCC::new(*b"u8  "));
    }
}
