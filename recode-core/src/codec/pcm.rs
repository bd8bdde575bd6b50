//! PCM sample formats and G.711 companding.
//!
//! Everything inside the engines is interleaved native-endian s16. Raw
//! sources are normalized to it without a decoder; the encoders here turn
//! it back into a wire format. G.711 decoding lives with the symphonia
//! decoders.

use super::{AudioEncoder, AudioEncoderParams, CodecError, DecodeProgress, EncodedAudio};
use crate::format::FourCC;
use crate::registry::CodecId;

/// Highest channel count the PCM family accepts
pub const MAX_PCM_CHANNELS: u16 = 8;

// ============================================================================
// Raw source normalization
// ============================================================================

/// Uncompressed source sample formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSampleFormat {
    S8,
    U8,
    S16Le,
    S16Be,
}

impl RawSampleFormat {
    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match fourcc.as_bytes() {
            b"s8  " => Some(Self::S8),
            b"u8  " => Some(Self::U8),
            b"s16l" => Some(Self::S16Le),
            b"s16b" => Some(Self::S16Be),
            _ => None,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::S8 | Self::U8 => 1,
            Self::S16Le | Self::S16Be => 2,
        }
    }

    /// Convert as many whole samples as fit into `output` (native s16).
    pub fn normalize(&self, input: &[u8], output: &mut [u8]) -> DecodeProgress {
        let samples = (output.len() / 2).min(input.len() / self.bytes_per_sample());
        let out = output.chunks_exact_mut(2).take(samples);
        match self {
            Self::S8 => {
                for (dst, &src) in out.zip(input) {
                    dst.copy_from_slice(&(((src as i8) as i16) << 8).to_ne_bytes());
                }
            }
            Self::U8 => {
                for (dst, &src) in out.zip(input) {
                    dst.copy_from_slice(&((src as i16 - 128) << 8).to_ne_bytes());
                }
            }
            Self::S16Le => {
                for (dst, src) in out.zip(input.chunks_exact(2)) {
                    dst.copy_from_slice(&i16::from_le_bytes([src[0], src[1]]).to_ne_bytes());
                }
            }
            Self::S16Be => {
                for (dst, src) in out.zip(input.chunks_exact(2)) {
                    dst.copy_from_slice(&i16::from_be_bytes([src[0], src[1]]).to_ne_bytes());
                }
            }
        }
        DecodeProgress {
            consumed: samples * self.bytes_per_sample(),
            written: samples * 2,
        }
    }
}

// ============================================================================
// G.711
// ============================================================================

const SEG_AEND: [i32; 8] = [0x1F, 0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF];
const SEG_UEND: [i32; 8] = [0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF, 0x1FFF];
const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 8159;

fn segment(value: i32, ends: &[i32; 8]) -> usize {
    ends.iter().position(|&end| value <= end).unwrap_or(8)
}

pub fn linear_to_alaw(sample: i16) -> u8 {
    let mut pcm = (sample as i32) >> 3;
    let mask = if pcm >= 0 {
        0xD5
    } else {
        pcm = -pcm - 1;
        0x55
    };
    let seg = segment(pcm, &SEG_AEND);
    if seg >= 8 {
        return (0x7F ^ mask) as u8;
    }
    let mantissa = if seg < 2 { (pcm >> 1) & 0x0F } else { (pcm >> seg) & 0x0F };
    ((((seg as i32) << 4) | mantissa) ^ mask) as u8
}

pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut pcm = (sample as i32) >> 2;
    let mask = if pcm < 0 {
        pcm = -pcm;
        0x7F
    } else {
        0xFF
    };
    pcm = pcm.min(ULAW_CLIP) + (ULAW_BIAS >> 2);
    let seg = segment(pcm, &SEG_UEND);
    if seg >= 8 {
        return (0x7F ^ mask) as u8;
    }
    ((((seg as i32) << 4) | ((pcm >> (seg + 1)) & 0x0F)) ^ mask) as u8
}

// ============================================================================
// Encoders
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmEncoding {
    S16Le,
    S16Be,
    U8,
    S8,
    Alaw,
    Mulaw,
}

impl PcmEncoding {
    pub fn for_codec(codec: CodecId) -> Option<Self> {
        match codec {
            CodecId::PcmS16Le => Some(Self::S16Le),
            CodecId::PcmS16Be => Some(Self::S16Be),
            CodecId::PcmU8 => Some(Self::U8),
            CodecId::PcmS8 => Some(Self::S8),
            CodecId::PcmAlaw => Some(Self::Alaw),
            CodecId::PcmMulaw => Some(Self::Mulaw),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::S16Le => "pcm-s16le",
            Self::S16Be => "pcm-s16be",
            Self::U8 => "pcm-u8",
            Self::S8 => "pcm-s8",
            Self::Alaw => "g711-alaw",
            Self::Mulaw => "g711-mulaw",
        }
    }
}

/// Frame-based PCM encoder. Frames are 20 ms of audio.
pub struct PcmEncoder {
    encoding: PcmEncoding,
    sample_rate: u32,
    channels: u16,
    frame_size: usize,
}

impl PcmEncoder {
    pub fn new(encoding: PcmEncoding, params: &AudioEncoderParams) -> Result<Self, CodecError> {
        if params.channels == 0 || params.channels > MAX_PCM_CHANNELS {
            return Err(CodecError::UnsupportedChannels(params.channels));
        }
        if params.sample_rate == 0 {
            return Err(CodecError::InvalidParameters("sample rate 0".into()));
        }
        Ok(Self {
            encoding,
            sample_rate: params.sample_rate,
            channels: params.channels,
            frame_size: (params.sample_rate as usize / 50).max(1),
        })
    }
}

impl AudioEncoder for PcmEncoder {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn encode(&mut self, frame: &[u8], out: &mut Vec<EncodedAudio>) -> Result<(), CodecError> {
        let expected = self.frame_size * self.channels as usize * 2;
        if frame.len() != expected {
            return Err(CodecError::InvalidData(format!(
                "frame of {} bytes, expected {expected}",
                frame.len()
            )));
        }
        let samples = frame
            .chunks_exact(2)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]));
        let data: Vec<u8> = match self.encoding {
            PcmEncoding::S16Le => samples.flat_map(i16::to_le_bytes).collect(),
            PcmEncoding::S16Be => samples.flat_map(i16::to_be_bytes).collect(),
            PcmEncoding::U8 => samples.map(|s| ((s >> 8) + 128) as u8).collect(),
            PcmEncoding::S8 => samples.map(|s| (s >> 8) as i8 as u8).collect(),
            PcmEncoding::Alaw => samples.map(linear_to_alaw).collect(),
            PcmEncoding::Mulaw => samples.map(linear_to_ulaw).collect(),
        };
        out.push(EncodedAudio {
            data,
            samples: self.frame_size as u64,
        });
        Ok(())
    }

    fn name(&self) -> &str {
        self.encoding.name()
    }
}
