//! Audio decoding through symphonia.
//!
//! Each non-empty `decode` call is one compressed packet. Decoded samples
//! that do not fit the caller's buffer are held back and handed out first
//! on the following calls, before any new packet is accepted. G.711 has no
//! packet boundaries, so its input is cut into whole-frame packets here.

use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{
    CodecParameters, CodecType, Decoder as SymphoniaCodec, DecoderOptions, CODEC_TYPE_AAC,
    CODEC_TYPE_FLAC, CODEC_TYPE_MP2, CODEC_TYPE_MP3, CODEC_TYPE_PCM_ALAW, CODEC_TYPE_PCM_MULAW,
    CODEC_TYPE_VORBIS,
};
use symphonia::core::formats::Packet;
use tracing::trace;

use super::{AudioDecoder, AudioDecoderParams, CodecError, DecodeProgress};
use crate::registry::CodecId;

/// Sample frames per G.711 packet
const PCM_PACKET_FRAMES: usize = 4096;

/// Speaker positions in interleaving order
const CHANNEL_ORDER: [Channels; 8] = [
    Channels::FRONT_LEFT,
    Channels::FRONT_RIGHT,
    Channels::FRONT_CENTRE,
    Channels::LFE1,
    Channels::REAR_LEFT,
    Channels::REAR_RIGHT,
    Channels::SIDE_LEFT,
    Channels::SIDE_RIGHT,
];

fn codec_type(codec: CodecId) -> Option<CodecType> {
    match codec {
        CodecId::Mp2 => Some(CODEC_TYPE_MP2),
        CodecId::Mp3 => Some(CODEC_TYPE_MP3),
        CodecId::Aac => Some(CODEC_TYPE_AAC),
        CodecId::Vorbis => Some(CODEC_TYPE_VORBIS),
        CodecId::Flac => Some(CODEC_TYPE_FLAC),
        CodecId::PcmAlaw => Some(CODEC_TYPE_PCM_ALAW),
        CodecId::PcmMulaw => Some(CODEC_TYPE_PCM_MULAW),
        _ => None,
    }
}

/// Whether symphonia decodes this codec.
pub fn supports(codec: CodecId) -> bool {
    codec_type(codec).is_some()
}

fn channel_layout(count: u16) -> Result<Channels, CodecError> {
    if count == 0 || count as usize > CHANNEL_ORDER.len() {
        return Err(CodecError::UnsupportedChannels(count));
    }
    Ok(CHANNEL_ORDER[..count as usize]
        .iter()
        .fold(Channels::empty(), |layout, &position| layout | position))
}

pub struct SymphoniaDecoder {
    codec: CodecId,
    decoder: Box<dyn SymphoniaCodec>,
    sample_rate: u32,
    channels: u16,
    /// Largest packet cut from unframed input, in bytes
    packet_limit: Option<usize>,
    /// Decoded native-endian s16 bytes not yet handed out
    pending: Vec<u8>,
    packets: u64,
}

impl SymphoniaDecoder {
    pub fn new(params: &AudioDecoderParams) -> Result<Self, CodecError> {
        let codec_type = codec_type(params.codec)
            .ok_or_else(|| CodecError::Unsupported(format!("{:?}", params.codec)))?;

        let mut codec_params = CodecParameters::new();
        codec_params
            .for_codec(codec_type)
            .with_sample_rate(params.sample_rate)
            .with_channels(channel_layout(params.channels)?);
        if !params.extra.is_empty() {
            codec_params.with_extra_data(params.extra.to_vec().into_boxed_slice());
        }
        let packet_limit = matches!(params.codec, CodecId::PcmAlaw | CodecId::PcmMulaw).then(|| {
            codec_params.with_max_frames_per_packet(PCM_PACKET_FRAMES as u64);
            PCM_PACKET_FRAMES * params.channels as usize
        });

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| CodecError::Backend(format!("Symphonia: {}", e)))?;

        Ok(Self {
            codec: params.codec,
            decoder,
            sample_rate: params.sample_rate,
            channels: params.channels,
            packet_limit,
            pending: Vec::new(),
            packets: 0,
        })
    }

    fn drain_pending(&mut self, output: &mut [u8]) -> usize {
        let n = self.pending.len().min(output.len() & !1);
        output[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        n
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&mut self, input: &[u8], output: &mut [u8]) -> Result<DecodeProgress, CodecError> {
        if !self.pending.is_empty() || input.is_empty() {
            return Ok(DecodeProgress {
                consumed: 0,
                written: self.drain_pending(output),
            });
        }

        let input = match self.packet_limit {
            Some(limit) => {
                let frame = self.channels.max(1) as usize;
                &input[..input.len().min(limit) / frame * frame]
            }
            None => input,
        };
        if input.is_empty() {
            return Ok(DecodeProgress::default());
        }

        let packet = Packet::new_from_slice(0, self.packets, 0, input);
        self.packets += 1;

        match self.decoder.decode(&packet) {
            Ok(decoded) => {
                let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
                samples.copy_interleaved_ref(decoded);
                trace!(samples = samples.samples().len(), "symphonia packet decoded");
                self.pending
                    .extend(samples.samples().iter().flat_map(|s| s.to_ne_bytes()));
            }
            Err(e) => return Err(CodecError::InvalidData(format!("Symphonia decode error: {}", e))),
        }

        Ok(DecodeProgress {
            consumed: input.len(),
            written: self.drain_pending(output),
        })
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn name(&self) -> &str {
        match self.codec {
            CodecId::Mp2 => "symphonia-mp2",
            CodecId::Mp3 => "symphonia-mp3",
            CodecId::Aac => "symphonia-aac",
            CodecId::Vorbis => "symphonia-vorbis",
            CodecId::PcmAlaw => "symphonia-alaw",
            CodecId::PcmMulaw => "symphonia-mulaw",
            _ => "symphonia-flac",
        }
    }
}
