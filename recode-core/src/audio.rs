//! # Audio Transcode Engine
//!
//! decode → (resample) → channel remap → encode, with staging buffers
//! between the stages:
//!
//! ```text
//! input (growable) → decoded (bounded) → [resampled] → encoder frames
//! ```
//!
//! Every emitted unit is stamped from a sample clock that each input unit
//! rebases by the audio still held in the engine, so output timestamps
//! stay gapless across variable-size decode and encode steps. Audio held
//! counts the resampler's filter delay and samples the encoder has taken
//! without returning a packet yet.

use std::convert::Infallible;

use tracing::{debug, info, warn};

use crate::buffer::StagingBuffer;
use crate::codec::pcm::RawSampleFormat;
use crate::codec::{
    AudioDecoder, AudioDecoderParams, AudioEncoder, AudioEncoderParams, CodecError, CodecProvider,
    EncodedAudio,
};
use crate::config::{AudioTarget, DEFAULT_AUDIO_BITRATE};
use crate::error::{Result, TranscodeError};
use crate::format::{EsFormat, StreamDescriptor};
use crate::registry::{self, CodecId};
use crate::resample::AudioResampler;
use crate::timing::{samples_to_us, SampleClock};
use crate::unit::MediaUnit;

/// Largest amount of audio one decode step may produce, in bytes
pub const MAX_AUDIO_FRAME_SIZE: usize = 192_000;

/// Decoded staging capacity
const DECODED_CAPACITY: usize = 2 * MAX_AUDIO_FRAME_SIZE;

/// Destination format for an audio source: configured values, falling back
/// to the source's.
pub fn destination_format(source: &EsFormat, target: &AudioTarget) -> EsFormat {
    let sample_rate = if target.sample_rate > 0 {
        target.sample_rate
    } else {
        source.sample_rate
    };
    let channels = if target.channels > 0 {
        target.channels
    } else {
        source.channels
    };
    let bitrate = if target.bitrate > 0 {
        target.bitrate
    } else {
        DEFAULT_AUDIO_BITRATE
    };
    EsFormat::audio(target.codec, sample_rate, channels).with_bitrate(bitrate)
}

enum SampleSource {
    /// Uncompressed source, normalized to native s16
    Raw(RawSampleFormat),
    Decoder(Box<dyn AudioDecoder>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioState {
    Ready,
    Decoding,
    Encoding,
    Closed,
}

pub struct AudioEngine {
    source: SampleSource,
    encoder: Box<dyn AudioEncoder>,
    resampler: Option<AudioResampler>,
    state: AudioState,
    clock: SampleClock,
    /// Rate and channel count of decoded samples
    decoder_rate: u32,
    decoder_channels: u16,
    input: StagingBuffer,
    decoded: StagingBuffer,
    resampled: StagingBuffer,
    packets: Vec<EncodedAudio>,
    headers_sent: bool,
    /// Remapped copy of the frame being encoded
    remap: Vec<u8>,
    resample_scratch: Vec<u8>,
}

impl AudioEngine {
    /// Opens decoder, encoder and resampler for `descriptor`. The
    /// destination channel count is lowered to what was actually opened and
    /// the destination FourCC is canonicalized.
    pub fn open(descriptor: &mut StreamDescriptor, codecs: &dyn CodecProvider) -> Result<Self> {
        let source = &descriptor.source;

        let (sample_source, decoder_rate, decoder_channels) = match RawSampleFormat::from_fourcc(source.fourcc) {
            Some(format) => {
                debug!(fourcc = %source.fourcc, "raw audio source, no decoder");
                (SampleSource::Raw(format), source.sample_rate, source.channels)
            }
            None => {
                let codec = registry::resolve(source.fourcc)?;
                if !codecs.has_decoder(codec) {
                    return Err(TranscodeError::NoCodec {
                        role: "decoder",
                        codec,
                        tried: vec![codecs.name().to_string()],
                    });
                }
                let params = AudioDecoderParams {
                    codec,
                    sample_rate: source.sample_rate,
                    channels: source.channels,
                    block_align: source.block_align,
                    bitrate: source.bitrate,
                    extra: source.extra.clone(),
                };
                let decoder = codecs
                    .audio_decoder(&params)
                    .map_err(|source| TranscodeError::CodecOpen {
                        role: "decoder",
                        codec,
                        source,
                    })?;
                let rate = match decoder.sample_rate() {
                    0 => params.sample_rate,
                    rate => rate,
                };
                let channels = match decoder.channels() {
                    0 => params.channels,
                    channels => channels,
                };
                (SampleSource::Decoder(decoder), rate, channels)
            }
        };

        let destination = &mut descriptor.destination;
        if destination.channels > decoder_channels {
            debug!(
                requested = destination.channels,
                source = decoder_channels,
                "clamping destination channels to source"
            );
            destination.channels = decoder_channels;
        }

        let codec = registry::resolve(destination.fourcc)?;
        if !codecs.has_encoder(codec) {
            return Err(TranscodeError::NoCodec {
                role: "encoder",
                codec,
                tried: vec![codecs.name().to_string()],
            });
        }
        let encoder = open_encoder(codecs, codec, destination)?;
        destination.fourcc = registry::canonical_destination(destination.fourcc);

        let encoder_rate = encoder.sample_rate();
        let resampler = if encoder_rate != decoder_rate {
            let resampler = AudioResampler::new(decoder_rate, encoder_rate, decoder_channels)
                .map_err(|source| TranscodeError::CodecOpen {
                    role: "resampler",
                    codec,
                    source,
                })?;
            Some(resampler)
        } else {
            None
        };

        info!(
            source = %descriptor.source.fourcc,
            destination = %destination.fourcc,
            rate = encoder_rate,
            channels = destination.channels,
            resampling = resampler.is_some(),
            encoder = encoder.name(),
            "audio engine ready"
        );

        Ok(Self {
            source: sample_source,
            encoder,
            resampler,
            state: AudioState::Ready,
            clock: SampleClock::new(),
            decoder_rate,
            decoder_channels,
            input: StagingBuffer::growable(),
            decoded: StagingBuffer::bounded(DECODED_CAPACITY),
            resampled: StagingBuffer::growable(),
            packets: Vec::new(),
            headers_sent: false,
            remap: Vec::new(),
            resample_scratch: Vec::new(),
        })
    }

    pub fn state(&self) -> AudioState {
        self.state
    }

    /// Microseconds of audio held between input and encoder
    fn buffered_us(&self) -> i64 {
        let frame = self.decoder_channels.max(1) as usize * 2;
        let mut us = samples_to_us((self.decoded.len() / frame) as u64, self.decoder_rate);
        if let Some(resampler) = &self.resampler {
            us += samples_to_us(resampler.pending_frames() as u64, resampler.source_rate());
            let resampled = (self.resampled.len() / frame + resampler.delay_frames()) as u64;
            us += samples_to_us(resampled, resampler.target_rate());
        }
        us + samples_to_us(self.encoder.delay(), self.encoder.sample_rate())
    }

    /// Pushes one input unit through the engine, appending the encoded
    /// units to `out` in emission order. Units encoded before an error are
    /// left in `out`.
    pub fn process(&mut self, unit: &MediaUnit, out: &mut Vec<MediaUnit>) -> Result<()> {
        if self.state == AudioState::Closed {
            return Err(TranscodeError::SessionClosed);
        }

        let buffered_us = self.buffered_us();
        self.clock.rebase(unit.dts, buffered_us);
        self.input.push(&unit.data);

        if !self.headers_sent {
            self.headers_sent = true;
            let dts = self.clock.dts();
            out.extend(
                self.encoder
                    .headers()
                    .into_iter()
                    .map(|header| MediaUnit::new(header, dts, dts, 0)),
            );
        }

        let before = out.len();
        let result = self.run(out);
        self.state = AudioState::Ready;

        debug!(
            in_bytes = unit.len(),
            out_units = out.len() - before,
            buffered = self.decoded.len() + self.resampled.len(),
            "audio unit processed"
        );
        result
    }

    fn run(&mut self, out: &mut Vec<MediaUnit>) -> Result<()> {
        loop {
            self.state = AudioState::Decoding;
            let (again, decoded) = self.decode_pass();
            let resampled = self.resample_pass()?;

            self.state = AudioState::Encoding;
            let encoded = self.encode_pass(out);

            if !again || !(decoded || resampled || encoded) {
                return Ok(());
            }
        }
    }

    /// Returns (again, progress).
    fn decode_pass(&mut self) -> (bool, bool) {
        let Self {
            source,
            input,
            decoded,
            ..
        } = self;

        match source {
            SampleSource::Raw(format) => {
                let free = decoded.free();
                let progress = decoded
                    .fill_with(free, |tail| {
                        let progress = format.normalize(input.as_slice(), tail);
                        Ok::<_, Infallible>((progress.written, progress))
                    })
                    .unwrap_or_default();
                input.consume(progress.consumed);
                input.compact();
                (!input.is_empty(), progress.consumed > 0)
            }
            SampleSource::Decoder(decoder) => {
                let mut again = false;
                let mut progress = false;
                loop {
                    let free = decoded.free();
                    if free == 0 {
                        again = true;
                        break;
                    }
                    let data = input.as_slice();
                    let step = decoded.fill_with(free, |tail| {
                        decoder.decode(data, tail).map(|p| (p.written, p))
                    });
                    match step {
                        Ok(step) => {
                            input.consume(step.consumed);
                            input.compact();
                            if step.consumed == 0 && step.written == 0 {
                                break;
                            }
                            progress = true;
                            if decoded.len() >= MAX_AUDIO_FRAME_SIZE {
                                again = true;
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(decoder = decoder.name(), error = %e, "audio decode failed, dropping staged input");
                            input.clear();
                            break;
                        }
                    }
                }
                (again, progress)
            }
        }
    }

    fn resample_pass(&mut self) -> Result<bool> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(false);
        };
        self.resample_scratch.clear();
        let taken = resampler
            .process(self.decoded.as_slice(), &mut self.resample_scratch)
            .map_err(TranscodeError::Decode)?;
        self.decoded.consume(taken);
        self.decoded.compact();
        self.resampled.push(&self.resample_scratch);
        Ok(taken > 0)
    }

    /// Encodes every whole frame waiting; returns whether any frame was
    /// taken. A failed frame drops everything staged for the encoder.
    fn encode_pass(&mut self, out: &mut Vec<MediaUnit>) -> bool {
        let Self {
            encoder,
            resampler,
            clock,
            decoder_channels,
            decoded,
            resampled,
            packets,
            remap,
            ..
        } = self;

        let frame_size = encoder.frame_size();
        let encoder_rate = encoder.sample_rate();
        let source_channels = *decoder_channels as usize;
        let encoder_channels = encoder.channels() as usize;
        let frame_bytes = frame_size * 2 * source_channels;
        let work = if resampler.is_some() { resampled } else { decoded };

        let mut progress = false;
        while frame_bytes > 0 && work.len() >= frame_bytes {
            let frame = &work.as_slice()[..frame_bytes];
            let frame = if encoder_channels != source_channels {
                remap_channels(frame, source_channels, encoder_channels, remap);
                remap.as_slice()
            } else {
                frame
            };

            packets.clear();
            match encoder.encode(frame, packets) {
                Ok(()) => {
                    work.consume(frame_bytes);
                    progress = true;
                    for packet in packets.drain(..) {
                        let (dts, length) = clock.advance(packet.samples, encoder_rate);
                        out.push(MediaUnit::new(packet.data, dts, dts, length));
                    }
                }
                Err(e) => {
                    warn!(
                        encoder = encoder.name(),
                        error = %e,
                        dropped = work.len(),
                        "audio encode failed, dropping staged samples"
                    );
                    work.clear();
                    break;
                }
            }
        }
        work.compact();
        progress
    }

    pub fn close(&mut self) {
        if self.state == AudioState::Closed {
            return;
        }
        self.state = AudioState::Closed;
        self.input = StagingBuffer::growable();
        self.decoded = StagingBuffer::bounded(0);
        self.resampled = StagingBuffer::growable();
        self.packets = Vec::new();
        self.remap = Vec::new();
        self.resampler = None;
        debug!(encoder = self.encoder.name(), "audio engine closed");
    }
}

/// Opens the encoder, retrying once in stereo when the encoder rejects a
/// multichannel layout.
fn open_encoder(
    codecs: &dyn CodecProvider,
    codec: CodecId,
    destination: &mut EsFormat,
) -> Result<Box<dyn AudioEncoder>> {
    let mut params = AudioEncoderParams {
        codec,
        sample_rate: destination.sample_rate,
        channels: destination.channels,
        bitrate: destination.bitrate,
    };
    match codecs.audio_encoder(&params) {
        Ok(encoder) => Ok(encoder),
        Err(CodecError::UnsupportedChannels(_)) if params.channels > 2 => {
            warn!(channels = params.channels, "encoder rejected channel layout, retrying in stereo");
            params.channels = 2;
            let encoder = codecs
                .audio_encoder(&params)
                .map_err(|source| TranscodeError::CodecOpen {
                    role: "encoder",
                    codec,
                    source,
                })?;
            destination.channels = 2;
            Ok(encoder)
        }
        Err(source) => Err(TranscodeError::CodecOpen {
            role: "encoder",
            codec,
            source,
        }),
    }
}

/// Destination channel `j` takes source channel `j`.
fn remap_channels(frame: &[u8], source_channels: usize, target_channels: usize, out: &mut Vec<u8>) {
    out.clear();
    for samples in frame.chunks_exact(source_channels * 2) {
        for channel in 0..target_channels {
            let at = channel.min(source_channels - 1) * 2;
            out.extend_from_slice(&samples[at..at + 2]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BuiltinCodecs;
    use crate::format::FourCC;
    use crate::testing::{s16_bytes, MockCodecs};

    fn process(engine: &mut AudioEngine, unit: &MediaUnit) -> Result<Vec<MediaUnit>> {
        let mut out = Vec::new();
        engine.process(unit, &mut out).map(|()| out)
    }

    fn descriptor(source: EsFormat, target: &AudioTarget) -> StreamDescriptor {
        StreamDescriptor {
            destination: destination_format(&source, target),
            source,
        }
    }

    fn alaw_target() -> AudioTarget {
        AudioTarget {
            codec: FourCC::new(*b"alaw"),
            sample_rate: 8000,
            channels: 1,
            bitrate: 64_000,
        }
    }

    #[test]
    fn two_seconds_of_silence_to_alaw() {
        let source = EsFormat::audio(FourCC::new(*b"s16l"), 8000, 1);
        let mut desc = descriptor(source, &alaw_target());
        let mut engine = AudioEngine::open(&mut desc, &BuiltinCodecs).unwrap();

        let unit = MediaUnit::new(vec![0u8; 32_000], 0, 0, 2_000_000);
        let out = process(&mut engine, &unit).unwrap();

        assert_eq!(out.len(), 100);
        let total: i64 = out.iter().map(|u| u.length).sum();
        assert!((total - 2_000_000).abs() <= 20_000);
        assert!(out.iter().all(|u| u.data.iter().all(|&b| b == 0xD5)));
        // gapless
        for pair in out.windows(2) {
            assert_eq!(pair[0].dts + pair[0].length, pair[1].dts);
            assert_eq!(pair[1].pts, pair[1].dts);
        }
        assert_eq!(engine.state(), AudioState::Ready);
    }

    #[test]
    fn s16_copy_reproduces_samples() {
        let source = EsFormat::audio(FourCC::new(*b"s16b"), 8000, 2);
        let target = AudioTarget {
            codec: FourCC::new(*b"s16l"),
            ..Default::default()
        };
        let mut desc = descriptor(source, &target);
        let mut engine = AudioEngine::open(&mut desc, &BuiltinCodecs).unwrap();

        let samples: Vec<i16> = (0..640).map(|i| (i * 97 - 20_000) as i16).collect();
        let input: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
        let out = process(&mut engine, &MediaUnit::new(input, 0, 0, 40_000)).unwrap();

        let produced: Vec<u8> = out.iter().flat_map(|u| u.data.iter().copied()).collect();
        let decoded: Vec<i16> = produced
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn remainder_carries_into_next_unit() {
        let source = EsFormat::audio(FourCC::new(*b"s16l"), 8000, 1);
        let mut desc = descriptor(source, &alaw_target());
        let mut engine = AudioEngine::open(&mut desc, &BuiltinCodecs).unwrap();

        // 170 samples: one 160-sample frame plus 10 left over
        let first = process(&mut engine, &MediaUnit::new(s16_bytes(&[1000; 170]), 0, 0, 21_250))
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(engine.decoded.len(), 20);

        let second = process(&mut engine, &MediaUnit::new(s16_bytes(&[1000; 150]), 21_250, 21_250, 18_750))
            .unwrap();
        assert_eq!(second.len(), 1);
        // rebased by the 10 buffered samples (1250 us)
        assert_eq!(second[0].dts, 20_000);
        assert!(engine.decoded.is_empty());
    }

    #[test]
    fn identical_inputs_give_identical_outputs() {
        let run = || {
            let source = EsFormat::audio(FourCC::new(*b"s16l"), 8000, 1);
            let mut desc = descriptor(source, &alaw_target());
            let mut engine = AudioEngine::open(&mut desc, &BuiltinCodecs).unwrap();
            let samples: Vec<i16> = (0..1000).map(|i| ((i * 131) % 30_000) as i16).collect();
            process(&mut engine, &MediaUnit::new(s16_bytes(&samples), 0, 0, 125_000))
                .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn destination_channels_are_clamped_to_source() {
        let source = EsFormat::audio(FourCC::new(*b"s16l"), 8000, 1);
        let target = AudioTarget {
            codec: FourCC::new(*b"alaw"),
            channels: 2,
            ..Default::default()
        };
        let mut desc = descriptor(source, &target);
        AudioEngine::open(&mut desc, &BuiltinCodecs).unwrap();
        assert_eq!(desc.destination.channels, 1);
        assert_eq!(desc.destination.sample_rate, 8000);
        assert_eq!(desc.destination.bitrate, DEFAULT_AUDIO_BITRATE);
    }

    #[test]
    fn six_channels_fall_back_to_stereo() {
        let codecs = MockCodecs {
            max_encoder_channels: 2,
            ..Default::default()
        };
        let source = EsFormat::audio(FourCC::new(*b"s16l"), 8000, 6);
        let target = AudioTarget {
            codec: FourCC::new(*b"s16l"),
            ..Default::default()
        };
        let mut desc = descriptor(source, &target);
        let mut engine = AudioEngine::open(&mut desc, &codecs).unwrap();
        assert_eq!(desc.destination.channels, 2);

        // one 160-sample frame of 6 channels, each channel a distinct value
        let frame: Vec<i16> = (0..160).flat_map(|_| [1i16, 2, 3, 4, 5, 6]).collect();
        let out = process(&mut engine, &MediaUnit::new(s16_bytes(&frame), 0, 0, 20_000)).unwrap();
        assert_eq!(out.len(), 1);
        let produced: Vec<i16> = out[0]
            .data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(produced.len(), 320);
        assert_eq!(&produced[..4], &[1, 2, 1, 2]);
    }

    #[test]
    fn stereo_encoder_rejection_is_not_retried() {
        let codecs = MockCodecs {
            max_encoder_channels: 1,
            ..Default::default()
        };
        let source = EsFormat::audio(FourCC::new(*b"s16l"), 8000, 2);
        let target = AudioTarget {
            codec: FourCC::new(*b"s16l"),
            ..Default::default()
        };
        let mut desc = descriptor(source, &target);
        let err = AudioEngine::open(&mut desc, &codecs).err().unwrap();
        assert!(matches!(err, TranscodeError::CodecOpen { role: "encoder", .. }));
    }

    #[test]
    fn decode_error_clears_staged_input() {
        let codecs = MockCodecs {
            failing_audio_decoder: true,
            ..Default::default()
        };
        let source = EsFormat::audio(FourCC::new(*b"mpga"), 8000, 1);
        let mut desc = descriptor(source, &alaw_target());
        let mut engine = AudioEngine::open(&mut desc, &codecs).unwrap();

        let out = process(&mut engine, &MediaUnit::new(vec![0xAB; 400], 0, 0, 20_000)).unwrap();
        assert!(out.is_empty());
        assert!(engine.input.is_empty());
        assert!(engine.decoded.is_empty());
        assert_eq!(engine.state(), AudioState::Ready);
    }

    #[test]
    fn missing_encoder_is_a_configuration_error() {
        let source = EsFormat::audio(FourCC::new(*b"s16l"), 44_100, 2);
        let target = AudioTarget {
            codec: FourCC::new(*b"mp4a"),
            ..Default::default()
        };
        let mut desc = descriptor(source, &target);
        let err = AudioEngine::open(&mut desc, &BuiltinCodecs).err().unwrap();
        assert!(err.is_configuration());
        assert!(matches!(err, TranscodeError::NoCodec { role: "encoder", codec: CodecId::Aac, .. }));
    }

    #[test]
    fn rate_change_inserts_resampler() {
        let source = EsFormat::audio(FourCC::new(*b"s16l"), 16_000, 1);
        let mut desc = descriptor(source, &alaw_target());
        let mut engine = AudioEngine::open(&mut desc, &BuiltinCodecs).unwrap();
        assert!(engine.resampler.is_some());

        // 0.5 s at 16 kHz
        let out = process(&mut engine, &MediaUnit::new(s16_bytes(&[0; 8000]), 0, 0, 500_000))
            .unwrap();
        assert!(!out.is_empty());
        assert!(out.iter().all(|u| u.length == 20_000 && u.len() == 160));
        // stamped back by the filter delay, 32 frames at 8 kHz
        let delay = engine.resampler.as_ref().unwrap().delay_frames();
        assert_eq!(delay, 32);
        assert_eq!(out[0].dts, -samples_to_us(delay as u64, 8000));
    }

    #[test]
    fn closed_engine_rejects_units() {
        let source = EsFormat::audio(FourCC::new(*b"u8  "), 8000, 1);
        let mut desc = descriptor(source, &alaw_target());
        let mut engine = AudioEngine::open(&mut desc, &BuiltinCodecs).unwrap();
        engine.close();
        assert_eq!(engine.state(), AudioState::Closed);
        assert!(matches!(
            process(&mut engine, &MediaUnit::new(vec![128u8; 10], 0, 0, 0)),
            Err(TranscodeError::SessionClosed)
        ));
    }

    #[test]
    fn encode_error_drops_staged_samples() {
        let codecs = MockCodecs {
            failing_audio_encoder: true,
            ..Default::default()
        };
        let source = EsFormat::audio(FourCC::new(*b"s16l"), 8000, 1);
        let mut desc = descriptor(source, &alaw_target());
        let mut engine = AudioEngine::open(&mut desc, &codecs).unwrap();

        // more than the decoded stage holds, so the input has to drain too
        for dts in [0, 25_000_000] {
            let out = process(&mut engine, &MediaUnit::new(vec![0u8; 400_000], dts, dts, 25_000_000)).unwrap();
            assert!(out.is_empty());
            assert!(engine.input.is_empty());
            assert!(engine.decoded.is_empty());
        }
        assert_eq!(engine.state(), AudioState::Ready);
    }

    #[test]
    fn headers_lead_and_encoder_delay_keeps_timestamps_gapless() {
        let codecs = MockCodecs {
            audio_encoder_lag: 2,
            ..Default::default()
        };
        let source = EsFormat::audio(FourCC::new(*b"s16l"), 8000, 1);
        let target = AudioTarget {
            codec: FourCC::new(*b"s16l"),
            ..Default::default()
        };
        let mut desc = descriptor(source, &target);
        let mut engine = AudioEngine::open(&mut desc, &codecs).unwrap();

        // three 160-sample frames; the encoder holds two of them back
        let first = process(&mut engine, &MediaUnit::new(s16_bytes(&[7; 480]), 0, 0, 60_000)).unwrap();
        assert_eq!(first.len(), 4);
        for (unit, header) in first.iter().zip([1u8, 3, 5]) {
            assert_eq!(&unit.data[..], &[header]);
            assert_eq!((unit.dts, unit.length), (0, 0));
        }
        assert_eq!((first[3].dts, first[3].length), (0, 20_000));
        assert_eq!(first[3].len(), 320);

        let second = process(&mut engine, &MediaUnit::new(s16_bytes(&[7; 480]), 60_000, 60_000, 60_000)).unwrap();
        let dts: Vec<i64> = second.iter().map(|u| u.dts).collect();
        assert_eq!(dts, [20_000, 40_000, 60_000]);
    }
}
