//! Sample rate conversion between the audio decoder and encoder.
//!
//! Wraps a rubato sinc resampler with interleaved native-endian s16 on both
//! sides. Input is accepted in any amount; it is resampled in fixed chunks
//! and whatever does not fill a chunk waits for the next call.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use crate::codec::CodecError;

/// Input frames per resampler pass
const CHUNK_FRAMES: usize = 1024;

pub struct AudioResampler {
    inner: SincFixedIn<f32>,
    source_rate: u32,
    target_rate: u32,
    channels: usize,
    /// Interleaved input frames not yet resampled
    pending: Vec<i16>,
    planar: Vec<Vec<f32>>,
}

impl AudioResampler {
    pub fn new(source_rate: u32, target_rate: u32, channels: u16) -> Result<Self, CodecError> {
        if source_rate == 0 || target_rate == 0 {
            return Err(CodecError::InvalidParameters(format!(
                "resampling {source_rate} Hz -> {target_rate} Hz"
            )));
        }
        if channels == 0 {
            return Err(CodecError::UnsupportedChannels(channels));
        }

        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = target_rate as f64 / source_rate as f64;
        let inner = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_FRAMES, channels as usize)
            .map_err(|e| CodecError::Backend(format!("Failed to create resampler: {:?}", e)))?;

        debug!(source_rate, target_rate, channels, "resampler created");

        Ok(Self {
            inner,
            source_rate,
            target_rate,
            channels: channels as usize,
            pending: Vec::new(),
            planar: vec![Vec::with_capacity(CHUNK_FRAMES); channels as usize],
        })
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Input frames held back until a full chunk is available
    pub fn pending_frames(&self) -> usize {
        self.pending.len() / self.channels
    }

    /// Output frames the sinc filter lags behind its input
    pub fn delay_frames(&self) -> usize {
        self.inner.output_delay()
    }

    /// Takes every whole frame of `input`, appends the resampled frames to
    /// `out` and returns the number of input bytes taken.
    pub fn process(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<usize, CodecError> {
        let frame_bytes = self.channels * 2;
        let taken = input.len() / frame_bytes * frame_bytes;
        self.pending.extend(
            input[..taken]
                .chunks_exact(2)
                .map(|b| i16::from_ne_bytes([b[0], b[1]])),
        );

        loop {
            let needed = self.inner.input_frames_next();
            if self.pending_frames() < needed {
                break;
            }

            // Interleaved to planar
            for channel in self.planar.iter_mut() {
                channel.clear();
            }
            for frame in self.pending[..needed * self.channels].chunks_exact(self.channels) {
                for (channel, &sample) in self.planar.iter_mut().zip(frame) {
                    channel.push(sample as f32 / 32768.0);
                }
            }
            self.pending.drain(..needed * self.channels);

            let planar_output = self
                .inner
                .process(&self.planar, None)
                .map_err(|e| CodecError::Backend(format!("Resampling failed: {:?}", e)))?;

            // Back to interleaved s16
            let frames = planar_output.first().map_or(0, Vec::len);
            out.reserve(frames * frame_bytes);
            for i in 0..frames {
                for channel in &planar_output {
                    let sample = (channel[i] * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
                    out.extend_from_slice(&sample.to_ne_bytes());
                }
            }
        }

        Ok(taken)
    }
}
