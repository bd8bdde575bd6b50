//! Scripted codecs for engine and session tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::pcm::{PcmEncoder, PcmEncoding};
use crate::codec::{
    AudioDecoder, AudioDecoderParams, AudioEncoder, AudioEncoderParams, BuiltinCodecs, CodecError,
    CodecProvider, DecodeProgress, EncodedAudio, EncodedPicture, FrameTimestampTagger, PictureType, VideoDecodeOutput,
    VideoDecoder, VideoDecoderParams, VideoEncoder, VideoEncoderParams,
};
use crate::format::Rational;
use crate::picture::{Picture, PixelLayout};
use crate::registry::CodecId;

/// Little-endian s16 bytes, as an `s16l` source carries them
pub fn s16_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Builtin codecs plus mock MPEG-4/H.264 video codecs, with knobs for
/// the failure paths.
#[derive(Default)]
pub struct MockCodecs {
    /// Encoders reject more channels than this; 0 accepts any count
    pub max_encoder_channels: u16,
    pub failing_audio_decoder: bool,
    pub failing_audio_encoder: bool,
    /// Audio encoders hold back this many packets and carry headers
    pub audio_encoder_lag: usize,
    pub failing_video_decoder: bool,
    pub failing_video_encoder: bool,
    /// Coded size of mock-decoded pictures
    pub video_size: (u32, u32),
    /// Coded size of every picture after the first
    pub later_video_size: Option<(u32, u32)>,
    pub video_frame_rate: Option<Rational>,
    /// Bytes the mock video decoder takes per picture; 0 takes the whole unit
    pub video_chunk: usize,
    /// (coded pts, type) returned by successive mock encodes, `None` for
    /// a picture the encoder holds back. Non-empty scripts report delay 1.
    pub encoder_script: Vec<Option<(i64, PictureType)>>,
    /// Every buffer handed to a mock video decoder
    pub fed: Arc<Mutex<Vec<Vec<u8>>>>,
}

fn mock_video(codec: CodecId) -> bool {
    matches!(codec, CodecId::Mpeg4 | CodecId::H264 | CodecId::Mpeg1Video)
}

impl CodecProvider for MockCodecs {
    fn name(&self) -> &str {
        "mock"
    }

    fn has_decoder(&self, codec: CodecId) -> bool {
        mock_video(codec) || codec == CodecId::Mp2 || BuiltinCodecs.has_decoder(codec)
    }

    fn has_encoder(&self, codec: CodecId) -> bool {
        mock_video(codec) || BuiltinCodecs.has_encoder(codec)
    }

    fn audio_decoder(&self, params: &AudioDecoderParams) -> Result<Box<dyn AudioDecoder>, CodecError> {
        if self.failing_audio_decoder {
            return Ok(Box::new(FailingAudioDecoder {
                sample_rate: params.sample_rate,
                channels: params.channels,
            }));
        }
        BuiltinCodecs.audio_decoder(params)
    }

    fn audio_encoder(&self, params: &AudioEncoderParams) -> Result<Box<dyn AudioEncoder>, CodecError> {
        if self.max_encoder_channels > 0 && params.channels > self.max_encoder_channels {
            return Err(CodecError::UnsupportedChannels(params.channels));
        }
        if self.failing_audio_encoder {
            return Ok(Box::new(FailingAudioEncoder {
                sample_rate: params.sample_rate,
                channels: params.channels,
            }));
        }
        if self.audio_encoder_lag > 0 {
            return Ok(Box::new(LaggingAudioEncoder {
                inner: PcmEncoder::new(PcmEncoding::S16Le, params)?,
                lag: self.audio_encoder_lag,
                queued: VecDeque::new(),
            }));
        }
        BuiltinCodecs.audio_encoder(params)
    }

    fn video_decoder(&self, params: &VideoDecoderParams) -> Result<Box<dyn VideoDecoder>, CodecError> {
        if !mock_video(params.codec) {
            return BuiltinCodecs.video_decoder(params);
        }
        let (width, height) = match self.video_size {
            (0, 0) => (params.width, params.height),
            size => size,
        };
        Ok(Box::new(MockVideoDecoder {
            width,
            height,
            later_size: self.later_video_size,
            decoded: 0,
            frame_rate: self.video_frame_rate,
            chunk: self.video_chunk,
            failing: self.failing_video_decoder,
            fed: Arc::clone(&self.fed),
        }))
    }

    fn video_encoder(&self, params: &VideoEncoderParams) -> Result<Box<dyn VideoEncoder>, CodecError> {
        if self.failing_video_encoder {
            return Err(CodecError::Backend("mock encoder refused to open".into()));
        }
        if !mock_video(params.codec) {
            return BuiltinCodecs.video_encoder(params);
        }
        Ok(Box::new(ScriptedVideoEncoder {
            layout: params.layout,
            script: self.encoder_script.clone(),
            encoded: 0,
        }))
    }
}

struct FailingAudioDecoder {
    sample_rate: u32,
    channels: u16,
}

impl AudioDecoder for FailingAudioDecoder {
    fn decode(&mut self, input: &[u8], _output: &mut [u8]) -> Result<DecodeProgress, CodecError> {
        if input.is_empty() {
            return Ok(DecodeProgress::default());
        }
        Err(CodecError::InvalidData("corrupt frame header".into()))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn name(&self) -> &str {
        "failing"
    }
}

struct FailingAudioEncoder {
    sample_rate: u32,
    channels: u16,
}

impl AudioEncoder for FailingAudioEncoder {
    fn frame_size(&self) -> usize {
        160
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn encode(&mut self, _frame: &[u8], _out: &mut Vec<EncodedAudio>) -> Result<(), CodecError> {
        Err(CodecError::Backend("encoder lost its state".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// s16le encoder that returns each packet `lag` frames late, behind three
/// one-byte headers.
struct LaggingAudioEncoder {
    inner: PcmEncoder,
    lag: usize,
    queued: VecDeque<EncodedAudio>,
}

impl AudioEncoder for LaggingAudioEncoder {
    fn frame_size(&self) -> usize {
        self.inner.frame_size()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn encode(&mut self, frame: &[u8], out: &mut Vec<EncodedAudio>) -> Result<(), CodecError> {
        let mut packets = Vec::new();
        self.inner.encode(frame, &mut packets)?;
        self.queued.extend(packets);
        while self.queued.len() > self.lag {
            out.extend(self.queued.pop_front());
        }
        Ok(())
    }

    fn headers(&self) -> Vec<Vec<u8>> {
        vec![vec![1], vec![3], vec![5]]
    }

    fn delay(&self) -> u64 {
        self.queued.iter().map(|packet| packet.samples).sum()
    }

    fn name(&self) -> &str {
        "lagging"
    }
}

/// Emits one flat Yuv420p picture per chunk, luma set to the chunk's first byte.
struct MockVideoDecoder {
    width: u32,
    height: u32,
    later_size: Option<(u32, u32)>,
    decoded: usize,
    frame_rate: Option<Rational>,
    chunk: usize,
    failing: bool,
    fed: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl VideoDecoder for MockVideoDecoder {
    fn decode(
        &mut self,
        data: &[u8],
        tagger: &dyn FrameTimestampTagger,
    ) -> Result<VideoDecodeOutput, CodecError> {
        self.fed.lock().push(data.to_vec());
        if self.failing {
            return Err(CodecError::InvalidData("broken slice".into()));
        }
        let consumed = match self.chunk {
            0 => data.len(),
            chunk => chunk.min(data.len()),
        };
        if self.decoded > 0 {
            if let Some((width, height)) = self.later_size {
                self.width = width;
                self.height = height;
            }
        }
        self.decoded += 1;
        let mut picture = Picture::new(PixelLayout::Yuv420p, self.width, self.height);
        tagger.tag(&mut picture);
        picture.plane_mut(0).fill(data.first().copied().unwrap_or(0));
        picture.plane_mut(1).fill(128);
        picture.plane_mut(2).fill(128);
        Ok(VideoDecodeOutput {
            consumed,
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
        self.frame_rate
    }

    fn name(&self) -> &str {
        "mock-video"
    }
}

/// Encoder whose output timing follows a script. Without a script it
/// behaves like an intra-only encoder reporting the picture pts.
struct ScriptedVideoEncoder {
    layout: PixelLayout,
    script: Vec<Option<(i64, PictureType)>>,
    encoded: usize,
}

impl VideoEncoder for ScriptedVideoEncoder {
    fn encode(&mut self, picture: &Picture) -> Result<Option<EncodedPicture>, CodecError> {
        let step = if self.script.is_empty() {
            Some((picture.pts, PictureType::I))
        } else {
            self.script.get(self.encoded).copied().flatten()
        };
        self.encoded += 1;
        let Some((coded_pts, picture_type)) = step else {
            return Ok(None);
        };
        Ok(Some(EncodedPicture {
            data: vec![picture.data[0], self.encoded as u8],
            coded_pts,
            picture_type,
        }))
    }

    fn delay(&self) -> u32 {
        if self.script.is_empty() {
            0
        } else {
            1
        }
    }

    fn pixel_layout(&self) -> PixelLayout {
        self.layout
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
