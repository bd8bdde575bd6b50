//! # Video Transcode Engine
//!
//! decode → deinterlace → convert → crop/scale → encode, one picture at a
//! time.
//!
//! The encoder is opened lazily from the first decoded picture: only then
//! are the coded size and frame rate known. Its destination format is
//! registered with the multiplexer at that point, never before, and never
//! twice.
//!
//! Timestamps come from a [`TimingTracker`]: decoders stamp pictures with
//! the pts of the unit they came from, pictures without one are
//! interpolated from the decoder's frame rate, and encoded pictures get pts/dts from
//! what the encoder reports.

use tracing::{debug, info, warn};

use crate::codec::{CodecError, CodecProvider, VideoDecoder, VideoDecoderParams, VideoEncoder, VideoEncoderParams};
use crate::config::VideoTarget;
use crate::error::{Result, TranscodeError};
use crate::filter::{Deinterlacer, PixelConverter, Scaler};
use crate::format::{EsFormat, Rational, StreamDescriptor};
use crate::mux::{StreamHandle, StreamMultiplexer};
use crate::picture::{Picture, PixelLayout};
use crate::registry::{self, CodecCapabilities, CodecId};
use crate::timing::TimingTracker;
use crate::unit::MediaUnit;

/// Frame rate assumed when neither decoder nor source know one
pub const DEFAULT_FRAME_RATE: Rational = Rational::new(25, 1);

enum FrameSource {
    /// Uncompressed source, one picture per unit
    Raw {
        layout: PixelLayout,
        width: u32,
        height: u32,
    },
    Decoder(Box<dyn VideoDecoder>),
}

enum EncoderState {
    /// Waiting for the first picture
    Pending,
    Steady {
        encoder: Box<dyn VideoEncoder>,
        handle: StreamHandle,
    },
    /// Encoder could not be set up; input is dropped
    Failed,
    Closed,
}

/// Intermediate pictures are allocated once, when the encoder opens.
#[derive(Default)]
struct Transforms {
    deinterlace: Option<(Deinterlacer, Picture)>,
    convert: Option<(PixelConverter, Picture)>,
    scale: Option<(Scaler, Picture)>,
}

impl Transforms {
    fn apply<'a>(&'a mut self, picture: &'a Picture) -> Result<&'a Picture> {
        let mut current = picture;
        if let Some((deinterlacer, out)) = self.deinterlace.as_mut() {
            if (current.layout, current.width, current.height) != (out.layout, out.width, out.height) {
                return Err(TranscodeError::FrameTooSmall {
                    needed: out.data.len(),
                    got: current.data.len(),
                });
            }
            deinterlacer.process(current, out);
            current = out;
        }
        if let Some((converter, out)) = self.convert.as_mut() {
            converter.convert(current, out)?;
            current = out;
        }
        if let Some((scaler, out)) = self.scale.as_mut() {
            scaler.scale(current, out)?;
            current = out;
        }
        Ok(current)
    }

    fn is_empty(&self) -> bool {
        self.deinterlace.is_none() && self.convert.is_none() && self.scale.is_none()
    }
}

pub struct VideoEngine {
    source: Option<FrameSource>,
    source_frame_rate: Option<Rational>,
    target: VideoTarget,
    codec: CodecId,
    encoder_layout: PixelLayout,
    capabilities: CodecCapabilities,
    tracker: TimingTracker,
    state: EncoderState,
    transforms: Transforms,
    pictures: u64,
}

impl VideoEngine {
    /// Opens the decoder for `descriptor.source` and checks an encoder
    /// exists for the destination. The destination FourCC is canonicalized;
    /// its size is filled in when the first picture arrives.
    pub fn open(
        descriptor: &mut StreamDescriptor,
        target: &VideoTarget,
        codecs: &dyn CodecProvider,
    ) -> Result<Self> {
        let codec = registry::resolve(descriptor.destination.fourcc)?;
        if !codecs.has_encoder(codec) {
            return Err(TranscodeError::NoCodec {
                role: "encoder",
                codec,
                tried: vec![codecs.name().to_string()],
            });
        }
        let encoder_layout = if codec == CodecId::RawVideo {
            registry::chroma_layout(descriptor.destination.fourcc).unwrap_or(PixelLayout::Yuv420p)
        } else {
            PixelLayout::Yuv420p
        };
        let capabilities = registry::capabilities(descriptor.destination.fourcc);

        let mut tracker = TimingTracker::new();
        let source = open_source(&descriptor.source, codecs, &mut tracker)?;
        descriptor.destination.fourcc = registry::canonical_destination(descriptor.destination.fourcc);

        debug!(
            source = %descriptor.source.fourcc,
            destination = %descriptor.destination.fourcc,
            layout = ?encoder_layout,
            "video engine opened, encoder deferred to first picture"
        );

        Ok(Self {
            source: Some(source),
            source_frame_rate: descriptor.source.frame_rate,
            target: target.clone(),
            codec,
            encoder_layout,
            capabilities,
            tracker,
            state: EncoderState::Pending,
            transforms: Transforms::default(),
            pictures: 0,
        })
    }

    /// Stream the encoder output is registered under, once open
    pub fn handle(&self) -> Option<StreamHandle> {
        match &self.state {
            EncoderState::Steady { handle, .. } => Some(*handle),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, EncoderState::Failed)
    }

    /// Frame rate the decoder reports, if it knows one
    fn decoder_frame_rate(&self) -> Option<Rational> {
        match &self.source {
            Some(FrameSource::Decoder(decoder)) => decoder.frame_rate().filter(Rational::is_valid),
            _ => None,
        }
    }

    /// Decodes one unit and encodes every picture it yields, appending the
    /// encoded units to `out` in emission order.
    ///
    /// Corrupt input and short raw frames are skipped with a warning.
    /// Failing to open the encoder or register its stream puts the engine
    /// in the failed state and returns the error; so do conversion errors,
    /// which the caller should treat as fatal. Units encoded before the
    /// failing picture stay in `out`.
    pub fn process(
        &mut self,
        unit: &MediaUnit,
        destination: &mut EsFormat,
        codecs: &dyn CodecProvider,
        mux: &dyn StreamMultiplexer,
        out: &mut Vec<MediaUnit>,
    ) -> Result<()> {
        match self.state {
            EncoderState::Closed => return Err(TranscodeError::SessionClosed),
            EncoderState::Failed => return Ok(()),
            _ => {}
        }

        self.tracker.begin_unit(unit.pts);
        let data = &unit.data[..];
        let mut offset = 0;

        while offset < data.len() {
            let Some(source) = self.source.as_mut() else {
                return Err(TranscodeError::SessionClosed);
            };

            let mut picture = match source {
                FrameSource::Raw { layout, width, height } => {
                    offset = data.len();
                    match Picture::from_bytes(*layout, *width, *height, data) {
                        Ok(mut picture) => {
                            picture.pts = unit.pts;
                            picture
                        }
                        Err(e) => {
                            warn!(error = %e, "short raw video frame dropped");
                            break;
                        }
                    }
                }
                FrameSource::Decoder(decoder) => match decoder.decode(&data[offset..], &self.tracker) {
                    Ok(output) => {
                        // a decoder returning a picture without consuming
                        // anything would otherwise spin on the same bytes
                        offset = match output.consumed {
                            0 => data.len(),
                            n => (offset + n).min(data.len()),
                        };
                        match output.picture {
                            Some(picture) => picture,
                            None => continue,
                        }
                    }
                    Err(e) => {
                        warn!(decoder = decoder.name(), error = %e, "video decode failed, dropping unit");
                        break;
                    }
                },
            };

            self.pictures += 1;
            self.tracker.observe_picture(picture.pts);

            if matches!(self.state, EncoderState::Pending) {
                if let Err(e) = self.start_encoder(&picture, destination, codecs, mux) {
                    self.state = EncoderState::Failed;
                    return Err(e);
                }
            }
            let decoder_rate = self.decoder_frame_rate();
            let EncoderState::Steady { encoder, .. } = &mut self.state else {
                break;
            };

            picture.pts = self.tracker.encode_pts(self.capabilities.tolerates_nonmonotonic_pts);
            // only a rate the decoder vouches for moves the running pts
            self.tracker.advance(decoder_rate, picture.repeat_pict);

            let ready = self.transforms.apply(&picture)?;
            match encoder.encode(ready) {
                Ok(Some(encoded)) => {
                    let timing = self
                        .tracker
                        .stamp(encoded.coded_pts, encoded.picture_type, encoder.delay(), unit);
                    out.push(MediaUnit::new(encoded.data, timing.pts, timing.dts, timing.length));
                }
                Ok(None) => {}
                Err(e) => warn!(encoder = encoder.name(), error = %e, "video encode failed, picture dropped"),
            }
        }

        Ok(())
    }

    /// Opens the encoder for the first picture and registers the finished
    /// destination format.
    fn start_encoder(
        &mut self,
        picture: &Picture,
        destination: &mut EsFormat,
        codecs: &dyn CodecProvider,
        mux: &dyn StreamMultiplexer,
    ) -> Result<()> {
        let crop = self.target.crop;
        let width = match self.target.width {
            0 => picture.width.saturating_sub(crop.left + crop.right),
            width => width,
        };
        let height = match self.target.height {
            0 => picture.height.saturating_sub(crop.top + crop.bottom),
            height => height,
        };

        let frame_rate = self
            .decoder_frame_rate()
            .or(self.source_frame_rate.filter(Rational::is_valid))
            .unwrap_or(DEFAULT_FRAME_RATE);

        destination.width = width;
        destination.height = height;
        destination.frame_rate = Some(frame_rate);

        let params = VideoEncoderParams {
            codec: self.codec,
            width,
            height,
            bitrate: destination.bitrate,
            bitrate_tolerance: self.target.bitrate_tolerance,
            frame_rate,
            gop_size: self.target.gop_size(),
            max_b_frames: self.target.max_b_frames(),
            qmin: self.target.qmin,
            qmax: self.target.qmax,
            mb_decision: self.target.mb_decision,
            layout: self.encoder_layout,
        };
        let encoder = codecs
            .video_encoder(&params)
            .map_err(|source| TranscodeError::CodecOpen {
                role: "encoder",
                codec: self.codec,
                source,
            })?;
        let handle = mux.register_stream(destination)?;

        let mut transforms = Transforms::default();
        if self.target.deinterlace {
            if picture.layout.is_planar() {
                transforms.deinterlace = Some((
                    Deinterlacer::new(self.target.deinterlace_mode),
                    Picture::new(picture.layout, picture.width, picture.height),
                ));
            } else {
                warn!(layout = ?picture.layout, "deinterlacing needs a planar layout, skipped");
            }
        }
        if picture.layout != self.encoder_layout {
            transforms.convert = Some((
                PixelConverter::new(picture.layout, self.encoder_layout, picture.width, picture.height),
                Picture::new(self.encoder_layout, picture.width, picture.height),
            ));
        }
        if (picture.width, picture.height) != (width, height) || !crop.is_zero() {
            transforms.scale = Some((
                Scaler::new(self.encoder_layout, picture.width, picture.height, crop, width, height),
                Picture::new(self.encoder_layout, width, height),
            ));
        }

        info!(
            encoder = encoder.name(),
            input = %format!("{}x{} {:?}", picture.width, picture.height, picture.layout),
            output = %format!("{width}x{height} {:?}", self.encoder_layout),
            fps = %format!("{}/{}", frame_rate.num, frame_rate.den),
            deinterlace = transforms.deinterlace.is_some(),
            passthrough_pictures = transforms.is_empty(),
            ?handle,
            "video encoder opened"
        );

        self.transforms = transforms;
        self.state = EncoderState::Steady { encoder, handle };
        Ok(())
    }

    /// Releases codecs and buffers. Returns the stream to unregister, if
    /// one was registered.
    pub fn close(&mut self) -> Option<StreamHandle> {
        let handle = self.handle();
        self.state = EncoderState::Closed;
        self.source = None;
        self.transforms = Transforms::default();
        debug!(pictures = self.pictures, "video engine closed");
        handle
    }
}

fn open_source(
    source: &EsFormat,
    codecs: &dyn CodecProvider,
    tracker: &mut TimingTracker,
) -> Result<FrameSource> {
    if let Some(layout) = registry::chroma_layout(source.fourcc) {
        if source.width == 0 || source.height == 0 {
            return Err(TranscodeError::CodecOpen {
                role: "decoder",
                codec: CodecId::RawVideo,
                source: CodecError::InvalidParameters(format!(
                    "raw {} source without picture size",
                    source.fourcc
                )),
            });
        }
        debug!(fourcc = %source.fourcc, ?layout, "raw video source, no decoder");
        return Ok(FrameSource::Raw {
            layout,
            width: source.width,
            height: source.height,
        });
    }

    let codec = registry::resolve(source.fourcc)?;
    if !codecs.has_decoder(codec) {
        return Err(TranscodeError::NoCodec {
            role: "decoder",
            codec,
            tried: vec![codecs.name().to_string()],
        });
    }
    let params = VideoDecoderParams {
        codec,
        width: source.width,
        height: source.height,
        extra: source.extra.clone(),
    };
    let mut decoder = codecs
        .video_decoder(&params)
        .map_err(|source| TranscodeError::CodecOpen {
            role: "decoder",
            codec,
            source,
        })?;

    // MPEG-4 decoders learn the stream configuration from the VOL header
    if codec == CodecId::Mpeg4 && !source.extra.is_empty() {
        tracker.begin_unit(0);
        match decoder.decode(&source.extra, tracker) {
            Ok(output) => debug!(consumed = output.consumed, "decoder primed with stream header"),
            Err(e) => warn!(error = %e, "decoder rejected stream header"),
        }
    }

    Ok(FrameSource::Decoder(decoder))
}
