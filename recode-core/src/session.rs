//! # Sessions
//!
//! A [`Transcoder`] turns every elementary stream it is shown into a
//! [`TranscodeSession`]: an audio or video engine when the configuration
//! has a target for that kind of stream, plain forwarding otherwise.
//! Sessions own their codecs and buffers, so independent sessions can run
//! on separate threads against one shared `Transcoder`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::audio::{self, AudioEngine};
use crate::codec::{BuiltinCodecs, CodecProvider};
use crate::config::{AudioTarget, TranscodeConfig, VideoTarget, DEFAULT_VIDEO_BITRATE};
use crate::error::{Result, TranscodeError};
use crate::format::{EsFormat, StreamCategory, StreamDescriptor};
use crate::mux::{StreamHandle, StreamMultiplexer};
use crate::unit::MediaUnit;
use crate::video::VideoEngine;

/// Everything sessions share: read-only configuration and the two
/// external collaborators.
pub struct PipelineContext {
    pub config: TranscodeConfig,
    pub codecs: Arc<dyn CodecProvider>,
    pub mux: Arc<dyn StreamMultiplexer>,
}

/// Per-session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub units_in: u64,
    pub units_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Units discarded by a failed session
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Passthrough,
    Audio,
    Video,
    Failed,
    Closed,
}

enum SessionMode {
    Passthrough { handle: StreamHandle },
    Audio { engine: AudioEngine, handle: StreamHandle },
    Video { engine: VideoEngine },
    Failed,
    Closed,
}

pub struct TranscodeSession {
    id: u64,
    descriptor: StreamDescriptor,
    mode: SessionMode,
    stats: SessionStats,
}

impl TranscodeSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn kind(&self) -> SessionKind {
        match self.mode {
            SessionMode::Passthrough { .. } => SessionKind::Passthrough,
            SessionMode::Audio { .. } => SessionKind::Audio,
            SessionMode::Video { .. } => SessionKind::Video,
            SessionMode::Failed => SessionKind::Failed,
            SessionMode::Closed => SessionKind::Closed,
        }
    }

    /// Downstream stream of this session; video gets one with its first picture
    pub fn handle(&self) -> Option<StreamHandle> {
        match &self.mode {
            SessionMode::Passthrough { handle } | SessionMode::Audio { handle, .. } => Some(*handle),
            SessionMode::Video { engine } => engine.handle(),
            SessionMode::Failed | SessionMode::Closed => None,
        }
    }

    /// Releases the engine and unregisters the stream, if any.
    fn teardown(&mut self, mux: &dyn StreamMultiplexer) {
        let handle = match std::mem::replace(&mut self.mode, SessionMode::Closed) {
            SessionMode::Passthrough { handle } => Some(handle),
            SessionMode::Audio { mut engine, handle } => {
                engine.close();
                Some(handle)
            }
            SessionMode::Video { mut engine } => engine.close(),
            SessionMode::Failed | SessionMode::Closed => None,
        };
        if let Some(handle) = handle {
            mux.unregister_stream(handle);
        }
    }
}

pub struct Transcoder {
    context: PipelineContext,
    next_id: AtomicU64,
}

impl Transcoder {
    pub fn new(
        config: TranscodeConfig,
        codecs: Arc<dyn CodecProvider>,
        mux: Arc<dyn StreamMultiplexer>,
    ) -> Self {
        info!(
            codecs = codecs.name(),
            audio = ?config.audio.as_ref().map(|a| a.codec),
            video = ?config.video.as_ref().map(|v| v.codec),
            passthrough_on_error = config.passthrough_on_error,
            "transcoder created"
        );
        Self {
            context: PipelineContext { config, codecs, mux },
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_builtin_codecs(config: TranscodeConfig, mux: Arc<dyn StreamMultiplexer>) -> Self {
        Self::new(config, Arc::new(BuiltinCodecs), mux)
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Classifies `format` and builds its session.
    ///
    /// Configuration errors fall back to passthrough when
    /// `passthrough_on_error` is set and are returned otherwise.
    pub fn create_session(&self, format: &EsFormat) -> Result<TranscodeSession> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let config = &self.context.config;

        let built = match (format.category, &config.audio, &config.video) {
            (StreamCategory::Audio, Some(target), _) => self.open_audio(format, target),
            (StreamCategory::Video, _, Some(target)) => self.open_video(format, target),
            _ => return self.open_passthrough(id, format),
        };

        match built {
            Ok((descriptor, mode)) => {
                let session = TranscodeSession {
                    id,
                    descriptor,
                    mode,
                    stats: SessionStats::default(),
                };
                info!(
                    session = id,
                    kind = ?session.kind(),
                    source = %session.descriptor.source.fourcc,
                    destination = %session.descriptor.destination.fourcc,
                    "session created"
                );
                Ok(session)
            }
            Err(e) if e.is_configuration() && config.passthrough_on_error => {
                warn!(session = id, fourcc = %format.fourcc, error = %e, "cannot transcode, passing stream through");
                self.open_passthrough(id, format)
            }
            Err(e) => {
                error!(session = id, fourcc = %format.fourcc, error = %e, "session creation failed");
                Err(e)
            }
        }
    }

    fn open_audio(&self, format: &EsFormat, target: &AudioTarget) -> Result<(StreamDescriptor, SessionMode)> {
        let mut descriptor = StreamDescriptor {
            source: format.clone(),
            destination: audio::destination_format(format, target),
        };
        let engine = AudioEngine::open(&mut descriptor, self.context.codecs.as_ref())?;
        let handle = self.context.mux.register_stream(&descriptor.destination)?;
        Ok((descriptor, SessionMode::Audio { engine, handle }))
    }

    fn open_video(&self, format: &EsFormat, target: &VideoTarget) -> Result<(StreamDescriptor, SessionMode)> {
        let bitrate = match target.bitrate {
            0 => DEFAULT_VIDEO_BITRATE,
            bitrate => bitrate,
        };
        let mut destination = EsFormat::video(target.codec, target.width, target.height).with_bitrate(bitrate);
        destination.frame_rate = format.frame_rate;
        let mut descriptor = StreamDescriptor {
            source: format.clone(),
            destination,
        };
        let engine = VideoEngine::open(&mut descriptor, target, self.context.codecs.as_ref())?;
        Ok((descriptor, SessionMode::Video { engine }))
    }

    fn open_passthrough(&self, id: u64, format: &EsFormat) -> Result<TranscodeSession> {
        let handle = self.context.mux.register_stream(format)?;
        info!(session = id, fourcc = %format.fourcc, category = ?format.category, "passthrough session created");
        Ok(TranscodeSession {
            id,
            descriptor: StreamDescriptor {
                source: format.clone(),
                destination: format.clone(),
            },
            mode: SessionMode::Passthrough { handle },
            stats: SessionStats::default(),
        })
    }

    /// Pushes one unit through `session` and sends whatever comes out.
    ///
    /// Units an engine produced before failing are still sent, in order,
    /// before the session is demoted or closed.
    pub fn process(&self, session: &mut TranscodeSession, unit: MediaUnit) -> Result<()> {
        let PipelineContext { codecs, mux, .. } = &self.context;
        session.stats.units_in += 1;
        session.stats.bytes_in += unit.len() as u64;

        let mut units = Vec::new();
        let (result, handle) = match &mut session.mode {
            SessionMode::Closed => return Err(TranscodeError::SessionClosed),
            SessionMode::Failed => {
                session.stats.dropped += 1;
                debug!(session = session.id, "failed session, unit dropped");
                return Ok(());
            }
            SessionMode::Passthrough { handle } => {
                units.push(unit);
                (Ok(()), Some(*handle))
            }
            SessionMode::Audio { engine, handle } => (engine.process(&unit, &mut units), Some(*handle)),
            SessionMode::Video { engine } => {
                let result = engine.process(
                    &unit,
                    &mut session.descriptor.destination,
                    codecs.as_ref(),
                    mux.as_ref(),
                    &mut units,
                );
                (result, engine.handle())
            }
        };

        if let Some(handle) = handle {
            for unit in units {
                session.stats.units_out += 1;
                session.stats.bytes_out += unit.len() as u64;
                mux.send(handle, unit)?;
            }
        }

        result.map_err(|e| self.fail(session, e))
    }

    /// Demotes or closes the session after an engine error.
    fn fail(&self, session: &mut TranscodeSession, e: TranscodeError) -> TranscodeError {
        if e.is_fatal() {
            error!(session = session.id, error = %e, "fatal transcode error, closing session");
            session.teardown(self.context.mux.as_ref());
        } else if matches!(&session.mode, SessionMode::Video { engine } if engine.is_failed()) {
            error!(session = session.id, error = %e, "video encoder setup failed, dropping stream");
            session.teardown(self.context.mux.as_ref());
            session.mode = SessionMode::Failed;
        }
        e
    }

    /// Closes the engine, then unregisters the stream. Returns the final
    /// counters.
    pub fn destroy_session(&self, mut session: TranscodeSession) -> SessionStats {
        session.teardown(self.context.mux.as_ref());
        info!(
            session = session.id,
            units_in = session.stats.units_in,
            units_out = session.stats.units_out,
            dropped = session.stats.dropped,
            "session destroyed"
        );
        session.stats
    }
}
