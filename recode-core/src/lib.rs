//! # Recode Core
//!
//! Streaming audio/video transcoding: compressed or raw elementary stream
//! units in, re-encoded and re-timed units out to a multiplexer.

// ============================================================================
// Formats & Registry
// ============================================================================
pub mod format;
pub mod registry;
pub mod unit;
pub mod picture;

// ============================================================================
// Configuration & Errors
// ============================================================================
pub mod config;
pub mod error;

// ============================================================================
// Codecs & Filters
// ============================================================================
pub mod codec;
pub mod filter;
pub mod resample;

// ============================================================================
// Engines
// ============================================================================
pub mod buffer;
pub mod timing;
pub mod audio;
pub mod video;

// ============================================================================
// Pipeline
// ============================================================================
pub mod mux;
pub mod session;

#[cfg(test)]
mod testing;

pub use codec::{BuiltinCodecs, CodecError, CodecProvider};
pub use config::TranscodeConfig;
pub use error::{Result, TranscodeError};
pub use format::{EsFormat, FourCC, Rational, StreamCategory, StreamDescriptor};
pub use mux::{MuxError, RecordingMux, StreamHandle, StreamMultiplexer};
pub use session::{PipelineContext, SessionKind, SessionStats, TranscodeSession, Transcoder};
pub use unit::MediaUnit;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
