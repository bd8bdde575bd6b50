//! Session-level error taxonomy.
//!
//! Codec implementations report [`CodecError`], multiplexer adapters report
//! [`MuxError`]; both fold into [`TranscodeError`] at the session boundary.

use thiserror::Error;

use crate::codec::CodecError;
use crate::format::FourCC;
use crate::mux::MuxError;
use crate::picture::PixelLayout;
use crate::registry::CodecId;

#[derive(Debug, Error)]
pub enum TranscodeError {
    // ===== Configuration =====
    #[error("Unknown codec: {0}")]
    UnknownCodec(FourCC),
    #[error("No {role} available for {codec:?} (tried: {tried:?})")]
    NoCodec {
        role: &'static str,
        codec: CodecId,
        tried: Vec<String>,
    },
    #[error("Cannot open {role} for {codec:?}: {source}")]
    CodecOpen {
        role: &'static str,
        codec: CodecId,
        #[source]
        source: CodecError,
    },
    #[error("Invalid option {key}={value}")]
    InvalidOption { key: String, value: String },
    #[error("Invalid config: {0}")]
    Config(#[from] serde_json::Error),

    // ===== Runtime =====
    #[error("Decode failed: {0}")]
    Decode(#[source] CodecError),
    #[error("Encode failed: {0}")]
    Encode(#[source] CodecError),
    #[error("Unsupported pixel conversion: {from:?} -> {to:?}")]
    UnsupportedConversion { from: PixelLayout, to: PixelLayout },
    #[error("Frame buffer too small: need {needed} bytes, got {got}")]
    FrameTooSmall { needed: usize, got: usize },
    #[error("Multiplexer: {0}")]
    Mux(#[from] MuxError),
    #[error("Session closed")]
    SessionClosed,
}

impl TranscodeError {
    /// Errors that abort session creation but allow a passthrough fallback.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownCodec(_)
                | Self::NoCodec { .. }
                | Self::CodecOpen { .. }
                | Self::InvalidOption { .. }
                | Self::Config(_)
        )
    }

    /// Errors after which the session cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FrameTooSmall { .. } | Self::UnsupportedConversion { .. })
    }
}

pub type Result<T> = std::result::Result<T, TranscodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_classified() {
        let unknown = TranscodeError::UnknownCodec(FourCC::new(*b"zzzz"));
        assert!(unknown.is_configuration());
        assert_eq!(unknown.to_string(), "Unknown codec: zzzz");

        assert!(!TranscodeError::SessionClosed.is_configuration());
        assert!(!TranscodeError::Decode(CodecError::InvalidData("bad".into())).is_configuration());

        let short = TranscodeError::FrameTooSmall { needed: 10, got: 4 };
        assert!(short.is_fatal());
        assert!(!short.is_configuration());
    }
}
