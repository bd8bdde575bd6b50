//! # Picture Transforms
//!
//! Stages the video engine runs between decoder and encoder, in order:
//! deinterlace, pixel layout conversion, crop + scale. Each stage writes
//! into a caller-owned picture allocated once per session.

pub mod convert;
pub mod deinterlace;
pub mod scale;

pub use convert::PixelConverter;
pub use deinterlace::{Deinterlacer, FieldOrder, InterlaceDetector};
pub use scale::Scaler;
