//! Media units flowing in and out of the engines.

use bytes::Bytes;

/// One delivery-order payload with its timing, all in microseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUnit {
    pub data: Bytes,
    pub pts: i64,
    pub dts: i64,
    pub length: i64,
}

impl MediaUnit {
    pub fn new(data: impl Into<Bytes>, pts: i64, dts: i64, length: i64) -> Self {
        Self {
            data: data.into(),
            pts,
            dts,
            length,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
