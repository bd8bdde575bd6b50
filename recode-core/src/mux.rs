//! # Stream Multiplexer Adapter
//!
//! Downstream sink of the pipeline. Sessions register one elementary stream
//! each, send finished units to it in emission order and unregister it on
//! teardown.

use std::collections::HashSet;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::format::EsFormat;
use crate::unit::MediaUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub u32);

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("Stream registration refused: {0}")]
    Refused(String),
    #[error("Unknown stream handle {0:?}")]
    UnknownStream(StreamHandle),
    #[error("Mux I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait StreamMultiplexer: Send + Sync {
    fn register_stream(&self, format: &EsFormat) -> Result<StreamHandle, MuxError>;

    fn unregister_stream(&self, handle: StreamHandle);

    fn send(&self, handle: StreamHandle, unit: MediaUnit) -> Result<(), MuxError>;
}

// ============================================================================
// Recording multiplexer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxEvent {
    Registered(StreamHandle, EsFormat),
    Sent(StreamHandle, MediaUnit),
    Unregistered(StreamHandle),
}

#[derive(Debug, Default)]
struct MuxLog {
    events: Vec<MuxEvent>,
    live: HashSet<StreamHandle>,
    next_handle: u32,
    refuse: bool,
}

/// In-memory multiplexer keeping an ordered log of everything it was asked
/// to do.
#[derive(Debug, Default)]
pub struct RecordingMux {
    log: Mutex<MuxLog>,
}

impl RecordingMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `register_stream` fail.
    pub fn refuse_registrations(&self, refuse: bool) {
        self.log.lock().refuse = refuse;
    }

    pub fn events(&self) -> Vec<MuxEvent> {
        self.log.lock().events.clone()
    }

    /// Formats registered so far, in order
    pub fn registrations(&self) -> Vec<EsFormat> {
        self.log
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MuxEvent::Registered(_, format) => Some(format.clone()),
                _ => None,
            })
            .collect()
    }

    /// Units sent to `handle`, in order
    pub fn sent(&self, handle: StreamHandle) -> Vec<MediaUnit> {
        self.log
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MuxEvent::Sent(h, unit) if *h == handle => Some(unit.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every unit sent, on any stream
    pub fn all_sent(&self) -> Vec<MediaUnit> {
        self.log
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MuxEvent::Sent(_, unit) => Some(unit.clone()),
                _ => None,
            })
            .collect()
    }
}

impl StreamMultiplexer for RecordingMux {
    fn register_stream(&self, format: &EsFormat) -> Result<StreamHandle, MuxError> {
        let mut log = self.log.lock();
        if log.refuse {
            return Err(MuxError::Refused(format!("{} stream", format.fourcc)));
        }
        let handle = StreamHandle(log.next_handle);
        log.next_handle += 1;
        log.live.insert(handle);
        log.events.push(MuxEvent::Registered(handle, format.clone()));
        debug!(?handle, fourcc = %format.fourcc, "stream registered");
        Ok(handle)
    }

    fn unregister_stream(&self, handle: StreamHandle) {
        let mut log = self.log.lock();
        if log.live.remove(&handle) {
            log.events.push(MuxEvent::Unregistered(handle));
        }
    }

    fn send(&self, handle: StreamHandle, unit: MediaUnit) -> Result<(), MuxError> {
        let mut log = self.log.lock();
        if !log.live.contains(&handle) {
            return Err(MuxError::UnknownStream(handle));
        }
        log.events.push(MuxEvent::Sent(handle, unit));
        Ok(())
    }
}
