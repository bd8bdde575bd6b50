//! File-backed multiplexer: payloads of every stream are appended to one
//! output file, with per-stream counters for the run report.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;
use recode_core::{EsFormat, MediaUnit, MuxError, StreamHandle, StreamMultiplexer};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub fourcc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<(u32, u16)>,
    pub units: u64,
    pub bytes: u64,
    pub first_pts: Option<i64>,
    pub last_pts: Option<i64>,
    /// Sum of unit lengths, microseconds
    pub duration_us: i64,
}

impl StreamReport {
    fn new(format: &EsFormat) -> Self {
        Self {
            fourcc: format.fourcc.to_string().trim_end().to_string(),
            size: (format.width > 0).then_some((format.width, format.height)),
            audio: (format.sample_rate > 0).then_some((format.sample_rate, format.channels)),
            units: 0,
            bytes: 0,
            first_pts: None,
            last_pts: None,
            duration_us: 0,
        }
    }
}

struct SinkState {
    writer: BufWriter<File>,
    next_handle: u32,
    streams: HashMap<StreamHandle, StreamReport>,
    /// Registration order
    order: Vec<StreamHandle>,
}

pub struct FileSink {
    state: Mutex<SinkState>,
}

impl FileSink {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            state: Mutex::new(SinkState {
                writer: BufWriter::new(file),
                next_handle: 0,
                streams: HashMap::new(),
                order: Vec::new(),
            }),
        })
    }

    /// Flushes the output and returns one report per registered stream.
    pub fn finish(&self) -> std::io::Result<Vec<StreamReport>> {
        let mut state = self.state.lock();
        state.writer.flush()?;
        Ok(state
            .order
            .iter()
            .filter_map(|handle| state.streams.get(handle).cloned())
            .collect())
    }
}

impl StreamMultiplexer for FileSink {
    fn register_stream(&self, format: &EsFormat) -> Result<StreamHandle, MuxError> {
        let mut state = self.state.lock();
        let handle = StreamHandle(state.next_handle);
        state.next_handle += 1;
        state.streams.insert(handle, StreamReport::new(format));
        state.order.push(handle);
        debug!(?handle, fourcc = %format.fourcc, "output stream registered");
        Ok(handle)
    }

    fn unregister_stream(&self, handle: StreamHandle) {
        debug!(?handle, "output stream unregistered");
    }

    fn send(&self, handle: StreamHandle, unit: MediaUnit) -> Result<(), MuxError> {
        let mut state = self.state.lock();
        let SinkState { writer, streams, .. } = &mut *state;
        let report = streams.get_mut(&handle).ok_or(MuxError::UnknownStream(handle))?;
        writer.write_all(&unit.data)?;
        report.units += 1;
        report.bytes += unit.data.len() as u64;
        report.first_pts.get_or_insert(unit.pts);
        report.last_pts = Some(unit.pts);
        report.duration_us += unit.length;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recode_core::FourCC;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("recode-sink-{}-{name}", std::process::id()))
    }

    #[test]
    fn payloads_are_appended_in_send_order() {
        let path = temp_path("order");
        let sink = FileSink::create(&path).unwrap();
        let audio = sink
            .register_stream(&EsFormat::audio(FourCC::new(*b"alaw"), 8000, 1))
            .unwrap();
        let video = sink
            .register_stream(&EsFormat::video(FourCC::new(*b"I420"), 16, 16))
            .unwrap();
        assert_eq!((audio, video), (StreamHandle(0), StreamHandle(1)));

        sink.send(video, MediaUnit::new(vec![9u8; 3], 40_000, 40_000, 40_000)).unwrap();
        sink.send(audio, MediaUnit::new(vec![1u8, 2], 0, 0, 20_000)).unwrap();
        sink.send(audio, MediaUnit::new(vec![3u8], 20_000, 20_000, 20_000)).unwrap();

        let reports = sink.finish().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), [9, 9, 9, 1, 2, 3]);
        std::fs::remove_file(&path).ok();

        assert_eq!(reports.len(), 2);
        let alaw = &reports[0];
        assert_eq!(alaw.fourcc, "alaw");
        assert_eq!(alaw.audio, Some((8000, 1)));
        assert_eq!((alaw.units, alaw.bytes), (2, 3));
        assert_eq!((alaw.first_pts, alaw.last_pts), (Some(0), Some(20_000)));
        assert_eq!(alaw.duration_us, 40_000);
        assert_eq!(reports[1].fourcc, "I420");
        assert_eq!(reports[1].size, Some((16, 16)));
        assert!(reports[1].audio.is_none());
    }

    #[test]
    fn unknown_handles_are_refused() {
        let path = temp_path("unknown");
        let sink = FileSink::create(&path).unwrap();
        let err = sink
            .send(StreamHandle(7), MediaUnit::new(vec![1u8], 0, 0, 0))
            .unwrap_err();
        assert!(matches!(err, MuxError::UnknownStream(StreamHandle(7))));
        assert!(sink.finish().unwrap().is_empty());
        std::fs::remove_file(&path).ok();
    }
}
