//! Vorbis encoding through libvorbis.
//!
//! libvorbis hands back an Ogg stream. Its pages are split into packets
//! again here: the header packets are collected when the encoder opens
//! (any that libvorbis holds back come out of `encode` with no duration),
//! and each audio packet is timed from the granule position of the
//! page it ends on.

use std::io::{self, Write};
use std::num::{NonZeroU32, NonZeroU8};
use std::sync::Arc;

use ogg::reading::{BasePacketReader, OggPage, OggReadError, PageParser};
use parking_lot::Mutex;
use tracing::debug;
use vorbis_rs::{VorbisBitrateManagementStrategy, VorbisEncoder as Libvorbis, VorbisEncoderBuilder};

use super::{AudioEncoder, AudioEncoderParams, CodecError, EncodedAudio};

/// Sample frames handed to libvorbis per call
const FRAME_SIZE: usize = 1024;

const PAGE_HEADER_LEN: usize = 27;

fn ogg_error(e: OggReadError) -> CodecError {
    CodecError::InvalidData(format!("libvorbis page: {e}"))
}

fn vorbis_error(e: vorbis_rs::VorbisError) -> CodecError {
    CodecError::Backend(e.to_string())
}

/// Ogg bytes written by libvorbis, shared with the encoder that reads them.
#[derive(Clone, Default)]
struct PageSink(Arc<Mutex<Vec<u8>>>);

impl PageSink {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl Write for PageSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Packets completed on one page
struct PagePackets {
    granule: u64,
    packets: Vec<Vec<u8>>,
}

/// Splits an Ogg byte stream back into packets.
struct Depacketizer {
    pending: Vec<u8>,
    reader: BasePacketReader,
}

impl Depacketizer {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            reader: BasePacketReader::new(),
        }
    }

    /// Appends `bytes` and returns the packets of every whole page now
    /// available, in stream order.
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<PagePackets>, CodecError> {
        self.pending.extend_from_slice(bytes);
        let mut pages = Vec::new();
        while let Some(page) = self.next_page()? {
            self.reader.push_page(page).map_err(ogg_error)?;
            let mut completed = PagePackets {
                granule: 0,
                packets: Vec::new(),
            };
            while let Some(packet) = self.reader.read_packet() {
                completed.granule = packet.absgp_page();
                completed.packets.push(packet.data);
            }
            if !completed.packets.is_empty() {
                pages.push(completed);
            }
        }
        Ok(pages)
    }

    fn next_page(&mut self) -> Result<Option<OggPage>, CodecError> {
        if self.pending.len() < PAGE_HEADER_LEN {
            return Ok(None);
        }
        if &self.pending[..4] != b"OggS" {
            return Err(CodecError::InvalidData("lost Ogg page sync".into()));
        }
        let segments_end = PAGE_HEADER_LEN + self.pending[PAGE_HEADER_LEN - 1] as usize;
        if self.pending.len() < segments_end {
            return Ok(None);
        }
        let body_len: usize = self.pending[PAGE_HEADER_LEN..segments_end]
            .iter()
            .map(|&lacing| lacing as usize)
            .sum();
        let page_end = segments_end + body_len;
        if self.pending.len() < page_end {
            return Ok(None);
        }

        let mut header = [0u8; PAGE_HEADER_LEN];
        header.copy_from_slice(&self.pending[..PAGE_HEADER_LEN]);
        let (mut parser, _) = PageParser::new(header).map_err(ogg_error)?;
        parser.parse_segments(self.pending[PAGE_HEADER_LEN..segments_end].to_vec());
        let page = parser
            .parse_packet_data(self.pending[segments_end..page_end].to_vec())
            .map_err(ogg_error)?;
        self.pending.drain(..page_end);
        Ok(Some(page))
    }
}

/// Header packets have the low bit of their type byte set.
fn is_header(packet: &[u8]) -> bool {
    packet.first().is_some_and(|&kind| kind & 1 == 1)
}

pub struct VorbisEncoder {
    inner: Libvorbis<PageSink>,
    sink: PageSink,
    depacketizer: Depacketizer,
    headers: Vec<Vec<u8>>,
    sample_rate: u32,
    channels: u16,
    /// Granule position of the last page that carried audio
    granule: u64,
    /// Sample frames handed to libvorbis
    fed: u64,
    /// Sample frames covered by returned packets
    emitted: u64,
    planar: Vec<Vec<f32>>,
}

// Safety: the libvorbis state is owned by this value alone and is only
// touched through `&mut self`, so moving it to another thread is sound.
unsafe impl Send for VorbisEncoder {}

impl VorbisEncoder {
    pub fn new(params: &AudioEncoderParams) -> Result<Self, CodecError> {
        let sample_rate = NonZeroU32::new(params.sample_rate)
            .ok_or_else(|| CodecError::InvalidParameters("sample rate 0".into()))?;
        let channels = u8::try_from(params.channels)
            .ok()
            .and_then(NonZeroU8::new)
            .ok_or(CodecError::UnsupportedChannels(params.channels))?;
        let bitrate = NonZeroU32::new(params.bitrate)
            .ok_or_else(|| CodecError::InvalidParameters("bitrate 0".into()))?;

        let sink = PageSink::default();
        let mut builder = VorbisEncoderBuilder::new(sample_rate, channels, sink.clone()).map_err(vorbis_error)?;
        builder.bitrate_management_strategy(VorbisBitrateManagementStrategy::Vbr {
            target_bitrate: bitrate,
        });
        let inner = builder.build().map_err(vorbis_error)?;

        let mut depacketizer = Depacketizer::new();
        let headers: Vec<Vec<u8>> = depacketizer
            .push(&sink.take())?
            .into_iter()
            .flat_map(|page| page.packets)
            .collect();
        if !headers.iter().all(|h| is_header(h)) {
            return Err(CodecError::Backend("libvorbis wrote audio before its headers".into()));
        }

        debug!(
            rate = params.sample_rate,
            channels = params.channels,
            bitrate = params.bitrate,
            "vorbis encoder opened"
        );

        Ok(Self {
            inner,
            sink,
            depacketizer,
            headers,
            sample_rate: params.sample_rate,
            channels: params.channels,
            granule: 0,
            fed: 0,
            emitted: 0,
            planar: vec![Vec::with_capacity(FRAME_SIZE); params.channels as usize],
        })
    }
}

impl AudioEncoder for VorbisEncoder {
    fn frame_size(&self) -> usize {
        FRAME_SIZE
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn encode(&mut self, frame: &[u8], out: &mut Vec<EncodedAudio>) -> Result<(), CodecError> {
        let channels = self.channels as usize;
        let expected = FRAME_SIZE * channels * 2;
        if frame.len() != expected {
            return Err(CodecError::InvalidData(format!(
                "frame of {} bytes, expected {expected}",
                frame.len()
            )));
        }

        for channel in self.planar.iter_mut() {
            channel.clear();
        }
        for samples in frame.chunks_exact(channels * 2) {
            for (channel, sample) in self.planar.iter_mut().zip(samples.chunks_exact(2)) {
                channel.push(i16::from_ne_bytes([sample[0], sample[1]]) as f32 / 32768.0);
            }
        }
        self.inner.encode_audio_block(&self.planar).map_err(vorbis_error)?;
        self.fed += FRAME_SIZE as u64;

        for page in self.depacketizer.push(&self.sink.take())? {
            let (headers, audio): (Vec<_>, Vec<_>) = page.packets.into_iter().partition(|p| is_header(p));
            out.extend(headers.into_iter().map(|data| EncodedAudio { data, samples: 0 }));
            if audio.is_empty() {
                continue;
            }

            let span = page.granule.saturating_sub(self.granule);
            self.granule = page.granule.max(self.granule);
            let count = audio.len() as u64;
            let last = audio.len() - 1;
            for (i, data) in audio.into_iter().enumerate() {
                let samples = if i == last {
                    span / count + span % count
                } else {
                    span / count
                };
                self.emitted += samples;
                out.push(EncodedAudio { data, samples });
            }
        }
        Ok(())
    }

    fn headers(&self) -> Vec<Vec<u8>> {
        self.headers.clone()
    }

    fn delay(&self) -> u64 {
        self.fed.saturating_sub(self.emitted)
    }

    fn name(&self) -> &str {
        "libvorbis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CodecId;

    fn encoder(channels: u16) -> VorbisEncoder {
        VorbisEncoder::new(&AudioEncoderParams {
            codec: CodecId::Vorbis,
            sample_rate: 44_100,
            channels,
            bitrate: 128_000,
        })
        .unwrap()
    }

    fn tone(frames: usize, channels: usize) -> Vec<u8> {
        (0..frames)
            .flat_map(|i| {
                let sample = ((i as f32 * 0.05).sin() * 8000.0) as i16;
                std::iter::repeat(sample).take(channels)
            })
            .flat_map(i16::to_ne_bytes)
            .collect()
    }

    #[test]
    fn headers_are_identification_comment_setup() {
        let encoder = encoder(2);
        let headers = encoder.headers();
        let kinds: Vec<u8> = headers.iter().map(|h| h[0]).collect();
        assert_eq!(kinds, [1, 3, 5]);
        assert!(headers.iter().all(|h| &h[1..7] == b"vorbis"));
        assert_eq!(encoder.delay(), 0);
    }

    #[test]
    fn packet_durations_and_delay_account_for_every_sample() {
        let mut encoder = encoder(1);
        let mut packets = Vec::new();
        for _ in 0..100 {
            encoder.encode(&tone(FRAME_SIZE, 1), &mut packets).unwrap();
        }

        assert!(!packets.is_empty());
        assert!(packets.iter().all(|p| !is_header(&p.data)));
        let emitted: u64 = packets.iter().map(|p| p.samples).sum();
        assert_eq!(emitted + encoder.delay(), 100 * FRAME_SIZE as u64);
    }

    #[test]
    fn short_frames_are_rejected() {
        let mut encoder = encoder(2);
        let mut packets = Vec::new();
        assert!(matches!(
            encoder.encode(&tone(10, 2), &mut packets),
            Err(CodecError::InvalidData(_))
        ));
    }

    #[test]
    fn ogg_pages_split_back_into_packets() {
        let mut depacketizer = Depacketizer::new();
        // a page needs its whole body before anything comes out
        assert!(depacketizer.push(b"OggS\0").unwrap().is_empty());
        assert!(matches!(
            Depacketizer::new().push(&[0u8; 40]),
            Err(CodecError::InvalidData(_))
        ));
    }
}
