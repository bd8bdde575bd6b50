//! # Recode CLI
//!
//! Transcodes a raw elementary stream file through the recode core and
//! writes the re-encoded payloads to a file.
//!
//! ## Usage
//! ```bash
//! # 8 kHz mono s16 to A-law
//! recode -i speech.raw --fourcc s16l --rate 8000 --channels 1 \
//!     --sout acodec=alaw -o speech.alaw
//!
//! # 320x240 I420 with an 8 pixel crop, JSON report
//! recode -i clip.yuv --fourcc I420 --width 320 --height 240 --fps 25 \
//!     --sout vcodec=I420,croptop=8,cropbottom=8,cropleft=8,cropright=8 -o out.yuv --json
//!
//! # With debug logging
//! RUST_LOG=debug recode ...
//! ```

mod sink;

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use recode_core::codec::pcm::RawSampleFormat;
use recode_core::registry::{self, CodecId};
use recode_core::{
    EsFormat, FourCC, MediaUnit, Rational, SessionKind, SessionStats, StreamCategory, TranscodeConfig, Transcoder,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::sink::{FileSink, StreamReport};

#[derive(Parser, Debug)]
#[command(name = "recode", version)]
#[command(about = "Transcode a raw elementary stream file")]
struct Args {
    /// Input file, raw samples or raw pictures back to back
    #[arg(short, long)]
    input: PathBuf,

    /// Source format (s16l, u8, alaw, I420, RV24, ...)
    #[arg(long)]
    fourcc: String,

    /// Source sample rate
    #[arg(long, default_value_t = 0)]
    rate: u32,

    /// Source channel count
    #[arg(long, default_value_t = 0)]
    channels: u16,

    /// Source picture width
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// Source picture height
    #[arg(long, default_value_t = 0)]
    height: u32,

    /// Source frame rate, "25" or "30000/1001"
    #[arg(long, default_value = "25")]
    fps: String,

    /// Audio unit duration in milliseconds
    #[arg(long, default_value_t = 100)]
    unit_ms: u32,

    /// Transcode options, e.g. "acodec=alaw,ab=64"
    #[arg(long, conflicts_with = "config")]
    sout: Option<String>,

    /// Transcode configuration as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct RunReport {
    input: PathBuf,
    output: PathBuf,
    session: SessionKind,
    source: String,
    destination: String,
    stats: SessionStats,
    streams: Vec<StreamReport>,
}

/// How the input file is cut into units.
struct UnitLayout {
    bytes: usize,
    /// Duration of a full unit, microseconds
    length: i64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("recode=info".parse()?)
                .add_directive("recode_core=info".parse()?),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    info!("recode v{} starting", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let fourcc: FourCC = args
        .fourcc
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("invalid --fourcc")?;
    let frame_rate = parse_fps(&args.fps)?;
    let source = source_format(&args, fourcc, frame_rate);
    let layout = unit_layout(&args, &source, frame_rate)?;

    let sink = Arc::new(
        FileSink::create(&args.output).with_context(|| format!("cannot create {}", args.output.display()))?,
    );
    let transcoder = Transcoder::with_builtin_codecs(config, sink.clone());
    let mut session = transcoder
        .create_session(&source)
        .context("cannot set up the transcode session")?;

    let file = File::open(&args.input).with_context(|| format!("cannot open {}", args.input.display()))?;
    let mut reader = BufReader::new(file);
    let mut buffer = vec![0u8; layout.bytes];
    let mut dts = 0i64;

    loop {
        let read = read_full(&mut reader, &mut buffer).context("read failed")?;
        if read == 0 {
            break;
        }
        let length = layout.length * read as i64 / layout.bytes as i64;
        let unit = MediaUnit::new(buffer[..read].to_vec(), dts, dts, length);
        if let Err(e) = transcoder.process(&mut session, unit) {
            if e.is_fatal() {
                return Err(e).context("transcoding stopped");
            }
            warn!(error = %e, "unit failed");
        }
        dts += length;
        if read < layout.bytes {
            break;
        }
    }

    let session_kind = session.kind();
    let source_fourcc = session.descriptor().source.fourcc.to_string();
    let destination_fourcc = session.descriptor().destination.fourcc.to_string();
    let stats = transcoder.destroy_session(session);
    let streams = sink.finish().context("cannot flush output")?;

    let report = RunReport {
        input: args.input.clone(),
        output: args.output.clone(),
        session: session_kind,
        source: source_fourcc.trim_end().to_string(),
        destination: destination_fourcc.trim_end().to_string(),
        stats,
        streams,
    };
    print_report(&report, args.json)
}

fn load_config(args: &Args) -> Result<TranscodeConfig> {
    if let Some(path) = &args.config {
        let json = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        return TranscodeConfig::from_json(&json).context("invalid JSON config");
    }
    TranscodeConfig::from_options(args.sout.as_deref().unwrap_or_default()).context("invalid --sout")
}

fn parse_fps(fps: &str) -> Result<Rational> {
    let (num, den) = fps.split_once('/').unwrap_or((fps, "1"));
    let rate = Rational::new(
        num.trim().parse().context("invalid --fps")?,
        den.trim().parse().context("invalid --fps")?,
    );
    if !rate.is_valid() {
        bail!("invalid --fps {fps}");
    }
    Ok(rate)
}

fn source_format(args: &Args, fourcc: FourCC, frame_rate: Rational) -> EsFormat {
    if registry::is_raw_video(fourcc) {
        return EsFormat::video(fourcc, args.width, args.height).with_frame_rate(frame_rate);
    }
    match registry::resolve(fourcc) {
        Ok(codec) if codec.is_audio() => EsFormat::audio(fourcc, args.rate, args.channels),
        Ok(_) => EsFormat::video(fourcc, args.width, args.height).with_frame_rate(frame_rate),
        Err(_) => EsFormat::other(fourcc),
    }
}

fn unit_layout(args: &Args, source: &EsFormat, frame_rate: Rational) -> Result<UnitLayout> {
    match source.category {
        StreamCategory::Audio => {
            let sample_bytes = match RawSampleFormat::from_fourcc(source.fourcc) {
                Some(format) => format.bytes_per_sample(),
                None => match registry::resolve(source.fourcc)? {
                    CodecId::PcmAlaw | CodecId::PcmMulaw => 1,
                    codec => bail!("{codec:?} input has no fixed unit size"),
                },
            };
            if source.sample_rate == 0 || source.channels == 0 {
                bail!("audio input needs --rate and --channels");
            }
            let samples = (source.sample_rate as u64 * args.unit_ms as u64 / 1000).max(1);
            Ok(UnitLayout {
                bytes: samples as usize * source.channels as usize * sample_bytes,
                length: (samples * 1_000_000 / source.sample_rate as u64) as i64,
            })
        }
        StreamCategory::Video => {
            let Some(layout) = registry::chroma_layout(source.fourcc) else {
                bail!("{} input is not raw video", source.fourcc);
            };
            if source.width == 0 || source.height == 0 {
                bail!("video input needs --width and --height");
            }
            Ok(UnitLayout {
                bytes: layout.buffer_size(source.width, source.height),
                length: 1_000_000 * frame_rate.den as i64 / frame_rate.num as i64,
            })
        }
        StreamCategory::Other => bail!("unknown source format {}", source.fourcc),
    }
}

/// Fills `buf` unless the input ends first; returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{} -> {}", report.input.display(), report.output.display());
    println!(
        "  session:  {:?} ({} -> {})",
        report.session, report.source, report.destination
    );
    println!(
        "  units:    {} in, {} out, {} dropped",
        report.stats.units_in, report.stats.units_out, report.stats.dropped
    );
    println!("  bytes:    {} in, {} out", report.stats.bytes_in, report.stats.bytes_out);
    for stream in &report.streams {
        let span = match (stream.first_pts, stream.last_pts) {
            (Some(first), Some(last)) => format!("pts {first}..{last} us"),
            _ => "no output".to_string(),
        };
        println!(
            "  stream {}: {} units, {} bytes, {}, {:.3} s",
            stream.fourcc,
            stream.units,
            stream.bytes,
            span,
            stream.duration_us as f64 / 1e6
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["recode", "-i", "in.raw", "-o", "out.raw"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    fn layout_for(extra: &[&str]) -> Result<UnitLayout> {
        let args = args(extra);
        let fourcc: FourCC = args.fourcc.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        let frame_rate = parse_fps(&args.fps)?;
        let source = source_format(&args, fourcc, frame_rate);
        unit_layout(&args, &source, frame_rate)
    }

    #[test]
    fn fps_accepts_integers_and_fractions() {
        assert_eq!(parse_fps("25").unwrap(), Rational::new(25, 1));
        assert_eq!(parse_fps(" 30000 / 1001 ").unwrap(), Rational::new(30000, 1001));
        assert!(parse_fps("0").is_err());
        assert!(parse_fps("25/0").is_err());
        assert!(parse_fps("abc").is_err());
    }

    #[test]
    fn audio_units_cover_the_configured_duration() {
        let layout = layout_for(&["--fourcc", "s16l", "--rate", "8000", "--channels", "1"]).unwrap();
        assert_eq!(layout.bytes, 1600);
        assert_eq!(layout.length, 100_000);

        let layout = layout_for(&["--fourcc", "alaw", "--rate", "8000", "--channels", "2", "--unit-ms", "20"]).unwrap();
        assert_eq!(layout.bytes, 320);
        assert_eq!(layout.length, 20_000);
    }

    #[test]
    fn video_units_are_one_picture() {
        let layout = layout_for(&["--fourcc", "I420", "--width", "320", "--height", "240"]).unwrap();
        assert_eq!(layout.bytes, 320 * 240 * 3 / 2);
        assert_eq!(layout.length, 40_000);
    }

    #[test]
    fn incomplete_source_descriptions_are_rejected() {
        assert!(layout_for(&["--fourcc", "s16l", "--rate", "8000"]).is_err());
        assert!(layout_for(&["--fourcc", "I420", "--width", "320"]).is_err());
        assert!(layout_for(&["--fourcc", "zzzz"]).is_err());
    }

    #[test]
    fn sout_string_becomes_the_config() {
        let config = load_config(&args(&["--fourcc", "s16l", "--sout", "acodec=alaw,ab=64"])).unwrap();
        let audio = config.audio.unwrap();
        assert_eq!(audio.codec, FourCC::new(*b"alaw"));
        assert!(config.video.is_none());

        let config = load_config(&args(&["--fourcc", "s16l"])).unwrap();
        assert!(config.audio.is_none() && config.video.is_none());
    }

    #[test]
    fn sout_and_config_conflict() {
        let parsed = Args::try_parse_from([
            "recode", "-i", "a", "-o", "b", "--fourcc", "s16l", "--sout", "acodec=alaw", "--config", "c.json",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn read_full_stops_at_end_of_input() {
        let mut reader = io::Cursor::new(vec![1u8; 10]);
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 4);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 4);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 2);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 0);
    }
}
