//! Pipeline configuration.
//!
//! Built from an option string (`acodec=mpga,ab=128,deinterlace`), from
//! JSON, or directly. Read-only once the pipeline is running.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TranscodeError};
use crate::format::FourCC;

pub const DEFAULT_AUDIO_BITRATE: u32 = 64_000;
pub const DEFAULT_VIDEO_BITRATE: u32 = 800_000;
pub const DEFAULT_GOP_SIZE: u32 = 50;
pub const MAX_B_FRAMES: u32 = 8;

/// Macroblock mode decision strategy handed to the video encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MbDecision {
    #[default]
    Simple,
    Bits,
    Rd,
}

impl MbDecision {
    /// Unrecognized names select the best quality mode.
    pub fn from_name(name: &str) -> Self {
        match name {
            "simple" => Self::Simple,
            "bits" => Self::Bits,
            _ => Self::Rd,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeinterlaceMode {
    #[default]
    Blend,
    Bob,
    Yadif,
    /// Comb detection decides per picture, yadif when interlaced
    Auto,
}

impl FromStr for DeinterlaceMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "blend" => Ok(Self::Blend),
            "bob" => Ok(Self::Bob),
            "yadif" => Ok(Self::Yadif),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown deinterlace mode {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropMargins {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl CropMargins {
    pub fn uniform(margin: u32) -> Self {
        Self {
            top: margin,
            bottom: margin,
            left: margin,
            right: margin,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.top == 0 && self.bottom == 0 && self.left == 0 && self.right == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioTarget {
    pub codec: FourCC,
    /// 0 keeps the source rate
    pub sample_rate: u32,
    /// 0 keeps the source channel count
    pub channels: u16,
    /// bits/s, 0 selects [`DEFAULT_AUDIO_BITRATE`]
    pub bitrate: u32,
}

impl Default for AudioTarget {
    fn default() -> Self {
        Self {
            codec: FourCC::new(*b"mpga"),
            sample_rate: 0,
            channels: 0,
            bitrate: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoTarget {
    pub codec: FourCC,
    /// 0 derives the width from the first decoded picture
    pub width: u32,
    /// 0 derives the height from the first decoded picture
    pub height: u32,
    /// bits/s, 0 selects [`DEFAULT_VIDEO_BITRATE`]
    pub bitrate: u32,
    pub bitrate_tolerance: Option<u32>,
    pub deinterlace: bool,
    pub deinterlace_mode: DeinterlaceMode,
    pub crop: CropMargins,
    pub keyint: Option<u32>,
    pub bframes: u32,
    pub qmin: u32,
    pub qmax: u32,
    pub mb_decision: MbDecision,
}

impl Default for VideoTarget {
    fn default() -> Self {
        Self {
            codec: FourCC::new(*b"mp4v"),
            width: 0,
            height: 0,
            bitrate: 0,
            bitrate_tolerance: None,
            deinterlace: false,
            deinterlace_mode: DeinterlaceMode::Blend,
            crop: CropMargins::default(),
            keyint: None,
            bframes: 0,
            qmin: 2,
            qmax: 31,
            mb_decision: MbDecision::Simple,
        }
    }
}

impl VideoTarget {
    pub fn gop_size(&self) -> u32 {
        self.keyint.unwrap_or(DEFAULT_GOP_SIZE)
    }

    pub fn max_b_frames(&self) -> u32 {
        self.bframes.min(MAX_B_FRAMES)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub audio: Option<AudioTarget>,
    pub video: Option<VideoTarget>,
    /// Forward streams unmodified when their transcode chain cannot be built
    pub passthrough_on_error: bool,
}

impl TranscodeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parses `key=value` pairs and bare flags separated by commas.
    ///
    /// Audio keys are only honoured when `acodec` is present and video keys
    /// only when `vcodec` is present.
    pub fn from_options(options: &str) -> Result<Self> {
        let pairs: Vec<(&str, Option<&str>)> = options
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| match token.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (token, None),
            })
            .collect();

        let find = |key: &str| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);
        let value = |key: &str| find(key).flatten();

        let mut config = TranscodeConfig::default();

        if let Some(codec) = value("acodec") {
            let mut audio = AudioTarget {
                codec: parse_fourcc("acodec", codec)?,
                ..Default::default()
            };
            if let Some(v) = value("samplerate") {
                audio.sample_rate = parse_number("samplerate", v)?;
            }
            if let Some(v) = value("channels") {
                audio.channels = parse_number("channels", v)?;
            }
            if let Some(v) = value("ab") {
                audio.bitrate = scale_kbps(parse_number("ab", v)?, 4000);
            }
            debug!(
                codec = %audio.codec,
                rate = audio.sample_rate,
                channels = audio.channels,
                kbps = audio.bitrate / 1024,
                "audio target"
            );
            config.audio = Some(audio);
        }

        if let Some(codec) = value("vcodec") {
            let mut video = VideoTarget {
                codec: parse_fourcc("vcodec", codec)?,
                ..Default::default()
            };
            if let Some(v) = value("width") {
                video.width = parse_number("width", v)?;
            }
            if let Some(v) = value("height") {
                video.height = parse_number("height", v)?;
            }
            if let Some(v) = value("vb") {
                video.bitrate = scale_kbps(parse_number("vb", v)?, 16000);
            }
            if let Some(v) = value("vt") {
                video.bitrate_tolerance = Some(parse_number("vt", v)?);
            }
            video.deinterlace = find("deinterlace").is_some();
            if let Some(v) = value("deinterlace-mode") {
                video.deinterlace_mode = v.parse().map_err(|_| invalid("deinterlace-mode", v))?;
            }
            if let Some(v) = value("croptop") {
                video.crop.top = parse_number("croptop", v)?;
            }
            if let Some(v) = value("cropbottom") {
                video.crop.bottom = parse_number("cropbottom", v)?;
            }
            if let Some(v) = value("cropleft") {
                video.crop.left = parse_number("cropleft", v)?;
            }
            if let Some(v) = value("cropright") {
                video.crop.right = parse_number("cropright", v)?;
            }
            if let Some(v) = value("keyint") {
                video.keyint = Some(parse_number("keyint", v)?);
            }
            if let Some(v) = value("bframes") {
                video.bframes = parse_number("bframes", v)?;
            }
            if let Some(v) = value("hq") {
                video.mb_decision = MbDecision::from_name(v);
            }
            if let Some(v) = value("qmin") {
                video.qmin = parse_number("qmin", v)?;
            }
            if let Some(v) = value("qmax") {
                video.qmax = parse_number("qmax", v)?;
            }
            debug!(
                codec = %video.codec,
                width = video.width,
                height = video.height,
                kbps = video.bitrate / 1024,
                "video target"
            );
            config.video = Some(video);
        }

        config.passthrough_on_error = find("passthrough-on-error").is_some();

        for (key, _) in &pairs {
            if !KNOWN_KEYS.contains(key) {
                warn!(key, "ignoring unknown transcode option");
            }
        }

        Ok(config)
    }
}

impl FromStr for TranscodeConfig {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_options(s)
    }
}

const KNOWN_KEYS: &[&str] = &[
    "acodec",
    "samplerate",
    "channels",
    "ab",
    "vcodec",
    "width",
    "height",
    "vb",
    "vt",
    "deinterlace",
    "deinterlace-mode",
    "croptop",
    "cropbottom",
    "cropleft",
    "cropright",
    "keyint",
    "bframes",
    "hq",
    "qmin",
    "qmax",
    "passthrough-on-error",
];

/// Bitrates under `threshold` are given in kbit/s.
fn scale_kbps(value: u32, threshold: u32) -> u32 {
    if value < threshold {
        value.saturating_mul(1000)
    } else {
        value
    }
}

fn invalid(key: &str, value: &str) -> TranscodeError {
    TranscodeError::InvalidOption {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| invalid(key, value))
}

fn parse_fourcc(key: &str, value: &str) -> Result<FourCC> {
    value.parse().map_err(|_| invalid(key, value))
}
