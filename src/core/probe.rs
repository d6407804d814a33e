//! Audio property probing via the bundled ffprobe binary
//!
//! The probe sits behind a narrow trait so the pipeline can be tested
//! without spawning subprocesses. The real implementation shells out
//! to ffprobe (via ffmpeg-sidecar's bundled binary) and parses its
//! JSON tolerantly: numeric fields arrive as integers or strings, and
//! "N/A" shows up where a codec has no meaningful value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use serde::Deserialize;

pub use ffmpeg_sidecar::download::auto_download;
pub use ffmpeg_sidecar::ffprobe::{ffprobe_is_installed, ffprobe_path};

use crate::error::SweepError;

/// Technical properties and the probe-side tag map for one file
#[derive(Debug, Clone, Default)]
pub struct AudioProps {
    pub format: String,
    pub container: String,
    pub codec: String,
    pub duration_ms: i64,
    pub sample_rate: i32,
    pub channels: i32,
    pub bit_depth: i32,
    pub bitrate_kbps: i32,
    /// Tag map as the container reports it, keys lowercased
    pub tags: HashMap<String, String>,
}

/// Narrow probe interface; swap in a stub for tests
pub trait AudioProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<AudioProps, SweepError>;
}

/// A numeric ffprobe field that may arrive as integer or string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Num(i64),
    Float(f64),
    Str(String),
}

impl NumOrStr {
    fn as_i64(&self) -> Option<i64> {
        match self {
            NumOrStr::Num(n) => Some(*n),
            NumOrStr::Float(f) => Some(*f as i64),
            NumOrStr::Str(s) => s.trim().parse::<i64>().ok(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            NumOrStr::Num(n) => Some(*n as f64),
            NumOrStr::Float(f) => Some(*f),
            NumOrStr::Str(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    streams: Option<Vec<ProbeStream>>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<NumOrStr>,
    bit_rate: Option<NumOrStr>,
    tags: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<NumOrStr>,
    channels: Option<i32>,
    bits_per_sample: Option<NumOrStr>,
    bits_per_raw_sample: Option<NumOrStr>,
    bit_rate: Option<NumOrStr>,
    tags: Option<HashMap<String, serde_json::Value>>,
}

/// ffprobe-backed probe implementation
#[derive(Debug, Clone)]
pub struct Ffprobe {
    binary: PathBuf,
}

impl Ffprobe {
    pub fn new() -> Self {
        Self {
            binary: ffprobe_path(),
        }
    }
}

impl Default for Ffprobe {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioProbe for Ffprobe {
    fn probe(&self, path: &Path) -> Result<AudioProps, SweepError> {
        let output = Command::new(&self.binary)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| SweepError::ProbeFailed(format!("failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(SweepError::ProbeFailed(format!(
                "ffprobe exited with {} for {}",
                output.status,
                path.display()
            )));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        let parsed: ProbeOutput = serde_json::from_str(&json_str)
            .map_err(|e| SweepError::ProbeFailed(format!("bad ffprobe json: {}", e)))?;

        Ok(props_from_output(parsed))
    }
}

fn merge_tag_map(
    into: &mut HashMap<String, String>,
    tags: &Option<HashMap<String, serde_json::Value>>,
) {
    let Some(tags) = tags else { return };

    for (key, value) in tags {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        into.entry(key.to_lowercase()).or_insert(text);
    }
}

fn props_from_output(parsed: ProbeOutput) -> AudioProps {
    let mut props = AudioProps::default();

    if let Some(format) = &parsed.format {
        if let Some(name) = &format.format_name {
            props.container = name.clone();
            props.format = name.split(',').next().unwrap_or(name).to_string();
        }
        if let Some(duration) = &format.duration {
            let secs = duration.as_f64().unwrap_or(0.0);
            props.duration_ms = (secs * 1000.0).round() as i64;
        }
        if let Some(bit_rate) = &format.bit_rate {
            props.bitrate_kbps = (bit_rate.as_i64().unwrap_or(0) / 1000) as i32;
        }
        merge_tag_map(&mut props.tags, &format.tags);
    }

    if let Some(streams) = &parsed.streams {
        for stream in streams {
            if stream.codec_type.as_deref() != Some("audio") {
                continue;
            }

            if let Some(codec) = &stream.codec_name {
                props.codec = codec.to_lowercase();
            }
            if let Some(rate) = &stream.sample_rate {
                props.sample_rate = rate.as_i64().unwrap_or(0) as i32;
            }
            if let Some(channels) = stream.channels {
                props.channels = channels;
            }
            // prefer raw sample bits; both fields may be "N/A"
            let depth = stream
                .bits_per_raw_sample
                .as_ref()
                .and_then(|d| d.as_i64())
                .filter(|d| *d > 0)
                .or_else(|| stream.bits_per_sample.as_ref().and_then(|d| d.as_i64()))
                .unwrap_or(0);
            props.bit_depth = depth as i32;

            if props.bitrate_kbps == 0 {
                if let Some(bit_rate) = &stream.bit_rate {
                    props.bitrate_kbps = (bit_rate.as_i64().unwrap_or(0) / 1000) as i32;
                }
            }
            merge_tag_map(&mut props.tags, &stream.tags);
            break;
        }
    }

    props
}

/// Ensure the ffprobe binary exists, downloading the sidecar build if
/// necessary
pub fn ensure_probe_available() -> Result<()> {
    if !ffprobe_is_installed() {
        tracing::info!("ffprobe not found, downloading...");
        auto_download().context("failed to download ffmpeg tools")?;
        tracing::info!("ffprobe downloaded successfully");
    }
    Ok(())
}
