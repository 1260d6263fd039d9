use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::convert::tool::{ToolInvocation, ToolRunner};
use crate::error::{ConvertError, ToolError};

/// Raw `ffprobe -print_format json` document. Only the fields we use.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamInfo {
    pub codec: Option<String>,
}

/// What the converter needs to know about a source video.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub duration: Option<f64>,
    pub format_name: Option<String>,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
}

impl ProbeInfo {
    /// Parses ffprobe's JSON output. The first video and first audio stream
    /// are the ones that count.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let raw: FfprobeOutput = serde_json::from_str(json)?;

        let video = raw
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));
        let audio = raw
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"));

        let duration = raw
            .format
            .as_ref()
            .and_then(|f| parse_seconds(f.duration.as_deref()))
            .or_else(|| video.and_then(|v| parse_seconds(v.duration.as_deref())));

        Ok(Self {
            duration,
            format_name: raw.format.and_then(|f| f.format_name),
            video: video.map(|v| VideoStreamInfo {
                codec: v.codec_name.clone(),
                width: v.width,
                height: v.height,
                fps: parse_frame_rate(v.avg_frame_rate.as_deref())
                    .or_else(|| parse_frame_rate(v.r_frame_rate.as_deref())),
            }),
            audio: audio.map(|a| AudioStreamInfo {
                codec: a.codec_name.clone(),
            }),
        })
    }
}

/// Runs ffprobe on `input` and parses the result.
pub async fn probe(
    runner: &dyn ToolRunner,
    ffprobe: &str,
    input: &Path,
    timeout: Duration,
) -> Result<ProbeInfo, ConvertError> {
    let invocation = ToolInvocation::new(ffprobe, timeout)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(input.to_string_lossy());

    let output = runner.run(&invocation).await?;
    let info = ProbeInfo::parse(&output.stdout).map_err(|e| ToolError::InvalidOutput {
        program: ffprobe.to_string(),
        reason: e.to_string(),
    })?;
    Ok(info)
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Parses `30000/1001` or `25`. Returns `None` for `0/0`.
pub fn parse_frame_rate(value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
