use serde::Deserialize;
use splicer_core::types::{AudioTrackInfo, Rotation, TimeMs, VideoInformation, VideoTrackInfo};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{RenderError, Result};

/// Source of per-file media metadata.
#[cfg_attr(test, mockall::automock)]
pub trait MediaProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<VideoInformation>;
}

/// Probe every path in order, failing on the first error.
pub fn probe_all(probe: &dyn MediaProbe, paths: &[PathBuf]) -> Result<Vec<VideoInformation>> {
    paths.iter().map(|p| probe.probe(p)).collect()
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: String,
    codec_name: Option<String>,
    codec_tag_string: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    bit_rate: Option<String>,
    r_frame_rate: Option<String>,
    sample_fmt: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    side_data_type: Option<String>,
    rotation: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    size: Option<String>,
    duration: Option<String>,
}

// ---------------------------------------------------------------------------
// FfprobeProbe
// ---------------------------------------------------------------------------

/// [`MediaProbe`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe: PathBuf,
}

impl FfprobeProbe {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MediaProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<VideoInformation> {
        if !path.exists() {
            return Err(RenderError::FileNotFound(path.to_path_buf()));
        }

        let output = std::process::Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .map_err(|e| RenderError::FfprobeExec(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::FfprobeFailed(stderr.into_owned()));
        }

        let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| RenderError::FfprobeFailed(format!("unreadable output: {e}")))?;
        let info = parse_probe_output(path, probe)?;
        debug!(
            path = %path.display(),
            duration = %info.duration,
            video = info.video_tracks.len(),
            audio = info.audio_tracks.len(),
            "probed media"
        );
        Ok(info)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn parse_probe_output(path: &Path, probe: FfprobeOutput) -> Result<VideoInformation> {
    let duration = parse_seconds(probe.format.duration.as_deref()).unwrap_or(TimeMs::ZERO);
    let size = probe
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let mut video_tracks = Vec::new();
    let mut audio_tracks = Vec::new();

    for stream in probe.streams {
        // streams without their own duration span the whole container
        let track_duration = parse_seconds(stream.duration.as_deref()).unwrap_or(duration);
        let bitrate = stream
            .bit_rate
            .as_deref()
            .and_then(|b| b.parse::<u64>().ok())
            .unwrap_or(0);

        match stream.codec_type.as_str() {
            "video" => {
                let rotation = stream_rotation(&stream);
                let width = stream.width.unwrap_or(0);
                let height = stream.height.unwrap_or(0);
                let (rotated_width, rotated_height) = if rotation.swaps_dimensions() {
                    (height, width)
                } else {
                    (width, height)
                };
                video_tracks.push(VideoTrackInfo {
                    index: stream.index,
                    width,
                    height,
                    rotated_width,
                    rotated_height,
                    codec: stream.codec_name.unwrap_or_default(),
                    codec_tag: stream.codec_tag_string.unwrap_or_default(),
                    pixel_format: stream.pix_fmt.unwrap_or_default(),
                    bitrate,
                    frame_rate: stream.r_frame_rate.unwrap_or_default(),
                    rotation,
                    duration: track_duration,
                });
            }
            "audio" => {
                audio_tracks.push(AudioTrackInfo {
                    index: stream.index,
                    codec: stream.codec_name.unwrap_or_default(),
                    codec_tag: stream.codec_tag_string.unwrap_or_default(),
                    sample_format: stream.sample_fmt.unwrap_or_default(),
                    bitrate,
                    sample_rate: stream
                        .sample_rate
                        .as_deref()
                        .and_then(|r| r.parse::<u32>().ok())
                        .unwrap_or(0),
                    channels: stream.channels.unwrap_or(0),
                    channel_layout: stream.channel_layout.unwrap_or_default(),
                    duration: track_duration,
                });
            }
            _ => {}
        }
    }

    if video_tracks.is_empty() && audio_tracks.is_empty() {
        return Err(RenderError::InvalidMedia(path.to_path_buf()));
    }

    Ok(VideoInformation {
        path: path.to_path_buf(),
        size,
        duration,
        format: probe.format.format_name.unwrap_or_default(),
        video_tracks,
        audio_tracks,
    })
}

/// Rotation from the display matrix side data, falling back to the legacy
/// `rotate` tag (clockwise, so the sign is flipped).
fn stream_rotation(stream: &FfprobeStream) -> Rotation {
    let matrix = stream
        .side_data_list
        .iter()
        .find(|d| d.side_data_type.as_deref() == Some("Display Matrix"))
        .and_then(|d| d.rotation);
    if let Some(value) = matrix {
        return Rotation::from_display_matrix(value);
    }
    stream
        .tags
        .get("rotate")
        .and_then(|r| r.parse::<i64>().ok())
        .map(|r| Rotation::from_display_matrix(-r))
        .unwrap_or_default()
}

/// Parse an ffprobe seconds string like "10.500000".
fn parse_seconds(value: Option<&str>) -> Option<TimeMs> {
    let secs = value?.parse::<f64>().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(TimeMs::from_seconds(secs))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
