use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// TimeMs
// ---------------------------------------------------------------------------

/// A media duration or position in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub const ZERO: Self = Self(0);

    pub fn from_seconds(s: f64) -> Self {
        Self((s * 1_000.0).round() as i64)
    }

    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Duration in the `<n>ms` form accepted by ffmpeg source filters.
    pub fn to_ffmpeg(&self) -> String {
        format!("{}ms", self.0)
    }
}

impl Add for TimeMs {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for TimeMs {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Sum for TimeMs {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, t| acc + t)
    }
}

impl fmt::Display for TimeMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_ms = self.0.unsigned_abs();
        let ms = total_ms % 1_000;
        let total_secs = total_ms / 1_000;
        let secs = total_secs % 60;
        let total_mins = total_secs / 60;
        let mins = total_mins % 60;
        let hours = total_mins / 60;
        if self.0 < 0 {
            write!(f, "-{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        } else {
            write!(f, "{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        }
    }
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Degrees0,
    Degrees90,
    Degrees180,
    Degrees270,
}

impl Rotation {
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Degrees0 => 0,
            Rotation::Degrees90 => 90,
            Rotation::Degrees180 => 180,
            Rotation::Degrees270 => 270,
        }
    }

    /// Map the `rotation` value of an ffprobe "Display Matrix" side data entry.
    ///
    /// The display matrix is counter-clockwise, so `90` means the frame has to
    /// be turned 270 degrees clockwise to be shown upright.
    pub fn from_display_matrix(value: i64) -> Self {
        match value {
            90 | -270 => Rotation::Degrees270,
            -90 | 270 => Rotation::Degrees90,
            180 | -180 => Rotation::Degrees180,
            _ => Rotation::Degrees0,
        }
    }

    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Degrees90 | Rotation::Degrees270)
    }
}

// ---------------------------------------------------------------------------
// Track information
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoTrackInfo {
    /// Stream index inside the container.
    pub index: u32,
    pub width: u32,
    pub height: u32,
    /// Display size after applying `rotation`.
    pub rotated_width: u32,
    pub rotated_height: u32,
    pub codec: String,
    pub codec_tag: String,
    pub pixel_format: String,
    pub bitrate: u64,
    /// Rational frame rate as reported by the prober, e.g. `30000/1001`.
    pub frame_rate: String,
    pub rotation: Rotation,
    pub duration: TimeMs,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioTrackInfo {
    pub index: u32,
    pub codec: String,
    pub codec_tag: String,
    pub sample_format: String,
    pub bitrate: u64,
    pub sample_rate: u32,
    pub channels: u32,
    pub channel_layout: String,
    pub duration: TimeMs,
}

// ---------------------------------------------------------------------------
// VideoInformation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoInformation {
    pub path: PathBuf,
    pub size: u64,
    pub duration: TimeMs,
    /// Container format name, e.g. `mov,mp4,m4a,3gp,3g2,mj2`.
    pub format: String,
    pub video_tracks: Vec<VideoTrackInfo>,
    pub audio_tracks: Vec<AudioTrackInfo>,
}

impl VideoInformation {
    pub fn has_video(&self) -> bool {
        !self.video_tracks.is_empty()
    }

    pub fn has_audio(&self) -> bool {
        !self.audio_tracks.is_empty()
    }

    /// Look up a video track by its container stream index.
    pub fn video_track(&self, stream_index: u32) -> Option<&VideoTrackInfo> {
        self.video_tracks.iter().find(|t| t.index == stream_index)
    }

    /// Look up an audio track by its container stream index.
    pub fn audio_track(&self, stream_index: u32) -> Option<&AudioTrackInfo> {
        self.audio_tracks.iter().find(|t| t.index == stream_index)
    }

    /// Ordinal of a video track among the file's video streams (the `N` in `[i:v:N]`).
    pub fn video_ordinal(&self, stream_index: u32) -> Option<usize> {
        self.video_tracks.iter().position(|t| t.index == stream_index)
    }

    /// Ordinal of an audio track among the file's audio streams (the `N` in `[i:a:N]`).
    pub fn audio_ordinal(&self, stream_index: u32) -> Option<usize> {
        self.audio_tracks.iter().position(|t| t.index == stream_index)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
