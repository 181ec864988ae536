use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// VideoCodec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    Default,
    H264,
    Libx264,
    H265,
    Mpeg4,
}

impl VideoCodec {
    /// Encoder name passed to `-c:v`.
    pub fn encoder(&self) -> &'static str {
        match self {
            VideoCodec::Default | VideoCodec::Libx264 => "libx264",
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "hevc",
            VideoCodec::Mpeg4 => "mpeg4",
        }
    }

    /// Container tag some players need to recognise the stream.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            VideoCodec::H265 => Some("hvc1"),
            _ => None,
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encoder())
    }
}

// ---------------------------------------------------------------------------
// FrameRate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FrameRate {
    #[serde(rename = "24")]
    Fps24,
    #[serde(rename = "25")]
    Fps25,
    #[default]
    #[serde(rename = "30")]
    Fps30,
    #[serde(rename = "50")]
    Fps50,
    #[serde(rename = "60")]
    Fps60,
}

impl FrameRate {
    pub fn value(&self) -> u32 {
        match self {
            FrameRate::Fps24 => 24,
            FrameRate::Fps25 => 25,
            FrameRate::Fps30 => 30,
            FrameRate::Fps50 => 50,
            FrameRate::Fps60 => 60,
        }
    }

    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            24 => Some(FrameRate::Fps24),
            25 => Some(FrameRate::Fps25),
            30 => Some(FrameRate::Fps30),
            50 => Some(FrameRate::Fps50),
            60 => Some(FrameRate::Fps60),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Track selections
// ---------------------------------------------------------------------------

/// One slot of a merge track group: a stream of one of the input files.
///
/// `entry_index` is the container stream index reported by the prober. When
/// the file has no stream with that index the slot is filled with generated
/// black video or silence for the whole file duration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeMediaEntry {
    pub file_index: usize,
    pub entry_index: u32,
}

impl MergeMediaEntry {
    pub fn new(file_index: usize, entry_index: u32) -> Self {
        Self {
            file_index,
            entry_index,
        }
    }
}

/// An output video stream assembled from one entry per input file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeVideoTrack {
    pub tracks: Vec<MergeMediaEntry>,
    /// Overrides the request-level target width for this stream only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeAudioTrack {
    pub tracks: Vec<MergeMediaEntry>,
}

/// A video stream of the single encode input to keep, with an optional size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncodeVideoEntry {
    pub entry_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}
