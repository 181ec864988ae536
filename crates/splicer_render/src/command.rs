use serde::{Deserialize, Serialize};
use splicer_core::types::TimeMs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Fixed parameters every synthesized command normalizes to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisSettings {
    pub audio_codec: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
    pub audio_channel_layout: String,
    pub audio_sample_format: String,
    pub pixel_format: String,
    pub filler_color: String,
    /// Smallest accepted target width or height.
    pub min_dimension: u32,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            audio_codec: "aac".to_string(),
            audio_sample_rate: 44_100,
            audio_channels: 2,
            audio_channel_layout: "stereo".to_string(),
            audio_sample_format: "fltp".to_string(),
            pixel_format: "yuv420p".to_string(),
            filler_color: "black".to_string(),
            min_dimension: 128,
        }
    }
}

/// A ready to run ffmpeg invocation.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Arguments after the program name.
    pub args: Vec<String>,
    pub output_path: PathBuf,
    /// Expected media duration, used to turn elapsed time into a fraction.
    pub total_duration: TimeMs,
    // files the command reads, removed once the last clone is dropped
    scratch: Vec<Arc<NamedTempFile>>,
}

impl FfmpegCommand {
    pub fn new(args: Vec<String>, output_path: PathBuf, total_duration: TimeMs) -> Self {
        Self {
            args,
            output_path,
            total_duration,
            scratch: Vec::new(),
        }
    }

    pub fn with_scratch_file(mut self, file: NamedTempFile) -> Self {
        self.scratch.push(Arc::new(file));
        self
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        let mut line = String::from("ffmpeg");
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == ';') {
                line.push('"');
                line.push_str(&arg.replace('"', "\\\""));
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}
