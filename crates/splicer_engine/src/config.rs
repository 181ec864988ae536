use serde::{Deserialize, Serialize};
use splicer_core::options::{FrameRate, VideoCodec};
use splicer_render::SynthesisSettings;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Engine wide settings, stored as JSON. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// JSON file holding every request record.
    pub store_path: PathBuf,
    /// Where concat list files are written.
    pub scratch_dir: PathBuf,
    pub default_codec: VideoCodec,
    pub default_frame_rate: FrameRate,
    pub synthesis: SynthesisSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            store_path: PathBuf::from("splicer-requests.json"),
            scratch_dir: std::env::temp_dir().join("splicer"),
            default_codec: VideoCodec::Default,
            default_frame_rate: FrameRate::Fps30,
            synthesis: SynthesisSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Save as pretty-printed JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), json).map_err(|e| {
            EngineError::Config(format!("failed to write {}: {e}", path.as_ref().display()))
        })
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&data)
            .map_err(|e| EngineError::Config(format!("invalid config {}: {e}", path.display())))
    }
}
