use splicer_core::options::{
    EncodeVideoEntry, FrameRate, MergeAudioTrack, MergeVideoTrack, VideoCodec,
};
use splicer_core::repository::RequestRepository;
use splicer_core::request::{
    ConcatRequestData, EncodeRequestData, MergeRequestData, Request, RequestPayload,
};
use splicer_render::encode::encode_layout;
use splicer_render::merge::MergeLayout;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

fn check_output(output: &Path) -> Result<()> {
    if output.as_os_str().is_empty() {
        return Err(EngineError::InvalidInput("output path is empty".to_string()));
    }
    Ok(())
}

fn check_inputs(inputs: &[PathBuf]) -> Result<()> {
    if inputs.is_empty() {
        return Err(EngineError::InvalidInput("no input files".to_string()));
    }
    if inputs.iter().any(|p| p.as_os_str().is_empty()) {
        return Err(EngineError::InvalidInput("input path is empty".to_string()));
    }
    Ok(())
}

async fn insert(repository: &RequestRepository, payload: RequestPayload) -> Result<Request> {
    let request = Request::new(payload);
    repository.insert(&request).await?;
    info!(id = %request.id, kind = %request.kind(), "created request");
    Ok(request)
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Collects merge options and stores a new IDLE request.
pub struct MergeBuilder {
    repository: Arc<RequestRepository>,
    config: Arc<EngineConfig>,
    data: MergeRequestData,
}

impl MergeBuilder {
    pub fn new(
        repository: Arc<RequestRepository>,
        config: Arc<EngineConfig>,
        inputs: Vec<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        let data = MergeRequestData {
            inputs,
            output: output.into(),
            result_path: None,
            width: None,
            height: None,
            frame_rate: config.default_frame_rate,
            codec: config.default_codec,
            video_tracks: Vec::new(),
            audio_tracks: Vec::new(),
        };
        Self {
            repository,
            config,
            data,
        }
    }

    pub fn width(mut self, width: u32) -> Self {
        self.data.width = Some(width);
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.data.height = Some(height);
        self
    }

    pub fn frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.data.frame_rate = frame_rate;
        self
    }

    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.data.codec = codec;
        self
    }

    pub fn video_tracks(mut self, tracks: Vec<MergeVideoTrack>) -> Self {
        self.data.video_tracks = tracks;
        self
    }

    pub fn audio_tracks(mut self, tracks: Vec<MergeAudioTrack>) -> Self {
        self.data.audio_tracks = tracks;
        self
    }

    pub async fn build(self) -> Result<Request> {
        check_inputs(&self.data.inputs)?;
        check_output(&self.data.output)?;
        let layout = MergeLayout::from_request(&self.data);
        layout.validate(&self.config.synthesis)?;
        layout.validate_file_indexes(self.data.inputs.len())?;
        insert(&self.repository, RequestPayload::Merge(self.data)).await
    }
}

// ---------------------------------------------------------------------------
// Concat
// ---------------------------------------------------------------------------

pub struct ConcatBuilder {
    repository: Arc<RequestRepository>,
    data: ConcatRequestData,
}

impl ConcatBuilder {
    pub fn new(
        repository: Arc<RequestRepository>,
        inputs: Vec<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repository,
            data: ConcatRequestData {
                inputs,
                output: output.into(),
                result_path: None,
            },
        }
    }

    pub async fn build(self) -> Result<Request> {
        check_inputs(&self.data.inputs)?;
        check_output(&self.data.output)?;
        insert(&self.repository, RequestPayload::Concat(self.data)).await
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

pub struct EncodeBuilder {
    repository: Arc<RequestRepository>,
    config: Arc<EngineConfig>,
    data: EncodeRequestData,
}

impl EncodeBuilder {
    pub fn new(
        repository: Arc<RequestRepository>,
        config: Arc<EngineConfig>,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        let data = EncodeRequestData {
            input: input.into(),
            output: output.into(),
            result_path: None,
            width: None,
            height: None,
            frame_rate: config.default_frame_rate,
            codec: config.default_codec,
            video_tracks: Vec::new(),
            audio_tracks: Vec::new(),
        };
        Self {
            repository,
            config,
            data,
        }
    }

    pub fn width(mut self, width: u32) -> Self {
        self.data.width = Some(width);
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.data.height = Some(height);
        self
    }

    pub fn frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.data.frame_rate = frame_rate;
        self
    }

    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.data.codec = codec;
        self
    }

    /// Video streams to keep, by stream index.
    pub fn video_tracks(mut self, tracks: Vec<EncodeVideoEntry>) -> Self {
        self.data.video_tracks = tracks;
        self
    }

    /// Audio streams to keep, by stream index.
    pub fn audio_tracks(mut self, tracks: Vec<u32>) -> Self {
        self.data.audio_tracks = tracks;
        self
    }

    pub async fn build(self) -> Result<Request> {
        check_inputs(std::slice::from_ref(&self.data.input))?;
        check_output(&self.data.output)?;
        encode_layout(&self.data).validate(&self.config.synthesis)?;
        insert(&self.repository, RequestPayload::Encode(self.data)).await
    }
}
