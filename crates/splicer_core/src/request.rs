use crate::error::{CoreError, Result};
use crate::options::{
    EncodeVideoEntry, FrameRate, MergeAudioTrack, MergeVideoTrack, VideoCodec,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status / operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Idle,
    Processing,
    Error,
    Completed,
    Canceled,
}

impl RequestStatus {
    /// Whether `op` is legal from this status.
    ///
    /// A completed request is final: it has to be rebuilt to run again.
    pub fn allows(&self, op: Operation) -> bool {
        match op {
            Operation::Process => matches!(
                self,
                RequestStatus::Idle | RequestStatus::Error | RequestStatus::Canceled
            ),
            Operation::Cancel => *self == RequestStatus::Processing,
            Operation::Delete => *self != RequestStatus::Processing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Error | RequestStatus::Completed | RequestStatus::Canceled
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Idle => "IDLE",
            RequestStatus::Processing => "PROCESSING",
            RequestStatus::Error => "ERROR",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Canceled => "CANCELED",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Process,
    Cancel,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Process => "process",
            Operation::Cancel => "cancel",
            Operation::Delete => "delete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    Merge,
    Concat,
    Encode,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestKind::Merge => "MERGE",
            RequestKind::Concat => "CONCAT",
            RequestKind::Encode => "ENCODE",
        };
        f.pad(s)
    }
}

/// Handle of an in-flight external command, only used to cancel it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeRequestData {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    #[serde(default)]
    pub result_path: Option<PathBuf>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub frame_rate: FrameRate,
    #[serde(default)]
    pub codec: VideoCodec,
    /// Explicit video groups; empty means group by track position.
    #[serde(default)]
    pub video_tracks: Vec<MergeVideoTrack>,
    #[serde(default)]
    pub audio_tracks: Vec<MergeAudioTrack>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConcatRequestData {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    #[serde(default)]
    pub result_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodeRequestData {
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub result_path: Option<PathBuf>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub frame_rate: FrameRate,
    #[serde(default)]
    pub codec: VideoCodec,
    /// Video streams to keep; empty keeps every video stream.
    #[serde(default)]
    pub video_tracks: Vec<EncodeVideoEntry>,
    /// Audio stream indexes to keep; empty keeps every audio stream.
    #[serde(default)]
    pub audio_tracks: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestPayload {
    Merge(MergeRequestData),
    Concat(ConcatRequestData),
    Encode(EncodeRequestData),
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestPayload::Merge(_) => RequestKind::Merge,
            RequestPayload::Concat(_) => RequestKind::Concat,
            RequestPayload::Encode(_) => RequestKind::Encode,
        }
    }

    pub fn output_path(&self) -> &Path {
        match self {
            RequestPayload::Merge(d) => &d.output,
            RequestPayload::Concat(d) => &d.output,
            RequestPayload::Encode(d) => &d.output,
        }
    }

    pub fn result_path(&self) -> Option<&Path> {
        match self {
            RequestPayload::Merge(d) => d.result_path.as_deref(),
            RequestPayload::Concat(d) => d.result_path.as_deref(),
            RequestPayload::Encode(d) => d.result_path.as_deref(),
        }
    }

    pub fn input_paths(&self) -> Vec<&Path> {
        match self {
            RequestPayload::Merge(d) => d.inputs.iter().map(PathBuf::as_path).collect(),
            RequestPayload::Concat(d) => d.inputs.iter().map(PathBuf::as_path).collect(),
            RequestPayload::Encode(d) => vec![d.input.as_path()],
        }
    }

    fn set_result_path(&mut self, path: Option<PathBuf>) {
        let slot = match self {
            RequestPayload::Merge(d) => &mut d.result_path,
            RequestPayload::Concat(d) => &mut d.result_path,
            RequestPayload::Encode(d) => &mut d.result_path,
        };
        *slot = path;
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A persisted merge/concat/encode job.
///
/// Status changes go through the `mark_*` methods, which keep `result_path`,
/// `error_message` and `command_id` consistent with the new status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: Uuid,
    pub status: RequestStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub command_id: Option<CommandId>,
    #[serde(default)]
    pub progress: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payload: RequestPayload,
}

impl Request {
    pub fn new(payload: RequestPayload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: RequestStatus::Idle,
            error_message: None,
            command_id: None,
            progress: 0.0,
            created_at: now,
            updated_at: now,
            payload,
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }

    pub fn result_path(&self) -> Option<&Path> {
        self.payload.result_path()
    }

    /// Fail with `InvalidState` unless `op` is legal from the current status.
    pub fn ensure(&self, op: Operation) -> Result<()> {
        if self.status.allows(op) {
            Ok(())
        } else {
            Err(CoreError::InvalidState {
                id: self.id,
                status: self.status,
                operation: op,
            })
        }
    }

    pub fn mark_processing(&mut self) {
        self.status = RequestStatus::Processing;
        self.error_message = None;
        self.command_id = None;
        self.progress = 0.0;
        self.payload.set_result_path(None);
        self.touch();
    }

    pub fn mark_completed(&mut self, result_path: PathBuf) {
        self.status = RequestStatus::Completed;
        self.error_message = None;
        self.command_id = None;
        self.progress = 1.0;
        self.payload.set_result_path(Some(result_path));
        self.touch();
    }

    pub fn mark_canceled(&mut self) {
        self.status = RequestStatus::Canceled;
        self.error_message = None;
        self.command_id = None;
        self.progress = 0.0;
        self.payload.set_result_path(None);
        self.touch();
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = RequestStatus::Error;
        self.error_message = Some(message.into());
        self.command_id = None;
        self.progress = 0.0;
        self.payload.set_result_path(None);
        self.touch();
    }

    pub fn set_command_id(&mut self, command_id: CommandId) {
        self.command_id = Some(command_id);
        self.touch();
    }

    pub fn set_progress(&mut self, progress: f32) {
        self.progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
