//! Hand-written collaborators for engine and facade tests.

use splicer_core::options::{FrameRate, VideoCodec};
use splicer_core::repository::RequestRepository;
use splicer_core::request::{
    CommandId, ConcatRequestData, EncodeRequestData, MergeRequestData, Request, RequestPayload,
};
use splicer_core::error::CoreError;
use splicer_core::store::{MemoryStore, RequestStore};
use splicer_core::types::{AudioTrackInfo, Rotation, TimeMs, VideoInformation, VideoTrackInfo};
use splicer_render::execute::{CommandExecutor, ExecutionEvent};
use splicer_render::probe::MediaProbe;
use splicer_render::{FfmpegCommand, RenderError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::RequestEngine;
use crate::jobs::JobKind;

const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

/// A file with one video stream (index 0) and one audio stream (index 1).
pub fn clip(path: &str, width: u32, height: u32, duration_ms: i64) -> VideoInformation {
    VideoInformation {
        path: PathBuf::from(path),
        size: 1_000_000,
        duration: TimeMs(duration_ms),
        format: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
        video_tracks: vec![VideoTrackInfo {
            index: 0,
            width,
            height,
            rotated_width: width,
            rotated_height: height,
            codec: "h264".to_string(),
            codec_tag: "avc1".to_string(),
            pixel_format: "yuv420p".to_string(),
            bitrate: 2_000_000,
            frame_rate: "30/1".to_string(),
            rotation: Rotation::Degrees0,
            duration: TimeMs(duration_ms),
        }],
        audio_tracks: vec![AudioTrackInfo {
            index: 1,
            codec: "aac".to_string(),
            codec_tag: "mp4a".to_string(),
            sample_format: "fltp".to_string(),
            bitrate: 128_000,
            sample_rate: 48_000,
            channels: 2,
            channel_layout: "stereo".to_string(),
            duration: TimeMs(duration_ms),
        }],
    }
}

#[derive(Default)]
pub struct FakeProbe {
    files: HashMap<PathBuf, VideoInformation>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, info: VideoInformation) -> Self {
        self.files.insert(info.path.clone(), info);
        self
    }
}

impl MediaProbe for FakeProbe {
    fn probe(&self, path: &Path) -> splicer_render::Result<VideoInformation> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| RenderError::FileNotFound(path.to_path_buf()))
    }
}

/// Arms a [`FlakyStore`] whenever a file is read, so the store's next
/// `get` after synthesis fails.
pub struct ArmingMedia {
    pub files: FakeProbe,
    pub store: Arc<FlakyStore>,
}

impl MediaProbe for ArmingMedia {
    fn probe(&self, path: &Path) -> splicer_render::Result<VideoInformation> {
        self.store.fail_next_get();
        self.files.probe(path)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory store whose `get` can be told to fail once.
#[derive(Default)]
pub struct FlakyStore {
    rows: MemoryStore,
    fail_get: AtomicBool,
}

impl FlakyStore {
    pub fn fail_next_get(&self) {
        self.fail_get.store(true, Ordering::SeqCst);
    }
}

impl RequestStore for FlakyStore {
    fn load_all(&self) -> splicer_core::Result<Vec<Request>> {
        self.rows.load_all()
    }

    fn get(&self, id: Uuid) -> splicer_core::Result<Option<Request>> {
        if self.fail_get.swap(false, Ordering::SeqCst) {
            return Err(CoreError::Store("transient read failure".to_string()));
        }
        self.rows.get(id)
    }

    fn upsert(&self, request: &Request) -> splicer_core::Result<()> {
        self.rows.upsert(request)
    }

    fn remove(&self, id: Uuid) -> splicer_core::Result<bool> {
        self.rows.remove(id)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// One `execute` call. The test drives the run through `events`.
pub struct Run {
    pub id: CommandId,
    pub command: FfmpegCommand,
    pub events: mpsc::UnboundedSender<ExecutionEvent>,
}

pub struct FakeExecutor {
    next_id: AtomicU64,
    runs: mpsc::UnboundedSender<Run>,
    canceled: Mutex<Vec<CommandId>>,
    /// Make `execute` fail as if ffmpeg were missing.
    pub fail_start: AtomicBool,
    /// Leave sending `Created` to the test.
    pub defer_created: AtomicBool,
}

impl FakeExecutor {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Run>) {
        let (runs, rx) = mpsc::unbounded_channel();
        let executor = Arc::new(Self {
            next_id: AtomicU64::new(1),
            runs,
            canceled: Mutex::new(Vec::new()),
            fail_start: AtomicBool::new(false),
            defer_created: AtomicBool::new(false),
        });
        (executor, rx)
    }

    pub fn canceled(&self) -> Vec<CommandId> {
        self.canceled.lock().unwrap().clone()
    }
}

impl CommandExecutor for FakeExecutor {
    fn execute(
        &self,
        command: FfmpegCommand,
    ) -> splicer_render::Result<mpsc::UnboundedReceiver<ExecutionEvent>> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(RenderError::FfmpegNotFound);
        }
        let id = CommandId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.defer_created.load(Ordering::SeqCst) {
            tx.send(ExecutionEvent::Created(id)).unwrap();
        }
        let _ = self.runs.send(Run {
            id,
            command,
            events: tx,
        });
        Ok(rx)
    }

    fn cancel(&self, id: CommandId) {
        self.canceled.lock().unwrap().push(id);
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn merge_request(inputs: &[&str]) -> Request {
    Request::new(RequestPayload::Merge(MergeRequestData {
        inputs: inputs.iter().map(PathBuf::from).collect(),
        output: PathBuf::from("/out/merged.mp4"),
        result_path: None,
        width: None,
        height: None,
        frame_rate: FrameRate::Fps30,
        codec: VideoCodec::Default,
        video_tracks: vec![],
        audio_tracks: vec![],
    }))
}

pub fn concat_request(inputs: &[&str]) -> Request {
    Request::new(RequestPayload::Concat(ConcatRequestData {
        inputs: inputs.iter().map(PathBuf::from).collect(),
        output: PathBuf::from("/out/joined.mp4"),
        result_path: None,
    }))
}

pub fn encode_request(input: &str) -> Request {
    Request::new(RequestPayload::Encode(EncodeRequestData {
        input: PathBuf::from(input),
        output: PathBuf::from("/out/encoded.mp4"),
        result_path: None,
        width: Some(640),
        height: None,
        frame_rate: FrameRate::Fps25,
        codec: VideoCodec::H265,
        video_tracks: vec![],
        audio_tracks: vec![],
    }))
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub repository: Arc<RequestRepository>,
    pub probe: Arc<FakeProbe>,
    pub executor: Arc<FakeExecutor>,
    pub config: Arc<EngineConfig>,
    runs: mpsc::UnboundedReceiver<Run>,
    _scratch: TempDir,
}

impl Harness {
    pub fn new(probe: FakeProbe) -> Self {
        let scratch = TempDir::new().unwrap();
        let config = EngineConfig {
            scratch_dir: scratch.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let (executor, runs) = FakeExecutor::new();
        Self {
            repository: Arc::new(RequestRepository::new(Arc::new(MemoryStore::new())).unwrap()),
            probe: Arc::new(probe),
            executor,
            config: Arc::new(config),
            runs,
            _scratch: scratch,
        }
    }

    pub fn engine<J: JobKind>(&self) -> RequestEngine<J> {
        RequestEngine::new(
            Arc::clone(&self.repository),
            self.probe.clone(),
            self.executor.clone(),
            Arc::clone(&self.config),
        )
    }

    pub async fn insert(&self, request: Request) -> Uuid {
        self.repository.insert(&request).await.unwrap();
        request.id
    }

    pub async fn next_run(&mut self) -> Run {
        tokio::time::timeout(WAIT, self.runs.recv())
            .await
            .expect("timed out waiting for a run")
            .expect("executor dropped")
    }

    pub fn no_runs_started(&mut self) -> bool {
        self.runs.try_recv().is_err()
    }

    pub async fn wait_for(&self, id: Uuid, pred: impl Fn(&Request) -> bool) -> Request {
        wait_for(&self.repository, id, pred).await
    }
}

/// Wait until the stored request satisfies `pred`.
pub async fn wait_for(
    repository: &RequestRepository,
    id: Uuid,
    pred: impl Fn(&Request) -> bool,
) -> Request {
    let mut stream = repository.stream_by_id(id);
    let watch = async {
        if let Some(req) = stream.current() {
            if pred(&req) {
                return req;
            }
        }
        loop {
            match stream.next().await {
                Some(Some(req)) if pred(&req) => return req,
                Some(_) => continue,
                None => panic!("repository dropped"),
            }
        }
    };
    tokio::time::timeout(WAIT, watch)
        .await
        .expect("timed out waiting for request")
}

/// Poll `cond` until it holds.
pub async fn eventually(cond: impl Fn() -> bool) {
    let poll = async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(WAIT, poll)
        .await
        .expect("condition never became true");
}
