use splicer_core::repository::{RequestByIdStream, RequestRepository, RequestStream};
use splicer_core::request::{Request, RequestKind, RequestStatus};
use splicer_core::store::{JsonFileStore, RequestStore};
use splicer_core::types::VideoInformation;
use splicer_render::execute::{CommandExecutor, FfmpegExecutor};
use splicer_render::probe::{FfprobeProbe, MediaProbe};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::builder::{ConcatBuilder, EncodeBuilder, MergeBuilder};
use crate::config::EngineConfig;
use crate::engine::{ConcatEngine, EncodeEngine, MergeEngine};
use crate::error::{EngineError, Result};

type Collaborators = (
    Arc<dyn MediaProbe>,
    Arc<dyn CommandExecutor>,
    Arc<dyn RequestStore>,
);

fn collaborators(config: &EngineConfig) -> Result<Collaborators> {
    Ok((
        Arc::new(FfprobeProbe::new(&config.ffprobe_path)),
        Arc::new(FfmpegExecutor::new(&config.ffmpeg_path)),
        Arc::new(JsonFileStore::open(&config.store_path)?),
    ))
}

/// Completion callback for [`Splicer::process_with_callback`].
pub type ProcessCallback = Box<dyn FnOnce(Result<PathBuf>) + Send + 'static>;

/// Entry point: owns the repository and one engine per request kind.
///
/// Requests stay plain values; operations take the request id and are routed
/// to the engine matching the stored request's kind.
pub struct Splicer {
    config: Arc<EngineConfig>,
    repository: Arc<RequestRepository>,
    probe: Arc<dyn MediaProbe>,
    merge: MergeEngine,
    concat: ConcatEngine,
    encode: EncodeEngine,
}

impl Splicer {
    /// Wire up the engines and cancel whatever a previous process left
    /// PROCESSING.
    pub async fn init(
        config: EngineConfig,
        probe: Arc<dyn MediaProbe>,
        executor: Arc<dyn CommandExecutor>,
        store: Arc<dyn RequestStore>,
    ) -> Result<Self> {
        let splicer = Self::init_without_recovery(config, probe, executor, store)?;
        let recovered = splicer.repository.cancel_all_processing().await?;
        if recovered > 0 {
            info!(count = recovered, "canceled interrupted requests");
        }
        Ok(splicer)
    }

    /// Wire up the engines and leave stored statuses alone.
    ///
    /// For callers that only inspect or add requests while another process
    /// may be running some of them.
    pub fn init_without_recovery(
        config: EngineConfig,
        probe: Arc<dyn MediaProbe>,
        executor: Arc<dyn CommandExecutor>,
        store: Arc<dyn RequestStore>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let repository = Arc::new(RequestRepository::new(store)?);

        let merge = MergeEngine::new(
            Arc::clone(&repository),
            Arc::clone(&probe),
            Arc::clone(&executor),
            Arc::clone(&config),
        );
        let concat = ConcatEngine::new(
            Arc::clone(&repository),
            Arc::clone(&probe),
            Arc::clone(&executor),
            Arc::clone(&config),
        );
        let encode = EncodeEngine::new(
            Arc::clone(&repository),
            Arc::clone(&probe),
            executor,
            Arc::clone(&config),
        );

        Ok(Self {
            config,
            repository,
            probe,
            merge,
            concat,
            encode,
        })
    }

    /// [`Splicer::init`] with ffprobe, ffmpeg and the JSON file store from `config`.
    pub async fn open(config: EngineConfig) -> Result<Self> {
        let (probe, executor, store) = collaborators(&config)?;
        info!(store = %config.store_path.display(), "opening splicer");
        Self::init(config, probe, executor, store).await
    }

    /// [`Splicer::open`] without the recovery sweep.
    pub fn open_without_recovery(config: EngineConfig) -> Result<Self> {
        let (probe, executor, store) = collaborators(&config)?;
        debug!(store = %config.store_path.display(), "opening splicer without recovery");
        Self::init_without_recovery(config, probe, executor, store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- Builders ----

    pub fn merge_builder(&self, inputs: Vec<PathBuf>, output: impl Into<PathBuf>) -> MergeBuilder {
        MergeBuilder::new(
            Arc::clone(&self.repository),
            Arc::clone(&self.config),
            inputs,
            output,
        )
    }

    pub fn concat_builder(&self, inputs: Vec<PathBuf>, output: impl Into<PathBuf>) -> ConcatBuilder {
        ConcatBuilder::new(Arc::clone(&self.repository), inputs, output)
    }

    pub fn encode_builder(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> EncodeBuilder {
        EncodeBuilder::new(
            Arc::clone(&self.repository),
            Arc::clone(&self.config),
            input,
            output,
        )
    }

    // ---- Queries ----

    pub fn get_request(&self, id: Uuid) -> Result<Request> {
        Ok(self.repository.get_by_id(id)?)
    }

    pub fn get_all_requests(&self, status: Option<RequestStatus>) -> Result<Vec<Request>> {
        Ok(self.repository.get_all(status)?)
    }

    pub fn stream_request(&self, id: Uuid) -> RequestByIdStream {
        self.repository.stream_by_id(id)
    }

    pub fn stream_all_requests(&self, status: Option<RequestStatus>) -> RequestStream {
        self.repository.stream_all(status)
    }

    /// Whether `files` can be concatenated without re-encoding.
    pub async fn compare(&self, files: Vec<PathBuf>) -> Result<bool> {
        let probe = Arc::clone(&self.probe);
        let same = tokio::task::spawn_blocking(move || {
            splicer_render::compare::compare(probe.as_ref(), &files)
        })
        .await
        .map_err(|e| EngineError::ProbeFailed(e.to_string()))??;
        Ok(same)
    }

    pub async fn get_info(&self, path: impl Into<PathBuf>) -> Result<VideoInformation> {
        let probe = Arc::clone(&self.probe);
        let path = path.into();
        let info = tokio::task::spawn_blocking(move || probe.probe(&path))
            .await
            .map_err(|e| EngineError::ProbeFailed(e.to_string()))??;
        Ok(info)
    }

    // ---- Request operations ----

    pub async fn process(&self, id: Uuid) -> Result<PathBuf> {
        match self.kind_of(id)? {
            RequestKind::Merge => self.merge.process(id).await,
            RequestKind::Concat => self.concat.process(id).await,
            RequestKind::Encode => self.encode.process(id).await,
        }
    }

    /// Run [`Splicer::process`] in the background and hand the result to
    /// `callback`.
    pub fn process_with_callback(self: &Arc<Self>, id: Uuid, callback: ProcessCallback) -> JoinHandle<()> {
        let splicer = Arc::clone(self);
        tokio::spawn(async move {
            let result = splicer.process(id).await;
            callback(result);
        })
    }

    pub async fn cancel(&self, id: Uuid) -> Result<Request> {
        match self.kind_of(id)? {
            RequestKind::Merge => self.merge.cancel(id).await,
            RequestKind::Concat => self.concat.cancel(id).await,
            RequestKind::Encode => self.encode.cancel(id).await,
        }
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        match self.kind_of(id)? {
            RequestKind::Merge => self.merge.delete(id).await,
            RequestKind::Concat => self.concat.delete(id).await,
            RequestKind::Encode => self.encode.delete(id).await,
        }
    }

    pub async fn update(&self, request: Request) -> Result<Request> {
        match request.kind() {
            RequestKind::Merge => self.merge.update(request).await,
            RequestKind::Concat => self.concat.update(request).await,
            RequestKind::Encode => self.encode.update(request).await,
        }
    }

    fn kind_of(&self, id: Uuid) -> Result<RequestKind> {
        Ok(self.repository.get_by_id(id)?.kind())
    }
}
