use splicer_core::repository::RequestRepository;
use splicer_core::request::{CommandId, Operation, Request, RequestStatus};
use splicer_core::types::TimeMs;
use splicer_render::execute::{CommandExecutor, ExecutionEvent, Outcome};
use splicer_render::probe::MediaProbe;
use splicer_render::FfmpegCommand;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::jobs::{wrong_kind, ConcatJob, EncodeJob, JobKind, MergeJob};

pub type MergeEngine = RequestEngine<MergeJob>;
pub type ConcatEngine = RequestEngine<ConcatJob>;
pub type EncodeEngine = RequestEngine<EncodeJob>;

/// Drives requests of one kind through synthesis and execution.
///
/// All status writes for one request id are serialized on a per-id lock held
/// by the engine. Different ids run fully in parallel. At most one execution
/// per id is in flight, even after a cancel that the executor has not yet
/// acknowledged.
pub struct RequestEngine<J: JobKind> {
    inner: Arc<Inner>,
    _job: PhantomData<fn() -> J>,
}

struct Inner {
    repository: Arc<RequestRepository>,
    probe: Arc<dyn MediaProbe>,
    executor: Arc<dyn CommandExecutor>,
    config: Arc<EngineConfig>,
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    active: Mutex<HashSet<Uuid>>,
}

impl<J: JobKind> Clone for RequestEngine<J> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _job: PhantomData,
        }
    }
}

/// Marks an execution in flight; cleared on drop, whatever way `process` ends.
struct ActiveRun {
    inner: Arc<Inner>,
    id: Uuid,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        lock(&self.inner.active).remove(&self.id);
    }
}

/// The per-id lock. The map entry goes away with the last holder.
struct IdGuard {
    inner: Arc<Inner>,
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = lock(&self.inner.locks);
        // waiters hold a clone of the mutex too
        if locks
            .get(&self.id)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<J: JobKind> RequestEngine<J> {
    pub fn new(
        repository: Arc<RequestRepository>,
        probe: Arc<dyn MediaProbe>,
        executor: Arc<dyn CommandExecutor>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repository,
                probe,
                executor,
                config,
                locks: Mutex::new(HashMap::new()),
                active: Mutex::new(HashSet::new()),
            }),
            _job: PhantomData,
        }
    }

    /// Whether an execution of `id` has not finished yet.
    pub fn is_active(&self, id: Uuid) -> bool {
        lock(&self.inner.active).contains(&id)
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Run request `id` to a terminal state and return the produced file.
    ///
    /// Resolves once the executor reports a result. A cancel while running
    /// ends in `EngineError::Canceled`.
    pub async fn process(&self, id: Uuid) -> Result<PathBuf> {
        let (request, _active) = self.start(id).await?;
        info!(%id, kind = %J::KIND, "processing request");

        let command = match self.synthesize(request).await {
            Ok(command) => command,
            Err(e) => return self.fail(id, e).await,
        };

        // a cancel may have landed while probing
        let current = {
            let _guard = self.lock_id(id).await;
            self.inner.repository.get_by_id(id)
        };
        match current {
            Ok(current) if current.status != RequestStatus::Processing => {
                info!(%id, status = %current.status, "request left processing before execution");
                return Err(EngineError::Canceled(id));
            }
            Ok(_) => {}
            Err(e) => return self.fail(id, e.into()).await,
        }

        let total = command.total_duration;
        let mut events = match self.inner.executor.execute(command) {
            Ok(events) => events,
            Err(e) => return self.fail(id, e.into()).await,
        };

        let mut outcome = None;
        while let Some(event) = events.recv().await {
            match event {
                ExecutionEvent::Created(command_id) => self.on_created(id, command_id).await,
                ExecutionEvent::Progress(elapsed) => self.on_progress(id, elapsed, total).await,
                ExecutionEvent::Finished(result) => {
                    outcome = Some(result);
                    break;
                }
            }
        }
        let outcome = outcome
            .unwrap_or_else(|| Outcome::Error("executor stopped without a result".to_string()));
        self.finish(id, outcome).await
    }

    /// Stop a PROCESSING request. Returns once the request is CANCELED; the
    /// running command is only asked to stop.
    pub async fn cancel(&self, id: Uuid) -> Result<Request> {
        let _guard = self.lock_id(id).await;
        let request = self.load(id)?;
        request.ensure(Operation::Cancel)?;

        if let Some(command_id) = request.command_id {
            self.inner.executor.cancel(command_id);
        }
        let canceled = self
            .inner
            .repository
            .try_change_status_to_canceled(id)
            .await?
            .ok_or(EngineError::InvalidState {
                id,
                status: request.status,
                operation: Operation::Cancel,
            })?;
        info!(%id, "request canceled");
        Ok(canceled)
    }

    /// Remove a request that is not PROCESSING.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let _guard = self.lock_id(id).await;
        let request = self.load(id)?;
        request.ensure(Operation::Delete)?;

        if let Some(command_id) = request.command_id {
            debug!(%id, %command_id, "canceling stale command before delete");
            self.inner.executor.cancel(command_id);
        }
        self.inner.repository.delete(id).await?;
        info!(%id, "request deleted");
        Ok(())
    }

    /// Store `request` as is, without status validation.
    pub async fn update(&self, request: Request) -> Result<Request> {
        if request.kind() != J::KIND {
            return Err(wrong_kind(J::KIND, &request));
        }
        Ok(self.inner.repository.update(request).await?)
    }

    // -----------------------------------------------------------------------
    // Process steps
    // -----------------------------------------------------------------------

    async fn start(&self, id: Uuid) -> Result<(Request, ActiveRun)> {
        let _guard = self.lock_id(id).await;
        let request = self.load(id)?;
        request.ensure(Operation::Process)?;

        if !lock(&self.inner.active).insert(id) {
            // canceled, but the previous command has not reported back yet
            return Err(EngineError::InvalidState {
                id,
                status: request.status,
                operation: Operation::Process,
            });
        }
        let active = ActiveRun {
            inner: Arc::clone(&self.inner),
            id,
        };
        let request = self
            .inner
            .repository
            .try_change_status_to_processing(id)
            .await?;
        Ok((request, active))
    }

    async fn synthesize(&self, request: Request) -> Result<FfmpegCommand> {
        let probe = Arc::clone(&self.inner.probe);
        let config = Arc::clone(&self.inner.config);
        tokio::task::spawn_blocking(move || J::synthesize(probe.as_ref(), &config, &request))
            .await
            .map_err(|e| EngineError::ExecutionFailed(format!("synthesis task failed: {e}")))?
    }

    async fn on_created(&self, id: Uuid, command_id: CommandId) {
        let _guard = self.lock_id(id).await;
        self.inner
            .repository
            .try_update_command_id(id, command_id)
            .await;

        let still_processing = match self.inner.repository.find(id) {
            Ok(Some(req)) => req.status == RequestStatus::Processing,
            Ok(None) => false,
            Err(e) => {
                warn!(%id, "failed to reload request: {}", e);
                true
            }
        };
        if !still_processing {
            debug!(%id, %command_id, "command started after cancel, stopping it");
            self.inner.executor.cancel(command_id);
        }
    }

    async fn on_progress(&self, id: Uuid, elapsed: TimeMs, total: TimeMs) {
        let fraction = progress_fraction(elapsed, total);
        let _guard = self.lock_id(id).await;
        self.inner.repository.try_update_progress(id, fraction).await;
    }

    /// Persist the executor's terminal result. A request that already left
    /// PROCESSING keeps its status and the caller sees `Canceled`.
    async fn finish(&self, id: Uuid, outcome: Outcome) -> Result<PathBuf> {
        let _guard = self.lock_id(id).await;
        let repository = &self.inner.repository;
        match outcome {
            Outcome::Success(path) => {
                match repository
                    .try_change_status_to_completed(id, path.clone())
                    .await?
                {
                    Some(_) => {
                        info!(%id, path = %path.display(), "request completed");
                        Ok(path)
                    }
                    None => {
                        info!(%id, "command finished after the request was canceled");
                        Err(EngineError::Canceled(id))
                    }
                }
            }
            Outcome::Canceled => {
                repository.try_change_status_to_canceled(id).await?;
                info!(%id, "command canceled");
                Err(EngineError::Canceled(id))
            }
            Outcome::Error(message) => {
                match repository.try_change_status_to_error(id, &message).await? {
                    Some(_) => {
                        error!(%id, "command failed: {}", message);
                        Err(EngineError::ExecutionFailed(message))
                    }
                    None => Err(EngineError::Canceled(id)),
                }
            }
        }
    }

    /// Record `err` on the request and hand it back to the caller.
    async fn fail(&self, id: Uuid, err: EngineError) -> Result<PathBuf> {
        let _guard = self.lock_id(id).await;
        warn!(%id, "request failed before execution: {}", err);
        match self
            .inner
            .repository
            .try_change_status_to_error(id, err.request_message())
            .await?
        {
            Some(_) => Err(err),
            None => Err(EngineError::Canceled(id)),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn load(&self, id: Uuid) -> Result<Request> {
        let request = self.inner.repository.get_by_id(id)?;
        if request.kind() != J::KIND {
            return Err(wrong_kind(J::KIND, &request));
        }
        Ok(request)
    }

    async fn lock_id(&self, id: Uuid) -> IdGuard {
        let mutex = {
            let mut locks = lock(&self.inner.locks);
            Arc::clone(locks.entry(id).or_default())
        };
        IdGuard {
            inner: Arc::clone(&self.inner),
            id,
            guard: Some(mutex.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        lock(&self.inner.locks).len()
    }
}

/// Elapsed media time over the expected duration, clamped to `[0, 1]`.
fn progress_fraction(elapsed: TimeMs, total: TimeMs) -> f32 {
    if !total.is_positive() {
        return 0.0;
    }
    (elapsed.0 as f64 / total.0 as f64).clamp(0.0, 1.0) as f32
}
