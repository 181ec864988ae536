use crate::error::{CoreError, Result};
use crate::request::{CommandId, Operation, Request, RequestStatus};
use crate::store::RequestStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Durable CRUD and status transitions over request records.
///
/// Every write is serialized and followed by a fresh snapshot published to all
/// live streams. Reads go straight to the store and never take the write lock.
pub struct RequestRepository {
    store: Arc<dyn RequestStore>,
    write_lock: Mutex<()>,
    changes: watch::Sender<Vec<Request>>,
}

impl RequestRepository {
    pub fn new(store: Arc<dyn RequestStore>) -> Result<Self> {
        let snapshot = sorted(store.load_all()?);
        let (changes, _) = watch::channel(snapshot);
        Ok(Self {
            store,
            write_lock: Mutex::new(()),
            changes,
        })
    }

    // ---- Queries ----

    pub fn get_by_id(&self, id: Uuid) -> Result<Request> {
        self.store.get(id)?.ok_or(CoreError::RequestNotFound(id))
    }

    pub fn find(&self, id: Uuid) -> Result<Option<Request>> {
        self.store.get(id)
    }

    /// All requests, oldest first, optionally restricted to one status.
    pub fn get_all(&self, status: Option<RequestStatus>) -> Result<Vec<Request>> {
        let all = sorted(self.store.load_all()?);
        Ok(filter(all, status))
    }

    pub fn stream_all(&self, status: Option<RequestStatus>) -> RequestStream {
        RequestStream {
            rx: self.changes.subscribe(),
            status,
        }
    }

    pub fn stream_by_id(&self, id: Uuid) -> RequestByIdStream {
        RequestByIdStream {
            rx: self.changes.subscribe(),
            id,
            last: None,
        }
    }

    // ---- Plain writes ----

    pub async fn insert(&self, request: &Request) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.store.get(request.id)?.is_some() {
            return Err(CoreError::InvalidInput(format!(
                "request {} already exists",
                request.id
            )));
        }
        self.store.upsert(request)?;
        debug!(id = %request.id, kind = %request.kind(), "inserted request");
        self.publish()
    }

    /// Overwrite a stored request without any status validation.
    pub async fn update(&self, mut request: Request) -> Result<Request> {
        let _guard = self.write_lock.lock().await;
        if self.store.get(request.id)?.is_none() {
            return Err(CoreError::RequestNotFound(request.id));
        }
        request.touch();
        self.store.upsert(&request)?;
        self.publish()?;
        Ok(request)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !self.store.remove(id)? {
            return Err(CoreError::RequestNotFound(id));
        }
        debug!(%id, "deleted request");
        self.publish()
    }

    // ---- Status transitions ----

    /// Validate that `id` may be processed and move it to PROCESSING.
    pub async fn try_change_status_to_processing(&self, id: Uuid) -> Result<Request> {
        self.mutate(id, |req| {
            req.ensure(Operation::Process)?;
            req.mark_processing();
            Ok(true)
        })
        .await
    }

    /// Complete a PROCESSING request. Returns `None` if it already left PROCESSING.
    pub async fn try_change_status_to_completed(
        &self,
        id: Uuid,
        result_path: PathBuf,
    ) -> Result<Option<Request>> {
        self.mutate_if_processing(id, move |req| req.mark_completed(result_path))
            .await
    }

    pub async fn try_change_status_to_canceled(&self, id: Uuid) -> Result<Option<Request>> {
        self.mutate_if_processing(id, Request::mark_canceled).await
    }

    pub async fn try_change_status_to_error(
        &self,
        id: Uuid,
        message: impl Into<String>,
    ) -> Result<Option<Request>> {
        let message = message.into();
        self.mutate_if_processing(id, move |req| req.mark_error(message))
            .await
    }

    /// Record the executor handle. Failures are logged, not returned.
    pub async fn try_update_command_id(&self, id: Uuid, command_id: CommandId) {
        let res = self
            .mutate_if_processing(id, move |req| req.set_command_id(command_id))
            .await;
        if let Err(e) = res {
            warn!(%id, %command_id, "failed to store command id: {}", e);
        }
    }

    /// Record progress in `[0, 1]`. Failures are logged, not returned.
    pub async fn try_update_progress(&self, id: Uuid, progress: f32) {
        let res = self
            .mutate_if_processing(id, move |req| req.set_progress(progress))
            .await;
        if let Err(e) = res {
            warn!(%id, progress, "failed to store progress: {}", e);
        }
    }

    /// Move every PROCESSING request to CANCELED. Run once at startup, when
    /// no command from a previous process can still be alive.
    pub async fn cancel_all_processing(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut count = 0;
        for mut req in self.store.load_all()? {
            if req.status == RequestStatus::Processing {
                req.mark_canceled();
                self.store.upsert(&req)?;
                info!(id = %req.id, "canceled request left processing by a previous run");
                count += 1;
            }
        }
        if count > 0 {
            self.publish()?;
        }
        Ok(count)
    }

    // ---- Internals ----

    async fn mutate<F>(&self, id: Uuid, f: F) -> Result<Request>
    where
        F: FnOnce(&mut Request) -> Result<bool>,
    {
        let _guard = self.write_lock.lock().await;
        let mut req = self.get_by_id(id)?;
        if f(&mut req)? {
            self.store.upsert(&req)?;
            self.publish()?;
        }
        Ok(req)
    }

    async fn mutate_if_processing<F>(&self, id: Uuid, f: F) -> Result<Option<Request>>
    where
        F: FnOnce(&mut Request),
    {
        let mut applied = false;
        let req = self
            .mutate(id, |req| {
                if req.status != RequestStatus::Processing {
                    return Ok(false);
                }
                f(req);
                applied = true;
                Ok(true)
            })
            .await?;
        Ok(applied.then_some(req))
    }

    fn publish(&self) -> Result<()> {
        let snapshot = sorted(self.store.load_all()?);
        self.changes.send_replace(snapshot);
        Ok(())
    }
}

fn sorted(mut requests: Vec<Request>) -> Vec<Request> {
    requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    requests
}

fn filter(requests: Vec<Request>, status: Option<RequestStatus>) -> Vec<Request> {
    match status {
        Some(s) => requests.into_iter().filter(|r| r.status == s).collect(),
        None => requests,
    }
}

// ---------------------------------------------------------------------------
// Live streams
// ---------------------------------------------------------------------------

/// Live view of the request list, pushed on every repository write.
pub struct RequestStream {
    rx: watch::Receiver<Vec<Request>>,
    status: Option<RequestStatus>,
}

impl RequestStream {
    pub fn current(&mut self) -> Vec<Request> {
        filter(self.rx.borrow_and_update().clone(), self.status)
    }

    /// Wait for the next write. `None` once the repository is gone.
    pub async fn next(&mut self) -> Option<Vec<Request>> {
        self.rx.changed().await.ok()?;
        Some(self.current())
    }
}

pub struct RequestByIdStream {
    rx: watch::Receiver<Vec<Request>>,
    id: Uuid,
    last: Option<Request>,
}

impl RequestByIdStream {
    /// Current state of the request, `None` if it does not exist (anymore).
    pub fn current(&mut self) -> Option<Request> {
        let now = self
            .rx
            .borrow_and_update()
            .iter()
            .find(|r| r.id == self.id)
            .cloned();
        self.last = now.clone();
        now
    }

    /// Wait until this request changes. Writes to other requests are skipped.
    pub async fn next(&mut self) -> Option<Option<Request>> {
        let before = self.last.clone();
        loop {
            self.rx.changed().await.ok()?;
            let now = self.current();
            if now != before {
                return Some(now);
            }
        }
    }
}
