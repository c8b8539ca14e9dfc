//! Write-notification decorator for the run repository
//!
//! `create`, `update` and `upsert` go through the inner repository, then the
//! written run is reloaded with all its relations and pushed to its
//! endpoint. The write call does not return until delivery finishes, and a
//! failed delivery fails the call even though the write itself went through.
//! Reads and deletes pass straight through.

use std::fmt;

use async_trait::async_trait;
use runhook_core::{JobRun, NewRun, RunFilter, RunGraph, RunUpdate};
use runhook_notify::Notifier;
use tracing::debug;

use super::runs::RunRepository;
use crate::error::DbResult;

/// The write operations that trigger a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Create,
    Update,
    Upsert,
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteOperation::Create => "create",
            WriteOperation::Update => "update",
            WriteOperation::Upsert => "upsert",
        })
    }
}

/// Identifier of a write result, if it carries a usable one
pub trait RecordId {
    fn record_id(&self) -> Option<&str>;
}

impl RecordId for JobRun {
    fn record_id(&self) -> Option<&str> {
        Some(self.id.as_str()).filter(|id| !id.is_empty())
    }
}

impl<T: RecordId> RecordId for Option<T> {
    fn record_id(&self) -> Option<&str> {
        self.as_ref().and_then(RecordId::record_id)
    }
}

/// Run repository that notifies the run's endpoint after every write
#[derive(Debug, Clone)]
pub struct NotifyingRunRepository<R, N> {
    inner: R,
    notifier: N,
}

impl<R, N> NotifyingRunRepository<R, N>
where
    R: RunRepository,
    N: Notifier,
{
    pub fn new(inner: R, notifier: N) -> Self {
        Self { inner, notifier }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Reload the written run and deliver it. Returns `result` untouched.
    async fn after_write<T>(&self, operation: WriteOperation, result: T) -> DbResult<T>
    where
        T: RecordId + Send + Sync,
    {
        let Some(id) = result.record_id() else {
            debug!(%operation, "write returned no run id, skipping notification");
            return Ok(result);
        };

        let Some(graph) = self.inner.load_graph(id).await? else {
            debug!(%operation, run_id = %id, "run not found on reload, skipping notification");
            return Ok(result);
        };

        debug!(%operation, run_id = %id, "run written, notifying endpoint");
        self.deliver(&graph).await?;
        Ok(result)
    }

    async fn deliver(&self, graph: &RunGraph) -> DbResult<()> {
        debug!(
            run_id = %graph.id(),
            endpoint = %graph.endpoint.url,
            "delivering run notification"
        );

        self.notifier
            .deliver(&graph.endpoint.url, &graph.environment.api_key, graph)
            .await?;
        Ok(())
    }

    /// Deliver a notification for an existing run outside any write.
    ///
    /// Returns `false` when the run does not exist.
    pub async fn redeliver(&self, id: &str) -> DbResult<bool> {
        let Some(graph) = self.inner.load_graph(id).await? else {
            return Ok(false);
        };

        debug!(run_id = %id, "redelivering run notification");
        self.deliver(&graph).await?;
        Ok(true)
    }
}

#[async_trait]
impl<R, N> RunRepository for NotifyingRunRepository<R, N>
where
    R: RunRepository,
    N: Notifier,
{
    async fn create(&self, input: NewRun) -> DbResult<JobRun> {
        let result = self.inner.create(input).await?;
        self.after_write(WriteOperation::Create, result).await
    }

    async fn update(&self, id: &str, changes: RunUpdate) -> DbResult<Option<JobRun>> {
        let result = self.inner.update(id, changes).await?;
        self.after_write(WriteOperation::Update, result).await
    }

    async fn upsert(&self, id: &str, create: NewRun, changes: RunUpdate) -> DbResult<JobRun> {
        let result = self.inner.upsert(id, create, changes).await?;
        self.after_write(WriteOperation::Upsert, result).await
    }

    async fn find_unique(&self, id: &str) -> DbResult<Option<JobRun>> {
        self.inner.find_unique(id).await
    }

    async fn find_many(&self, filter: RunFilter) -> DbResult<Vec<JobRun>> {
        self.inner.find_many(filter).await
    }

    async fn delete(&self, id: &str) -> DbResult<Option<JobRun>> {
        self.inner.delete(id).await
    }

    async fn load_graph(&self, id: &str) -> DbResult<Option<RunGraph>> {
        self.inner.load_graph(id).await
    }
}
