//! The operation coordinator: the engine's public entry point.
//!
//! Validates requests, acquires a queue slot, and spawns the operation on
//! the runtime. A second start request for the same tenant and kind while
//! one is live returns the live task's handle instead of starting another.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ops::{self, OpContext, RestorePlan};
use crate::source::{TenantDestination, TenantSource};
use crate::tasks::{OperationKind, TaskHandle, TaskQueue, TaskStatus};
use portavault_archive::StorageBackend;
use portavault_core::{ModuleRegistry, RestoreMode, TransformStats};
use std::sync::Arc;

/// Parameters for a restore request.
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    /// Archive locator to restore from.
    pub archive: String,
    /// Keep original identifiers instead of remapping. Only permitted on
    /// deployments configured to allow instance dumps.
    pub preserve_ids: bool,
    /// Destination prefix for blob payloads; `None` skips blob restore.
    pub blob_target_prefix: Option<String>,
}

impl RestoreRequest {
    /// Restore the given archive with identifier remapping.
    pub fn new(archive: impl Into<String>) -> Self {
        Self {
            archive: archive.into(),
            preserve_ids: false,
            blob_target_prefix: None,
        }
    }

    /// Keep original identifiers (dump re-import).
    pub fn preserving_ids(mut self) -> Self {
        self.preserve_ids = true;
        self
    }

    /// Restore blob payloads under the given destination prefix.
    pub fn with_blob_target(mut self, prefix: impl Into<String>) -> Self {
        self.blob_target_prefix = Some(prefix.into());
        self
    }
}

/// Parameters for a tenant-to-tenant transfer request.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Tenant receiving the copied data.
    pub dest_tenant: String,
}

impl TransferRequest {
    /// Transfer into the given destination tenant.
    pub fn new(dest_tenant: impl Into<String>) -> Self {
        Self {
            dest_tenant: dest_tenant.into(),
        }
    }
}

/// Accepts operation requests and drives them to completion.
pub struct OperationCoordinator {
    registry: Arc<ModuleRegistry>,
    queue: Arc<TaskQueue>,
    config: EngineConfig,
    backend: Arc<dyn StorageBackend>,
    source: Arc<dyn TenantSource>,
    destination: Arc<dyn TenantDestination>,
}

impl OperationCoordinator {
    /// Wire a coordinator together.
    pub fn new(
        registry: Arc<ModuleRegistry>,
        queue: Arc<TaskQueue>,
        config: EngineConfig,
        backend: Arc<dyn StorageBackend>,
        source: Arc<dyn TenantSource>,
        destination: Arc<dyn TenantDestination>,
    ) -> Self {
        Self {
            registry,
            queue,
            config,
            backend,
            source,
            destination,
        }
    }

    fn op_context(&self, handle: Arc<TaskHandle>) -> OpContext {
        OpContext {
            handle,
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            backend: Arc::clone(&self.backend),
        }
    }

    /// Finish the task from the operation's outcome. Rows dropped along the
    /// way surface as a non-fatal error message on the completed task.
    fn settle(
        handle: &TaskHandle,
        result: Result<(Option<String>, TransformStats), EngineError>,
    ) {
        let settled = match result {
            Ok((artifact, stats)) => {
                let note = (stats.rows_dropped > 0)
                    .then(|| format!("{} rows dropped during transform", stats.rows_dropped));
                handle.complete(artifact, note)
            }
            Err(EngineError::Cancelled) => {
                tracing::info!(task_id = %handle.id(), "operation cancelled");
                Ok(())
            }
            Err(e) => {
                tracing::error!(task_id = %handle.id(), error = %e, "operation failed");
                handle.fail(e.to_string())
            }
        };
        if let Err(e) = settled {
            tracing::error!(task_id = %handle.id(), error = %e, "failed to persist task outcome");
        }
    }

    /// Start a backup of `tenant`, or return the live backup task's handle.
    pub async fn start_backup(&self, tenant: &str) -> Result<Arc<TaskHandle>, EngineError> {
        let outcome = self
            .queue
            .enqueue(tenant, OperationKind::Backup, self.config.concurrency)
            .await?;
        if outcome.existing {
            return Ok(outcome.handle);
        }

        let handle = Arc::clone(&outcome.handle);
        let ctx = self.op_context(Arc::clone(&handle));
        let source = Arc::clone(&self.source);
        let tenant = tenant.to_string();

        tokio::spawn(async move {
            if let Err(e) = ctx.handle.set_running() {
                tracing::error!(error = %e, "failed to mark task running");
                return;
            }
            let result = ops::run_backup(&ctx, &source, &tenant, 0, 100)
                .await
                .map(|(locator, stats)| (Some(locator), stats));
            Self::settle(&ctx.handle, result);
        });

        Ok(handle)
    }

    /// Start a restore into `tenant`, or return the live restore task's
    /// handle. Preserving identifiers requires the deployment to allow
    /// instance dumps.
    pub async fn start_restore(
        &self,
        tenant: &str,
        request: RestoreRequest,
    ) -> Result<Arc<TaskHandle>, EngineError> {
        if request.archive.is_empty() {
            return Err(EngineError::Configuration(
                "restore request lacks an archive locator".to_string(),
            ));
        }
        if request.preserve_ids && !self.config.allow_instance_dump {
            return Err(EngineError::InstanceDumpNotAllowed);
        }

        let outcome = self
            .queue
            .enqueue(tenant, OperationKind::Restore, self.config.concurrency)
            .await?;
        if outcome.existing {
            return Ok(outcome.handle);
        }

        let handle = Arc::clone(&outcome.handle);
        let ctx = self.op_context(Arc::clone(&handle));
        let destination = Arc::clone(&self.destination);
        let plan = RestorePlan {
            archive: request.archive,
            dest_tenant: tenant.to_string(),
            mode: if request.preserve_ids {
                RestoreMode::PreserveIds
            } else {
                RestoreMode::Remap
            },
            blob_target_prefix: request.blob_target_prefix,
        };

        tokio::spawn(async move {
            if let Err(e) = ctx.handle.set_running() {
                tracing::error!(error = %e, "failed to mark task running");
                return;
            }
            let result = ops::run_restore(&ctx, &destination, &plan, 0, 100)
                .await
                .map(|stats| (None, stats));
            Self::settle(&ctx.handle, result);
        });

        Ok(handle)
    }

    /// Start a transfer from `tenant` into the request's destination
    /// tenant, or return the live transfer task's handle.
    pub async fn start_transfer(
        &self,
        tenant: &str,
        request: TransferRequest,
    ) -> Result<Arc<TaskHandle>, EngineError> {
        if request.dest_tenant.is_empty() || request.dest_tenant == tenant {
            return Err(EngineError::Configuration(
                "transfer needs a distinct destination tenant".to_string(),
            ));
        }

        let outcome = self
            .queue
            .enqueue(tenant, OperationKind::Transfer, self.config.concurrency)
            .await?;
        if outcome.existing {
            return Ok(outcome.handle);
        }

        let handle = Arc::clone(&outcome.handle);
        let ctx = self.op_context(Arc::clone(&handle));
        let source = Arc::clone(&self.source);
        let destination = Arc::clone(&self.destination);
        let src_tenant = tenant.to_string();
        let dest_tenant = request.dest_tenant;

        tokio::spawn(async move {
            if let Err(e) = ctx.handle.set_running() {
                tracing::error!(error = %e, "failed to mark task running");
                return;
            }
            let result =
                ops::run_transfer(&ctx, &source, &destination, &src_tenant, &dest_tenant)
                    .await
                    .map(|(locator, stats)| (Some(locator), stats));
            Self::settle(&ctx.handle, result);
        });

        Ok(handle)
    }

    /// Progress of the tenant's task of the given kind.
    pub async fn progress(
        &self,
        tenant: &str,
        kind: OperationKind,
    ) -> Result<TaskStatus, EngineError> {
        let handle = self
            .queue
            .get(tenant, kind)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound {
                tenant: tenant.to_string(),
                kind: kind.to_string(),
            })?;
        Ok(handle.status())
    }

    /// Cancel and remove the tenant's task of the given kind.
    pub async fn dequeue(&self, tenant: &str, kind: OperationKind) -> Result<bool, EngineError> {
        self.queue.dequeue(tenant, kind).await
    }

    /// Clear a terminal task's error so callers stop seeing it.
    pub async fn reset_error(
        &self,
        tenant: &str,
        kind: OperationKind,
    ) -> Result<(), EngineError> {
        let handle = self
            .queue
            .get(tenant, kind)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound {
                tenant: tenant.to_string(),
                kind: kind.to_string(),
            })?;
        handle.reset_error()
    }

    /// Cancel every live task and clear the queue. Called on shutdown.
    pub async fn drain(&self) -> Result<(), EngineError> {
        self.queue.drain().await
    }
}
