//! Engine configuration.

use portavault_core::Sentinels;
use std::time::Duration;

/// Default concurrency ceiling per worker instance.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default bound on queue lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(15);

/// Default retry budget for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff between retries.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Default chunk size for multipart uploads and chunked hashing (8 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Queue name, used as the lock key and in diagnostics.
    pub queue_name: String,
    /// Maximum live tasks bound to this worker instance.
    pub concurrency: usize,
    /// Bound on queue lock acquisition.
    pub lock_timeout: Duration,
    /// Retries for transient source/destination/backend failures.
    pub max_retries: u32,
    /// Backoff between retries.
    pub retry_backoff: Duration,
    /// Chunk size for multipart uploads and chunked hashing.
    pub chunk_size: usize,
    /// Whether full-instance dumps are permitted on this deployment.
    pub allow_instance_dump: bool,
    /// Backend prefix under which archives are staged.
    pub staging_prefix: String,
    /// Sentinel identifier values passed through unresolved.
    pub sentinels: Sentinels,
    /// Table and column user-identity references resolve through.
    pub user_mapping: Option<(String, String)>,
    /// Table whose ids appear in bucketed blob paths, if the deployment
    /// stores file payloads.
    pub blob_table: Option<String>,
}

impl EngineConfig {
    /// Create a configuration for the named queue.
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            concurrency: DEFAULT_CONCURRENCY,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            chunk_size: DEFAULT_CHUNK_SIZE,
            allow_instance_dump: false,
            staging_prefix: "backups".to_string(),
            sentinels: Sentinels::new(),
            user_mapping: None,
            blob_table: None,
        }
    }

    /// Set the concurrency ceiling.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the queue lock timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the upload chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Permit full-instance dumps.
    pub fn with_instance_dump(mut self) -> Self {
        self.allow_instance_dump = true;
        self
    }

    /// Set the archive staging prefix.
    pub fn with_staging_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.staging_prefix = prefix.into();
        self
    }

    /// Set the sentinel identifier values.
    pub fn with_sentinels(mut self, sentinels: Sentinels) -> Self {
        self.sentinels = sentinels;
        self
    }

    /// Route user-identity columns through the given table/column.
    pub fn with_user_mapping(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        self.user_mapping = Some((table.into(), column.into()));
        self
    }

    /// Name the table whose ids appear in bucketed blob paths.
    pub fn with_blob_table(mut self, table: impl Into<String>) -> Self {
        self.blob_table = Some(table.into());
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("portavault")
    }
}
