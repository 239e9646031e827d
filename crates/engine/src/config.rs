use std::future::Future;
use std::time::Duration;

use crate::{EngineError, Result};

/// Default upper bound on a single engine operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on one operation, store round trips included.
    pub operation_timeout: Duration,
}

impl EngineConfig {
    pub fn new(operation_timeout: Duration) -> Self {
        Self { operation_timeout }
    }

    /// Runs `operation`, failing with `Timeout` once the bound is exceeded.
    ///
    /// The operation future is dropped on timeout, which rolls back any
    /// unit of work it holds.
    pub(crate) async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.operation_timeout, operation)
            .await
            .map_err(|_| EngineError::Timeout(self.operation_timeout))?
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OPERATION_TIMEOUT)
    }
}
