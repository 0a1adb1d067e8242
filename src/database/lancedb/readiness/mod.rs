// Index readiness gate
// Bounded polling of an index's build status


use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::RagError;
use crate::database::sqlite::models::IndexStatus;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Time source for polling loops
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary origin
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    #[inline]
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Build status of an index as seen by a poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProgress {
    pub status: IndexStatus,
    pub error_message: Option<String>,
}

/// Anything that can report the build status of a named index
#[async_trait]
pub trait IndexStatusSource: Send + Sync {
    async fn index_progress(&self, collection: &str, index: &str)
    -> Result<IndexProgress, RagError>;
}

/// Poll until the index is `ready`
///
/// Fails with [`RagError::IndexBuildFailed`] as soon as the build fails and
/// with [`RagError::IndexTimeout`] once `timeout` has elapsed. The final sleep
/// is shortened so the last poll happens exactly at the deadline.
#[inline]
pub async fn wait_for_index_ready(
    source: &dyn IndexStatusSource,
    clock: &dyn Clock,
    collection: &str,
    index: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<(), RagError> {
    let start = clock.now();
    let interval = interval.max(Duration::from_millis(1));

    loop {
        let elapsed = clock.now().saturating_sub(start);

        let progress = source.index_progress(collection, index).await?;
        match progress.status {
            IndexStatus::Ready => {
                info!(
                    "Index {} on {} is ready after {:?}",
                    index, collection, elapsed
                );
                return Ok(());
            }
            IndexStatus::Failed => {
                return Err(RagError::IndexBuildFailed {
                    collection: collection.to_string(),
                    index: index.to_string(),
                    reason: progress
                        .error_message
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
            }
            status => {
                debug!(
                    "Index {} on {} is {} after {:?}",
                    index, collection, status, elapsed
                );
            }
        }

        if elapsed >= timeout {
            return Err(RagError::IndexTimeout {
                collection: collection.to_string(),
                index: index.to_string(),
                waited: elapsed,
            });
        }

        clock.sleep(interval.min(timeout - elapsed)).await;
    }
}
