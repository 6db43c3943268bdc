//! Socket worker pool
//!
//! Two tiers: [`SocketWorker`] owns a private set of sockets and polls them
//! from a dedicated thread; [`SocketPoolManager`] owns a fixed pool of
//! workers, distributes new sockets round-robin, and fans control calls out
//! to all of them.

pub mod manager;
pub mod worker;

pub use manager::SocketPoolManager;
pub use worker::SocketWorker;

use std::time::Duration;

use crate::constants::{DEFAULT_MAX_SOCKETS_PER_WORKER, DEFAULT_POLL_TIMEOUT_MS, IDLE_SLEEP_MS};

/// Tuning knobs for a socket pool.
///
/// The original limits these model were descriptor-set constants baked into
/// the platform; here they are explicit configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum sockets one worker will poll concurrently
    pub max_sockets_per_worker: usize,

    /// Bounded timeout for each readiness wait; also the worst-case extra
    /// latency of `stop()`
    pub poll_timeout: Duration,

    /// Sleep between cycles when a worker has no sockets, and after a
    /// transient readiness-wait failure
    pub idle_sleep: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sockets_per_worker: DEFAULT_MAX_SOCKETS_PER_WORKER,
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            idle_sleep: Duration::from_millis(IDLE_SLEEP_MS),
        }
    }
}
