//! Pool coordinator
//!
//! Owns a fixed set of workers, assigns new sockets round-robin, and
//! presents one aggregate control surface. The manager never blocks on I/O
//! itself; its methods coordinate on the caller's thread under a single
//! internal lock.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::constants::MAX_WORKERS;
use crate::error::{PoolError, RejectedSocket, SocketError};
use crate::poll::{Readiness, SocketHandle};
use crate::pool::{PoolConfig, SocketWorker};
use crate::socket::PollableSocket;

struct ManagerState {
    /// `None` until `init`; re-init without teardown is a usage error
    pool_id: Option<i32>,
    /// Fixed after `init`
    workers: Vec<SocketWorker>,
    /// Round-robin cursor
    next_assign: usize,
    /// Alternator: the cursor advances only every second successful add,
    /// filling the current worker a little before moving on
    advance_next_time: bool,
}

/// Coordinator for a fixed pool of [`SocketWorker`]s
pub struct SocketPoolManager {
    state: Mutex<ManagerState>,
    poller: Arc<dyn Readiness>,
    config: PoolConfig,
}

impl SocketPoolManager {
    /// Create an uninitialized pool using the platform readiness backend
    #[cfg(unix)]
    pub fn new() -> Self {
        Self::with_poller(Arc::new(crate::poll::PollReadiness::new()))
    }

    /// Create an uninitialized pool over a custom readiness backend
    pub fn with_poller(poller: Arc<dyn Readiness>) -> Self {
        Self::with_config(PoolConfig::default(), poller)
    }

    pub fn with_config(config: PoolConfig, poller: Arc<dyn Readiness>) -> Self {
        Self {
            state: Mutex::new(ManagerState {
                pool_id: None,
                workers: Vec::new(),
                next_assign: 0,
                advance_next_time: false,
            }),
            poller,
            config,
        }
    }

    /// One-time initialization: record the pool id and construct
    /// `min(requested_workers, MAX_WORKERS)` workers.
    pub fn init(&self, pool_id: i32, requested_workers: usize) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if state.pool_id.is_some() {
            return Err(PoolError::AlreadyInitialized);
        }
        if requested_workers == 0 {
            return Err(PoolError::ZeroWorkers);
        }

        let count = requested_workers.min(MAX_WORKERS);
        if count < requested_workers {
            tracing::debug!(
                "Clamping worker count from {} to {}",
                requested_workers,
                count
            );
        }

        state.workers = (0..count)
            .map(|i| SocketWorker::new(i, &self.config, self.poller.clone()))
            .collect();
        state.pool_id = Some(pool_id);
        tracing::debug!("Pool {} initialized with {} workers", pool_id, count);
        Ok(())
    }

    /// Start every worker, in order. Short-circuits on the first failure;
    /// workers already started stay running.
    pub fn start(&self) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if state.pool_id.is_none() {
            return Err(PoolError::NotInitialized);
        }

        for (i, worker) in state.workers.iter_mut().enumerate() {
            worker.start().map_err(|e| {
                tracing::error!("Failed to start worker {}: {}", i, e);
                PoolError::StartFailed(i)
            })?;
        }
        Ok(())
    }

    /// Stop every worker. A failing worker does not keep its siblings from
    /// being stopped; any failure surfaces as an aggregate error.
    pub fn stop(&self) -> Result<(), PoolError> {
        let mut state = self.state.lock();

        let mut failed = 0;
        for (i, worker) in state.workers.iter_mut().enumerate() {
            if let Err(e) = worker.stop() {
                tracing::error!("Failed to stop worker {}: {}", i, e);
                failed += 1;
            }
        }
        if failed > 0 {
            Err(PoolError::StopFailed(failed))
        } else {
            Ok(())
        }
    }

    /// Hand a socket to the worker under the round-robin cursor.
    ///
    /// The delegate's verdict is returned untouched; on success the cursor
    /// ticks per the alternating rule.
    pub fn add_socket(&self, socket: Box<dyn PollableSocket>) -> Result<(), RejectedSocket> {
        let mut state = self.state.lock();
        if state.workers.is_empty() {
            return Err(RejectedSocket::new(socket, SocketError::NoWorkerAvailable));
        }

        let index = state.next_assign;
        state.workers[index].add_socket(socket)?;

        if state.advance_next_time {
            state.advance_next_time = false;
            state.next_assign = (state.next_assign + 1) % state.workers.len();
        } else {
            state.advance_next_time = true;
        }
        Ok(())
    }

    /// Remove and destroy the socket with `handle`, whichever worker owns
    /// it. The owner is not tracked, so every worker is asked in order.
    pub fn remove_socket(&self, handle: SocketHandle) -> Result<(), SocketError> {
        let state = self.state.lock();
        for worker in &state.workers {
            if worker.remove_socket(handle).is_ok() {
                return Ok(());
            }
        }
        tracing::debug!("Socket {} not found in any worker", handle);
        Err(SocketError::NotFound(handle))
    }

    /// Number of workers constructed at `init` (zero before then)
    pub fn worker_count(&self) -> usize {
        self.state.lock().workers.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().pool_id.is_some()
    }

    /// Sockets registered with each worker, in worker order
    pub fn worker_loads(&self) -> Vec<usize> {
        self.state
            .lock()
            .workers
            .iter()
            .map(|w| w.registered_count())
            .collect()
    }
}

#[cfg(unix)]
impl Default for SocketPoolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SocketPoolManager {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
