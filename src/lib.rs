//! # UDP Socket Pool
//!
//! Multi-threaded UDP socket multiplexing: a fixed pool of worker threads,
//! each polling its own set of datagram sockets for readability and driving
//! their read path from a dedicated thread.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       SocketPoolManager                          │
//! │   add_socket ──► round-robin cursor (advances every 2nd add)    │
//! │   start / stop / remove_socket ──► fan out to every worker      │
//! └──────────┬──────────────────┬──────────────────┬───────────────┘
//!            ▼                  ▼                  ▼
//!   ┌────────────────┐ ┌────────────────┐ ┌────────────────┐
//!   │ SocketWorker 0 │ │ SocketWorker 1 │ │ SocketWorker N │
//!   │  pending_add   │ │  pending_add   │ │  pending_add   │
//!   │  pending_remove│ │  pending_remove│ │  pending_remove│
//!   └───────┬────────┘ └───────┬────────┘ └───────┬────────┘
//!           ▼                  ▼                  ▼
//!   ┌────────────────┐ ┌────────────────┐ ┌────────────────┐
//!   │  Poll Thread   │ │  Poll Thread   │ │  Poll Thread   │
//!   │ merge ► build  │ │ merge ► build  │ │ merge ► build  │
//!   │ ► wait ► fire  │ │ ► wait ► fire  │ │ ► wait ► fire  │
//!   │  on_readable() │ │  on_readable() │ │  on_readable() │
//!   └────────────────┘ └────────────────┘ └────────────────┘
//! ```
//!
//! Sockets are registered as [`PollableSocket`](socket::PollableSocket)
//! trait objects. Once added, the owning worker is responsible for the
//! socket's destruction; add/remove requests are queued and folded into the
//! live set at the start of the next poll cycle, so callers never race the
//! in-flight readiness wait.

pub mod error;
pub mod poll;
pub mod pool;
pub mod socket;

pub use error::{Error, Result};
pub use pool::{PoolConfig, SocketPoolManager, SocketWorker};

/// Library-wide constants
pub mod constants {
    /// Maximum number of worker threads in one pool
    pub const MAX_WORKERS: usize = 8;

    /// Default maximum number of sockets polled by a single worker
    pub const DEFAULT_MAX_SOCKETS_PER_WORKER: usize = 1024;

    /// Default readiness-wait timeout in milliseconds
    pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 10;

    /// Sleep between cycles when a worker has nothing to poll, and after a
    /// transient readiness-wait error
    pub const IDLE_SLEEP_MS: u64 = 10;
}
