//! Error types for the socket pool

use std::fmt;

use thiserror::Error;

use crate::poll::SocketHandle;
use crate::socket::PollableSocket;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Manager/worker coordination errors
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Pool is already initialized")]
    AlreadyInitialized,

    #[error("Pool is not initialized")]
    NotInitialized,

    #[error("Requested worker count is zero")]
    ZeroWorkers,

    #[error("Failed to spawn poll thread: {0}")]
    SpawnFailed(String),

    #[error("Worker {0} poll thread panicked")]
    WorkerPanicked(usize),

    #[error("Failed to start worker {0}")]
    StartFailed(usize),

    #[error("Failed to stop {0} worker(s)")]
    StopFailed(usize),
}

/// Per-socket registration errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Invalid socket handle: {0}")]
    InvalidHandle(SocketHandle),

    #[error("Worker is at capacity: {0} sockets")]
    AtCapacity(usize),

    #[error("Handle already registered: {0}")]
    DuplicateHandle(SocketHandle),

    #[error("Socket not found: {0}")]
    NotFound(SocketHandle),

    #[error("No worker available to take the socket")]
    NoWorkerAvailable,
}

/// A socket that was rejected by `add_socket`.
///
/// Ownership of the socket stays with the caller on rejection; the boxed
/// object rides back inside the error so the caller can dispose of it or
/// retry elsewhere.
pub struct RejectedSocket {
    /// The socket that was not accepted
    pub socket: Box<dyn PollableSocket>,
    /// Why it was rejected
    pub error: SocketError,
}

impl RejectedSocket {
    pub fn new(socket: Box<dyn PollableSocket>, error: SocketError) -> Self {
        Self { socket, error }
    }
}

impl fmt::Debug for RejectedSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectedSocket")
            .field("handle", &self.socket.handle())
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for RejectedSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket {} rejected: {}", self.socket.handle(), self.error)
    }
}

impl std::error::Error for RejectedSocket {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<RejectedSocket> for Error {
    fn from(rejected: RejectedSocket) -> Self {
        Error::Socket(rejected.error)
    }
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
