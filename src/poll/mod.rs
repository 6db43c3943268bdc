//! Readiness multiplexing over sets of socket handles
//!
//! The worker loop only needs one capability from the platform: "block until
//! one of these handles is readable, or a timeout elapses". That capability
//! is the [`Readiness`] trait, so the same worker logic runs against
//! `poll(2)` in production and scripted fakes in tests.

#[cfg(unix)]
pub mod sys;

#[cfg(unix)]
pub use sys::PollReadiness;

use std::io;
use std::time::Duration;

/// Comparable handle identifying a registered socket.
///
/// On unix this is the raw file descriptor. Negative values are never
/// well-formed.
pub type SocketHandle = i32;

/// Returns true if `handle` is a well-formed socket handle
pub fn is_valid_handle(handle: SocketHandle) -> bool {
    handle >= 0
}

/// Multiplexed readiness wait over a bounded set of handles
pub trait Readiness: Send + Sync {
    /// Block until at least one handle in `handles` is readable or `timeout`
    /// elapses, returning the readable subset.
    ///
    /// A timeout is not an error: it returns an empty vector. `Err` is
    /// reserved for the underlying wait primitive itself failing.
    fn wait_readable(
        &self,
        handles: &[SocketHandle],
        timeout: Duration,
    ) -> io::Result<Vec<SocketHandle>>;
}
