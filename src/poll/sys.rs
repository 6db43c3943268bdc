//! `poll(2)`-backed readiness implementation for unix targets

use std::io;
use std::time::Duration;

use super::{Readiness, SocketHandle};

/// Readiness wait built on the `poll(2)` system call.
///
/// Level-triggered: a handle with unread data is reported again on every
/// wait, so one `recv` per notification is enough.
#[derive(Debug, Default, Clone, Copy)]
pub struct PollReadiness;

impl PollReadiness {
    pub fn new() -> Self {
        Self
    }
}

impl Readiness for PollReadiness {
    fn wait_readable(
        &self,
        handles: &[SocketHandle],
        timeout: Duration,
    ) -> io::Result<Vec<SocketHandle>> {
        let mut fds: Vec<libc::pollfd> = handles
            .iter()
            .map(|&fd| libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

        let num = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if num < 0 {
            return Err(io::Error::last_os_error());
        }

        let ready = fds
            .iter()
            .filter(|pfd| pfd.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0)
            .map(|pfd| pfd.fd)
            .collect();
        Ok(ready)
    }
}
