//! Registered socket objects
//!
//! The pool only knows sockets through the [`PollableSocket`] contract: a
//! comparable handle to poll on, a notification when that handle is
//! readable, and a final notification before the worker destroys the
//! object. Reading and interpreting the datagram belongs to the object.

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use crossbeam_channel::Sender;
use socket2::{Domain, Protocol, Socket, Type};
use std::os::fd::AsRawFd;

use crate::error::Result;
use crate::poll::SocketHandle;

/// Maximum UDP payload this crate will read in one notification
pub const MAX_DATAGRAM_SIZE: usize = 65536;

/// Object that can be registered with a socket worker.
///
/// Ownership transfers to the worker on a successful add; from then on the
/// worker calls `on_readable` from its poll thread whenever the handle
/// reports data, and calls `on_teardown` exactly once before dropping the
/// object.
pub trait PollableSocket: Send {
    /// The handle the worker polls for readability. Must stay constant for
    /// the lifetime of the object.
    fn handle(&self) -> SocketHandle;

    /// Data is available on the handle. Runs synchronously on the poll
    /// thread; the object should read promptly and never block.
    fn on_readable(&mut self);

    /// The worker is about to destroy this object. Fired exactly once.
    fn on_teardown(&mut self);
}

/// A datagram received by a [`UdpDatagramSocket`]
#[derive(Debug, Clone)]
pub struct Datagram {
    pub payload: Bytes,
    pub from: SocketAddr,
}

/// Concrete [`PollableSocket`] over a non-blocking UDP socket.
///
/// Each readiness notification reads one datagram and delivers it over a
/// channel to whatever thread consumes this socket's traffic. A full
/// channel drops the datagram rather than blocking the poll thread.
pub struct UdpDatagramSocket {
    socket: std::net::UdpSocket,
    recv_buf: BytesMut,
    tx: Sender<Datagram>,
}

impl UdpDatagramSocket {
    /// Bind a non-blocking UDP socket on `addr` and deliver incoming
    /// datagrams to `tx`.
    pub fn bind(addr: SocketAddr, tx: Sender<Datagram>) -> Result<Self> {
        let domain = Domain::for_address(addr);
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        Ok(Self {
            socket: socket.into(),
            recv_buf: BytesMut::zeroed(MAX_DATAGRAM_SIZE),
            tx,
        })
    }

    /// Local address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl PollableSocket for UdpDatagramSocket {
    fn handle(&self) -> SocketHandle {
        self.socket.as_raw_fd()
    }

    fn on_readable(&mut self) {
        // One read per notification; the level-triggered wait reports the
        // handle again while data remains queued.
        match self.socket.recv_from(&mut self.recv_buf) {
            Ok((len, from)) => {
                let payload = Bytes::copy_from_slice(&self.recv_buf[..len]);
                if self.tx.try_send(Datagram { payload, from }).is_err() {
                    tracing::warn!("Datagram receiver full, dropping packet from {}", from);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // Spurious wakeup, nothing to read this time.
            }
            Err(e) => {
                tracing::warn!("UDP receive failed: {}", e);
            }
        }
    }

    fn on_teardown(&mut self) {
        tracing::debug!("UDP socket {} torn down", self.handle());
    }
}
