//! UDP Pool Monitor
//!
//! Binds a handful of loopback UDP sockets, registers them with a socket
//! pool, and logs every datagram that arrives on any of them.

use anyhow::{anyhow, Result};
use crossbeam_channel::bounded;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use udp_socket_pool::{
    socket::{Datagram, UdpDatagramSocket},
    SocketPoolManager,
};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let socket_count: usize = std::env::args()
        .nth(1)
        .map(|arg| arg.parse().expect("Invalid socket count"))
        .unwrap_or(4);
    let worker_count: usize = std::env::args()
        .nth(2)
        .map(|arg| arg.parse().expect("Invalid worker count"))
        .unwrap_or(2);

    tracing::info!(
        "Starting UDP pool monitor: {} sockets across {} workers",
        socket_count,
        worker_count
    );

    let manager = SocketPoolManager::new();
    manager.init(0, worker_count)?;

    let (tx, rx) = bounded::<Datagram>(256);
    for _ in 0..socket_count {
        let socket = UdpDatagramSocket::bind("127.0.0.1:0".parse()?, tx.clone())?;
        let addr = socket.local_addr()?;
        manager
            .add_socket(Box::new(socket))
            .map_err(|rejected| anyhow!("{}", rejected))?;
        tracing::info!("Listening on {}", addr);
    }

    manager.start()?;
    tracing::info!("Pool started - send datagrams to the ports above, Ctrl+C to quit");

    let mut received: u64 = 0;
    let mut bytes: u64 = 0;
    loop {
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(datagram) => {
                received += 1;
                bytes += datagram.payload.len() as u64;
                tracing::info!(
                    "{} bytes from {} (total: {} packets, {:.1} KB)",
                    datagram.payload.len(),
                    datagram.from,
                    received,
                    bytes as f64 / 1024.0
                );
            }
            Err(_) => {
                tracing::debug!("No traffic in the last 5s");
            }
        }
    }
}
