//! Datagram transport abstraction.
//!
//! The engine talks to any transport through [`DatagramTransport`]: send a
//! datagram to a remote, receive the next inbound datagram with its source.
//! One transport instance serves every remote the engine queries.

mod udp;

pub use udp::UdpTransport;

use crate::error::Result;
use std::future::Future;
use std::net::SocketAddr;

/// Connectionless datagram transport.
///
/// Sends are fire-and-forget from the engine's point of view: a lost
/// datagram surfaces later as a timeout, never as a stuck engine.
pub trait DatagramTransport: Send + Sync + 'static {
    /// Send a datagram to a remote address.
    fn send_to(
        &self,
        data: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Receive the next inbound datagram into `buf`.
    ///
    /// Returns the byte count and the source address.
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(usize, SocketAddr)>> + Send;

    /// Local bind address.
    fn local_addr(&self) -> SocketAddr;
}
