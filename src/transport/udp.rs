//! UDP datagram transport.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use super::DatagramTransport;
use crate::error::{Error, Result};
use crate::util::bind_udp_socket;

/// A single unconnected UDP socket serving every remote the engine talks to.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to the given local address (`0.0.0.0:0` for an ephemeral port).
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = bind_udp_socket(addr).map_err(|e| Error::Io {
            target: Some(addr),
            source: e,
        })?;
        let local_addr = socket.local_addr().map_err(|e| Error::Io {
            target: Some(addr),
            source: e,
        })?;

        tracing::debug!(target: "snmp_query::transport", %local_addr, "UDP transport bound");

        Ok(Self { socket, local_addr })
    }
}

impl DatagramTransport for UdpTransport {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        tracing::trace!(
            target: "snmp_query::transport",
            remote = %target,
            bytes = data.len(),
            "send"
        );
        self.socket
            .send_to(data, target)
            .await
            .map_err(|e| Error::Io {
                target: Some(target),
                source: e,
            })?;
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let (len, source) = self.socket.recv_from(buf).await.map_err(|e| Error::Io {
            target: None,
            source: e,
        })?;
        tracing::trace!(
            target: "snmp_query::transport",
            remote = %source,
            bytes = len,
            "recv"
        );
        Ok((len, source))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_roundtrip() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        a.send_to(b"ping", b.local_addr()).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, source) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(source, a.local_addr());
    }
}
