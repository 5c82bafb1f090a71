use std::fmt;
use std::io;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::{lookup_host, UdpSocket};

/// The resolved chat partner: the address datagrams go to and must come
/// from, plus the host exactly as the user typed it. Console lines show the
/// typed form, not the resolved one.
#[derive(Debug, Clone)]
pub struct Peer {
    pub host: String,
    pub port: u16,
    pub addr: SocketAddr,
}

impl Peer {
    /// Resolves `host:port`, preferring an IPv4 address when the name has
    /// several. Failure to resolve is a startup error.
    pub async fn resolve(host: &str, port: u16) -> Result<Self> {
        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .with_context(|| format!("failed to resolve remote host '{host}'"))?
            .collect();
        let addr = addrs
            .iter()
            .copied()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first().copied())
            .with_context(|| format!("remote host '{host}' did not resolve to any address"))?;
        Ok(Self {
            host: host.to_string(),
            port,
            addr,
        })
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.host, self.port)
    }
}

/// Moves raw datagrams for the pipeline. Object safe so tests can swap in
/// scripted or failing transports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one datagram to `peer`. Best effort; an error costs the one
    /// message, never the session.
    async fn send(&self, payload: &[u8], peer: SocketAddr) -> io::Result<usize>;

    /// Receives one datagram into `buf`, returning its length and source.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

/// The real transport: one UDP socket, bound once for the whole session.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds `0.0.0.0:<port>`. Port 0 asks the OS for a free port, which
    /// the tests rely on.
    pub async fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind UDP port {port}"))?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, payload: &[u8], peer: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(payload, peer).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}
