//! TCP transport for the device gateway.
//!
//! GT06 trackers speak plain TCP, not QUIC/TLS - this wraps
//! `tokio::net::TcpListener`/`TcpStream` with the minimal surface the
//! per-connection task needs: accept, peer address, and independent
//! read/write halves.

use std::net::SocketAddr;

use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpListener, TcpStream,
};

use crate::error::GatewayError;

/// A bound TCP listener accepting device connections.
pub struct GatewayListener {
    inner: TcpListener,
}

impl GatewayListener {
    /// Binds to `address` (e.g. `"0.0.0.0:5023"`).
    pub async fn bind(address: &str) -> Result<Self, GatewayError> {
        let inner = TcpListener::bind(address)
            .await
            .map_err(|e| GatewayError::Transport(format!("failed to bind {address}: {e}")))?;

        tracing::info!(%address, "gateway listener bound");
        Ok(Self { inner })
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        self.inner
            .local_addr()
            .map_err(|e| GatewayError::Transport(format!("failed to read local address: {e}")))
    }

    /// Accepts the next incoming connection.
    pub async fn accept(&self) -> Result<GatewayStream, GatewayError> {
        let (socket, remote_address) = self
            .inner
            .accept()
            .await
            .map_err(|e| GatewayError::Transport(format!("accept failed: {e}")))?;

        socket
            .set_nodelay(true)
            .map_err(|e| GatewayError::Transport(format!("set_nodelay failed: {e}")))?;

        Ok(GatewayStream { inner: socket, remote_address })
    }
}

/// An accepted device connection.
pub struct GatewayStream {
    inner: TcpStream,
    remote_address: SocketAddr,
}

impl GatewayStream {
    /// The device's peer address.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.remote_address
    }

    /// Splits into independent read/write halves so the per-connection
    /// task can read frames and write ACKs without sharing a lock.
    #[must_use]
    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.inner.into_split()
    }
}
