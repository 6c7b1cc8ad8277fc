//! Unix datagram transport.
//!
//! The client binds its own socket path so the daemon can address replies,
//! and sends each frame as one datagram to the daemon's socket.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::UnixDatagram;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{TransportError, TransportSender};
use crate::client::IntegrationClient;
use crate::codec::MAX_FRAME_LEN;

/// A bound client socket. Dropping it removes the socket file.
pub struct UnixDatagramTransport {
    socket: Arc<UnixDatagram>,
    local_path: PathBuf,
    daemon_path: PathBuf,
}

impl UnixDatagramTransport {
    /// Bind `local_path`, replacing a stale socket left by a previous run.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        local_path: impl Into<PathBuf>,
        daemon_path: impl Into<PathBuf>,
    ) -> Result<Self, TransportError> {
        let local_path = local_path.into();
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if local_path.exists() {
            warn!(path = %local_path.display(), "Removing stale client socket");
            std::fs::remove_file(&local_path)?;
        }

        let socket = UnixDatagram::bind(&local_path)?;
        info!(path = %local_path.display(), "Client socket bound");

        Ok(Self {
            socket: Arc::new(socket),
            local_path,
            daemon_path: daemon_path.into(),
        })
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// A sender addressing the daemon socket.
    pub fn sender(&self) -> UnixDatagramSender {
        UnixDatagramSender {
            socket: Arc::clone(&self.socket),
            daemon_path: self.daemon_path.clone(),
        }
    }

    /// Start the receive loop. The client is told the channel is ready before
    /// the first receive, then every datagram is delivered to it.
    pub fn spawn_receiver(&self, client: IntegrationClient) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            if client.channel_ready().is_err() {
                return;
            }
            let mut buf = vec![0u8; MAX_FRAME_LEN];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, _)) => {
                        debug!(len, "Datagram received");
                        if client.deliver(buf[..len].to_vec()).is_err() {
                            debug!("Client closed, stopping receiver");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Datagram receive failed, stopping receiver");
                        break;
                    }
                }
            }
        })
    }
}

impl Drop for UnixDatagramTransport {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.local_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.local_path.display(), error = %e, "Failed to remove client socket");
            }
        }
    }
}

/// Non-blocking sender half of [`UnixDatagramTransport`].
#[derive(Clone)]
pub struct UnixDatagramSender {
    socket: Arc<UnixDatagram>,
    daemon_path: PathBuf,
}

impl TransportSender for UnixDatagramSender {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let sent = self.socket.try_send_to(frame, &self.daemon_path)?;
        if sent != frame.len() {
            return Err(TransportError::ShortWrite {
                sent,
                len: frame.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sender_reaches_daemon_socket() {
        let dir = tempfile::tempdir().unwrap();
        let daemon_path = dir.path().join("daemon.sock");
        let daemon = UnixDatagram::bind(&daemon_path).unwrap();

        let transport =
            UnixDatagramTransport::bind(dir.path().join("clients/locint.1"), &daemon_path).unwrap();
        transport.sender().send(b"hello").unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = daemon.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");
    }

    #[tokio::test]
    async fn test_send_without_daemon_fails() {
        let dir = tempfile::tempdir().unwrap();
        let transport =
            UnixDatagramTransport::bind(dir.path().join("locint.1"), dir.path().join("missing"))
                .unwrap();
        let err = transport.sender().send(b"hello").unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket_and_drop_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("locint.1");
        std::fs::write(&local, b"stale").unwrap();

        let transport = UnixDatagramTransport::bind(&local, dir.path().join("daemon")).unwrap();
        assert!(local.exists());
        drop(transport);
        assert!(!local.exists());
    }
}
