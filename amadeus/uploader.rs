use crate::config::PeerConfig;
use crate::error::App;
use amadeus_protocol::CommandMessage;
use log::{debug, info, warn};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Fire-and-forget link to the practice peer: one connection per message,
/// no retry and no reply.
#[derive(Clone, Debug)]
pub struct CommandSender {
    peer: PeerConfig,
}

impl CommandSender {
    #[must_use]
    pub fn new(peer: PeerConfig) -> Self {
        Self { peer }
    }

    /// Sends the practice command for `path`. Failures are logged only.
    pub async fn send_practice(&self, path: &Path) -> bool {
        let message = match CommandMessage::practice(path) {
            Ok(message) => message,
            Err(e) => {
                warn!("Not sending practice command: {}", e);
                return false;
            }
        };
        match self.send(&message).await {
            Ok(()) => {
                info!("Sent practice command for {}", message.path());
                true
            }
            Err(e) => {
                warn!("Failed to send practice command: {}", e);
                false
            }
        }
    }

    pub async fn send(&self, message: &CommandMessage) -> Result<(), App> {
        let host = self.peer.host.as_str();
        let port = self.peer.port;
        debug!("Connecting to socket {}:{}", host, port);

        let mut stream = timeout(
            self.peer.connect_timeout(),
            TcpStream::connect((host, port)),
        )
        .await
        .map_err(|_| {
            App::Connect(format!(
                "Timed out after {}ms connecting to {host}:{port}",
                self.peer.connect_timeout_ms
            ))
        })?
        .map_err(|e| App::Connect(format!("{host}:{port}: {e}")))?;

        let frame = self.peer.framing.encode(message.encode().as_bytes());
        let written = stream.write_all(&frame).await;
        // The connection is closed whatever the write did.
        if let Err(e) = stream.shutdown().await {
            debug!("Socket shutdown failed: {}", e);
        }
        drop(stream);

        written.map_err(|e| App::Connect(format!("Write to {host}:{port} failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amadeus_protocol::Framing;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn peer_at(port: u16) -> PeerConfig {
        PeerConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_ms: 1_000,
            framing: Framing::Raw,
        }
    }

    #[tokio::test]
    async fn practice_command_is_the_only_bytes_written() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let reader = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let sender = CommandSender::new(peer_at(port));
        assert!(sender.send_practice(Path::new("/tmp/a.wav")).await);

        let received = reader.await.unwrap();
        assert_eq!(received, b"<:COMMAND:>PRACTICE<:FILEPATH:>/tmp/a.wav");
    }

    #[tokio::test]
    async fn header_framing_is_applied_when_configured() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let reader = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut peer = peer_at(port);
        peer.framing = Framing::Header;
        assert!(CommandSender::new(peer)
            .send_practice(Path::new("/tmp/a.wav"))
            .await);

        let received = reader.await.unwrap();
        assert_eq!(&received[..8], &[0, 0, 0, 0, 41, 0, 0, 0]);
        assert_eq!(&received[8..], b"<:COMMAND:>PRACTICE<:FILEPATH:>/tmp/a.wav");
    }

    #[tokio::test]
    async fn unreachable_peer_reports_failure() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let sender = CommandSender::new(peer_at(port));
        assert!(!sender.send_practice(Path::new("/tmp/a.wav")).await);
        assert!(matches!(
            sender
                .send(&CommandMessage::practice(Path::new("/tmp/a.wav")).unwrap())
                .await,
            Err(App::Connect(_))
        ));
    }

    #[tokio::test]
    async fn empty_path_is_never_sent() {
        let sender = CommandSender::new(peer_at(9));
        assert!(!sender.send_practice(Path::new("")).await);
    }
}
