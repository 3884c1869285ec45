use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::handler::{EventHandler, Outcome, SessionState};
use crate::settings::ListenUri;
use crate::wyoming::{read_event, write_event, Event};

/// A bidirectional byte stream carrying Wyoming events.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener, PathBuf),
}

impl Listener {
    pub async fn bind(uri: &ListenUri) -> Result<Self> {
        match uri {
            ListenUri::Tcp(addr) => {
                let listener = TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("Failed to bind Wyoming server on {}", addr))?;
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            ListenUri::Unix(path) => {
                if path.exists() {
                    debug!("Removing stale socket {:?}", path);
                    std::fs::remove_file(path)
                        .with_context(|| format!("Failed to remove stale socket {:?}", path))?;
                }
                let listener = tokio::net::UnixListener::bind(path)
                    .with_context(|| format!("Failed to bind Wyoming server on {:?}", path))?;
                Ok(Listener::Unix(listener, path.clone()))
            }
            #[cfg(not(unix))]
            ListenUri::Unix(_) => Err(anyhow::anyhow!(
                "unix:// URIs are not supported on this platform"
            )),
        }
    }

    /// Bound TCP address; `None` for Unix sockets.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Listener::Unix(..) => None,
        }
    }

    fn socket_path(&self) -> Option<&Path> {
        match self {
            Listener::Tcp(_) => None,
            #[cfg(unix)]
            Listener::Unix(_, path) => Some(path),
        }
    }

    async fn accept(&self) -> std::io::Result<(Box<dyn Connection>, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Box::new(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix(listener, path) => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), format!("unix:{}", path.display())))
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(path) = self.socket_path() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Open a client connection to a Wyoming server.
pub async fn connect(uri: &ListenUri) -> Result<Box<dyn Connection>> {
    match uri {
        ListenUri::Tcp(addr) => {
            let stream = TcpStream::connect(addr)
                .await
                .with_context(|| format!("Failed to connect to {}", uri))?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        ListenUri::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .with_context(|| format!("Failed to connect to {}", uri))?;
            Ok(Box::new(stream))
        }
        #[cfg(not(unix))]
        ListenUri::Unix(_) => Err(anyhow::anyhow!(
            "unix:// URIs are not supported on this platform"
        )),
    }
}

#[derive(Clone)]
pub struct Server {
    handler: Arc<EventHandler>,
    temp_root: Option<PathBuf>,
    close_after_transcript: bool,
}

impl Server {
    pub fn new(handler: Arc<EventHandler>) -> Self {
        Self {
            handler,
            temp_root: None,
            close_after_transcript: false,
        }
    }

    /// Parent directory for per-session temporary directories.
    pub fn with_temp_root(mut self, temp_root: Option<PathBuf>) -> Self {
        self.temp_root = temp_root;
        self
    }

    pub fn close_after_transcript(mut self, close: bool) -> Self {
        self.close_after_transcript = close;
        self
    }

    /// Accept connections until `shutdown` resolves. Each connection gets its
    /// own session and task.
    pub async fn run<F>(&self, listener: Listener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down Wyoming server");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((connection, peer)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            if let Err(err) = server.handle_connection(connection, &peer).await {
                                warn!("Wyoming connection {} ended with error: {:#}", peer, err);
                            }
                        });
                    }
                    Err(err) => {
                        error!("Wyoming accept error: {}", err);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }

        Ok(())
    }

    /// Drive one client session until the peer disconnects.
    pub async fn handle_connection<S>(&self, stream: S, peer: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut state = SessionState::new(self.temp_root.as_deref())
            .context("Failed to create session temporary directory")?;
        info!("Client {} connected (session {})", peer, state.id());

        let (read_half, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        while let Some(event) = read_event(&mut reader).await? {
            match self.handler.handle_event(&mut state, event).await {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Reply(reply)) => write_event(&mut writer, &reply).await?,
                Ok(Outcome::TurnComplete(transcript)) => {
                    write_event(&mut writer, &transcript).await?;
                    if self.close_after_transcript {
                        debug!("Closing session {} after transcript", state.id());
                        break;
                    }
                }
                Err(err) => {
                    warn!("Session {}: {}", state.id(), err);
                    let event = Event::error(&err.to_string(), err.code());
                    write_event(&mut writer, &event).await?;
                }
            }
        }

        info!("Client {} disconnected (session {})", peer, state.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::testing::MockRecognizer;
    use crate::managers::model::{EngineType, ModelEntry, ModelRegistry, ENGLISH};
    use crate::managers::transcription::{InferenceGate, TranscriptionManager};
    use crate::wyoming::{AudioFormat, ERROR, INFO, TRANSCRIPT};
    use tempfile::TempDir;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::sync::oneshot;

    const MONO_16K: AudioFormat = AudioFormat {
        rate: 16000,
        width: 2,
        channels: 1,
    };

    fn server(reply: &str) -> (Server, Arc<MockRecognizer>) {
        let recognizer = Arc::new(MockRecognizer::replying(reply));
        let mut registry = ModelRegistry::new();
        registry.insert(
            ENGLISH,
            ModelEntry {
                name: "mock".to_string(),
                engine: EngineType::Remote,
                languages: vec!["en".to_string()],
                recognizer: recognizer.clone(),
            },
        );
        let manager = TranscriptionManager::new(registry, Arc::new(InferenceGate::new()));
        let handler = EventHandler::new(Arc::new(manager), None).unwrap();
        (Server::new(Arc::new(handler)), recognizer)
    }

    async fn next_event<R>(reader: &mut R) -> Event
    where
        R: tokio::io::AsyncBufRead + Unpin,
    {
        tokio::time::timeout(Duration::from_secs(2), read_event(reader))
            .await
            .expect("timed out waiting for an event")
            .unwrap()
            .expect("server closed the connection")
    }

    async fn wait_until_empty(dir: &std::path::Path) -> bool {
        for _ in 0..100 {
            if std::fs::read_dir(dir).unwrap().next().is_none() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn wyoming_transcript_flow_works() {
        let temp_root = TempDir::new().unwrap();
        let (server, recognizer) = server("hello world");
        let server = server.with_temp_root(Some(temp_root.path().to_path_buf()));

        let listener = Listener::bind(&ListenUri::Tcp("127.0.0.1:0".to_string()))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_task = tokio::spawn(async move {
            server
                .run(listener, async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_event(&mut writer, &Event::describe()).await.unwrap();
        assert!(next_event(&mut reader).await.is_type(INFO));

        write_event(&mut writer, &Event::audio_start(MONO_16K)).await.unwrap();
        for _ in 0..3 {
            write_event(&mut writer, &Event::audio_chunk(MONO_16K, vec![0; 2048]))
                .await
                .unwrap();
        }
        write_event(&mut writer, &Event::audio_stop()).await.unwrap();

        let transcript = next_event(&mut reader).await;
        assert!(transcript.is_type(TRANSCRIPT));
        assert_eq!(transcript.text(), Some("hello world"));
        assert_eq!(recognizer.calls()[0].samples, 3072);

        drop(writer);
        drop(reader);
        assert!(wait_until_empty(temp_root.path()).await);

        shutdown_tx.send(()).unwrap();
        server_task.await.unwrap().unwrap();
    }

    async fn spawn_session(server: Server) -> (BufReader<DuplexStream>, tokio::task::JoinHandle<Result<()>>) {
        let (client, server_side) = tokio::io::duplex(64 * 1024);
        let handle = tokio::spawn(async move { server.handle_connection(server_side, "test").await });
        (BufReader::new(client), handle)
    }

    #[tokio::test]
    async fn handler_errors_are_reported_and_session_continues() {
        let (server, _) = server("still here");
        let (mut client, handle) = spawn_session(server).await;

        write_event(&mut client, &Event::audio_stop()).await.unwrap();
        let error = next_event(&mut client).await;
        assert!(error.is_type(ERROR));
        assert_eq!(error.data.get("code").and_then(|v| v.as_str()), Some("protocol-error"));

        write_event(&mut client, &Event::audio_chunk(MONO_16K, vec![0; 32])).await.unwrap();
        write_event(
            &mut client,
            &Event::audio_chunk(AudioFormat::new(48000, 2, 1), vec![0; 32]),
        )
        .await
        .unwrap();
        let error = next_event(&mut client).await;
        assert_eq!(error.data.get("code").and_then(|v| v.as_str()), Some("format-error"));

        write_event(&mut client, &Event::audio_stop()).await.unwrap();
        assert_eq!(next_event(&mut client).await.text(), Some("still here"));

        // the connection stays open for another utterance
        write_event(&mut client, &Event::audio_chunk(MONO_16K, vec![0; 32])).await.unwrap();
        write_event(&mut client, &Event::audio_stop()).await.unwrap();
        assert_eq!(next_event(&mut client).await.text(), Some("still here"));

        client.shutdown().await.unwrap();
        drop(client);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closes_after_transcript_when_configured() {
        let (server, _) = server("bye");
        let (mut client, handle) = spawn_session(server.close_after_transcript(true)).await;

        write_event(&mut client, &Event::audio_chunk(MONO_16K, vec![0; 32])).await.unwrap();
        write_event(&mut client, &Event::audio_stop()).await.unwrap();
        assert_eq!(next_event(&mut client).await.text(), Some("bye"));

        handle.await.unwrap().unwrap();
        assert!(read_event(&mut client).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_framing_ends_the_connection() {
        let (server, _) = server("unused");
        let (mut client, handle) = spawn_session(server).await;

        client.write_all(b"this is not json\n").await.unwrap();
        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn oversized_event_ends_only_that_connection() {
        let (server, _) = server("unaffected");
        let (mut bad, bad_handle) = spawn_session(server.clone()).await;
        let (mut good, good_handle) = spawn_session(server).await;

        write_event(&mut good, &Event::audio_chunk(MONO_16K, vec![0; 32])).await.unwrap();

        bad.write_all(b"{\"type\":\"audio-chunk\",\"payload_length\":4611686018427387903}\n")
            .await
            .unwrap();
        let err = bad_handle.await.unwrap().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::CodecError>(),
            Some(crate::error::CodecError::TooLarge { section: "payload", .. })
        ));

        write_event(&mut good, &Event::audio_stop()).await.unwrap();
        assert_eq!(next_event(&mut good).await.text(), Some("unaffected"));

        good.shutdown().await.unwrap();
        drop(good);
        good_handle.await.unwrap().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_socket_replaces_stale_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("asr.sock");
        std::fs::write(&path, b"stale").unwrap();
        let uri = ListenUri::Unix(path.clone());

        let (server, _) = server("over unix");
        let listener = Listener::bind(&uri).await.unwrap();
        assert!(listener.local_addr().is_none());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_task = tokio::spawn(async move {
            server
                .run(listener, async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let connection = connect(&uri).await.unwrap();
        let (read_half, mut writer) = tokio::io::split(connection);
        let mut reader = BufReader::new(read_half);
        write_event(&mut writer, &Event::audio_chunk(MONO_16K, vec![0; 32])).await.unwrap();
        write_event(&mut writer, &Event::audio_stop()).await.unwrap();
        assert_eq!(next_event(&mut reader).await.text(), Some("over unix"));

        shutdown_tx.send(()).unwrap();
        server_task.await.unwrap().unwrap();
        assert!(!path.exists());
    }
}
