//! Connection manager: connect, serve, reset, back off, repeat.
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Disconnected ──► ...
//!                      │                             ▲
//!                      └──── connect failed ─────────┘
//! ```
//!
//! One task owns the whole loop. While connected it reads the socket into a
//! [`FrameBuffer`] and hands each frame to the [`Dispatcher`]; writes go
//! through the per-connection writer task. A session ends on EOF, read
//! error, an oversized inbound frame (the stream cannot be resynchronised),
//! writer failure, a failed `Init`, or shutdown.
//!
//! Failed connects and sessions that never ran cleanly share one counter.
//! Past `loud_failure_limit` in a row they are logged at `debug` only.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, ReadHalf};

use super::socket::{BoxedStream, Connector};
use crate::client::ClientCore;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::protocol::{FrameBuffer, RequestType, PROTOCOL_VERSION};
use crate::registration::{lifecycle, PeerHandle};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Read buffer size for the socket.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Daemon connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Why a session ended.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Closed,
    Failed(String),
}

/// Drives the connect/read/reconnect loop for one client.
pub struct ConnectionManager {
    core: Arc<ClientCore>,
    connector: Arc<dyn Connector>,
}

impl ConnectionManager {
    pub(crate) fn new(core: Arc<ClientCore>, connector: Arc<dyn Connector>) -> Self {
        Self { core, connector }
    }

    /// Run until shutdown.
    pub(crate) async fn run(self) {
        let delay = self.core.config.reconnect_delay();
        let peer = self.connector.describe();

        loop {
            if self.core.shutdown.is_cancelled() {
                break;
            }
            self.core.set_link_state(LinkState::Connecting);

            let connected = tokio::select! {
                _ = self.core.shutdown.cancelled() => break,
                r = self.connector.connect() => r,
            };

            let failure = match connected {
                Ok(stream) => {
                    let (end, established) = self.serve(stream, &peer).await;
                    self.core.reset_session();
                    self.core.set_link_state(LinkState::Disconnected);
                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Closed if established => {
                            self.core.clear_failures();
                            tracing::info!("{} closed the connection", peer);
                            None
                        }
                        SessionEnd::Closed => Some("closed before Init completed".to_string()),
                        SessionEnd::Failed(reason) => Some(format!("connection lost: {}", reason)),
                    }
                }
                Err(e) => {
                    self.core.set_link_state(LinkState::Disconnected);
                    Some(format!("connect failed: {}", e))
                }
            };

            if let Some(reason) = failure {
                let failures = self.core.record_failure();
                if self.is_loud() {
                    tracing::warn!(
                        "{}: {} ({} in a row); retrying in {:?}",
                        peer,
                        reason,
                        failures,
                        delay
                    );
                } else {
                    tracing::debug!("{}: {} ({} in a row)", peer, reason, failures);
                }
            }

            tokio::select! {
                _ = self.core.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.core.set_link_state(LinkState::Disconnected);
        tracing::debug!("Connection manager for {} stopped", peer);
    }

    /// Whether the current failure streak is still logged loudly.
    fn is_loud(&self) -> bool {
        self.core.consecutive_failures() <= self.core.config.loud_failure_limit
    }

    /// Serve one connection until it ends. The flag tells whether `Init`
    /// was acknowledged.
    ///
    /// Callers see the session only after `Init` succeeds, so `Init` is
    /// always the first request on the wire.
    async fn serve(&self, stream: BoxedStream, peer: &str) -> (SessionEnd, bool) {
        let (reader, write_half) = tokio::io::split(stream);
        let writer_config = WriterConfig {
            channel_capacity: self.core.config.channel_capacity,
        };
        let (writer, mut writer_task) = spawn_writer_task(write_half, writer_config);

        let epoch = self.core.begin_session();
        tracing::debug!("Session epoch {} started", epoch);

        let read_loop = self.read_loop(reader);
        tokio::pin!(read_loop);
        let hello = handshake(&self.core, &writer);
        tokio::pin!(hello);
        let mut established = false;

        let end = loop {
            tokio::select! {
                end = &mut read_loop => break end,
                res = &mut writer_task => break match res {
                    Ok(Ok(())) => SessionEnd::Closed,
                    Ok(Err(e)) => SessionEnd::Failed(format!("write failed: {}", e)),
                    Err(e) => SessionEnd::Failed(format!("writer task: {}", e)),
                },
                res = &mut hello, if !established => match res {
                    Ok(()) => {
                        established = true;
                        self.core.open_session(writer.clone());
                        self.core.set_link_state(LinkState::Connected);
                        if self.is_loud() {
                            tracing::info!("Connected to {}", peer);
                        } else {
                            tracing::debug!("Connected to {}", peer);
                        }
                        self.register_standing_role();
                    }
                    Err(e) => break SessionEnd::Failed(format!("Init failed: {}", e)),
                },
                _ = self.core.shutdown.cancelled() => break SessionEnd::Shutdown,
            }
        };

        writer_task.abort();
        (end, established)
    }

    fn register_standing_role(&self) {
        let Some(role) = self.core.config.standing_role.clone() else {
            return;
        };
        match lifecycle::register(&self.core, role, PeerHandle::new()) {
            Ok(id) => tracing::info!("Standing role registering as {}", id),
            Err(e) => tracing::warn!("Standing role not registered: {}", e),
        }
    }

    async fn read_loop(&self, mut reader: ReadHalf<BoxedStream>) -> SessionEnd {
        let dispatcher = Dispatcher::new(self.core.clone());
        let mut frames = FrameBuffer::with_max_frame_size(self.core.config.max_frame_size);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    if frames.is_mid_frame() {
                        tracing::debug!("EOF inside a frame, {} bytes discarded", frames.len());
                    }
                    return SessionEnd::Closed;
                }
                Ok(n) => n,
                Err(e) => return SessionEnd::Failed(format!("read failed: {}", e)),
            };

            frames.extend(&buf[..n]);
            loop {
                match frames.next_frame() {
                    Ok(Some(frame)) => dispatcher.dispatch(frame),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Read loop error: {}", e);
                        return SessionEnd::Failed(e.to_string());
                    }
                }
            }
        }
    }
}

/// Per-session hello on the not yet published writer.
async fn handshake(core: &ClientCore, writer: &WriterHandle) -> Result<()> {
    let req = core.request(RequestType::Init, |w| {
        w.put_i32(PROTOCOL_VERSION);
    });
    core.round_trip_on(writer, req, core.config.request_timeout()).await?;
    tracing::debug!("Init acknowledged");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::notify::LogNotifier;
    use crate::protocol::{build_frame, solicited_payload, RequestView};
    use crate::transport::BoxFuture;
    use std::io;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;

    /// Hands out pre-made in-memory streams, then refuses.
    struct QueueConnector {
        streams: parking_lot::Mutex<Vec<DuplexStream>>,
        attempts: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Connector for QueueConnector {
        fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
            self.attempts
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let next = self.streams.lock().pop();
            Box::pin(async move {
                match next {
                    Some(s) => Ok(Box::new(s) as BoxedStream),
                    None => Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
                }
            })
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    fn core(reconnect_ms: u64) -> Arc<ClientCore> {
        let config = ClientConfig {
            reconnect_delay_ms: reconnect_ms,
            request_timeout_ms: 200,
            ..ClientConfig::default()
        };
        Arc::new(ClientCore::new(config, Arc::new(LogNotifier)))
    }

    async fn read_request(server: &mut DuplexStream) -> RequestView {
        let mut prefix = [0u8; 4];
        server.read_exact(&mut prefix).await.unwrap();
        let mut payload = vec![0u8; u32::from_be_bytes(prefix) as usize];
        server.read_exact(&mut payload).await.unwrap();
        RequestView::decode(payload.into()).unwrap()
    }

    async fn ack(server: &mut DuplexStream, serial: u32) {
        let reply = build_frame(&solicited_payload(serial, 0, &[]));
        server.write_all(&reply).await.unwrap();
    }

    async fn wait_for_state(core: &ClientCore, state: LinkState) {
        let mut rx = core.subscribe_link_state();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| *s == state))
            .await
            .unwrap()
            .unwrap();
    }

    /// Client halves whose daemon side is already gone.
    fn dead_streams(n: usize) -> Vec<DuplexStream> {
        (0..n)
            .map(|_| {
                let (client, server) = duplex(64);
                drop(server);
                client
            })
            .collect()
    }

    #[tokio::test]
    async fn test_session_sends_init_first() {
        let core = core(50);
        let (client, mut server) = duplex(4096);
        let connector = QueueConnector {
            streams: parking_lot::Mutex::new(vec![client]),
            attempts: Default::default(),
        };
        let task = tokio::spawn(ConnectionManager::new(core.clone(), Arc::new(connector)).run());

        let init = read_request(&mut server).await;
        assert_eq!(init.request_type, RequestType::Init.code());
        assert_eq!(init.serial, 0);
        assert_eq!(&init.body[..], &PROTOCOL_VERSION.to_be_bytes());

        // Not connected, and closed to callers, until Init is acknowledged.
        assert_eq!(core.link_state(), LinkState::Connecting);
        let early = core.call(RequestType::UpdateBatteryInfo, |_| {}).await;
        assert!(matches!(early, Err(crate::error::CneError::PeerUnavailable)));

        ack(&mut server, init.serial).await;
        wait_for_state(&core, LinkState::Connected).await;
        let (late, update) = tokio::join!(
            core.call(RequestType::UpdateBatteryInfo, |_| {}),
            async {
                let update = read_request(&mut server).await;
                ack(&mut server, update.serial).await;
                update
            }
        );
        late.unwrap();
        assert_eq!(update.request_type, RequestType::UpdateBatteryInfo.code());

        core.shutdown.cancel();
        task.await.unwrap();
        assert_eq!(core.link_state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_unanswered_init_recycles_connection() {
        let core = core(10);
        let (first, mut first_server) = duplex(4096);
        let (second, mut second_server) = duplex(4096);
        let connector = QueueConnector {
            streams: parking_lot::Mutex::new(vec![second, first]),
            attempts: Default::default(),
        };
        let task = tokio::spawn(ConnectionManager::new(core.clone(), Arc::new(connector)).run());

        let _init = read_request(&mut first_server).await;
        // Request timeout is 200ms; the next session starts over.
        let init = read_request(&mut second_server).await;
        assert_eq!(init.serial, 0);
        assert_ne!(core.link_state(), LinkState::Connected);
        assert_eq!(core.consecutive_failures(), 1);

        core.shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_inbound_frame_recycles_connection() {
        let core = core(10);
        let (first, mut first_server) = duplex(4096);
        let (second, mut second_server) = duplex(4096);
        let connector = QueueConnector {
            // Popped from the back.
            streams: parking_lot::Mutex::new(vec![second, first]),
            attempts: Default::default(),
        };
        let task = tokio::spawn(ConnectionManager::new(core.clone(), Arc::new(connector)).run());

        let init = read_request(&mut first_server).await;
        // Answer Init, then poison the stream.
        let mut bytes = build_frame(&solicited_payload(init.serial, 0, &[]));
        bytes.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        first_server.write_all(&bytes).await.unwrap();

        // A fresh session on the second stream restarts serials.
        let init = read_request(&mut second_server).await;
        assert_eq!(init.serial, 0);
        assert_eq!(core.consecutive_failures(), 1);

        core.shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_retries_after_connect_failures() {
        let core = core(5);
        let (client, mut server) = duplex(4096);
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let connector = QueueConnector {
            streams: parking_lot::Mutex::new(Vec::new()),
            attempts: attempts.clone(),
        };
        let connector = Arc::new(connector);
        let task = tokio::spawn(ConnectionManager::new(core.clone(), connector.clone()).run());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(attempts.load(std::sync::atomic::Ordering::SeqCst) >= 3);
        assert!(core.consecutive_failures() >= 3);
        assert_ne!(core.link_state(), LinkState::Connected);

        connector.streams.lock().push(client);
        let init = read_request(&mut server).await;
        assert_eq!(init.request_type, RequestType::Init.code());

        core.shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_sessions_dropped_before_init_keep_counting() {
        let core = core(2);
        let connector = Arc::new(QueueConnector {
            streams: parking_lot::Mutex::new(dead_streams(64)),
            attempts: Default::default(),
        });
        let task = tokio::spawn(ConnectionManager::new(core.clone(), connector.clone()).run());

        let mut seen = 0;
        for _ in 0..3 {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
            while core.consecutive_failures() <= seen + 2 {
                assert!(tokio::time::Instant::now() < deadline, "failure count stalled at {}", seen);
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            // Every failure so far came from a session; the connector has
            // not refused anything yet.
            assert!(!connector.streams.lock().is_empty());
            let now = core.consecutive_failures();
            assert!(now > seen);
            seen = now;
        }
        assert_ne!(core.link_state(), LinkState::Connected);

        core.shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_clean_session_clears_failures() {
        let core = core(2);
        let (live, mut live_server) = duplex(4096);
        let (next, mut next_server) = duplex(4096);
        let mut streams = vec![next, live];
        streams.extend(dead_streams(3));
        let connector = QueueConnector {
            streams: parking_lot::Mutex::new(streams),
            attempts: Default::default(),
        };
        let task = tokio::spawn(ConnectionManager::new(core.clone(), Arc::new(connector)).run());

        let init = read_request(&mut live_server).await;
        assert_eq!(core.consecutive_failures(), 3);
        ack(&mut live_server, init.serial).await;
        wait_for_state(&core, LinkState::Connected).await;
        drop(live_server);

        let _init = read_request(&mut next_server).await;
        assert_eq!(core.consecutive_failures(), 0);

        core.shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_while_disconnected() {
        let core = core(60_000);
        let connector = QueueConnector {
            streams: parking_lot::Mutex::new(Vec::new()),
            attempts: Default::default(),
        };
        let task = tokio::spawn(ConnectionManager::new(core.clone(), Arc::new(connector)).run());
        tokio::time::sleep(Duration::from_millis(10)).await;

        core.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_peer_close_fails_outstanding() {
        let core = core(10_000);
        let (client, mut server) = duplex(4096);
        let connector = QueueConnector {
            streams: parking_lot::Mutex::new(vec![client]),
            attempts: Default::default(),
        };
        let task = tokio::spawn(ConnectionManager::new(core.clone(), Arc::new(connector)).run());
        let init = read_request(&mut server).await;
        ack(&mut server, init.serial).await;
        wait_for_state(&core, LinkState::Connected).await;

        let (tx, mut rx) = mpsc::channel(1);
        let caller = core.clone();
        tokio::spawn(async move {
            let r = caller.call(RequestType::UpdateBatteryInfo, |_| {}).await;
            let _ = tx.send(r).await;
        });
        let _update = read_request(&mut server).await;
        drop(server);

        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome, Err(crate::error::CneError::PeerUnavailable)));

        core.shutdown.cancel();
        task.await.unwrap();
    }
}
