// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! Outbound connection role: dials the LifeSOS ethernet interface.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::BaseUnitConfig;
use crate::error::{LifeSosError, Result};
use crate::event::{event_channel, EventReceiver, EventSender};
use crate::response::Response;
use crate::session::{run_keepalive, run_reader, SessionCore, SessionState};

/// Provides connectivity to the LifeSOS ethernet interface.
///
/// Applications can use this directly for protocol-level access, or the
/// [`BaseUnit`](crate::baseunit::BaseUnit) for management and higher level
/// access.
pub struct ClientSession {
    core: Arc<SessionCore>,
    host: String,
    port: u16,
    reconnect_interval: Duration,
    event_tx: EventSender,
    shutdown_tx: watch::Sender<bool>,
}

impl ClientSession {
    /// Create an unconnected session for the configured host/port.
    pub fn new(config: &BaseUnitConfig) -> Self {
        let (event_tx, _) = event_channel(256);
        let core = Arc::new(SessionCore::new(
            config.password.clone(),
            event_tx.clone(),
            config.execute_timeout,
            config.keepalive_interval,
        ));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            core,
            host: config.host.clone(),
            port: config.port,
            reconnect_interval: config.reconnect_interval,
            event_tx,
            shutdown_tx,
        }
    }

    /// Host name or IP address for the LifeSOS ethernet interface.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number for the LifeSOS ethernet interface.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// True when connected to the ethernet interface.
    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    /// Replace the control password used for subsequent commands.
    pub async fn set_password(&self, password: impl Into<String>) {
        self.core.set_password(password.into()).await;
    }

    /// Open the connection. A failure leaves the session disconnected;
    /// when started via [`start`](Self::start) the supervisor retries
    /// after the reconnect interval.
    pub async fn connect(&self) -> Result<()> {
        if self.core.is_connected() {
            return Ok(());
        }
        self.core.set_state(SessionState::Connecting);
        debug!("Connecting to {}:{}", self.host, self.port);

        let stream = match TcpStream::connect((self.host.as_str(), self.port)).await {
            Ok(stream) => stream,
            Err(e) => {
                self.core.set_state(SessionState::Disconnected);
                return Err(LifeSosError::Io(e));
            }
        };
        info!("Connected to {}:{}", self.host, self.port);

        let (reader, writer) = stream.into_split();
        self.core.attach(writer).await;
        tokio::spawn(run_reader(self.core.clone(), reader));
        tokio::spawn(run_keepalive(
            self.core.clone(),
            self.shutdown_tx.subscribe(),
        ));
        Ok(())
    }

    /// Start supervised connection management: connect now, and reconnect
    /// after the configured interval whenever the connection is lost or an
    /// attempt fails, until [`close`](Self::close) is called.
    pub fn start(self: &Arc<Self>) {
        let session = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut state_rx = session.core.state_receiver();
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if !session.core.is_connected() {
                    if let Err(e) = session.connect().await {
                        warn!(
                            "Failed to open connection: {}; retrying in {:?}",
                            e, session.reconnect_interval
                        );
                        tokio::select! {
                            _ = sleep(session.reconnect_interval) => {}
                            _ = shutdown.changed() => {}
                        }
                        continue;
                    }
                }
                // Connected; wait for loss or shutdown
                tokio::select! {
                    _ = state_rx.changed() => {}
                    _ = shutdown.changed() => {}
                }
                if *shutdown.borrow() {
                    break;
                }
                if !session.core.is_connected() {
                    warn!(
                        "Connection was lost; reconnecting in {:?}",
                        session.reconnect_interval
                    );
                    tokio::select! {
                        _ = sleep(session.reconnect_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
            debug!("Connection supervisor stopped");
        });
    }

    /// Execute a command and return its response.
    ///
    /// `password` overrides the session password for this call only;
    /// `response_timeout` overrides the configured execute timeout.
    pub async fn execute(
        &self,
        command: Command,
        password: Option<&str>,
        response_timeout: Option<Duration>,
    ) -> Result<Response> {
        self.core.execute(command, password, response_timeout).await
    }

    /// Close the connection and stop the reconnect supervisor.
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        self.core.detach().await;
        debug!("Disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_before_connect_fails() {
        let config = BaseUnitConfig::default();
        let session = ClientSession::new(&config);
        assert!(!session.is_connected());
        let result = session.execute(Command::GetExitDelay, None, None).await;
        assert!(matches!(result, Err(LifeSosError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_and_execute_round_trip() {
        // A scripted peer standing in for the ethernet adapter
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"!vn?&");
            // Response arrives in two chunks with a stray leading newline
            stream.write_all(b"\n!vn1.0").await.unwrap();
            stream.write_all(b"0&\r\n").await.unwrap();
        });

        let config = BaseUnitConfig::builder()
            .host(addr.ip().to_string())
            .port(addr.port())
            .build();
        let session = ClientSession::new(&config);
        session.connect().await.unwrap();
        assert!(session.is_connected());

        let response = session
            .execute(Command::GetRomVersion, None, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(
            response,
            Response::RomVersion {
                version: "1.00".to_string()
            }
        );

        peer.await.unwrap();
        session.close().await;
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_command_timeout_leaves_session_connected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent_peer = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Never respond; hold the socket open long enough for the test
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let config = BaseUnitConfig::builder()
            .host(addr.ip().to_string())
            .port(addr.port())
            .build();
        let session = ClientSession::new(&config);
        session.connect().await.unwrap();

        let result = session
            .execute(Command::GetRomVersion, None, Some(Duration::from_millis(50)))
            .await;
        assert!(matches!(result, Err(LifeSosError::CommandTimeout { .. })));
        assert!(session.is_connected());

        session.close().await;
        silent_peer.abort();
    }
}
