// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! Inbound connection role: accepts a connection from a LifeSOS ethernet
//! adapter configured in TCP-client mode.
//!
//! While multiple incoming connections are accepted over time, it is
//! assumed they come from a single adapter; a new connection replaces the
//! previous one.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::error::Result;
use crate::event::{event_channel, EventReceiver, EventSender};
use crate::response::Response;
use crate::session::{run_keepalive, run_reader, SessionCore};

/// Listens for a connection from the LifeSOS ethernet interface.
pub struct ServerSession {
    core: Arc<SessionCore>,
    listen_port: u16,
    remote: Arc<RwLock<Option<SocketAddr>>>,
    event_tx: EventSender,
    shutdown_tx: watch::Sender<bool>,
}

impl ServerSession {
    pub fn new(listen_port: u16, password: impl Into<String>) -> Self {
        let (event_tx, _) = event_channel(256);
        let core = Arc::new(SessionCore::new(
            password.into(),
            event_tx.clone(),
            Duration::from_secs(8),
            Duration::from_secs(30),
        ));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            core,
            listen_port,
            remote: Arc::new(RwLock::new(None)),
            event_tx,
            shutdown_tx,
        }
    }

    /// Port number we are listening on.
    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    /// Address of the currently connected adapter, if any.
    pub async fn remote_addr(&self) -> Option<SocketAddr> {
        *self.remote.read().await
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    /// Bind the listener and start accepting connections.
    pub async fn listen(&self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.listen_port)).await?;
        info!("Listening on port {}", self.listen_port);

        let core = self.core.clone();
        let remote = self.remote.clone();
        let shutdown_tx = self.shutdown_tx.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    accepted = listener.accept() => accepted,
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                };
                match accepted {
                    Ok((stream, addr)) => {
                        info!("Adapter connected from {}", addr);
                        // Replace any previous connection
                        core.detach().await;
                        *remote.write().await = Some(addr);
                        let (reader, writer) = stream.into_split();
                        core.attach(writer).await;
                        tokio::spawn(run_reader(core.clone(), reader));
                        tokio::spawn(run_keepalive(core.clone(), shutdown_tx.subscribe()));
                    }
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                    }
                }
            }
            debug!("Listener stopped");
        });
        Ok(())
    }

    /// Execute a command over the currently connected adapter.
    pub async fn execute(
        &self,
        command: Command,
        password: Option<&str>,
        response_timeout: Option<Duration>,
    ) -> Result<Response> {
        self.core.execute(command, password, response_timeout).await
    }

    /// Stop listening and drop any active connection.
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        self.core.detach().await;
        *self.remote.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SessionEvent;

    #[tokio::test]
    async fn test_accepts_adapter_and_receives_events() {
        use tokio::io::AsyncWriteExt;

        let server = ServerSession::new(0, "");
        // Bind on an ephemeral port directly for the test
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let core = server.core.clone();
        let shutdown_tx = server.shutdown_tx.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, writer) = stream.into_split();
            core.attach(writer).await;
            tokio::spawn(run_reader(core.clone(), reader));
            tokio::spawn(run_keepalive(core, shutdown_tx.subscribe()));
        });

        let mut events = server.subscribe();
        let mut adapter = tokio::net::TcpStream::connect(addr).await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::ConnectionMade
        ));

        adapter
            .write_all(b"MINPIC=0a4040123456001062\r\n")
            .await
            .unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::DeviceEvent(_)
        ));

        server.close().await;
    }
}
