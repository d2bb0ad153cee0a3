// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! The connection/session layer.
//!
//! [`SessionCore`] holds everything common to both connection roles: the
//! pending-command map, the writer half, the keep-alive bookkeeping and the
//! inbound dispatch. [`ClientSession`] obtains its transport by dialing the
//! ethernet adapter; [`ServerSession`] by accepting a connection from an
//! adapter configured in TCP-client mode. Everything past that point is
//! shared.

pub mod client;
pub mod server;

pub use client::ClientSession;
pub use server::ServerSession;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error};

use crate::command::Command;
use crate::error::{LifeSosError, Result};
use crate::event::{EventSender, SessionEvent};
use crate::protocol::{classify, FrameAssembler, Message};
use crate::response::Response;

/// Connection state; the session resides in exactly one state at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// One in-flight request awaiting its response.
struct PendingCommand {
    command: Command,
    response_tx: oneshot::Sender<Response>,
}

/// Shared state machine for both connection roles.
pub(crate) struct SessionCore {
    password: Mutex<String>,
    state_tx: watch::Sender<SessionState>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// In-flight commands keyed by command name. Only one wait per name is
    /// allowed; a second execute of the same name is rejected rather than
    /// silently orphaning the first waiter.
    pending: Mutex<HashMap<String, PendingCommand>>,
    last_activity: Mutex<Instant>,
    event_tx: EventSender,
    execute_timeout: Duration,
    keepalive_interval: Duration,
}

impl SessionCore {
    pub(crate) fn new(
        password: String,
        event_tx: EventSender,
        execute_timeout: Duration,
        keepalive_interval: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            password: Mutex::new(password),
            state_tx,
            writer: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            last_activity: Mutex::new(Instant::now()),
            event_tx,
            execute_timeout,
            keepalive_interval,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub(crate) fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    pub(crate) async fn set_password(&self, password: String) {
        *self.password.lock().await = password;
    }

    /// Take ownership of a freshly opened connection's writer half.
    pub(crate) async fn attach(&self, writer: OwnedWriteHalf) {
        *self.writer.lock().await = Some(writer);
        *self.last_activity.lock().await = Instant::now();
        self.set_state(SessionState::Connected);
        let _ = self.event_tx.send(SessionEvent::ConnectionMade);
    }

    /// Tear the connection down: fail every pending command with a
    /// connection-lost error, drop the writer and notify subscribers.
    /// Only the first caller does the work.
    pub(crate) async fn detach(&self) {
        let previous = self.state_tx.send_replace(SessionState::Disconnected);
        if previous == SessionState::Disconnected {
            return;
        }
        *self.writer.lock().await = None;
        // Dropping the response senders unblocks the waiters with a
        // connection-lost error
        self.pending.lock().await.clear();
        let _ = self.event_tx.send(SessionEvent::ConnectionLost);
    }

    /// Execute a command and return its response.
    ///
    /// Fails immediately when not connected; no wire traffic is attempted.
    /// Concurrent execution of two commands sharing a name is rejected,
    /// since responses correlate by command name only.
    pub(crate) async fn execute(
        &self,
        command: Command,
        password: Option<&str>,
        response_timeout: Option<Duration>,
    ) -> Result<Response> {
        if !self.is_connected() {
            return Err(LifeSosError::NotConnected);
        }

        let name = command.name();
        let (response_tx, response_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&name) {
                return Err(LifeSosError::CommandInFlight { command: name });
            }
            pending.insert(
                name.clone(),
                PendingCommand {
                    command: command.clone(),
                    response_tx,
                },
            );
        }

        if let Err(e) = self.send(&command, password).await {
            self.pending.lock().await.remove(&name);
            return Err(e);
        }

        let duration = response_timeout.unwrap_or(self.execute_timeout);
        match timeout(duration, response_rx).await {
            Ok(Ok(response)) => Ok(response),
            // Sender was dropped by detach
            Ok(Err(_)) => Err(LifeSosError::Disconnected),
            Err(_) => {
                self.pending.lock().await.remove(&name);
                debug!("Command timeout: {}", name);
                Err(LifeSosError::CommandTimeout { command: name })
            }
        }
    }

    /// Serialize and write a command without waiting for any response.
    pub(crate) async fn send(&self, command: &Command, password: Option<&str>) -> Result<()> {
        // When no password is given on this call, use the session password
        let password = match password {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => self.password.lock().await.clone(),
        };

        *self.last_activity.lock().await = Instant::now();

        let text = command.format(&password);
        {
            let mut writer = self.writer.lock().await;
            let writer = writer.as_mut().ok_or(LifeSosError::NotConnected)?;
            writer.write_all(text.as_bytes()).await.map_err(|e| {
                error!("Failed to write command: {}", e);
                LifeSosError::Io(e)
            })?;
        }

        // Log what was sent for diagnostics, but hide the password
        let masked = command.format(&"*".repeat(password.len()));
        debug!("DataSent: {}", masked);
        Ok(())
    }

    /// Dispatch one inbound line.
    ///
    /// A response fulfils the matching pending command when there is one;
    /// either way it is broadcast, attributed or not (responses without a
    /// pending entry happen when multiple clients share one adapter).
    /// Device events and ContactID messages are always broadcast. This
    /// never blocks on a waiter.
    pub(crate) async fn handle_line(&self, line: &str) {
        match classify(line) {
            Some(Message::Response(response)) => {
                let pending = {
                    let mut map = self.pending.lock().await;
                    map.remove(&response.command_name())
                };
                match pending {
                    Some(entry) => {
                        debug!("{:?} (response to {:?})", response, entry.command);
                        // The waiter may have timed out and gone away
                        let _ = entry.response_tx.send(response.clone());
                        let _ = self.event_tx.send(SessionEvent::Response {
                            response,
                            command: Some(entry.command),
                        });
                    }
                    None => {
                        debug!("{:?} (unsolicited)", response);
                        let _ = self.event_tx.send(SessionEvent::Response {
                            response,
                            command: None,
                        });
                    }
                }
            }
            Some(Message::DeviceEvent(event)) => {
                debug!("{}", event);
                let _ = self.event_tx.send(SessionEvent::DeviceEvent(event));
            }
            Some(Message::ContactId(contact_id)) => {
                debug!("{}", contact_id);
                let _ = self.event_tx.send(SessionEvent::ContactId(contact_id));
            }
            None => {}
        }
    }
}

/// Run the reader half until the connection ends, then detach.
pub(crate) async fn run_reader(core: Arc<SessionCore>, mut reader: OwnedReadHalf) {
    let mut assembler = FrameAssembler::new();
    let mut buf = vec![0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("Connection closed by peer");
                break;
            }
            Ok(n) => {
                *core.last_activity.lock().await = Instant::now();
                match assembler.push(&buf[..n]) {
                    Ok(lines) => {
                        for line in lines {
                            core.handle_line(&line).await;
                        }
                    }
                    Err(e) => error!("DataReceived: {}", e),
                }
            }
            Err(e) => {
                error!("Read error: {}", e);
                break;
            }
        }
    }
    core.detach().await;
}

/// Send a no-op when nothing has been sent or received for a while, to
/// ensure the connection is still functional. Ends when the connection
/// goes away or shutdown is signalled.
pub(crate) async fn run_keepalive(core: Arc<SessionCore>, mut shutdown: watch::Receiver<bool>) {
    let interval = core.keepalive_interval;
    loop {
        let idle = core.last_activity.lock().await.elapsed();
        let wait = interval
            .checked_sub(idle)
            .unwrap_or_default()
            .max(Duration::from_secs(1));
        tokio::select! {
            _ = sleep(wait) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
        if !core.is_connected() {
            break;
        }
        if core.last_activity.lock().await.elapsed() > interval {
            if let Err(e) = core.send(&Command::NoOp, None).await {
                debug!("Keep-alive probe failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_channel;

    fn test_core() -> (Arc<SessionCore>, crate::event::EventReceiver) {
        let (event_tx, event_rx) = event_channel(64);
        let core = Arc::new(SessionCore::new(
            String::new(),
            event_tx,
            Duration::from_secs(8),
            Duration::from_secs(30),
        ));
        (core, event_rx)
    }

    #[tokio::test]
    async fn test_execute_while_disconnected_fails_immediately() {
        let (core, _rx) = test_core();
        let result = core.execute(Command::GetExitDelay, None, None).await;
        assert!(matches!(result, Err(LifeSosError::NotConnected)));
        // Nothing was registered
        assert!(core.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_response_line_fulfils_pending_command() {
        let (core, mut rx) = test_core();
        // Register a pending command by hand; no transport needed to test
        // the dispatch path
        let (response_tx, response_rx) = oneshot::channel();
        core.pending.lock().await.insert(
            "vn".to_string(),
            PendingCommand {
                command: Command::GetRomVersion,
                response_tx,
            },
        );

        core.handle_line("!vn1.00&").await;

        let response = response_rx.await.unwrap();
        assert_eq!(
            response,
            Response::RomVersion {
                version: "1.00".to_string()
            }
        );
        let event = rx.recv().await.unwrap();
        let SessionEvent::Response { command, .. } = event else {
            panic!("wrong event");
        };
        assert_eq!(command, Some(Command::GetRomVersion));
    }

    #[tokio::test]
    async fn test_unmatched_response_is_broadcast_unattributed() {
        let (core, mut rx) = test_core();
        core.handle_line("!l00f&").await;
        let event = rx.recv().await.unwrap();
        let SessionEvent::Response { response, command } = event else {
            panic!("wrong event");
        };
        assert_eq!(command, None);
        assert_eq!(
            response,
            Response::ExitDelay {
                was_set: false,
                seconds: 15
            }
        );
    }

    #[tokio::test]
    async fn test_device_event_and_contact_id_are_broadcast() {
        let (core, mut rx) = test_core();
        core.handle_line("MINPIC=0a4040123456001062").await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::DeviceEvent(_)
        ));
        core.handle_line("(123418113101102b)").await;
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::ContactId(_)));
    }

    #[tokio::test]
    async fn test_corrupt_line_produces_no_event() {
        let (core, mut rx) = test_core();
        core.handle_line("(123418113101102c)").await;
        core.handle_line("!zz9999&").await;
        core.handle_line("garbage").await;
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_detach_fails_pending_waiters() {
        let (core, _rx) = test_core();
        core.set_state(SessionState::Connected);
        let (response_tx, response_rx) = oneshot::channel();
        core.pending.lock().await.insert(
            "vn".to_string(),
            PendingCommand {
                command: Command::GetRomVersion,
                response_tx,
            },
        );
        core.detach().await;
        assert!(response_rx.await.is_err());
        assert_eq!(core.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_same_command_name_rejected_while_in_flight() {
        let (core, _rx) = test_core();
        core.set_state(SessionState::Connected);
        let (response_tx, _response_rx) = oneshot::channel();
        core.pending.lock().await.insert(
            "l0".to_string(),
            PendingCommand {
                command: Command::GetExitDelay,
                response_tx,
            },
        );
        let result = core.execute(Command::GetExitDelay, None, None).await;
        assert!(matches!(
            result,
            Err(LifeSosError::CommandInFlight { .. })
        ));
    }
}
