// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connection session manager.
//!
//! One worker task per session owns the link and handles connect, send and
//! release requests in queue order, so socket mutations never interleave.
//! Callers update the observable state synchronously and tag each request
//! with the session generation; the worker discards work whose generation
//! has been superseded by a later connect or disconnect.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bluetooth::{Address, DeviceDescriptor, DeviceDirectory, Link, LinkDriver};
use crate::completion::{Completion, Reply};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::permission::{Capability, PermissionGate};
use crate::state::{SessionCell, SessionState};

enum Request {
    Connect {
        generation: u64,
        address: Address,
        reply: Reply<()>,
    },
    Send {
        generation: u64,
        data: Vec<u8>,
        reply: Reply<()>,
    },
    /// Close the link if it belongs to an old generation.
    Release,
    /// Answer once everything queued before it is done.
    Flush(oneshot::Sender<()>),
}

/// Manages the single SPP session.
pub struct SessionManager {
    cell: Arc<SessionCell>,
    queue: mpsc::UnboundedSender<Request>,
    directory: Arc<dyn DeviceDirectory>,
    gate: Arc<dyn PermissionGate>,
    worker: JoinHandle<()>,
}

impl SessionManager {
    /// Create an idle session and spawn its worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: &SessionConfig,
        directory: Arc<dyn DeviceDirectory>,
        driver: Arc<dyn LinkDriver>,
        gate: Arc<dyn PermissionGate>,
    ) -> Self {
        let cell = Arc::new(SessionCell::new());
        let (queue, rx) = mpsc::unbounded_channel();

        let worker = Worker {
            cell: Arc::clone(&cell),
            directory: Arc::clone(&directory),
            driver,
            gate: Arc::clone(&gate),
            service: config.service_uuid,
            connect_timeout: config.connect_timeout(),
            send_timeout: config.send_timeout(),
            link: None,
        };
        let worker = tokio::spawn(worker.run(rx));

        Self {
            cell,
            queue,
            directory,
            gate,
            worker,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.cell.state()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.cell.subscribe()
    }

    /// List bonded devices. Callable in any state; no transition.
    pub async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, SessionError> {
        self.directory.radio_state().await.check()?;
        if !self.gate.has_capability(Capability::Connect) {
            warn!("Listing devices without connect permission");
            return Err(SessionError::PermissionDenied(Capability::Connect));
        }

        let devices = self.directory.bonded_devices().await?;
        debug!("Listed {} bonded devices", devices.len());
        Ok(devices)
    }

    /// Connect to `address`, replacing any existing session.
    ///
    /// The session is `Connecting` when this returns unless the address is
    /// malformed or the connect capability is missing, in which case the
    /// completion is already failed. A malformed address leaves the state
    /// untouched; a missing capability still drops any existing session.
    pub fn connect(&self, address: &str) -> Completion<()> {
        let address: Address = match address.parse() {
            Ok(address) => address,
            Err(e) => return Completion::failed(e),
        };
        if !self.gate.has_capability(Capability::Connect) {
            warn!("Connect to {} refused: permission not granted", address);
            // The previous session is dropped even though the new one never starts.
            self.disconnect();
            return Completion::failed(SessionError::PermissionDenied(Capability::Connect));
        }

        let (reply, completion) = Completion::channel();
        let mut session = self.cell.lock();
        if let Some(peer) = session.state().peer() {
            info!("Superseding session with {}", peer);
        }
        let generation = session.supersede(SessionState::Connecting { peer: address });
        info!("Connecting to {} (generation {})", address, generation);

        let request = Request::Connect {
            generation,
            address,
            reply,
        };
        if self.queue.send(request).is_err() {
            error!("Session worker is gone, connect to {} dropped", address);
            session.set(SessionState::Idle);
        }
        completion
    }

    /// Drop the session. Always leaves the state `Idle`; close errors are
    /// absorbed.
    pub fn disconnect(&self) {
        let mut session = self.cell.lock();
        let Some(peer) = session.state().peer() else {
            debug!("Disconnect while idle");
            return;
        };

        session.supersede(SessionState::Idle);
        info!("Disconnected from {}", peer);
        let _ = self.queue.send(Request::Release);
    }

    /// Write `data` to the connected peer.
    ///
    /// Fails immediately with `NotConnected` unless the state is
    /// `Connected`. Never changes the state.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> Completion<()> {
        let data = data.into();
        let session = self.cell.lock();
        let SessionState::Connected { peer } = session.state() else {
            debug!("Send rejected in state {}", session.state().as_str());
            return Completion::failed(SessionError::NotConnected);
        };
        if data.is_empty() {
            return Completion::failed(SessionError::InvalidArgument(
                "payload is empty".to_string(),
            ));
        }

        debug!("Queueing {} bytes for {}", data.len(), peer);
        let (reply, completion) = Completion::channel();
        let _ = self.queue.send(Request::Send {
            generation: session.generation(),
            data,
            reply,
        });
        completion
    }

    /// Wait until every request queued so far has been processed, including
    /// closing a released link.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.queue.send(Request::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Disconnect and stop the worker once the link is closed.
    pub async fn shutdown(self) {
        self.disconnect();
        let SessionManager { queue, worker, .. } = self;
        drop(queue);
        if let Err(e) = worker.await {
            error!("Session worker failed: {}", e);
        }
    }
}

struct HeldLink {
    generation: u64,
    peer: Address,
    link: Box<dyn Link>,
}

struct Worker {
    cell: Arc<SessionCell>,
    directory: Arc<dyn DeviceDirectory>,
    driver: Arc<dyn LinkDriver>,
    gate: Arc<dyn PermissionGate>,
    service: Uuid,
    connect_timeout: Duration,
    send_timeout: Duration,
    link: Option<HeldLink>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Request>) {
        debug!("Session worker started");

        while let Some(request) = rx.recv().await {
            self.reap().await;

            match request {
                Request::Connect {
                    generation,
                    address,
                    reply,
                } => {
                    let result = self.connect(generation, address).await;
                    let _ = reply.send(result);
                }
                Request::Send {
                    generation,
                    data,
                    reply,
                } => {
                    let result = self.send(generation, &data).await;
                    let _ = reply.send(result);
                }
                Request::Release => {}
                Request::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }

        self.release().await;
        debug!("Session worker stopped");
    }

    /// Close the held link if the session has moved past it.
    async fn reap(&mut self) {
        let current = self.cell.lock().generation();
        if self
            .link
            .as_ref()
            .is_some_and(|held| held.generation != current)
        {
            self.release().await;
        }
    }

    async fn release(&mut self) {
        if let Some(mut held) = self.link.take() {
            info!("Closing link to {}", held.peer);
            held.link.close().await;
        }
    }

    async fn connect(&mut self, generation: u64, address: Address) -> Result<(), SessionError> {
        if !self.cell.lock().is_current(generation) {
            debug!("Skipping superseded connect to {}", address);
            return Err(superseded());
        }

        let outcome = self.open(address).await;

        let accepted = {
            let mut session = self.cell.lock();
            if session.is_current(generation) {
                match &outcome {
                    Ok(_) => session.set(SessionState::Connected { peer: address }),
                    Err(_) => session.set(SessionState::Idle),
                }
                true
            } else {
                false
            }
        };

        if !accepted {
            warn!("Connect to {} finished after being superseded", address);
            if let Ok(mut link) = outcome {
                link.close().await;
            }
            return Err(superseded());
        }

        match outcome {
            Ok(link) => {
                info!("Connected to {}", address);
                self.link = Some(HeldLink {
                    generation,
                    peer: address,
                    link,
                });
                Ok(())
            }
            Err(e) => {
                warn!("Connect to {} failed: {}", address, e);
                Err(e)
            }
        }
    }

    async fn open(&mut self, address: Address) -> Result<Box<dyn Link>, SessionError> {
        self.directory.radio_state().await.check()?;
        if !self.gate.has_capability(Capability::Connect) {
            return Err(SessionError::PermissionDenied(Capability::Connect));
        }

        match timeout(self.connect_timeout, self.driver.open(address, self.service)).await {
            Ok(Ok(link)) => Ok(link),
            Ok(Err(e)) => Err(SessionError::Connection(e.to_string())),
            Err(_) => Err(SessionError::Timeout {
                operation: "connect",
                after: self.connect_timeout,
            }),
        }
    }

    async fn send(&mut self, generation: u64, data: &[u8]) -> Result<(), SessionError> {
        let Some(held) = self
            .link
            .as_mut()
            .filter(|held| held.generation == generation)
        else {
            debug!("Dropping send for superseded session");
            return Err(SessionError::NotConnected);
        };

        match timeout(self.send_timeout, held.link.write(data)).await {
            Ok(Ok(())) => {
                debug!("Sent {} bytes to {}", data.len(), held.peer);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Send to {} failed: {}", held.peer, e);
                Err(SessionError::Send(e.to_string()))
            }
            Err(_) => {
                warn!("Send to {} timed out", held.peer);
                Err(SessionError::Timeout {
                    operation: "send",
                    after: self.send_timeout,
                })
            }
        }
    }
}

fn superseded() -> SessionError {
    SessionError::Connection("connection attempt superseded".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::memory::{LinkEvent, MemoryDirectory, MemoryLinkDriver};
    use crate::bluetooth::RadioState;
    use crate::permission::CapabilitySet;
    use futures::FutureExt;

    const PEER_A: &str = "00:11:22:33:44:55";
    const PEER_B: &str = "AA:BB:CC:DD:EE:FF";

    struct Harness {
        session: SessionManager,
        driver: MemoryLinkDriver,
        directory: Arc<MemoryDirectory>,
        caps: Arc<CapabilitySet>,
    }

    fn harness(config: SessionConfig) -> Harness {
        let driver = MemoryLinkDriver::new();
        let directory = Arc::new(MemoryDirectory::new(vec![DeviceDescriptor::new(
            "altimeter", PEER_A,
        )]));
        let caps = Arc::new(CapabilitySet::granted());
        let session = SessionManager::new(
            &config,
            directory.clone(),
            Arc::new(driver.clone()),
            caps.clone(),
        );
        Harness {
            session,
            driver,
            directory,
            caps,
        }
    }

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_connect_is_connecting_before_completion() {
        let h = harness(SessionConfig::default());
        h.driver.delay_opens(Duration::from_millis(20));

        let pending = h.session.connect(PEER_A);
        assert_eq!(
            h.session.state(),
            SessionState::Connecting {
                peer: addr(PEER_A)
            }
        );

        pending.await.unwrap();
        assert_eq!(
            h.session.state(),
            SessionState::Connected {
                peer: addr(PEER_A)
            }
        );
        assert_eq!(h.driver.live(), 1);
    }

    #[tokio::test]
    async fn test_send_while_connecting_is_not_connected() {
        let h = harness(SessionConfig::default());
        h.driver.stall_opens(true);

        let _pending = h.session.connect(PEER_A);
        let result = h.session.send("X").now_or_never();
        assert_eq!(result, Some(Err(SessionError::NotConnected)));
        assert!(h.driver.written().is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_idle() {
        let h = harness(SessionConfig::default());
        h.driver.refuse(addr(PEER_A));

        let err = h.session.connect(PEER_A).await.unwrap_err();
        assert_eq!(err.code(), "CONNECTION_ERROR");
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.driver.live(), 0);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let h = harness(SessionConfig {
            connect_timeout_ms: 30,
            ..SessionConfig::default()
        });
        h.driver.stall_opens(true);

        let err = h.session.connect(PEER_A).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Timeout {
                operation: "connect",
                ..
            }
        ));
        assert_eq!(h.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_permission_revoked_before_open() {
        let h = harness(SessionConfig::default());

        let pending = h.session.connect(PEER_A);
        h.caps.revoke(Capability::Connect);

        assert_eq!(
            pending.await,
            Err(SessionError::PermissionDenied(Capability::Connect))
        );
        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(h.driver.events().is_empty());
    }

    #[tokio::test]
    async fn test_superseded_connect_never_opens() {
        let h = harness(SessionConfig::default());

        let first = h.session.connect(PEER_A);
        let second = h.session.connect(PEER_B);

        assert_eq!(first.await, Err(superseded()));
        second.await.unwrap();
        assert_eq!(h.driver.events(), vec![LinkEvent::Opened(addr(PEER_B))]);
    }

    #[tokio::test]
    async fn test_radio_off_fails_connect() {
        let h = harness(SessionConfig::default());
        h.directory.set_radio_state(RadioState::Disabled);

        assert_eq!(
            h.session.connect(PEER_A).await,
            Err(SessionError::RadioDisabled)
        );
        assert_eq!(h.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_disconnect_during_connect_discards_link() {
        let h = harness(SessionConfig::default());
        h.driver.delay_opens(Duration::from_millis(30));

        let pending = h.session.connect(PEER_A);
        // Let the worker start opening.
        tokio::time::sleep(Duration::from_millis(5)).await;
        h.session.disconnect();
        assert_eq!(h.session.state(), SessionState::Idle);

        let err = pending.await.unwrap_err();
        assert_eq!(err, superseded());
        h.session.flush().await;

        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.driver.live(), 0);
        assert_eq!(
            h.driver.events(),
            vec![
                LinkEvent::Opened(addr(PEER_A)),
                LinkEvent::Closed(addr(PEER_A))
            ]
        );
    }

    #[tokio::test]
    async fn test_send_failure_keeps_connection() {
        let h = harness(SessionConfig::default());
        h.session.connect(PEER_A).await.unwrap();
        h.driver.fail_writes(true);

        let err = h.session.send("PING").await.unwrap_err();
        assert_eq!(err.code(), "SEND_ERROR");
        assert!(h.session.state().is_connected());

        h.driver.fail_writes(false);
        h.session.send("PING").await.unwrap();
        assert_eq!(h.driver.written(), vec![b"PING".to_vec()]);
    }

    #[tokio::test]
    async fn test_send_timeout_keeps_connection() {
        let h = harness(SessionConfig {
            send_timeout_ms: 30,
            ..SessionConfig::default()
        });
        h.session.connect(PEER_A).await.unwrap();
        h.driver.stall_writes(true);

        let err = h.session.send("PING").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Timeout {
                operation: "send",
                ..
            }
        ));
        assert!(h.session.state().is_connected());
        assert_eq!(h.driver.live(), 1);

        h.session.disconnect();
        h.session.flush().await;
        assert_eq!(h.driver.live(), 0);
        assert!(h.driver.written().is_empty());
    }

    #[tokio::test]
    async fn test_send_queued_before_disconnect_is_dropped() {
        let h = harness(SessionConfig::default());
        h.session.connect(PEER_A).await.unwrap();

        let pending = h.session.send("late");
        h.session.disconnect();

        assert_eq!(pending.await, Err(SessionError::NotConnected));
        assert!(h.driver.written().is_empty());
    }

    #[tokio::test]
    async fn test_empty_payload_rejected() {
        let h = harness(SessionConfig::default());
        h.session.connect(PEER_A).await.unwrap();

        let err = h.session.send(Vec::new()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_shutdown_releases_link() {
        let h = harness(SessionConfig::default());
        h.session.connect(PEER_A).await.unwrap();
        assert_eq!(h.driver.live(), 1);

        h.session.shutdown().await;
        assert_eq!(h.driver.live(), 0);
    }

    #[tokio::test]
    async fn test_uses_configured_service() {
        let service = Uuid::from_u128(0x1234);
        let h = harness(SessionConfig {
            service_uuid: service,
            ..SessionConfig::default()
        });
        h.session.connect(PEER_A).await.unwrap();
        assert_eq!(h.driver.last_service(), Some(service));
    }
}
