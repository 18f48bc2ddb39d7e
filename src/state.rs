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

//! Session state tracking.

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;

use crate::bluetooth::Address;

/// Connection state of the session.
///
/// The peer address exists exactly while connecting or connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting { peer: Address },
    Connected { peer: Address },
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting { .. } => "Connecting...",
            SessionState::Connected { .. } => "Connected",
        }
    }

    pub fn peer(&self) -> Option<Address> {
        match self {
            SessionState::Idle => None,
            SessionState::Connecting { peer } | SessionState::Connected { peer } => Some(*peer),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }
}

#[derive(Debug)]
struct Snapshot {
    state: SessionState,
    generation: u64,
}

/// Observable session state plus the generation counter.
///
/// The lock is never held across an await.
#[derive(Debug)]
pub(crate) struct SessionCell {
    inner: Mutex<Snapshot>,
    tx: watch::Sender<SessionState>,
}

impl SessionCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::Idle);
        Self {
            inner: Mutex::new(Snapshot {
                state: SessionState::Idle,
                generation: 0,
            }),
            tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn lock(&self) -> SessionGuard<'_> {
        SessionGuard {
            snapshot: self.inner.lock(),
            tx: &self.tx,
        }
    }
}

pub(crate) struct SessionGuard<'a> {
    snapshot: MutexGuard<'a, Snapshot>,
    tx: &'a watch::Sender<SessionState>,
}

impl SessionGuard<'_> {
    pub fn state(&self) -> SessionState {
        self.snapshot.state
    }

    pub fn generation(&self) -> u64 {
        self.snapshot.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.snapshot.generation == generation
    }

    /// Start a new generation in `state`. Work tagged with older
    /// generations becomes stale.
    pub fn supersede(&mut self, state: SessionState) -> u64 {
        self.snapshot.generation += 1;
        self.set(state);
        self.snapshot.generation
    }

    /// Transition within the current generation.
    pub fn set(&mut self, state: SessionState) {
        if self.snapshot.state != state {
            self.snapshot.state = state;
            self.tx.send_replace(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Address {
        "00:11:22:33:44:55".parse().unwrap()
    }

    #[test]
    fn test_peer_follows_state() {
        assert_eq!(SessionState::Idle.peer(), None);
        assert_eq!(SessionState::Connecting { peer: addr() }.peer(), Some(addr()));
        assert!(SessionState::Connected { peer: addr() }.is_connected());
        assert!(!SessionState::Connecting { peer: addr() }.is_connected());
    }

    #[test]
    fn test_supersede_bumps_generation() {
        let cell = SessionCell::new();
        let mut session = cell.lock();
        assert_eq!(session.generation(), 0);

        let gen = session.supersede(SessionState::Connecting { peer: addr() });
        assert_eq!(gen, 1);
        assert!(session.is_current(1));
        assert!(!session.is_current(0));

        session.set(SessionState::Connected { peer: addr() });
        assert_eq!(session.generation(), 1);
        drop(session);

        assert_eq!(cell.state(), SessionState::Connected { peer: addr() });
    }

    #[test]
    fn test_watchers_see_transitions() {
        let cell = SessionCell::new();
        let mut rx = cell.subscribe();
        assert_eq!(*rx.borrow_and_update(), SessionState::Idle);

        cell.lock().supersede(SessionState::Connecting { peer: addr() });
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionState::Connecting { peer: addr() });

        cell.lock().set(SessionState::Connecting { peer: addr() });
        assert!(!rx.has_changed().unwrap());
    }
}
