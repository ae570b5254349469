//! Relay actuation boundary
//!
//! The control loops decide *which* relays to throw; driving the
//! hardware is behind [`RelayControl`] so the rest of the crate tests
//! without a switch box attached. [`LoopbackRelays`] is the in-memory
//! implementation used by tests and by the console binary when run
//! without hardware.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use crate::wiring::RelayActions;

/// A relay state transition, for observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEvent {
    /// Relay at this index was energized
    Opened(usize),
    /// Relay at this index was released
    Closed(usize),
}

/// Driver for a bank of relays
///
/// Implementations must be idempotent: actuating a position the bank
/// is already in is a no-op.
pub trait RelayControl: Send + Sync {
    /// Apply one position's actions, close first then open; returns
    /// whether the bank accepted the whole actuation
    fn actuate(&self, actions: &RelayActions) -> bool;

    /// Indexes of currently energized relays, lowest first
    fn open_relays(&self) -> Vec<usize>;
}

/// In-memory relay bank
pub struct LoopbackRelays {
    state: Mutex<Vec<bool>>,
    observer: Option<mpsc::UnboundedSender<RelayEvent>>,
}

impl LoopbackRelays {
    /// A bank of `count` relays, all released
    pub fn new(count: usize) -> Self {
        Self {
            state: Mutex::new(vec![false; count]),
            observer: None,
        }
    }

    /// A bank that reports every transition on `observer`
    pub fn with_observer(count: usize, observer: mpsc::UnboundedSender<RelayEvent>) -> Self {
        Self {
            state: Mutex::new(vec![false; count]),
            observer: Some(observer),
        }
    }

    fn set(&self, state: &mut [bool], index: usize, open: bool) {
        if index >= state.len() || state[index] == open {
            return;
        }
        state[index] = open;
        debug!(relay = index, open, "relay transition");
        if let Some(observer) = &self.observer {
            let event = if open {
                RelayEvent::Opened(index)
            } else {
                RelayEvent::Closed(index)
            };
            let _ = observer.send(event);
        }
    }
}

impl RelayControl for LoopbackRelays {
    fn actuate(&self, actions: &RelayActions) -> bool {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let in_range = |index: &usize| *index < state.len();
        let accepted = actions.close.iter().all(in_range) && actions.open.iter().all(in_range);
        // Break before make: release the position we are leaving
        // before energizing the one we are entering.
        for &index in &actions.close {
            self.set(&mut state, index, false);
        }
        for &index in &actions.open {
            self.set(&mut state, index, true);
        }
        accepted
    }

    fn open_relays(&self) -> Vec<usize> {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state
            .iter()
            .enumerate()
            .filter_map(|(index, open)| open.then_some(index))
            .collect()
    }
}
