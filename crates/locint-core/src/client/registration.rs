//! Registration lifecycle with the daemon.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    /// No registration attempted since the daemon was last seen going down.
    Unregistered,
    /// A hello was attempted and has not yet been sent successfully.
    Registering,
    Registered,
}

/// Registration state plus the bookkeeping for epochs and retries.
///
/// The epoch advances on every successful registration and is the session
/// stamped on every frame; daemon frames from any other session are
/// dropped. Each retry timer carries the generation it was armed in so stale
/// timers are ignored.
#[derive(Debug)]
pub(crate) struct Registration {
    state: RegistrationState,
    epoch: u64,
    generation: u64,
    retries_used: u32,
}

impl Registration {
    pub(crate) fn new() -> Self {
        Self {
            state: RegistrationState::Unregistered,
            epoch: 0,
            generation: 0,
            retries_used: 0,
        }
    }

    pub(crate) fn state(&self) -> RegistrationState {
        self.state
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The epoch a hello sent now would open.
    pub(crate) fn next_epoch(&self) -> u64 {
        self.epoch + 1
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.state == RegistrationState::Registered
    }

    /// Start a fresh registration attempt with a full retry budget.
    pub(crate) fn begin(&mut self) {
        self.state = RegistrationState::Registering;
        self.generation += 1;
        self.retries_used = 0;
    }

    /// The hello was sent. Returns the new epoch.
    pub(crate) fn registered(&mut self) -> u64 {
        self.state = RegistrationState::Registered;
        self.epoch += 1;
        self.generation += 1;
        self.retries_used = 0;
        self.epoch
    }

    pub(crate) fn down(&mut self) {
        self.state = RegistrationState::Unregistered;
        self.generation += 1;
        self.retries_used = 0;
    }

    /// Claim the next retry. Returns the timer generation and the zero-based
    /// attempt number, or `None` once `max_retries` is spent.
    pub(crate) fn next_retry(&mut self, max_retries: u32) -> Option<(u64, u32)> {
        if self.retries_used >= max_retries {
            return None;
        }
        let attempt = self.retries_used;
        self.retries_used += 1;
        Some((self.generation, attempt))
    }

    /// Whether a retry timer armed in `generation` should still fire.
    pub(crate) fn retry_is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.state == RegistrationState::Registering
    }
}
