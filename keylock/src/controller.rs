//! Lock states and the single-slot transition handshake between the activities.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LockState {
    /// Waiting for the code to be typed.
    Active = 0,
    /// A wrong code was typed; alarm, then back to [LockState::Active].
    WrongPassword = 1,
    /// The right code was typed; hold open, then back to [LockState::Active].
    Defused = 2,
}

impl LockState {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(LockState::Active),
            1 => Some(LockState::WrongPassword),
            2 => Some(LockState::Defused),
            _ => None,
        }
    }

    /// The text published on the state characteristic.
    pub fn status_text(self, candidate: &str) -> String {
        match self {
            LockState::Active => format!("ACTIVE : '{}'", candidate),
            LockState::WrongPassword => "WRONG_PASSWORD".to_string(),
            LockState::Defused => "DEFUSED".to_string(),
        }
    }
}

impl Display for LockState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            LockState::Active => "ACTIVE",
            LockState::WrongPassword => "WRONG_PASSWORD",
            LockState::Defused => "DEFUSED",
        };
        write!(f, "{}", str)
    }
}

/// Outcome of [TransitionCell::request].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransitionRequest {
    Accepted,
    /// The same state was already pending; nothing changed.
    AlreadyPending,
    /// Another state is pending; the request was dropped.
    Refused { pending: LockState },
}

const NOTHING_PENDING: u8 = u8::MAX;

/// The current state plus at most one pending transition.
///
/// Anyone may request a transition; only the executor applies it, through [TransitionCell::begin]
/// and [TransitionCell::finish]. The new state is published before the pending slot is cleared,
/// so a reader never sees the old state with nothing pending once a transition was accepted.
#[derive(Debug)]
pub struct TransitionCell {
    state: AtomicU8,
    pending: AtomicU8,
}

impl TransitionCell {
    /// Starts in [LockState::Active] with a transition into it pending, so its entry actions run
    /// at boot.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LockState::Active as u8),
            pending: AtomicU8::new(LockState::Active as u8),
        }
    }

    pub fn state(&self) -> LockState {
        LockState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(LockState::Active)
    }

    pub fn pending(&self) -> Option<LockState> {
        LockState::from_u8(self.pending.load(Ordering::Acquire))
    }

    /// Asks the executor to move to `target`.
    pub fn request(&self, target: LockState) -> TransitionRequest {
        match self.pending.compare_exchange(
            NOTHING_PENDING,
            target as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => TransitionRequest::Accepted,
            Err(current) => match LockState::from_u8(current) {
                Some(pending) if pending == target => TransitionRequest::AlreadyPending,
                Some(pending) => TransitionRequest::Refused { pending },
                // The slot only ever holds a state or the sentinel.
                None => TransitionRequest::Refused { pending: target },
            },
        }
    }

    /// Publishes the pending state as the current one and returns it.
    ///
    /// The pending slot stays occupied until [TransitionCell::finish].
    pub fn begin(&self) -> Option<LockState> {
        let pending = self.pending()?;
        self.state.store(pending as u8, Ordering::Release);
        Some(pending)
    }

    /// Frees the pending slot after `state`'s entry actions ran.
    pub fn finish(&self, state: LockState) {
        let _ = self.pending.compare_exchange(
            state as u8,
            NOTHING_PENDING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl Default for TransitionCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_runs_active_entry() {
        let cell = TransitionCell::new();
        assert_eq!(cell.state(), LockState::Active);
        assert_eq!(cell.pending(), Some(LockState::Active));
        assert_eq!(cell.begin(), Some(LockState::Active));
        cell.finish(LockState::Active);
        assert_eq!(cell.pending(), None);
        assert_eq!(cell.begin(), None);
    }

    #[test]
    fn requests_are_idempotent_and_exclusive() {
        let cell = TransitionCell::new();
        cell.begin();
        cell.finish(LockState::Active);

        assert_eq!(cell.request(LockState::WrongPassword), TransitionRequest::Accepted);
        assert_eq!(cell.request(LockState::WrongPassword), TransitionRequest::AlreadyPending);
        assert_eq!(
            cell.request(LockState::Defused),
            TransitionRequest::Refused { pending: LockState::WrongPassword }
        );
        assert_eq!(cell.state(), LockState::Active);
    }

    #[test]
    fn state_is_published_before_pending_clears() {
        let cell = TransitionCell::new();
        cell.begin();
        cell.finish(LockState::Active);
        cell.request(LockState::Defused);

        assert_eq!(cell.begin(), Some(LockState::Defused));
        assert_eq!(cell.state(), LockState::Defused);
        assert_eq!(cell.pending(), Some(LockState::Defused));
        cell.finish(LockState::Defused);
        assert_eq!(cell.pending(), None);

        assert_eq!(cell.request(LockState::Active), TransitionRequest::Accepted);
    }

    #[test]
    fn status_texts() {
        assert_eq!(LockState::Active.status_text("12"), "ACTIVE : '12'");
        assert_eq!(LockState::Active.status_text(""), "ACTIVE : ''");
        assert_eq!(LockState::WrongPassword.status_text("12"), "WRONG_PASSWORD");
        assert_eq!(LockState::Defused.to_string(), "DEFUSED");
    }
}
