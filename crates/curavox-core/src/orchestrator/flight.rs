//! Single-flight turn permit.
//!
//! At most one turn (transcript -> response -> synthesis) may be in
//! flight per session. The flag is acquired with a compare-exchange
//! before any turn-local mutation and released by [`TurnPermit`]'s Drop
//! impl, so every exit path -- normal completion, an early return on a
//! dead client, or a panic inside the turn -- clears it. A leaked flag
//! would permanently silence the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared in-flight flag for one session.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    flag: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the turn permit, or `None` if a turn is already in flight.
    pub fn try_acquire(&self) -> Option<TurnPermit> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TurnPermit {
                flag: Arc::clone(&self.flag),
            })
    }

    /// Whether a turn is currently in flight.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// RAII guard for the in-flight flag. Dropping it releases the flag.
#[derive(Debug)]
pub struct TurnPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
