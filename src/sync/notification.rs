//! Binary notification
//!
//! One word of state shared between a signaller and a waiter. Signals are
//! not queued: a signal that arrives while the word is already pending is
//! absorbed into it, so at most one notification is ever outstanding.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

use super::suspend::SuspendFlag;

/// Why a wait returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Signalled,
    /// The waiting thread was suspended by its kernel
    Suspended,
}

/// Cumulative counters of a notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationCounters {
    /// `signal()` calls
    pub signalled: u64,
    /// Notifications handed to a waiter
    pub consumed: u64,
    /// Signals that found the word already pending and were absorbed
    pub coalesced: u64,
}

impl NotificationCounters {
    /// Signals absorbed into an already pending word since `earlier`
    pub fn coalesced_since(&self, earlier: &NotificationCounters) -> u64 {
        self.coalesced - earlier.coalesced
    }

    /// Counter growth since `earlier`
    pub fn since(&self, earlier: &NotificationCounters) -> NotificationCounters {
        NotificationCounters {
            signalled: self.signalled - earlier.signalled,
            consumed: self.consumed - earlier.consumed,
            coalesced: self.coalesced - earlier.coalesced,
        }
    }
}

#[derive(Debug, Default)]
struct Word {
    pending: bool,
    counters: NotificationCounters,
}

impl Word {
    fn consume(&mut self) {
        self.pending = false;
        self.counters.consumed += 1;
    }
}

#[derive(Debug, Default)]
pub(crate) struct Inner {
    word: Mutex<Word>,
    cond: Condvar,
}

impl Inner {
    /// Wake every waiter so it re-checks its suspend flag
    pub(crate) fn kick(&self) {
        let _word = self.word.lock();
        self.cond.notify_all();
    }
}

/// Cloneable handle to one notification object
#[derive(Debug, Clone, Default)]
pub struct Notification {
    inner: Arc<Inner>,
}

impl Notification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark pending and wake a waiter. Never blocks on the waiter.
    pub fn signal(&self) {
        let mut word = self.inner.word.lock();
        word.counters.signalled += 1;
        if word.pending {
            word.counters.coalesced += 1;
        } else {
            word.pending = true;
            self.inner.cond.notify_one();
        }
    }

    /// Block until pending, then consume it
    pub fn wait(&self) {
        let mut word = self.inner.word.lock();
        while !word.pending {
            self.inner.cond.wait(&mut word);
        }
        word.consume();
    }

    /// Like [`wait`](Self::wait), but also returns once `suspend` is raised.
    ///
    /// A suspended thread does not consume: a raised flag wins over a
    /// pending word.
    pub fn wait_or_suspend(&self, suspend: &SuspendFlag) -> Wake {
        let _parked = suspend.park_on(&self.inner);
        let mut word = self.inner.word.lock();
        loop {
            if suspend.is_raised() {
                return Wake::Suspended;
            }
            if word.pending {
                word.consume();
                return Wake::Signalled;
            }
            self.inner.cond.wait(&mut word);
        }
    }

    /// Consume a pending notification without blocking
    pub fn poll(&self) -> bool {
        let mut word = self.inner.word.lock();
        if word.pending {
            word.consume();
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.word.lock().pending
    }

    pub fn counters(&self) -> NotificationCounters {
        self.inner.word.lock().counters
    }
}
