//! Per-thread suspend flag
//!
//! Raised by a kernel to stop a worker. Raising wakes the notification the
//! worker is currently parked in, if any.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::notification::Inner;

#[derive(Debug, Default)]
struct FlagInner {
    raised: AtomicBool,
    parked_on: Mutex<Option<Arc<Inner>>>,
}

#[derive(Debug, Clone, Default)]
pub struct SuspendFlag {
    inner: Arc<FlagInner>,
}

impl SuspendFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        // The waiter registers before checking the flag, so either it sees
        // the flag or it is reachable here.
        let parked = self.inner.parked_on.lock().clone();
        if let Some(ntfn) = parked {
            ntfn.kick();
        }
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    pub(crate) fn park_on(&self, ntfn: &Arc<Inner>) -> Parked<'_> {
        *self.inner.parked_on.lock() = Some(Arc::clone(ntfn));
        Parked { flag: self }
    }
}

/// Registration of a waiter; cleared on drop
pub(crate) struct Parked<'a> {
    flag: &'a SuspendFlag,
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        *self.flag.inner.parked_on.lock() = None;
    }
}
