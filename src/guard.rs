//! Live slot accounting that survives cancelled futures

use std::sync::atomic::{AtomicUsize, Ordering};

/// Give back one live slot, never going below zero
pub(crate) fn release_slot(live: &AtomicUsize) {
    let _ = live.fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| live.checked_sub(1));
}

/// One counted live slot, given back on drop unless cancelled
///
/// Held across every await between reserving a slot and settling the
/// connection that owns it, so a dropped future cannot leak capacity.
pub(crate) struct LiveSlot<'a> {
    live: &'a AtomicUsize,
    cancelled: bool,
}

impl<'a> LiveSlot<'a> {
    /// Guard a slot that is already included in `live`
    pub fn new(live: &'a AtomicUsize) -> Self {
        Self {
            live,
            cancelled: false,
        }
    }

    /// Keep the slot; its connection is now accounted elsewhere
    pub fn cancel(mut self) {
        self.cancelled = true;
    }
}

impl Drop for LiveSlot<'_> {
    fn drop(&mut self) {
        if !self.cancelled {
            release_slot(self.live);
        }
    }
}
