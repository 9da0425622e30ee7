//! Single-slot admission control for image generation.
//!
//! The gate owns one slot: at most one caller holds it at a time, and a new
//! caller is only admitted once `min_interval` has passed since the previous
//! admission. Admission hands out a [`SlotPermit`]; the slot is released when
//! the permit is dropped, so every exit path of the holder frees it.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// Default minimum time between two admitted requests.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(5000);

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    /// Another request holds the slot.
    Busy,
    /// The previous admission was too recent.
    CoolingDown { retry_after: Duration },
}

#[derive(Debug, Default)]
struct SlotState {
    busy: bool,
    last_admitted_at: Option<Instant>,
}

/// Admission gate guarding one expensive outbound call.
#[derive(Debug)]
pub struct RequestGate {
    min_interval: Duration,
    slot: Mutex<SlotState>,
}

impl RequestGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            slot: Mutex::new(SlotState::default()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Try to take the slot.
    pub fn try_admit(&self) -> Result<SlotPermit<'_>, Denied> {
        self.try_admit_with(|| Ok::<(), Denied>(()))
    }

    /// Try to take the slot, running `precheck` after the busy and cooldown
    /// checks but before any state changes. A failing precheck leaves the
    /// slot untouched.
    pub fn try_admit_with<E, F>(&self, precheck: F) -> Result<SlotPermit<'_>, E>
    where
        E: From<Denied>,
        F: FnOnce() -> Result<(), E>,
    {
        let mut slot = self.lock();

        if slot.busy {
            return Err(Denied::Busy.into());
        }

        let now = Instant::now();
        if let Some(last) = slot.last_admitted_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Err(Denied::CoolingDown {
                    retry_after: self.min_interval - elapsed,
                }
                .into());
            }
        }

        precheck()?;

        slot.busy = true;
        slot.last_admitted_at = Some(now);
        Ok(SlotPermit { gate: self })
    }

    /// Give the slot back. Equivalent to dropping the permit.
    pub fn release(&self, permit: SlotPermit<'_>) {
        debug_assert!(std::ptr::eq(permit.gate, self));
        drop(permit);
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    /// When the most recent request was admitted, if ever.
    pub fn last_admitted_at(&self) -> Option<Instant> {
        self.lock().last_admitted_at
    }

    // The critical sections never panic, but a poisoned lock still holds a
    // consistent slot.
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RequestGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

/// Proof of admission. Dropping it frees the slot; the cooldown set at
/// admission stays in effect.
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct SlotPermit<'a> {
    gate: &'a RequestGate,
}

impl Drop for SlotPermit<'_> {
    fn drop(&mut self) {
        self.gate.lock().busy = false;
    }
}
