//! Random event scheduler
//!
//! The random source is always passed in so tests can substitute a seeded
//! generator; production seeds from the OS.

use rand::Rng;

use crate::tuning::{EventDefinition, Tuning};

/// Timestamp of the next event: `now + uniform[min, max]` (inclusive)
pub fn schedule_next<R: Rng + ?Sized>(now: u64, tuning: &Tuning, rng: &mut R) -> u64 {
    let delay = rng.random_range(tuning.event_min_interval_ms..=tuning.event_max_interval_ms);
    now.saturating_add(delay)
}

/// Uniform pick over the event catalog. `None` only for an empty catalog.
pub fn pick_event<'a, R: Rng + ?Sized>(
    tuning: &'a Tuning,
    rng: &mut R,
) -> Option<&'a EventDefinition> {
    if tuning.events.is_empty() {
        return None;
    }
    let idx = rng.random_range(0..tuning.events.len());
    tuning.events.get(idx)
}
