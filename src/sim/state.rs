//! Run state and core simulation types
//!
//! All state that must be persisted to resume a run lives here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tuning::{BoostDefinition, EventDefinition};

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunPhase {
    /// No run started yet
    #[default]
    Idle,
    /// Clock is ticking, input accepted
    Running,
    /// Deadline passed; frozen until a new run starts
    Finished,
}

/// Generator id -> owned count
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnedGenerators(BTreeMap<String, u32>);

impl OwnedGenerators {
    pub fn count(&self, id: &str) -> u32 {
        self.0.get(id).copied().unwrap_or(0)
    }

    pub fn set(&mut self, id: &str, count: u32) {
        self.0.insert(id.to_string(), count);
    }

    /// Add one unit, returning the new count
    pub fn increment(&mut self, id: &str) -> u32 {
        let count = self.0.entry(id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Lower every count above `cap` to `cap`. Returns how many were lowered.
    pub fn clamp_to(&mut self, cap: u32) -> usize {
        let mut lowered = 0;
        for count in self.0.values_mut().filter(|n| **n > cap) {
            *count = cap;
            lowered += 1;
        }
        lowered
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(id, n)| (id.as_str(), *n))
    }
}

/// A boost in flight. Effect values are captured at activation so later
/// catalog edits cannot change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBoost {
    pub boost_id: String,
    pub expires_at: u64,
    pub tap_multiplier: f64,
    pub auto_rate_bonus: f64,
}

impl ActiveBoost {
    pub fn from_definition(def: &BoostDefinition, now: u64) -> Self {
        Self {
            boost_id: def.id.clone(),
            expires_at: now.saturating_add(def.duration_ms),
            tap_multiplier: def.tap_multiplier,
            auto_rate_bonus: def.auto_rate_bonus,
        }
    }

    #[inline]
    pub fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// An event in flight, denormalized for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEvent {
    pub event_id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub beneficial: bool,
    pub expires_at: u64,
    pub rate_multiplier: f64,
    pub all_gains_multiplier: f64,
}

impl ActiveEvent {
    pub fn from_definition(def: &EventDefinition, now: u64) -> Self {
        Self {
            event_id: def.id.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            icon: def.icon.clone(),
            beneficial: def.beneficial,
            expires_at: now.saturating_add(def.duration_ms),
            rate_multiplier: def.rate_multiplier,
            all_gains_multiplier: def.all_gains_multiplier,
        }
    }

    #[inline]
    pub fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// Derived rates recomputed every tick for observers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRates {
    /// Auto-taps per second from generators
    pub auto_rate: f64,
    /// Tap multiplier from generators
    pub tap_multiplier: f64,
    /// Currency per second from every passive source
    pub gain_per_second: f64,
}

impl Default for DisplayRates {
    fn default() -> Self {
        Self {
            auto_rate: 0.0,
            tap_multiplier: 1.0,
            gain_per_second: 0.0,
        }
    }
}

/// Complete run state (serializable)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    /// Spendable currency
    pub currency: f64,
    /// Highest currency ever held this run; this is the score
    pub peak: f64,
    pub owned: OwnedGenerators,
    pub boosts: Vec<ActiveBoost>,
    pub events: Vec<ActiveEvent>,
    pub next_event_at: u64,
    pub phase: RunPhase,
    /// Run ends when a tick reaches this timestamp
    pub deadline: u64,
    pub last_processed: u64,
    pub player_name: String,
    /// One-shot guard for the end-of-run score report
    pub score_reported: bool,
    /// Not persisted; rebuilt on the next tick
    #[serde(skip)]
    pub rates: DisplayRates,
}

/// Persisted form of a run
pub type RunSnapshot = RunState;

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wipe everything for a fresh run starting at `now`
    pub fn reset(&mut self, player_name: &str, now: u64, deadline: u64, next_event_at: u64) {
        *self = Self {
            phase: RunPhase::Running,
            deadline,
            last_processed: now,
            next_event_at,
            player_name: player_name.to_string(),
            ..Self::default()
        };
    }

    /// Add currency, dragging the peak along
    pub fn credit(&mut self, amount: f64) {
        self.currency += amount;
        if self.currency > self.peak {
            self.peak = self.currency;
        }
    }

    /// Remove currency. Callers check affordability first.
    pub fn debit(&mut self, amount: f64) {
        self.currency -= amount;
    }

    pub fn is_running(&self) -> bool {
        self.phase == RunPhase::Running
    }

    pub fn boost_active(&self, boost_id: &str, now: u64) -> bool {
        self.boosts
            .iter()
            .any(|b| b.boost_id == boost_id && b.is_live(now))
    }

    /// Drop boosts and events whose expiry has passed
    pub fn sweep_expired(&mut self, now: u64) {
        self.boosts.retain(|b| b.is_live(now));
        self.events.retain(|e| e.is_live(now));
    }

    /// Final score: floor of the peak
    pub fn score(&self) -> u64 {
        self.peak.max(0.0).floor() as u64
    }

    /// Product of tap multipliers over live boosts
    pub fn boost_tap_multiplier(&self, now: u64) -> f64 {
        self.boosts
            .iter()
            .filter(|b| b.is_live(now))
            .map(|b| b.tap_multiplier)
            .product()
    }

    /// Sum of auto-rate bonuses over live boosts
    pub fn boost_auto_rate(&self, now: u64) -> f64 {
        self.boosts
            .iter()
            .filter(|b| b.is_live(now))
            .map(|b| b.auto_rate_bonus)
            .sum()
    }

    /// Product of auto-rate multipliers over live events
    pub fn event_rate_multiplier(&self, now: u64) -> f64 {
        self.events
            .iter()
            .filter(|e| e.is_live(now))
            .map(|e| e.rate_multiplier)
            .product()
    }

    /// Product of all-gains multipliers over live events
    pub fn event_all_multiplier(&self, now: u64) -> f64 {
        self.events
            .iter()
            .filter(|e| e.is_live(now))
            .map(|e| e.all_gains_multiplier)
            .product()
    }
}
