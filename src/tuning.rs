//! Data-driven game balance
//!
//! Every number the simulation uses lives here: generator, boost and event
//! definitions plus the run-level constants. The standard catalog is built
//! in; a JSON override can be loaded for playtesting.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::*;

/// What a generator contributes per unit owned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorKind {
    /// Adds automatic taps per second (passive income)
    AutoGenerator,
    /// Adds to the tap multiplier (rewards active tapping)
    TapBooster,
}

/// A purchasable generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorDefinition {
    pub id: String,
    pub name: String,
    pub kind: GeneratorKind,
    /// Auto-taps/s (AutoGenerator) or additive multiplier (TapBooster) per unit
    pub per_unit: f64,
    pub base_cost: u64,
    /// One line per purchase, shown as the generator levels up
    #[serde(default)]
    pub flavor_texts: Vec<String>,
}

impl GeneratorDefinition {
    /// Flavor text for the current owned count.
    ///
    /// Nothing owned shows the first line; past the end of the list the last
    /// line sticks.
    pub fn flavor_text(&self, owned: u32) -> &str {
        if self.flavor_texts.is_empty() {
            return "";
        }
        if owned == 0 {
            return &self.flavor_texts[0];
        }
        let idx = (owned as usize).min(self.flavor_texts.len()) - 1;
        &self.flavor_texts[idx]
    }
}

/// A temporary, purchasable boost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub duration_ms: u64,
    /// Multiplier applied to tap gains (1 = no effect)
    pub tap_multiplier: f64,
    /// Extra auto-taps per second while active (0 = none)
    pub auto_rate_bonus: f64,
    pub cost: u64,
}

/// A random in-run event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub duration_ms: u64,
    /// Multiplier on auto-generated income only
    pub rate_multiplier: f64,
    /// Multiplier on every gain, taps included
    pub all_gains_multiplier: f64,
    /// Display-only polarity
    pub beneficial: bool,
}

#[derive(Debug, Error)]
pub enum TuningError {
    #[error("failed to read tuning file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse tuning file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("cost scale must be greater than 1 (got {0})")]
    CostScale(f64),
    #[error("event interval is inverted ({min} > {max})")]
    EventInterval { min: u64, max: u64 },
    #[error("event catalog is empty")]
    NoEvents,
    #[error("duplicate id in catalog: {0}")]
    DuplicateId(String),
    #[error("{field} must be a finite, non-negative number (got {value})")]
    BadValue { field: String, value: f64 },
    #[error("max owned must be at least 1")]
    MaxOwned,
}

/// Effect magnitudes may be zero but never negative or NaN
fn check_value(field: impl FnOnce() -> String, value: f64) -> Result<(), TuningError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(TuningError::BadValue {
            field: field(),
            value,
        })
    }
}

/// The full balance sheet for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tuning {
    pub run_duration_ms: u64,
    /// Geometric growth factor applied per unit already owned
    pub cost_scale: f64,
    /// Currency per tap before any multiplier
    pub base_tap_value: f64,
    /// Purchase cap shared by every generator
    pub max_owned: u32,
    pub event_min_interval_ms: u64,
    pub event_max_interval_ms: u64,
    /// Minimum engine time between two run snapshots
    pub save_interval_ms: u64,
    pub generators: Vec<GeneratorDefinition>,
    pub boosts: Vec<BoostDefinition>,
    pub events: Vec<EventDefinition>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            run_duration_ms: RUN_DURATION_MS,
            cost_scale: COST_SCALE,
            base_tap_value: BASE_TAP_VALUE,
            max_owned: MAX_OWNED,
            event_min_interval_ms: EVENT_MIN_INTERVAL_MS,
            event_max_interval_ms: EVENT_MAX_INTERVAL_MS,
            save_interval_ms: SAVE_INTERVAL_MS,
            generators: standard_generators(),
            boosts: standard_boosts(),
            events: standard_events(),
        }
    }
}

impl Tuning {
    /// Standard catalog with a different run length
    pub fn with_run_duration(run_duration_ms: u64) -> Self {
        Self {
            run_duration_ms,
            ..Self::default()
        }
    }

    /// Load an override file. Missing fields take their standard values.
    pub fn from_file(path: &Path) -> Result<Self, TuningError> {
        let json = std::fs::read_to_string(path)?;
        let tuning: Tuning = serde_json::from_str(&json)?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Load an override file, falling back to the standard catalog
    pub fn load(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(tuning) => {
                log::info!("Loaded tuning from {}", path.display());
                tuning
            }
            Err(e) => {
                log::warn!("Using standard tuning ({e})");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), TuningError> {
        if self.cost_scale <= 1.0 || !self.cost_scale.is_finite() {
            return Err(TuningError::CostScale(self.cost_scale));
        }
        if self.event_min_interval_ms > self.event_max_interval_ms {
            return Err(TuningError::EventInterval {
                min: self.event_min_interval_ms,
                max: self.event_max_interval_ms,
            });
        }
        if self.events.is_empty() {
            return Err(TuningError::NoEvents);
        }
        if self.max_owned == 0 {
            return Err(TuningError::MaxOwned);
        }

        check_value(|| "baseTapValue".into(), self.base_tap_value)?;
        for g in &self.generators {
            check_value(|| format!("{}.perUnit", g.id), g.per_unit)?;
        }
        for b in &self.boosts {
            check_value(|| format!("{}.tapMultiplier", b.id), b.tap_multiplier)?;
            check_value(|| format!("{}.autoRateBonus", b.id), b.auto_rate_bonus)?;
        }
        for e in &self.events {
            check_value(|| format!("{}.rateMultiplier", e.id), e.rate_multiplier)?;
            check_value(|| format!("{}.allGainsMultiplier", e.id), e.all_gains_multiplier)?;
        }

        let mut seen = HashSet::new();
        let ids = self
            .generators
            .iter()
            .map(|g| &g.id)
            .chain(self.boosts.iter().map(|b| &b.id))
            .chain(self.events.iter().map(|e| &e.id));
        for id in ids {
            if !seen.insert(id.as_str()) {
                return Err(TuningError::DuplicateId(id.clone()));
            }
        }
        Ok(())
    }

    pub fn generator(&self, id: &str) -> Option<&GeneratorDefinition> {
        self.generators.iter().find(|g| g.id == id)
    }

    pub fn boost(&self, id: &str) -> Option<&BoostDefinition> {
        self.boosts.iter().find(|b| b.id == id)
    }

    pub fn event(&self, id: &str) -> Option<&EventDefinition> {
        self.events.iter().find(|e| e.id == id)
    }
}

fn texts(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

fn standard_generators() -> Vec<GeneratorDefinition> {
    vec![
        GeneratorDefinition {
            id: "sideHustle".into(),
            name: "Side Hustle".into(),
            kind: GeneratorKind::AutoGenerator,
            per_unit: 0.5, // max 5/s
            base_cost: 25,
            flavor_texts: texts(&[
                "Sell old textbooks",
                "Weekend garage sale",
                "Marketplace hustle",
                "Online shop opens",
                "Freelance gig machine",
                "Dog walking empire",
                "Reselling sneakers",
                "Rent out the spare room",
                "Dropshipping guru",
                "Side hustle CEO",
            ]),
        },
        GeneratorDefinition {
            id: "budgetSystem".into(),
            name: "Budget System".into(),
            kind: GeneratorKind::AutoGenerator,
            per_unit: 3.0, // max 30/s
            base_cost: 250,
            flavor_texts: texts(&[
                "Track expenses in a notes app",
                "Open a savings account",
                "Set up auto-pay",
                "Cancel unused subscriptions",
                "Coupon era",
                "Cash envelope system",
                "High-yield savings account",
                "Emergency fund started",
                "Passive income lifestyle",
                "Money printer goes brr",
            ]),
        },
        GeneratorDefinition {
            id: "promotionTrack".into(),
            name: "Promotion Track".into(),
            kind: GeneratorKind::TapBooster,
            per_unit: 0.5, // max +5x
            base_cost: 50,
            flavor_texts: texts(&[
                "Ask for a raise (politely)",
                "Update the profile",
                "Schmooze the boss",
                "Present at the team meeting",
                "Get the corner cubicle",
                "Lead a small team",
                "Skip-level meeting energy",
                "Conference talk invitation",
                "CEO energy achieved",
                "Retired at the top",
            ]),
        },
        GeneratorDefinition {
            id: "familySupport".into(),
            name: "Family Support".into(),
            kind: GeneratorKind::TapBooster,
            per_unit: 2.0, // max +20x
            base_cost: 400,
            flavor_texts: texts(&[
                "Home cooking",
                "Hand-me-down car",
                "Birthday card with $20",
                "Move back in to save rent",
                "An uncle's investment tip",
                "Family recipe side business",
                "Parents cover the phone bill",
                "Tax advice saves thousands",
                "Trust fund discovered (jk)",
                "Family empire established",
            ]),
        },
    ]
}

fn standard_boosts() -> Vec<BoostDefinition> {
    vec![
        BoostDefinition {
            id: "paydayHit".into(),
            name: "Payday Hit".into(),
            description: "x2 tap gains for 20 s".into(),
            duration_ms: 20_000,
            tap_multiplier: 2.0,
            auto_rate_bonus: 0.0,
            cost: 50,
        },
        BoostDefinition {
            id: "lockedIn".into(),
            name: "Locked-In Mode".into(),
            description: "Auto-taps 10/sec for 20 s".into(),
            duration_ms: 20_000,
            tap_multiplier: 1.0,
            auto_rate_bonus: 10.0,
            cost: 75,
        },
    ]
}

fn standard_events() -> Vec<EventDefinition> {
    vec![
        EventDefinition {
            id: "unexpectedBonus".into(),
            name: "Unexpected Bonus".into(),
            description: "+50% passive income".into(),
            icon: "gift".into(),
            duration_ms: 15_000,
            rate_multiplier: 1.5,
            all_gains_multiplier: 1.0,
            beneficial: true,
        },
        EventDefinition {
            id: "raiseApproved".into(),
            name: "Raise Approved".into(),
            description: "+25% all gains (taps + passive)".into(),
            icon: "party".into(),
            duration_ms: 20_000,
            rate_multiplier: 1.0,
            all_gains_multiplier: 1.25,
            beneficial: true,
        },
        EventDefinition {
            id: "unexpectedBill".into(),
            name: "Unexpected Bill".into(),
            description: "-50% passive income".into(),
            icon: "bill".into(),
            duration_ms: 15_000,
            rate_multiplier: 0.5,
            all_gains_multiplier: 1.0,
            beneficial: false,
        },
        EventDefinition {
            id: "taxSurprise".into(),
            name: "Tax Surprise".into(),
            description: "-25% all gains (taps + passive)".into(),
            icon: "bank".into(),
            duration_ms: 20_000,
            rate_multiplier: 1.0,
            all_gains_multiplier: 0.75,
            beneficial: false,
        },
    ]
}
