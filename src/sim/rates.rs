//! Rate composition
//!
//! Pure functions deriving the aggregate income rates from what the player
//! owns. No state, no side effects.

use super::state::OwnedGenerators;
use crate::tuning::{GeneratorDefinition, GeneratorKind};

/// Auto-taps per second from all AutoGenerator definitions
pub fn auto_rate(generators: &[GeneratorDefinition], owned: &OwnedGenerators) -> f64 {
    generators
        .iter()
        .filter(|g| g.kind == GeneratorKind::AutoGenerator)
        .map(|g| g.per_unit * owned.count(&g.id) as f64)
        .sum()
}

/// Tap multiplier from all TapBooster definitions. Never below 1.
pub fn tap_multiplier(generators: &[GeneratorDefinition], owned: &OwnedGenerators) -> f64 {
    let bonus: f64 = generators
        .iter()
        .filter(|g| g.kind == GeneratorKind::TapBooster)
        .map(|g| g.per_unit * owned.count(&g.id) as f64)
        .sum();
    1.0 + bonus
}

/// Price of the next unit: `floor(base_cost * scale^owned)`
pub fn purchase_cost(def: &GeneratorDefinition, owned: u32, cost_scale: f64) -> u64 {
    (def.base_cost as f64 * cost_scale.powi(owned as i32)).floor() as u64
}
