//! Idle/demo mode - a bot plays the run
//!
//! Taps at a steady rate and spends greedily on whatever buys the most
//! income per unit of currency. Used by the headless `play` command and as
//! a smoke test of the whole engine.

use rand::RngCore;

use super::engine::Engine;
use super::tick::TickOutcome;
use crate::tuning::GeneratorKind;

/// Maximum purchases per frame
const MAX_BUYS_PER_STEP: usize = 8;

#[derive(Debug, Clone)]
pub struct Autoplay {
    /// Simulated finger speed
    taps_per_sec: f64,
    /// Fractional taps carried between frames
    tap_budget: f64,
    /// Activate boosts when affordable
    use_boosts: bool,
}

impl Default for Autoplay {
    fn default() -> Self {
        Self::new(6.0)
    }
}

impl Autoplay {
    pub fn new(taps_per_sec: f64) -> Self {
        Self {
            taps_per_sec: taps_per_sec.max(0.0),
            tap_budget: 0.0,
            use_boosts: true,
        }
    }

    pub fn without_boosts(mut self) -> Self {
        self.use_boosts = false;
        self
    }

    /// Play one frame of `dt_ms` ending at `now`, then tick the engine
    pub fn step<R: RngCore>(&mut self, engine: &mut Engine<R>, now: u64, dt_ms: u64) -> TickOutcome {
        if !engine.state().is_running() {
            return TickOutcome::Ignored;
        }

        self.tap_budget += self.taps_per_sec * dt_ms as f64 / 1000.0;
        while self.tap_budget >= 1.0 {
            engine.tap(now);
            self.tap_budget -= 1.0;
        }

        let mut bought = false;
        for _ in 0..MAX_BUYS_PER_STEP {
            match self.best_purchase(engine) {
                Some(id) => {
                    engine.buy_generator(&id);
                    bought = true;
                }
                None => break,
            }
        }

        if self.use_boosts && !bought {
            let ids: Vec<String> = engine.tuning().boosts.iter().map(|b| b.id.clone()).collect();
            for id in ids {
                if engine.can_activate_boost(&id, now) {
                    engine.activate_boost(&id, now);
                }
            }
        }

        engine.tick(now)
    }

    /// Affordable generator with the best income gain per currency spent
    fn best_purchase<R: RngCore>(&self, engine: &Engine<R>) -> Option<String> {
        let tuning = engine.tuning();
        tuning
            .generators
            .iter()
            .filter(|g| engine.can_afford_generator(&g.id))
            .filter_map(|g| {
                let cost = engine.purchase_cost(&g.id)? as f64;
                let gain_per_sec = match g.kind {
                    GeneratorKind::AutoGenerator => g.per_unit * tuning.base_tap_value,
                    GeneratorKind::TapBooster => {
                        g.per_unit * tuning.base_tap_value * self.taps_per_sec
                    }
                };
                Some((g.id.clone(), gain_per_sec / cost.max(1.0)))
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(id, _)| id)
    }
}
