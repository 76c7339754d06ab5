//! Run controller
//!
//! Owns the one [`RunState`] and wires the pure transitions in `tick` to the
//! outside world: a debounced snapshot sink and a score reporter invoked once
//! per finished run. Single owner; hosts with several callers must serialize
//! access (one task, or a mutex around the engine).

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg32;

use super::rates::purchase_cost;
use super::state::{DisplayRates, RunPhase, RunSnapshot, RunState};
use super::tick::{self, Rejection, TickOutcome};
use crate::persistence::{Debounced, SnapshotSink};
use crate::submission::ScoreReporter;
use crate::tuning::Tuning;

pub type BoxedSink = Box<dyn SnapshotSink + Send>;
pub type BoxedReporter = Box<dyn ScoreReporter + Send>;

pub struct Engine<R = Pcg32> {
    state: RunState,
    tuning: Tuning,
    rng: R,
    saver: Debounced<BoxedSink>,
    reporter: BoxedReporter,
}

impl Engine<Pcg32> {
    /// Production engine with an OS-seeded event RNG
    pub fn new(tuning: Tuning, sink: BoxedSink, reporter: BoxedReporter) -> Self {
        let rng = Pcg32::from_rng(&mut rand::rng());
        Self::with_rng(tuning, rng, sink, reporter)
    }
}

impl<R: RngCore> Engine<R> {
    pub fn with_rng(tuning: Tuning, rng: R, sink: BoxedSink, reporter: BoxedReporter) -> Self {
        let saver = Debounced::new(sink, tuning.save_interval_ms);
        Self {
            state: RunState::new(),
            tuning,
            rng,
            saver,
            reporter,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn phase(&self) -> RunPhase {
        self.state.phase
    }

    pub fn rates(&self) -> DisplayRates {
        self.state.rates
    }

    /// Start (or restart) a run lasting the configured duration
    pub fn start_run(&mut self, player_name: &str, now: u64) {
        let deadline = now.saturating_add(self.tuning.run_duration_ms);
        self.start_run_until(player_name, now, deadline);
    }

    /// Start a run that also ends no later than `deadline`, for hosts
    /// following a global event deadline
    pub fn start_run_until(&mut self, player_name: &str, now: u64, deadline: u64) {
        let deadline = deadline.min(now.saturating_add(self.tuning.run_duration_ms));
        tick::start_run(
            &mut self.state,
            &self.tuning,
            player_name,
            now,
            deadline,
            &mut self.rng,
        );
        self.saver.reset_timer();
        log::info!(
            "Run started for {player_name} ({} s)",
            deadline.saturating_sub(now) / 1000
        );
    }

    /// Adopt a saved run if it is still live at `now`.
    ///
    /// A stale or finished snapshot is discarded and storage cleared.
    pub fn restore(&mut self, snapshot: RunSnapshot, now: u64) -> bool {
        if snapshot.phase != RunPhase::Running || snapshot.deadline <= now {
            log::info!("Discarding saved run (expired or finished)");
            self.saver.clear();
            return false;
        }
        self.state = snapshot;
        let clamped = self.state.owned.clamp_to(self.tuning.max_owned);
        if clamped > 0 {
            log::warn!("Saved run held {clamped} generator counts above the cap");
        }
        self.refresh_rates(now);
        log::info!(
            "Resumed run for {} at {:.0}",
            self.state.player_name,
            self.state.currency
        );
        true
    }

    /// Load whatever the sink holds and restore it if still valid
    pub fn resume_saved(&mut self, now: u64) -> bool {
        match self.saver.load() {
            Some(snapshot) => self.restore(snapshot, now),
            None => false,
        }
    }

    pub fn try_tap(&mut self, now: u64) -> Result<f64, Rejection> {
        tick::tap(&mut self.state, &self.tuning, now)
    }

    pub fn tap(&mut self, now: u64) {
        if let Err(why) = self.try_tap(now) {
            log::debug!("Tap ignored: {why:?}");
        }
    }

    pub fn try_buy_generator(&mut self, id: &str) -> Result<u64, Rejection> {
        tick::buy_generator(&mut self.state, &self.tuning, id)
    }

    pub fn buy_generator(&mut self, id: &str) {
        match self.try_buy_generator(id) {
            Ok(cost) => log::debug!("Bought {id} for {cost}"),
            Err(why) => log::debug!("Purchase ignored: {why:?}"),
        }
    }

    pub fn try_activate_boost(&mut self, id: &str, now: u64) -> Result<(), Rejection> {
        tick::activate_boost(&mut self.state, &self.tuning, id, now)
    }

    pub fn activate_boost(&mut self, id: &str, now: u64) {
        match self.try_activate_boost(id, now) {
            Ok(()) => log::debug!("Boost {id} active"),
            Err(why) => log::debug!("Boost ignored: {why:?}"),
        }
    }

    /// Per-frame driver
    pub fn tick(&mut self, now: u64) -> TickOutcome {
        let outcome = tick::tick(&mut self.state, &self.tuning, now, &mut self.rng);
        match &outcome {
            TickOutcome::Finished { report } => {
                if let Some((name, score)) = report {
                    log::info!("Run over: {name} peaked at {score}");
                    self.reporter.report(name, *score);
                }
                self.saver.clear();
            }
            TickOutcome::Advanced { .. } => {
                self.saver.offer(now, &self.state);
            }
            TickOutcome::Ignored => {}
        }
        outcome
    }

    /// Price of the next unit of `id`, if it exists and is below the cap
    pub fn purchase_cost(&self, id: &str) -> Option<u64> {
        let def = self.tuning.generator(id)?;
        let owned = self.state.owned.count(id);
        (owned < self.tuning.max_owned).then(|| purchase_cost(def, owned, self.tuning.cost_scale))
    }

    pub fn can_afford_generator(&self, id: &str) -> bool {
        self.purchase_cost(id)
            .is_some_and(|cost| self.state.currency >= cost as f64)
    }

    pub fn can_activate_boost(&self, id: &str, now: u64) -> bool {
        self.tuning.boost(id).is_some_and(|def| {
            self.state.is_running()
                && self.state.currency >= def.cost as f64
                && !self.state.boost_active(id, now)
        })
    }

    /// Milliseconds until the deadline; zero when not running
    pub fn time_remaining(&self, now: u64) -> u64 {
        if !self.state.is_running() {
            return 0;
        }
        self.state.deadline.saturating_sub(now)
    }

    fn refresh_rates(&mut self, now: u64) {
        use super::rates::{auto_rate, tap_multiplier};

        let s = &self.state;
        let base = self.tuning.base_tap_value;
        let gen_auto = auto_rate(&self.tuning.generators, &s.owned);
        let gen_tap = tap_multiplier(&self.tuning.generators, &s.owned);
        let all = s.event_all_multiplier(now);
        let gain_per_second = gen_auto * base * s.event_rate_multiplier(now) * all
            + s.boost_auto_rate(now) * base * gen_tap * s.boost_tap_multiplier(now) * all;
        self.state.rates = DisplayRates {
            auto_rate: gen_auto,
            tap_multiplier: gen_tap,
            gain_per_second,
        };
    }
}
