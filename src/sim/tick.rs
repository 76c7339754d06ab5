//! Run state machine
//!
//! Pure transitions over [`RunState`]: every function takes the timestamp it
//! should act at and never reads a clock. Side effects (saving, score
//! submission) are left to the caller via the returned outcome.

use rand::Rng;

use super::events::{pick_event, schedule_next};
use super::rates::{auto_rate, purchase_cost, tap_multiplier};
use super::state::{ActiveBoost, ActiveEvent, DisplayRates, RunPhase, RunState};
use crate::consts::MAX_TICK_DT_SECS;
use crate::tuning::Tuning;

/// Why a player operation changed nothing
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    NotRunning,
    UnknownGenerator(String),
    AtCap { id: String, cap: u32 },
    InsufficientFunds { cost: u64, available: f64 },
    UnknownBoost(String),
    BoostActive(String),
}

/// What a tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not running, or the timestamp did not move forward
    Ignored,
    /// Time advanced and gains were applied
    Advanced {
        gain: f64,
        /// An event fired during this tick
        event_fired: Option<String>,
    },
    /// The deadline was reached; carries the score to report, if still due
    Finished { report: Option<(String, u64)> },
}

/// Begin a fresh run at `now`, ending at `deadline`
pub fn start_run<R: Rng + ?Sized>(
    state: &mut RunState,
    tuning: &Tuning,
    player_name: &str,
    now: u64,
    deadline: u64,
    rng: &mut R,
) {
    let next_event_at = schedule_next(now, tuning, rng);
    state.reset(player_name, now, deadline, next_event_at);
}

/// One tap. Returns the currency gained.
pub fn tap(state: &mut RunState, tuning: &Tuning, now: u64) -> Result<f64, Rejection> {
    if !state.is_running() {
        return Err(Rejection::NotRunning);
    }

    let gain = tuning.base_tap_value
        * tap_multiplier(&tuning.generators, &state.owned)
        * state.boost_tap_multiplier(now)
        * state.event_all_multiplier(now);
    state.credit(gain);
    Ok(gain)
}

/// Buy one unit of a generator. Returns the price paid.
pub fn buy_generator(state: &mut RunState, tuning: &Tuning, id: &str) -> Result<u64, Rejection> {
    if !state.is_running() {
        return Err(Rejection::NotRunning);
    }
    let def = tuning
        .generator(id)
        .ok_or_else(|| Rejection::UnknownGenerator(id.to_string()))?;

    let owned = state.owned.count(id);
    if owned >= tuning.max_owned {
        return Err(Rejection::AtCap {
            id: id.to_string(),
            cap: tuning.max_owned,
        });
    }

    // Priced at the count before this purchase
    let cost = purchase_cost(def, owned, tuning.cost_scale);
    if state.currency < cost as f64 {
        return Err(Rejection::InsufficientFunds {
            cost,
            available: state.currency,
        });
    }

    state.debit(cost as f64);
    state.owned.increment(id);
    state.rates.auto_rate = auto_rate(&tuning.generators, &state.owned);
    state.rates.tap_multiplier = tap_multiplier(&tuning.generators, &state.owned);
    Ok(cost)
}

/// Activate a boost for its catalog duration starting at `now`
pub fn activate_boost(
    state: &mut RunState,
    tuning: &Tuning,
    id: &str,
    now: u64,
) -> Result<(), Rejection> {
    if !state.is_running() {
        return Err(Rejection::NotRunning);
    }
    let def = tuning
        .boost(id)
        .ok_or_else(|| Rejection::UnknownBoost(id.to_string()))?;

    if state.currency < def.cost as f64 {
        return Err(Rejection::InsufficientFunds {
            cost: def.cost,
            available: state.currency,
        });
    }
    if state.boost_active(id, now) {
        return Err(Rejection::BoostActive(id.to_string()));
    }

    state.debit(def.cost as f64);
    state.boosts.push(ActiveBoost::from_definition(def, now));
    Ok(())
}

/// Advance the run to `now`
pub fn tick<R: Rng + ?Sized>(
    state: &mut RunState,
    tuning: &Tuning,
    now: u64,
    rng: &mut R,
) -> TickOutcome {
    if !state.is_running() {
        return TickOutcome::Ignored;
    }

    if now >= state.deadline {
        let report = if state.score_reported {
            None
        } else {
            Some((state.player_name.clone(), state.score()))
        };
        state.phase = RunPhase::Finished;
        state.score_reported = true;
        state.last_processed = now;
        return TickOutcome::Finished { report };
    }

    // Clamped so a long pause (backgrounded host) cannot dump unbounded income
    let elapsed_ms = now.saturating_sub(state.last_processed);
    if elapsed_ms == 0 {
        return TickOutcome::Ignored;
    }
    let dt = (elapsed_ms as f64 / 1000.0).min(MAX_TICK_DT_SECS);

    let gen_auto_rate = auto_rate(&tuning.generators, &state.owned);
    let gen_tap_mult = tap_multiplier(&tuning.generators, &state.owned);
    let boost_tap_mult = state.boost_tap_multiplier(now);
    let boost_auto_rate = state.boost_auto_rate(now);
    let event_rate_mult = state.event_rate_multiplier(now);
    let event_all_mult = state.event_all_multiplier(now);

    let base = tuning.base_tap_value;
    let passive_per_sec = gen_auto_rate * base * event_rate_mult * event_all_mult;
    // Boost auto-taps count as taps: they scale with the tap multipliers
    let boost_per_sec = boost_auto_rate * base * gen_tap_mult * boost_tap_mult * event_all_mult;
    let gain = (passive_per_sec + boost_per_sec) * dt;
    state.credit(gain);

    state.sweep_expired(now);

    let mut event_fired = None;
    if now >= state.next_event_at {
        if let Some(def) = pick_event(tuning, rng) {
            log::info!("Event: {} ({})", def.name, def.description);
            state.events.push(ActiveEvent::from_definition(def, now));
            event_fired = Some(def.id.clone());
        }
        state.next_event_at = schedule_next(now, tuning, rng);
    }

    state.rates = DisplayRates {
        auto_rate: gen_auto_rate,
        tap_multiplier: gen_tap_mult,
        gain_per_second: passive_per_sec + boost_per_sec,
    };
    state.last_processed = now;

    TickOutcome::Advanced { gain, event_fired }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    const T0: u64 = 1_000_000;

    fn running(tuning: &Tuning) -> (RunState, Pcg32) {
        let mut rng = Pcg32::seed_from_u64(12345);
        let mut state = RunState::new();
        start_run(
            &mut state,
            tuning,
            "Ada",
            T0,
            T0 + tuning.run_duration_ms,
            &mut rng,
        );
        (state, rng)
    }

    #[test]
    fn start_run_schedules_inside_window() {
        let tuning = Tuning::default();
        let (state, _) = running(&tuning);
        assert_eq!(state.phase, RunPhase::Running);
        assert_eq!(state.deadline, T0 + tuning.run_duration_ms);
        let gap = state.next_event_at - T0;
        assert!((tuning.event_min_interval_ms..=tuning.event_max_interval_ms).contains(&gap));
    }

    #[test]
    fn tap_gives_base_value_with_nothing_owned() {
        let tuning = Tuning::default();
        let (mut state, _) = running(&tuning);
        assert_eq!(tap(&mut state, &tuning, T0), Ok(1.0));
        assert_eq!(state.currency, 1.0);
        assert_eq!(state.peak, 1.0);
    }

    #[test]
    fn buy_then_reject_on_insufficient_funds() {
        let tuning = Tuning::default();
        let (mut state, _) = running(&tuning);
        state.credit(30.0);

        assert_eq!(buy_generator(&mut state, &tuning, "sideHustle"), Ok(25));
        assert_eq!(state.currency, 5.0);
        assert_eq!(state.owned.count("sideHustle"), 1);

        let before = state.clone();
        assert_eq!(
            buy_generator(&mut state, &tuning, "sideHustle"),
            Err(Rejection::InsufficientFunds {
                cost: 28,
                available: 5.0
            })
        );
        assert_eq!(state, before);
    }

    #[test]
    fn buy_rejects_unknown_and_capped() {
        let tuning = Tuning::default();
        let (mut state, _) = running(&tuning);
        state.credit(1e9);
        assert!(matches!(
            buy_generator(&mut state, &tuning, "timeMachine"),
            Err(Rejection::UnknownGenerator(_))
        ));

        for _ in 0..tuning.max_owned {
            assert!(buy_generator(&mut state, &tuning, "sideHustle").is_ok());
        }
        let before = state.clone();
        assert!(matches!(
            buy_generator(&mut state, &tuning, "sideHustle"),
            Err(Rejection::AtCap { cap: 10, .. })
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn buying_refreshes_display_rates() {
        let tuning = Tuning::default();
        let (mut state, _) = running(&tuning);
        state.credit(100.0);
        buy_generator(&mut state, &tuning, "promotionTrack").unwrap();
        assert_eq!(state.rates.tap_multiplier, 1.5);
        buy_generator(&mut state, &tuning, "sideHustle").unwrap();
        assert_eq!(state.rates.auto_rate, 0.5);
    }

    #[test]
    fn tap_multiplier_composition() {
        let tuning = Tuning::default();
        let (mut state, _) = running(&tuning);
        state.owned.set("promotionTrack", 2); // 1 + 0.5 * 2 = 2
        state.credit(50.0);
        activate_boost(&mut state, &tuning, "paydayHit", T0).unwrap();
        assert_eq!(state.currency, 0.0);

        assert_eq!(tap(&mut state, &tuning, T0 + 10), Ok(4.0));
    }

    #[test]
    fn boost_cannot_stack_with_itself() {
        let tuning = Tuning::default();
        let (mut state, _) = running(&tuning);
        state.credit(200.0);
        activate_boost(&mut state, &tuning, "paydayHit", T0).unwrap();
        let before = state.clone();

        assert_eq!(
            activate_boost(&mut state, &tuning, "paydayHit", T0 + 5_000),
            Err(Rejection::BoostActive("paydayHit".into()))
        );
        assert_eq!(state, before);
        assert_eq!(state.boosts.len(), 1);

        // Expired instances no longer block
        assert!(activate_boost(&mut state, &tuning, "paydayHit", T0 + 20_000).is_ok());
    }

    #[test]
    fn boost_rejects_unknown_and_unaffordable() {
        let tuning = Tuning::default();
        let (mut state, _) = running(&tuning);
        state.credit(10.0);
        assert!(matches!(
            activate_boost(&mut state, &tuning, "nope", T0),
            Err(Rejection::UnknownBoost(_))
        ));
        assert!(matches!(
            activate_boost(&mut state, &tuning, "lockedIn", T0),
            Err(Rejection::InsufficientFunds { cost: 75, .. })
        ));
        assert!(state.boosts.is_empty());
    }

    #[test]
    fn passive_tick_one_second() {
        let tuning = Tuning::default();
        let (mut state, mut rng) = running(&tuning);
        state.owned.set("sideHustle", 1);

        let outcome = tick(&mut state, &tuning, T0 + 1_000, &mut rng);
        assert_eq!(
            outcome,
            TickOutcome::Advanced {
                gain: 0.5,
                event_fired: None
            }
        );
        assert_eq!(state.currency, 0.5);
        assert_eq!(state.peak, 0.5);
        assert_eq!(state.rates.gain_per_second, 0.5);
        assert_eq!(state.last_processed, T0 + 1_000);
    }

    #[test]
    fn long_pause_is_clamped_to_one_second() {
        let tuning = Tuning::default();
        let (mut state, mut rng) = running(&tuning);
        state.owned.set("budgetSystem", 1);
        state.next_event_at = u64::MAX;

        tick(&mut state, &tuning, T0 + 10_000, &mut rng);
        assert_eq!(state.currency, 3.0);
    }

    #[test]
    fn stale_or_duplicate_timestamps_are_ignored() {
        let tuning = Tuning::default();
        let (mut state, mut rng) = running(&tuning);
        state.owned.set("sideHustle", 1);
        tick(&mut state, &tuning, T0 + 500, &mut rng);
        let before = state.clone();

        assert_eq!(tick(&mut state, &tuning, T0 + 500, &mut rng), TickOutcome::Ignored);
        assert_eq!(tick(&mut state, &tuning, T0 + 100, &mut rng), TickOutcome::Ignored);
        assert_eq!(state, before);
    }

    #[test]
    fn boost_auto_taps_scale_with_tap_multipliers() {
        let tuning = Tuning::default();
        let (mut state, mut rng) = running(&tuning);
        state.next_event_at = u64::MAX;
        state.owned.set("promotionTrack", 2); // x2
        state.credit(75.0);
        activate_boost(&mut state, &tuning, "lockedIn", T0).unwrap();

        tick(&mut state, &tuning, T0 + 1_000, &mut rng);
        // 10 auto-taps/s * 1 * 2 (generators) * 1 (boost) * 1 (events)
        assert!((state.currency - 20.0).abs() < 1e-9);
    }

    #[test]
    fn events_scale_passive_income() {
        let tuning = Tuning::default();
        let (mut state, mut rng) = running(&tuning);
        state.next_event_at = u64::MAX;
        state.owned.set("sideHustle", 2); // 1/s
        state
            .events
            .push(ActiveEvent::from_definition(tuning.event("unexpectedBonus").unwrap(), T0));
        state
            .events
            .push(ActiveEvent::from_definition(tuning.event("taxSurprise").unwrap(), T0));

        tick(&mut state, &tuning, T0 + 1_000, &mut rng);
        // 1 * 1.5 * 0.75
        assert!((state.currency - 1.125).abs() < 1e-9);
    }

    #[test]
    fn expired_instances_are_swept() {
        let tuning = Tuning::default();
        let (mut state, mut rng) = running(&tuning);
        state.next_event_at = u64::MAX;
        state.credit(50.0);
        activate_boost(&mut state, &tuning, "paydayHit", T0).unwrap();

        tick(&mut state, &tuning, T0 + 19_999, &mut rng);
        assert_eq!(state.boosts.len(), 1);
        tick(&mut state, &tuning, T0 + 20_000, &mut rng);
        assert!(state.boosts.is_empty());
    }

    #[test]
    fn event_fires_and_reschedules() {
        let tuning = Tuning::default();
        let (mut state, mut rng) = running(&tuning);
        let due = state.next_event_at;

        let outcome = tick(&mut state, &tuning, due, &mut rng);
        assert!(matches!(
            outcome,
            TickOutcome::Advanced {
                event_fired: Some(_),
                ..
            }
        ));
        assert_eq!(state.events.len(), 1);
        let gap = state.next_event_at - due;
        assert!((tuning.event_min_interval_ms..=tuning.event_max_interval_ms).contains(&gap));
    }

    #[test]
    fn deadline_finishes_run_once() {
        let tuning = Tuning::with_run_duration(20_000);
        let (mut state, mut rng) = running(&tuning);
        state.credit(41.9);
        state.debit(40.0);

        let outcome = tick(&mut state, &tuning, T0 + 20_001, &mut rng);
        assert_eq!(
            outcome,
            TickOutcome::Finished {
                report: Some(("Ada".into(), 41))
            }
        );
        assert_eq!(state.phase, RunPhase::Finished);
        assert!(state.score_reported);

        let frozen = state.clone();
        assert_eq!(tick(&mut state, &tuning, T0 + 30_000, &mut rng), TickOutcome::Ignored);
        assert_eq!(tap(&mut state, &tuning, T0 + 30_000), Err(Rejection::NotRunning));
        assert_eq!(state, frozen);
    }

    #[test]
    fn idle_state_ignores_everything() {
        let tuning = Tuning::default();
        let mut rng = Pcg32::seed_from_u64(1);
        let mut state = RunState::new();
        state.credit(1e6);
        let before = state.clone();

        assert_eq!(tap(&mut state, &tuning, 5), Err(Rejection::NotRunning));
        assert_eq!(buy_generator(&mut state, &tuning, "sideHustle"), Err(Rejection::NotRunning));
        assert_eq!(
            activate_boost(&mut state, &tuning, "paydayHit", 5),
            Err(Rejection::NotRunning)
        );
        assert_eq!(tick(&mut state, &tuning, 5, &mut rng), TickOutcome::Ignored);
        assert_eq!(state, before);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Tap,
        Tick(u64),
        Buy(usize),
        Boost(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => Just(Op::Tap),
            4 => (1u64..3_000).prop_map(Op::Tick),
            2 => (0usize..5).prop_map(Op::Buy),
            1 => (0usize..3).prop_map(Op::Boost),
        ]
    }

    proptest! {
        #[test]
        fn peak_never_decreases_and_caps_hold(ops in prop::collection::vec(op(), 1..300)) {
            let tuning = Tuning::default();
            let (mut state, mut rng) = running(&tuning);
            let mut now = T0;
            let mut last_peak = state.peak;

            for op in ops {
                match op {
                    Op::Tap => { let _ = tap(&mut state, &tuning, now); }
                    Op::Tick(step) => {
                        now += step;
                        let _ = tick(&mut state, &tuning, now, &mut rng);
                    }
                    Op::Buy(i) => {
                        let id = tuning.generators.get(i).map(|g| g.id.clone()).unwrap_or_default();
                        let _ = buy_generator(&mut state, &tuning, &id);
                    }
                    Op::Boost(i) => {
                        let id = tuning.boosts.get(i).map(|b| b.id.clone()).unwrap_or_default();
                        let _ = activate_boost(&mut state, &tuning, &id, now);
                    }
                }
                prop_assert!(state.peak >= last_peak);
                prop_assert!(state.peak >= state.currency);
                prop_assert!(state.currency >= 0.0);
                for g in &tuning.generators {
                    prop_assert!(state.owned.count(&g.id) <= tuning.max_owned);
                }
                for b in &tuning.boosts {
                    let live = state.boosts.iter().filter(|x| x.boost_id == b.id && x.is_live(now)).count();
                    prop_assert!(live <= 1);
                }
                last_peak = state.peak;
            }
        }
    }
}
