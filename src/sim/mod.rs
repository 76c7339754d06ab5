//! Run simulation
//!
//! All gameplay logic lives here. Everything is driven by explicit
//! timestamps handed in by the caller:
//! - No wall clock reads
//! - Random source injected
//! - Side effects only through the `Engine`'s sink and reporter

pub mod autoplay;
pub mod engine;
pub mod events;
pub mod rates;
pub mod state;
pub mod tick;

pub use autoplay::Autoplay;
pub use engine::{BoxedReporter, BoxedSink, Engine};
pub use events::{pick_event, schedule_next};
pub use rates::{auto_rate, purchase_cost, tap_multiplier};
pub use state::{
    ActiveBoost, ActiveEvent, DisplayRates, OwnedGenerators, RunPhase, RunSnapshot, RunState,
};
pub use tick::{Rejection, TickOutcome};
