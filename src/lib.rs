//! cleargate: Cloudflare challenge resolution behind a priority scheduler.
//!
//! Two persistent Chromium sessions do the actual work. The clearance
//! resolver drives challenge pages until a `cf_clearance` cookie is issued;
//! the Turnstile resolver hosts the widget on a synthetic page and harvests
//! its token. A bounded worker pool serializes requests onto each session in
//! priority order.

pub mod api;
pub mod browser;
pub mod core;
pub mod features;
pub mod sched;
pub mod solver;

pub use crate::core::config::{load_gate_config, GateConfig};
pub use crate::core::error::SolveError;
pub use crate::core::AppState;
pub use crate::sched::{Priority, Scheduler, SchedulerOptions};
pub use crate::solver::{ChallengeResolver, ClearanceSolver, Resolution, TurnstileSolver};
