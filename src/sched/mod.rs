//! Priority-ordered request scheduling over the two persistent resolver
//! sessions. Workers pull from a shared [`DispatchQueue`]; an admission
//! semaphore bounds in-flight work and a per-kind gate serializes access to
//! each browser session.

pub mod envelope;
pub mod manager;
pub mod queue;
pub mod stats;

pub use envelope::Envelope;
pub use manager::{Scheduler, SchedulerOptions};
pub use queue::{DispatchQueue, Priority};
pub use stats::{SchedulerStats, StatsSnapshot};
