//! Server-side simulation: the fixed-rate tick that drives block tick handlers.

mod tick_scheduler;

pub use tick_scheduler::{TickMetrics, TickScheduler};
