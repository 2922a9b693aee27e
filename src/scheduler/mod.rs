//! Frame scheduling: the per-tick pipeline and outbound pacing.

pub mod pacing;
pub mod render;

pub use pacing::SendPacer;
pub use render::{ConsoleContext, RenderScheduler, SchedulerStats};
