//! Logging infrastructure for structured console output.

mod logger;
mod scoped;
mod subscriber;
mod types;

pub use logger::Logger;
pub use scoped::ScopedLog;
pub use subscriber::{init_subscriber, level_for_verbosity};
pub use types::{Log, StepEntry, StepStatus};
