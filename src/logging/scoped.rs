//! Step-scoped logger that attributes every message to one step.
use std::sync::Arc;

use super::types::{Log, StepStatus};

/// Implement the display methods of [`Log`] by prefixing each message with
/// the scope name and forwarding it to `self.inner`.
macro_rules! scoped_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.inner.$method(&format!("[{}] {msg}", self.scope));
            }
        )+
    };
}

/// Logger handle given to a single step.
///
/// The runner wraps the run-wide logger in a `ScopedLog` and hands the step a
/// copy of the environment holding it.  The run-wide logger is never
/// modified, so its identity is back in effect as soon as the step returns,
/// whether it succeeded or failed.
///
/// [`record_step`](Log::record_step) is forwarded unprefixed because summary
/// entries are already keyed by step.
pub struct ScopedLog {
    inner: Arc<dyn Log>,
    scope: String,
}

impl std::fmt::Debug for ScopedLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedLog")
            .field("inner", &"<dyn Log>")
            .field("scope", &self.scope)
            .finish()
    }
}

impl ScopedLog {
    /// Wrap `inner`, attributing messages to `scope`.
    #[must_use]
    pub fn new(inner: Arc<dyn Log>, scope: &str) -> Self {
        Self {
            inner,
            scope: scope.to_string(),
        }
    }

    /// The scope name used as message prefix.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl Log for ScopedLog {
    scoped_log_methods!(stage, info, debug, warn, error, dry_run);

    fn record_step(&self, name: &str, status: StepStatus, message: Option<&str>) {
        self.inner.record_step(name, status, message);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::Logger;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        lines: Mutex<Vec<String>>,
    }

    impl Log for Capture {
        fn stage(&self, msg: &str) {
            self.lines.lock().unwrap().push(format!("stage {msg}"));
        }
        fn info(&self, msg: &str) {
            self.lines.lock().unwrap().push(format!("info {msg}"));
        }
        fn debug(&self, msg: &str) {
            self.lines.lock().unwrap().push(format!("debug {msg}"));
        }
        fn warn(&self, msg: &str) {
            self.lines.lock().unwrap().push(format!("warn {msg}"));
        }
        fn error(&self, msg: &str) {
            self.lines.lock().unwrap().push(format!("error {msg}"));
        }
        fn dry_run(&self, msg: &str) {
            self.lines.lock().unwrap().push(format!("dry_run {msg}"));
        }
        fn record_step(&self, name: &str, _: StepStatus, _: Option<&str>) {
            self.lines.lock().unwrap().push(format!("record {name}"));
        }
    }

    #[test]
    fn messages_are_prefixed_with_scope() {
        let capture = Arc::new(Capture::default());
        let scoped = ScopedLog::new(Arc::clone(&capture) as Arc<dyn Log>, "symlinks");
        scoped.info("linked 2");
        scoped.warn("exists");
        scoped.dry_run("would link");
        let lines = capture.lines.lock().unwrap().clone();
        assert_eq!(
            lines,
            vec![
                "info [symlinks] linked 2",
                "warn [symlinks] exists",
                "dry_run [symlinks] would link",
            ]
        );
    }

    #[test]
    fn record_step_is_not_prefixed() {
        let capture = Arc::new(Capture::default());
        let scoped = ScopedLog::new(Arc::clone(&capture) as Arc<dyn Log>, "pacman");
        scoped.record_step("use pacman to install git", StepStatus::Ok, None);
        let lines = capture.lines.lock().unwrap().clone();
        assert_eq!(lines, vec!["record use pacman to install git"]);
    }

    #[test]
    fn warnings_reach_the_run_wide_logger() {
        let logger = Arc::new(Logger::new());
        let scoped = ScopedLog::new(Arc::clone(&logger) as Arc<dyn Log>, "secrets");
        scoped.warn("already exists");
        assert_eq!(logger.warning_count(), 1);
        assert_eq!(scoped.scope(), "secrets");
    }
}
