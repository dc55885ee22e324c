//! Logging for the reconciler binary.
//!
//! The subscriber starts at `info` so configuration loading is logged, and
//! the filter is swapped in place once `logging.level` is known. `RUST_LOG`
//! pins the filter for the whole process.

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

/// HTTP and database internals stay at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "reqwest=warn", "sqlx=warn"];

/// Handle to the installed filter.
pub struct LogFilter {
    handle: reload::Handle<EnvFilter, Registry>,
    pinned: bool,
}

/// Install the global subscriber.
pub fn init() -> LogFilter {
    let from_env = std::env::var_os("RUST_LOG")
        .and_then(|_| EnvFilter::try_from_default_env().ok());
    let pinned = from_env.is_some();

    let (filter, handle) = reload::Layer::new(from_env.unwrap_or_else(|| filter_for("info")));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();

    LogFilter { handle, pinned }
}

impl LogFilter {
    /// Switch to the configured level unless `RUST_LOG` pinned the filter.
    pub fn apply(&self, level: &str) {
        if self.pinned {
            tracing::debug!(level, "RUST_LOG set, ignoring logging.level");
            return;
        }
        if let Err(e) = self.handle.modify(|f| *f = filter_for(level)) {
            tracing::warn!(error = %e, level, "Failed to apply log level");
        }
    }
}

fn directives(level: &str) -> String {
    std::iter::once(level)
        .chain(QUIET_TARGETS.iter().copied())
        .collect::<Vec<_>>()
        .join(",")
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_new(directives(level)).unwrap_or_else(|_| EnvFilter::new("info"))
}
