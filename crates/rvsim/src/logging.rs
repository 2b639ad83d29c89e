//! `tracing` subscriber setup.
//!
//! `RUST_LOG` wins when set. Otherwise the filter logs at `info` and opens each
//! enabled trace category's target down to `trace`.

use driver_core::{TraceCategory, TraceConfig};
use tracing_subscriber::EnvFilter;

/// Builds the filter directive string for `trace`.
#[must_use]
pub fn directives(trace: &TraceConfig) -> String {
    let mut directives = vec!["info".to_string()];
    for category in TraceCategory::ALL {
        let level = if trace.is_enabled(category) {
            "trace"
        } else {
            "off"
        };
        directives.push(format!("{}={level}", category.target()));
    }
    directives.join(",")
}

/// Installs the global subscriber, writing to stderr. A second call is a
/// no-op.
pub fn init(trace: &TraceConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(trace)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use driver_core::TraceConfig;

    use super::directives;

    #[test]
    fn disabled_categories_are_switched_off() {
        let mut trace = TraceConfig::default();
        trace.set(Some("reg"), false).expect("known category");
        assert_eq!(
            directives(&trace),
            "info,rvsim::instr=trace,rvsim::reg=off,rvsim::mem=trace,rvsim::platform=trace"
        );
    }
}
