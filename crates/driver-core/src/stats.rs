//! Instruction totals and wall-clock timing for end-of-run reporting.

use std::time::{Duration, Instant};

/// Retired instructions between periodic throughput lines.
pub const KIPS_REPORT_INTERVAL: u64 = 0x10_0000;

/// Run-wide counters, read for reporting after the loop exits.
#[derive(Debug, Clone)]
pub struct RunStats {
    started: Instant,
    initialized: Option<Instant>,
    finished: Option<Instant>,
    window_start: Instant,
    retired: u64,
    periodic: bool,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new(false)
    }
}

impl RunStats {
    /// Starts the initialisation clock. With `periodic` set, a throughput line
    /// is logged every [`KIPS_REPORT_INTERVAL`] instructions.
    #[must_use]
    pub fn new(periodic: bool) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            initialized: None,
            finished: None,
            window_start: now,
            retired: 0,
            periodic,
        }
    }

    /// Ends initialisation and starts the execution clock.
    pub fn mark_initialized(&mut self) {
        let now = Instant::now();
        self.initialized = Some(now);
        self.window_start = now;
    }

    /// Counts one retired instruction.
    pub fn record_retired(&mut self) {
        self.retired += 1;
        if self.periodic && self.retired % KIPS_REPORT_INTERVAL == 0 {
            let now = Instant::now();
            let kips = kips(KIPS_REPORT_INTERVAL, now - self.window_start);
            tracing::info!("kips: {kips}");
            self.window_start = now;
        }
    }

    /// Stops the execution clock.
    pub fn finish_run(&mut self) {
        self.finished = Some(Instant::now());
    }

    /// Instructions retired across every run so far.
    #[must_use]
    pub const fn retired(&self) -> u64 {
        self.retired
    }

    /// Time from creation to [`Self::mark_initialized`].
    #[must_use]
    pub fn init_duration(&self) -> Duration {
        self.initialized
            .map_or(Duration::ZERO, |at| at - self.started)
    }

    /// Time from [`Self::mark_initialized`] to [`Self::finish_run`].
    #[must_use]
    pub fn exec_duration(&self) -> Duration {
        match (self.initialized, self.finished) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    /// Logs the timing summary.
    pub fn report(&self) {
        let exec = self.exec_duration();
        tracing::info!("Initialization: {} msecs", self.init_duration().as_millis());
        tracing::info!("Execution: {} msecs", exec.as_millis());
        tracing::info!("Instructions: {}", self.retired);
        tracing::info!("Perf: {} Kips", kips(self.retired, exec));
    }
}

/// Thousands of instructions per second, with sub-millisecond runs counted as
/// one millisecond.
fn kips(instructions: u64, elapsed: Duration) -> u64 {
    let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX).max(1);
    instructions / millis
}
