//! Named-event timing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::{BenchError, BenchResult};

/// Mapping from event name to start instant, owned by the driver.
///
/// Starting a name that is already open overwrites the previous start
/// (last-start-wins) — an allowed, observable race, not an error. Distinct
/// names never interfere. Not safe for concurrent callers opening
/// overlapping names; the benchmark drives it from a single thread.
#[derive(Debug, Default)]
pub struct TimingRegistry {
    open: HashMap<String, Instant>,
}

impl TimingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of `name` at the current instant.
    pub fn start(&mut self, name: impl Into<String>) {
        self.open.insert(name.into(), Instant::now());
    }

    /// Elapsed time since the last `start(name)`, consuming the entry.
    ///
    /// Fails fast with [`BenchError::UnmatchedTimingEnd`] when `name` was
    /// never started (or was already ended).
    pub fn end(&mut self, name: &str) -> BenchResult<Duration> {
        let started = self.open.remove(name).ok_or_else(|| BenchError::UnmatchedTimingEnd {
            name: name.to_string(),
        })?;
        Ok(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_end_yields_a_duration() {
        let mut reg = TimingRegistry::new();
        reg.start("insert_i_str");
        let elapsed = reg.end("insert_i_str").unwrap();
        assert!(elapsed >= Duration::ZERO);
    }

    #[test]
    fn end_without_start_fails_fast() {
        let mut reg = TimingRegistry::new();
        assert!(matches!(
            reg.end("never_started"),
            Err(BenchError::UnmatchedTimingEnd { .. })
        ));
    }

    #[test]
    fn end_consumes_the_entry() {
        let mut reg = TimingRegistry::new();
        reg.start("e");
        reg.end("e").unwrap();
        assert!(reg.end("e").is_err());
    }

    #[test]
    fn restart_overwrites_instead_of_stacking() {
        let mut reg = TimingRegistry::new();
        reg.start("e");
        reg.start("e");
        assert!(reg.end("e").is_ok());
        // a single entry remained despite two starts
        assert!(reg.end("e").is_err());
    }

    #[test]
    fn distinct_names_do_not_interfere() {
        let mut reg = TimingRegistry::new();
        reg.start("a");
        reg.start("b");
        assert!(reg.end("a").is_ok());
        assert!(reg.end("b").is_ok());
    }
}
