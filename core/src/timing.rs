//! A small tree of named durations, merged at wave close (spec §5
//! "Shared resources": "the `Timing` tree merges child times at wave
//! close").

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One open measurement. Dropping it without calling [TimingScope::finish]
/// still records the elapsed time, so an early `?` return doesn't lose it.
pub struct TimingScope<'a> {
    timing: &'a Timing,
    name: &'static str,
    started: Instant,
    finished: bool,
}

impl TimingScope<'_> {
    pub fn finish(mut self) {
        self.finished = true;
        self.timing.record(self.name, self.started.elapsed());
    }
}

impl Drop for TimingScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.timing.record(self.name, self.started.elapsed());
        }
    }
}

/// Accumulates named durations across however many workers call
/// [Timing::scope] concurrently; wave-close code reads the totals with
/// [Timing::totals].
#[derive(Default)]
pub struct Timing {
    totals: dashmap::DashMap<&'static str, Duration>,
}

impl Timing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self, name: &'static str) -> TimingScope<'_> {
        TimingScope { timing: self, name, started: Instant::now(), finished: false }
    }

    fn record(&self, name: &'static str, elapsed: Duration) {
        *self.totals.entry(name).or_insert(Duration::ZERO) += elapsed;
    }

    pub fn totals(&self) -> HashMap<&'static str, Duration> {
        self.totals.iter().map(|entry| (*entry.key(), *entry.value())).collect()
    }

    /// Merges another `Timing`'s totals into this one and clears it,
    /// matching the "merges child times at wave close" contract.
    pub fn merge(&self, other: &Timing) {
        for entry in other.totals.iter() {
            self.record(*entry.key(), *entry.value());
        }
        other.totals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn a_finished_scope_accumulates_into_the_named_total() {
        let timing = Timing::new();
        timing.scope("wave").finish();
        timing.scope("wave").finish();
        assert_eq!(timing.totals().len(), 1);
        assert!(timing.totals()["wave"] >= Duration::ZERO);
    }

    #[test]
    fn a_dropped_scope_still_records_elapsed_time() {
        let timing = Timing::new();
        {
            let _scope = timing.scope("pass");
            sleep(Duration::from_millis(1));
        }
        assert!(timing.totals()["pass"] > Duration::ZERO);
    }

    #[test]
    fn merging_drains_the_source_tree() {
        let child = Timing::new();
        child.scope("leaf").finish();
        let parent = Timing::new();
        parent.merge(&child);
        assert!(parent.totals().contains_key("leaf"));
        assert!(child.totals().is_empty());
    }
}
