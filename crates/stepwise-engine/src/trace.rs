use serde::{Deserialize, Serialize};

use stepwise_core::types::TraceEntry;

/// Ordered record of the steps executed during one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunTrace {
    entries: Vec<TraceEntry>,
}

impl RunTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    /// How many times the given step ran.
    pub fn count(&self, step: &str) -> usize {
        self.entries.iter().filter(|e| e.step == step).count()
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.step.as_str()).collect()
    }

    /// Sum of per-step execution times.
    pub fn total_elapsed_ms(&self) -> u64 {
        self.entries.iter().map(|e| e.elapsed_ms).sum()
    }
}

impl<'a> IntoIterator for &'a RunTrace {
    type Item = &'a TraceEntry;
    type IntoIter = std::slice::Iter<'a, TraceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stepwise_core::types::ControlSignal;

    fn entry(step: &str, iteration: usize, signal: ControlSignal) -> TraceEntry {
        TraceEntry {
            step: step.into(),
            iteration,
            signal,
            timestamp: Utc::now(),
            elapsed_ms: 5,
        }
    }

    #[test]
    fn test_counts_and_order() {
        let mut trace = RunTrace::new();
        trace.push(entry("a", 0, ControlSignal::Next));
        trace.push(entry("b", 1, ControlSignal::Repeat));
        trace.push(entry("b", 2, ControlSignal::Next));

        assert_eq!(trace.len(), 3);
        assert_eq!(trace.count("b"), 2);
        assert_eq!(trace.count("zzz"), 0);
        assert_eq!(trace.step_names(), vec!["a", "b", "b"]);
        assert_eq!(trace.last().unwrap().iteration, 2);
        assert_eq!(trace.total_elapsed_ms(), 15);
        assert_eq!((&trace).into_iter().count(), 3);
    }

    #[test]
    fn test_empty_trace() {
        let trace = RunTrace::new();
        assert!(trace.is_empty());
        assert!(trace.last().is_none());
    }
}
