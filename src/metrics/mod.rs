use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

/// Saturating counters for the dispatch pipeline.
#[derive(Debug, Default, Clone)]
pub struct RuntimeMetrics {
    dispatches: u64,
    follow_ups: u64,
    skipped_mutations: u64,
    reflows: u64,
    nodes_moved: u64,
    full_evaluations: u64,
    incremental_evaluations: u64,
    evaluated_nodes: u64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&mut self, follow_ups: usize) {
        self.dispatches = self.dispatches.saturating_add(1);
        self.follow_ups = self.follow_ups.saturating_add(follow_ups as u64);
    }

    pub fn record_skipped(&mut self, count: usize) {
        if count > 0 {
            self.skipped_mutations = self.skipped_mutations.saturating_add(count as u64);
        }
    }

    pub fn record_reflow(&mut self, moved: usize) {
        self.reflows = self.reflows.saturating_add(1);
        self.nodes_moved = self.nodes_moved.saturating_add(moved as u64);
    }

    pub fn record_evaluation(&mut self, full: bool, nodes: usize) {
        if full {
            self.full_evaluations = self.full_evaluations.saturating_add(1);
        } else {
            self.incremental_evaluations = self.incremental_evaluations.saturating_add(1);
        }
        self.evaluated_nodes = self.evaluated_nodes.saturating_add(nodes as u64);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            dispatches: self.dispatches,
            follow_ups: self.follow_ups,
            skipped_mutations: self.skipped_mutations,
            reflows: self.reflows,
            nodes_moved: self.nodes_moved,
            full_evaluations: self.full_evaluations,
            incremental_evaluations: self.incremental_evaluations,
            evaluated_nodes: self.evaluated_nodes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub dispatches: u64,
    pub follow_ups: u64,
    pub skipped_mutations: u64,
    pub reflows: u64,
    pub nodes_moved: u64,
    pub full_evaluations: u64,
    pub incremental_evaluations: u64,
    pub evaluated_nodes: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(
            LogLevel::Info,
            target.to_string(),
            "runtime_metrics".to_string(),
            self.as_fields(),
        )
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("dispatches".to_string(), json!(self.dispatches));
        map.insert("follow_ups".to_string(), json!(self.follow_ups));
        map.insert("skipped_mutations".to_string(), json!(self.skipped_mutations));
        map.insert("reflows".to_string(), json!(self.reflows));
        map.insert("nodes_moved".to_string(), json!(self.nodes_moved));
        map.insert("full_evaluations".to_string(), json!(self.full_evaluations));
        map.insert(
            "incremental_evaluations".to_string(),
            json!(self.incremental_evaluations),
        );
        map.insert("evaluated_nodes".to_string(), json!(self.evaluated_nodes));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_into_snapshot() {
        let mut metrics = RuntimeMetrics::new();
        metrics.record_dispatch(3);
        metrics.record_dispatch(0);
        metrics.record_reflow(2);
        metrics.record_evaluation(true, 5);
        metrics.record_evaluation(false, 1);
        metrics.record_skipped(0);

        let snapshot = metrics.snapshot(Duration::from_millis(12));
        assert_eq!(snapshot.dispatches, 2);
        assert_eq!(snapshot.follow_ups, 3);
        assert_eq!(snapshot.nodes_moved, 2);
        assert_eq!(snapshot.evaluated_nodes, 6);
        assert_eq!(snapshot.skipped_mutations, 0);

        let event = snapshot.to_log_event("builder::runtime");
        assert_eq!(event.message, "runtime_metrics");
        assert_eq!(event.fields["incremental_evaluations"], json!(1));
    }
}
