use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use crate::Result;
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::RuntimeMetrics;

use super::{Action, Listener, ListenerContext};

/// Logs every reduced action for observability and debugging.
pub struct LifecycleLoggerListener {
    logger: Logger,
    level: LogLevel,
    log_layout: bool,
    log_selection: bool,
}

impl LifecycleLoggerListener {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            log_layout: true,
            log_selection: false,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Geometry actions fire on every drag step.
    pub fn log_layout(mut self, enabled: bool) -> Self {
        self.log_layout = enabled;
        self
    }

    pub fn log_selection(mut self, enabled: bool) -> Self {
        self.log_selection = enabled;
        self
    }

    fn emit(&self, message: &str, fields: impl IntoIterator<Item = (String, serde_json::Value)>) {
        let event = event_with_fields(self.level, "builder::runtime.lifecycle", message, fields);
        let _ = self.logger.log_event(event);
    }
}

impl Listener for LifecycleLoggerListener {
    fn name(&self) -> &str {
        "diagnostics.lifecycle_logger"
    }

    fn after_reduce(&mut self, ctx: &mut ListenerContext<'_>, action: &Action) -> Result<()> {
        let state = ctx.state();
        match action {
            Action::PreviewLayout { .. }
            | Action::UpdateLayoutInfo { .. }
            | Action::BatchUpdateLayoutInfo(_)
            | Action::BatchUpdateLayoutInfoWhenReflow(_)
            | Action::UpdateReflow { .. }
            | Action::UpdateNodeHeight { .. }
                if !self.log_layout => {}
            Action::Select(_) | Action::SetCursor(_) | Action::ResetCursor if !self.log_selection => {}
            Action::Rename {
                display_name,
                new_display_name,
            } => self.emit(
                "action.rename",
                [
                    json_kv("from", json!(display_name)),
                    json_kv("to", json!(new_display_name)),
                ],
            ),
            Action::ActionRunCompleted { display_name, result } => self.emit(
                "action.run_completed",
                [
                    json_kv("action", json!(display_name)),
                    json_kv("failed", json!(result.error.is_some())),
                    json_kv("known", json!(state.actions().contains(display_name))),
                ],
            ),
            other => self.emit(
                "action.reduced",
                [
                    json_kv("action", json!(other.name())),
                    json_kv("components", json!(state.components().len())),
                ],
            ),
        }
        Ok(())
    }
}

/// Emits metrics snapshots through a logger, at most once per interval.
pub struct MetricsSnapshotListener {
    logger: Logger,
    metrics: Arc<Mutex<RuntimeMetrics>>,
    target: String,
    interval: Duration,
    last_emit: Option<Instant>,
    started_at: Instant,
}

impl MetricsSnapshotListener {
    pub fn new(logger: Logger, metrics: Arc<Mutex<RuntimeMetrics>>) -> Self {
        Self {
            logger,
            metrics,
            target: "builder::runtime.metrics".to_string(),
            interval: Duration::from_secs(5),
            last_emit: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    fn emit_snapshot(&mut self) {
        if self.interval == Duration::from_millis(0) {
            return;
        }

        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.interval {
                return;
            }
        }

        self.last_emit = Some(now);
        let uptime = now.duration_since(self.started_at);

        if let Ok(guard) = self.metrics.lock() {
            let event = guard.snapshot(uptime).to_log_event(&self.target);
            let _ = self.logger.log_event(event);
        }
    }
}

impl Listener for MetricsSnapshotListener {
    fn name(&self) -> &str {
        "diagnostics.metrics_snapshot"
    }

    fn after_reduce(&mut self, _ctx: &mut ListenerContext<'_>, _action: &Action) -> Result<()> {
        self.emit_snapshot();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use crate::runtime::{EditorRuntime, RuntimeConfig};
    use crate::tree::ComponentNode;

    #[test]
    fn lifecycle_logger_filters_noisy_actions() {
        let sink = Arc::new(MemorySink::new());
        let logger = Logger::from_shared(sink.clone());
        let mut runtime = EditorRuntime::new(RuntimeConfig::default());
        runtime.register_listener(LifecycleLoggerListener::new(logger));

        runtime.dispatch(Action::InitTree(ComponentNode::root())).unwrap();
        runtime.dispatch(Action::ResetCursor).unwrap();
        runtime
            .dispatch(Action::Rename {
                display_name: "root".into(),
                new_display_name: "app".into(),
            })
            .unwrap();

        assert_eq!(sink.messages(), vec!["action.reduced", "action.rename"]);
    }

    #[test]
    fn metrics_snapshot_respects_interval() {
        let sink = Arc::new(MemorySink::new());
        let logger = Logger::from_shared(sink.clone());
        let mut config = RuntimeConfig::default();
        config.enable_metrics();
        let metrics = config.metrics_handle().unwrap();
        let mut runtime = EditorRuntime::new(config);
        runtime.register_listener(
            MetricsSnapshotListener::new(logger, metrics).with_interval(Duration::from_secs(60)),
        );

        runtime.dispatch(Action::ResetCursor).unwrap();
        runtime.dispatch(Action::ResetCursor).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, "builder::runtime.metrics");
    }
}
