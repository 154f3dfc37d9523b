//! Dispatch lifecycle audit hooks.
//!
//! Records carry a stage plus structured details so callers can buffer or
//! inspect how a dispatch unfolded without touching the queue itself.

use std::sync::Mutex;
use std::time::SystemTime;

use serde_json::Value;

/// Checkpoints emitted by `EditorRuntime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeAuditStage {
    RuntimeConstructed,
    ListenerRegistered,
    /// One queued action was applied to the stores.
    ActionReduced,
    /// A listener queued a follow-up action.
    FollowUpQueued,
    /// The execution tree re-evaluated after a reduction.
    ExecutionSynced,
    /// The whole cascade for one dispatch settled.
    DispatchCompleted,
    /// The cascade hit `max_cascade` and was abandoned.
    CascadeOverflow,
}

#[derive(Debug, Clone)]
pub struct RuntimeAuditEvent {
    pub timestamp: SystemTime,
    pub stage: RuntimeAuditStage,
    pub details: Vec<(String, Value)>,
}

impl RuntimeAuditEvent {
    fn new(stage: RuntimeAuditStage) -> Self {
        Self {
            timestamp: SystemTime::now(),
            stage,
            details: Vec::new(),
        }
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }
}

pub struct RuntimeAuditEventBuilder {
    event: RuntimeAuditEvent,
}

impl RuntimeAuditEventBuilder {
    pub fn new(stage: RuntimeAuditStage) -> Self {
        Self {
            event: RuntimeAuditEvent::new(stage),
        }
    }

    pub fn detail(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.event.details.push((key.into(), value));
        self
    }

    pub fn finish(self) -> RuntimeAuditEvent {
        self.event
    }
}

pub trait RuntimeAudit: Send + Sync {
    fn record(&self, event: RuntimeAuditEvent);
}

#[derive(Debug, Default)]
pub struct NullRuntimeAudit;

impl RuntimeAudit for NullRuntimeAudit {
    fn record(&self, _event: RuntimeAuditEvent) {}
}

/// Keeps every record in memory; meant for tests and debugging sessions.
#[derive(Debug, Default)]
pub struct BufferedRuntimeAudit {
    events: Mutex<Vec<RuntimeAuditEvent>>,
}

impl BufferedRuntimeAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RuntimeAuditEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn stages(&self) -> Vec<RuntimeAuditStage> {
        self.events().into_iter().map(|event| event.stage).collect()
    }
}

impl RuntimeAudit for BufferedRuntimeAudit {
    fn record(&self, event: RuntimeAuditEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_collects_details() {
        let mut builder = RuntimeAuditEventBuilder::new(RuntimeAuditStage::ActionReduced);
        builder.detail("action", json!("rename")).detail("skipped", json!(0));
        let event = builder.finish();
        assert_eq!(event.stage, RuntimeAuditStage::ActionReduced);
        assert_eq!(event.detail("action"), Some(&json!("rename")));
        assert!(event.detail("missing").is_none());
    }

    #[test]
    fn buffered_audit_keeps_order() {
        let audit = BufferedRuntimeAudit::new();
        audit.record(RuntimeAuditEventBuilder::new(RuntimeAuditStage::RuntimeConstructed).finish());
        audit.record(RuntimeAuditEventBuilder::new(RuntimeAuditStage::DispatchCompleted).finish());
        assert_eq!(
            audit.stages(),
            vec![
                RuntimeAuditStage::RuntimeConstructed,
                RuntimeAuditStage::DispatchCompleted
            ]
        );
    }
}
