use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::CommandError;
use crate::tree::{ComponentNode, ComponentType, Props};

/// Bumped whenever a command variant changes shape.
pub const CONTROL_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    SetValue,
    ClearValue,
    Navigate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigateTarget {
    Index(usize),
    Key(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "args", rename_all = "camelCase")]
pub enum WidgetCommand {
    SetValue(Value),
    ClearValue,
    Navigate(NavigateTarget),
}

impl WidgetCommand {
    pub fn capability(&self) -> Capability {
        match self {
            Self::SetValue(_) => Capability::SetValue,
            Self::ClearValue => Capability::ClearValue,
            Self::Navigate(_) => Capability::Navigate,
        }
    }
}

/// Wire form of a command sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub version: u32,
    pub display_name: String,
    pub command: WidgetCommand,
}

impl CommandEnvelope {
    pub fn new(display_name: impl Into<String>, command: WidgetCommand) -> Self {
        Self {
            version: CONTROL_PROTOCOL_VERSION,
            display_name: display_name.into(),
            command,
        }
    }

    /// Parse an envelope, rejecting other protocol versions.
    pub fn decode(raw: &str) -> crate::error::Result<Self> {
        let envelope: Self = serde_json::from_str(raw)?;
        if envelope.version != CONTROL_PROTOCOL_VERSION {
            return Err(CommandError::Version {
                expected: CONTROL_PROTOCOL_VERSION,
                found: envelope.version,
            }
            .into());
        }
        Ok(envelope)
    }
}

/// A node that can be driven from outside the editor.
pub trait ControllableWidget {
    fn capabilities(&self) -> &'static [Capability];

    /// Runtime values the command produces, to be layered over the node's
    /// evaluated props.
    fn control(&self, command: &WidgetCommand) -> Result<Props, CommandError>;
}

const VALUE_CAPABILITIES: &[Capability] = &[Capability::SetValue, Capability::ClearValue];
const NAVIGATE_CAPABILITIES: &[Capability] = &[Capability::Navigate];

impl ControllableWidget for ComponentNode {
    fn capabilities(&self) -> &'static [Capability] {
        match self.node_type {
            ComponentType::InputWidget
            | ComponentType::SelectWidget
            | ComponentType::SwitchWidget
            | ComponentType::RateWidget => VALUE_CAPABILITIES,
            ComponentType::DotPanel
            | ComponentType::SectionNode
            | ComponentType::ContainerWidget
            | ComponentType::TabsWidget => NAVIGATE_CAPABILITIES,
            _ => &[],
        }
    }

    fn control(&self, command: &WidgetCommand) -> Result<Props, CommandError> {
        if !self.capabilities().contains(&command.capability()) {
            return Err(CommandError::Unsupported {
                widget: self.display_name.clone(),
                command: format!("{:?}", command.capability()),
            });
        }
        let mut values = Props::new();
        match command {
            WidgetCommand::SetValue(value) => {
                values.insert("value".to_string(), value.clone());
            }
            WidgetCommand::ClearValue => {
                values.insert("value".to_string(), cleared_value(self.node_type));
            }
            WidgetCommand::Navigate(target) => {
                let (keys, index_key) = if self.node_type == ComponentType::DotPanel {
                    (string_list(&self.props, "pageSortedKey"), "currentPageIndex")
                } else {
                    (string_list(&self.props, "viewSortedKey"), "currentViewIndex")
                };
                let index = resolve_target(target, &keys, &self.props)?;
                values.insert(index_key.to_string(), json!(index));
            }
        }
        Ok(values)
    }
}

fn cleared_value(node_type: ComponentType) -> Value {
    match node_type {
        ComponentType::InputWidget => json!(""),
        ComponentType::SwitchWidget => json!(false),
        ComponentType::RateWidget => json!(0),
        _ => Value::Null,
    }
}

fn string_list(props: &Props, key: &str) -> Vec<String> {
    props
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// A key names either a page or view display name, or a view config key.
fn resolve_target(target: &NavigateTarget, keys: &[String], props: &Props) -> Result<usize, CommandError> {
    match target {
        NavigateTarget::Index(index) if *index < keys.len() => Ok(*index),
        NavigateTarget::Index(index) => Err(CommandError::OutOfRange {
            index: *index,
            len: keys.len(),
        }),
        NavigateTarget::Key(key) => {
            if let Some(position) = keys.iter().position(|name| name == key) {
                return Ok(position);
            }
            let view = props
                .get("sectionViewConfigs")
                .and_then(Value::as_array)
                .and_then(|configs| {
                    configs.iter().find(|config| {
                        config.get("key").and_then(Value::as_str) == Some(key.as_str())
                    })
                })
                .and_then(|config| config.get("viewDisplayName"))
                .and_then(Value::as_str);
            view.and_then(|view| keys.iter().position(|name| name == view))
                .ok_or_else(|| CommandError::UnknownKey(key.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tabs() -> ComponentNode {
        ComponentNode::new("tabs1", ComponentType::TabsWidget).with_props(json!({
            "viewSortedKey": ["tabsView1", "tabsView2"],
            "sectionViewConfigs": [
                {"key": "view1", "viewDisplayName": "tabsView1"},
                {"key": "view2", "viewDisplayName": "tabsView2"}
            ]
        }))
    }

    #[test]
    fn value_commands_write_value() {
        let input = ComponentNode::new("input1", ComponentType::InputWidget);
        let set = input.control(&WidgetCommand::SetValue(json!("hi"))).unwrap();
        assert_eq!(set["value"], json!("hi"));
        let cleared = input.control(&WidgetCommand::ClearValue).unwrap();
        assert_eq!(cleared["value"], json!(""));
    }

    #[test]
    fn navigate_accepts_index_name_or_view_key() {
        let tabs = tabs();
        let by_index = tabs.control(&WidgetCommand::Navigate(NavigateTarget::Index(1))).unwrap();
        assert_eq!(by_index["currentViewIndex"], json!(1));
        let by_key = tabs
            .control(&WidgetCommand::Navigate(NavigateTarget::Key("view2".into())))
            .unwrap();
        assert_eq!(by_key["currentViewIndex"], json!(1));
        let by_name = tabs
            .control(&WidgetCommand::Navigate(NavigateTarget::Key("tabsView1".into())))
            .unwrap();
        assert_eq!(by_name["currentViewIndex"], json!(0));
    }

    #[test]
    fn bad_targets_and_capabilities_are_rejected() {
        let tabs = tabs();
        assert_eq!(
            tabs.control(&WidgetCommand::Navigate(NavigateTarget::Index(5))),
            Err(CommandError::OutOfRange { index: 5, len: 2 })
        );
        assert!(matches!(
            tabs.control(&WidgetCommand::ClearValue),
            Err(CommandError::Unsupported { .. })
        ));
        let text = ComponentNode::new("text1", ComponentType::TextWidget);
        assert!(text.capabilities().is_empty());
    }

    #[test]
    fn envelope_checks_the_protocol_version() {
        let raw = r#"{"version":1,"displayName":"input1","command":{"kind":"setValue","args":3}}"#;
        let envelope = CommandEnvelope::decode(raw).unwrap();
        assert_eq!(envelope.command, WidgetCommand::SetValue(json!(3)));

        let stale = r#"{"version":0,"displayName":"input1","command":{"kind":"clearValue"}}"#;
        assert!(CommandEnvelope::decode(stale).is_err());
    }
}
