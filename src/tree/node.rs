use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::path::Props;
use crate::geometry::Rect;

pub const ROOT_DISPLAY_NAME: &str = "root";

/// Widget and structural node kinds understood by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentType {
    DotPanel,
    PageNode,
    SectionNode,
    ModalSectionNode,
    ContainerNode,
    ContainerWidget,
    TabsWidget,
    ModalWidget,
    FormWidget,
    ListWidget,
    InputWidget,
    ButtonWidget,
    TextWidget,
    ImageWidget,
    SelectWidget,
    SwitchWidget,
    RateWidget,
    TableWidget,
    ChartWidget,
    #[serde(other)]
    Unknown,
}

impl ComponentType {
    /// Pages, sections and the root shape the document rather than the canvas.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Self::DotPanel
                | Self::PageNode
                | Self::SectionNode
                | Self::ModalSectionNode
                | Self::ContainerNode
        )
    }

    /// Nodes whose children are laid out as switchable views.
    pub fn has_views(self) -> bool {
        matches!(
            self,
            Self::SectionNode | Self::ContainerWidget | Self::TabsWidget
        )
    }
}

/// How the editor frames a node on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerType {
    EditorDotPanel,
    EditorLayoutSquare,
    /// Resizable, selectable widget.
    #[default]
    EditorScaleSquare,
}

fn default_unit() -> f64 {
    1.0
}

/// One node of the serialized document (DSL).
///
/// Inside the store `children_node` is kept empty; the nested form only exists
/// at the persistence boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentNode {
    pub display_name: String,
    #[serde(rename = "type")]
    pub node_type: ComponentType,
    #[serde(default)]
    pub container_type: ContainerType,
    #[serde(default)]
    pub parent_node: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children_node: Vec<ComponentNode>,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
    #[serde(default)]
    pub w: u32,
    #[serde(default)]
    pub h: u32,
    #[serde(default = "default_unit")]
    pub unit_w: f64,
    #[serde(default = "default_unit")]
    pub unit_h: f64,
    #[serde(default)]
    pub min_h: u32,
    #[serde(default)]
    pub props: Props,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_name: Option<String>,
}

impl ComponentNode {
    pub fn new(display_name: impl Into<String>, node_type: ComponentType) -> Self {
        let container_type = match node_type {
            ComponentType::DotPanel | ComponentType::ContainerNode => ContainerType::EditorDotPanel,
            ComponentType::PageNode | ComponentType::SectionNode | ComponentType::ModalSectionNode => {
                ContainerType::EditorLayoutSquare
            }
            _ => ContainerType::EditorScaleSquare,
        };
        Self {
            display_name: display_name.into(),
            node_type,
            container_type,
            parent_node: None,
            children_node: Vec::new(),
            x: 0,
            y: 0,
            w: 0,
            h: 0,
            unit_w: default_unit(),
            unit_h: default_unit(),
            min_h: 0,
            props: Props::new(),
            show_name: None,
        }
    }

    pub fn root() -> Self {
        let mut node = Self::new(ROOT_DISPLAY_NAME, ComponentType::DotPanel);
        node.props = props_of(json!({
            "pageSortedKey": [],
            "currentPageIndex": 0,
            "globalData": {},
        }));
        node
    }

    pub fn page(display_name: impl Into<String>) -> Self {
        Self::new(display_name, ComponentType::PageNode).with_parent(ROOT_DISPLAY_NAME)
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_node = Some(parent.into());
        self
    }

    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.set_rect(rect);
        self
    }

    pub fn with_min_h(mut self, min_h: u32) -> Self {
        self.min_h = min_h;
        self
    }

    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props_of(props);
        self
    }

    pub fn with_container_type(mut self, container_type: ContainerType) -> Self {
        self.container_type = container_type;
        self
    }

    pub fn with_children(mut self, children: Vec<ComponentNode>) -> Self {
        self.children_node = children;
        self
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }

    pub fn set_rect(&mut self, rect: Rect) {
        self.x = rect.x;
        self.y = rect.y;
        self.w = rect.w;
        self.h = rect.h;
    }

    /// Names of this node and all nested children, preorder.
    pub fn subtree_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            names.push(node.display_name.clone());
            for child in node.children_node.iter().rev() {
                stack.push(child);
            }
        }
        names
    }
}

/// Coerce a JSON value into a props mapping; non-objects yield empty props.
pub fn props_of(value: Value) -> Props {
    match value {
        Value::Object(map) => map,
        _ => Props::new(),
    }
}

/// One view of a multi-view container (tabs, section views).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionViewConfig {
    pub key: String,
    pub view_display_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub disabled: bool,
}

impl SectionViewConfig {
    pub fn new(key: impl Into<String>, view_display_name: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            view_display_name: view_display_name.into(),
            hidden: false,
            disabled: false,
        }
    }
}

/// Structural page sections that can be toggled on and off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionName {
    #[serde(rename = "leftSection")]
    Left,
    #[serde(rename = "rightSection")]
    Right,
    #[serde(rename = "headerSection")]
    Header,
    #[serde(rename = "footerSection")]
    Footer,
}

impl SectionName {
    pub fn show_name(self) -> &'static str {
        match self {
            Self::Left => "leftSection",
            Self::Right => "rightSection",
            Self::Header => "headerSection",
            Self::Footer => "footerSection",
        }
    }

    pub fn from_show_name(name: &str) -> Option<Self> {
        match name {
            "leftSection" => Some(Self::Left),
            "rightSection" => Some(Self::Right),
            "headerSection" => Some(Self::Header),
            "footerSection" => Some(Self::Footer),
            _ => None,
        }
    }

    /// Page layout flags written when the section is added.
    pub fn options_when_added(self) -> Props {
        props_of(match self {
            Self::Left => json!({"hasLeft": true, "leftWidth": 20, "leftPosition": "FULL", "layout": "Custom"}),
            Self::Right => json!({"hasRight": true, "rightWidth": 20, "rightPosition": "FULL", "layout": "Custom"}),
            Self::Header => json!({"hasHeader": true, "topHeight": 96, "layout": "Custom"}),
            Self::Footer => json!({"hasFooter": true, "bottomHeight": 96, "layout": "Custom"}),
        })
    }

    /// Page layout flags written when the section is removed.
    pub fn options_when_deleted(self) -> Props {
        props_of(match self {
            Self::Left => json!({"hasLeft": false, "leftWidth": 0, "leftPosition": "NONE", "layout": "Custom"}),
            Self::Right => json!({"hasRight": false, "rightWidth": 0, "rightPosition": "NONE", "layout": "Custom"}),
            Self::Header => json!({"hasHeader": false, "topHeight": 0, "layout": "Custom"}),
            Self::Footer => json!({"hasFooter": false, "bottomHeight": 0, "layout": "Custom"}),
        })
    }
}
