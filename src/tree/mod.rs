//! Component document: typed nodes, prop paths and the mutable store.

mod core;
pub mod node;
pub mod path;

pub use core::{ComponentStore, LayoutPatch, LayoutSlice, MutationOutcome, PropSlice};
pub use node::{
    ComponentNode, ComponentType, ContainerType, ROOT_DISPLAY_NAME, SectionName, SectionViewConfig,
    props_of,
};
pub use path::{PathSegment, PropPath, Props};
