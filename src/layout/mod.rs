//! Grid layout engine.
//!
//! Pure rectangle algorithms live in the private `core` module; `container`
//! binds them to sibling sets read from the component store.

mod container;
mod core;

pub use container::{container_overlaps, detect_crossing, height_reflow};
pub use core::{
    HeightChange, LayoutItem, ReflowResult, classify_height_change, combine_widget_infos,
    compute_reflow, crossing_effects, find_overlaps, get_near_component_nodes, get_reflow_result,
    height_effects, shrink_effects, validate_layout,
};
