//! Host-facing control surface for interactive widgets.

mod core;

pub use core::{
    CONTROL_PROTOCOL_VERSION, Capability, CommandEnvelope, ControllableWidget, NavigateTarget,
    WidgetCommand,
};
