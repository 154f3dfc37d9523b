//! Display-name registry: allocates and reclaims the unique identifiers that
//! key every widget, container, page and action.

mod core;

pub use core::DisplayNameRegistry;
