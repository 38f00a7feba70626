//! Built-in rewriting addins.
//!
//! These are the reference consumers of the visitor contract: a timing
//! instrumentation pass over methods and a change-notification pass over
//! property setters. Hosts register their own [`crate::weave::WeaverAddin`]
//! implementations alongside or instead of these.

mod method_timer;
mod property_changed;

pub use method_timer::{injected, MethodTimerAddin, TIMED_MARKER};
pub use property_changed::{
    PropertyChangedAddin, NOTIFY_INTERFACE, NOTIFY_INTERFACE_METHOD, NOTIFY_MARKER,
};
