//! Tagged-event registry for server-pushed events.
//!
//! The transport decodes each inbound event into a name and a JSON payload
//! and hands it to [`EventRegistry::dispatch`]. Subscribers are invoked
//! synchronously in registration order and are removed through the
//! [`Subscription`] handle returned when they registered.

pub mod event_types;
mod registry;

pub use registry::{EventRegistry, Subscription};
