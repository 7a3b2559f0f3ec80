//! Event names dispatched through the registry.

/// Server push carrying a full notification record.
pub const EVENT_NOTIFICATION: &str = "notification";

// ---------------------------------------------------------------------------
// Connection lifecycle (emitted by the transport itself)
// ---------------------------------------------------------------------------

pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_CONNECT_ERROR: &str = "connect_error";
pub const EVENT_RECONNECTING: &str = "reconnecting";

/// Returns true for events the transport synthesizes rather than receives.
pub fn is_lifecycle_event(name: &str) -> bool {
    matches!(
        name,
        EVENT_CONNECT | EVENT_DISCONNECT | EVENT_CONNECT_ERROR | EVENT_RECONNECTING
    )
}
