//! Client-side notification relay for the hospital management system.
//!
//! The crate keeps a signed-in user's notification list in sync with the
//! backend. Live pushes arrive over a Socket.IO channel and are fanned out
//! through a tagged event registry; the REST API is used for the initial
//! fetch and for read/delete actions.
//!
//! # Architecture
//!
//! - `transport`: Socket.IO connection lifecycle and wire codec
//! - `bus`: event registry that distributes live messages to subscribers
//! - `api`: REST client for the notification endpoints, with token refresh
//! - `store`: in-memory notification list and unread counter
//! - `session`: wires one user's transport, store and credentials together
//! - `calendar`: month grid helper used by the dashboard views
//! - `model`: notification records and relative-time labels
//! - `config`, `error`, `logging`: environment configuration and shared plumbing

pub mod api;
pub mod bus;
pub mod calendar;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::{
    ClientError, HttpNotificationApi, ListQuery, NotificationApi, SessionCredentials, TokenPair,
    TokenStore,
};
pub use bus::{EventRegistry, Subscription};
pub use calendar::{month_grid, DayCell, MonthGrid, YearMonth};
pub use config::ClientConfig;
pub use error::NotifyError;
pub use model::{Notification, NotificationId, NotificationKind};
pub use session::{NotificationSession, StartReport};
pub use store::{NotificationStore, StoreSnapshot};
pub use transport::{
    ConnectAuth, LiveTransport, ReconnectPolicy, SocketIoTransport, TransportError,
    TransportState,
};
