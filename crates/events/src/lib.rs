//! Rotor event bus and notification infrastructure.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`. Collaborators subscribe to it for state
//!   changes instead of polling the store.
//! - [`AutomationEvent`]: typed automation events subscribers match on.
//! - [`PlatformEvent`]: the event envelope carrying the typed event and its
//!   flattened log row, with one constructor per event.
//! - [`EventPersistence`]: background service that appends every event to
//!   the `automation_log` table.
//! - [`delivery`]: the operator webhook notification sink.

pub mod automation_event;
pub mod bus;
pub mod delivery;
pub mod persistence;

pub use automation_event::AutomationEvent;
pub use bus::{EventBus, PlatformEvent};
pub use delivery::webhook::{WebhookDelivery, WebhookError, WebhookNotifier};
pub use persistence::EventPersistence;
