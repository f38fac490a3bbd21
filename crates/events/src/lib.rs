//! Taleforge event infrastructure.
//!
//! - [`EventBus`]: in-process publish/subscribe hub for [`PlatformEvent`]s,
//!   backed by `tokio::sync::broadcast`.
//! - [`ProgressHub`]: one broadcast topic per running job carrying
//!   [`JobEvent`]s to progress subscribers.
//! - [`EventPersistence`]: background service that durably writes every
//!   platform event to the `events` table.

pub mod bus;
pub mod persistence;
pub mod progress;

pub use bus::{EventBus, PlatformEvent};
pub use persistence::EventPersistence;
pub use progress::{JobEvent, ProgressHub};
