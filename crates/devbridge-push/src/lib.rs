//! Push notifications for a development bridge
//!
//! - [`TokenStore`]: durable device registry, unique by device id
//! - [`PushDispatcher`]: batched relay sends that prune dead tokens
//! - [`events`]: pure session event → notification mapping
//! - [`api`]: the `/push-token` HTTP surface

pub mod api;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod relay;
pub mod store;

pub use dispatcher::{DispatchReport, PushDispatcher};
pub use error::PushError;
pub use events::{notification_for, NotificationContext};
pub use relay::{RelayClient, EXPO_PUSH_URL};
pub use store::TokenStore;
