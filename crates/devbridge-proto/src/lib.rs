//! Devbridge shared data model
//!
//! Types exchanged between the tunnel manager, the push dispatcher, the
//! token/tunnel HTTP surface and the streaming client.

pub mod error;
pub mod push;
pub mod tunnel;

pub use error::ErrorKind;
pub use push::{
    Notification, NotificationData, Platform, PushToken, SessionEvent, SessionEventKind,
};
pub use tunnel::{ProviderKind, TunnelInfo};

/// Path prefix served by the token API behind the reverse proxy
pub const PUSH_TOKEN_PREFIX: &str = "/push-token";
