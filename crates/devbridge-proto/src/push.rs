//! Push registration and notification types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mobile platform of a registered device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

/// A device registration, keyed by `device_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PushToken {
    /// Opaque push token handed out by the device's push service
    pub token: String,
    pub platform: Platform,
    /// Unique device identifier
    pub device_id: String,
    pub registered_at: DateTime<Utc>,
}

impl PushToken {
    pub fn new(device_id: impl Into<String>, token: impl Into<String>, platform: Platform) -> Self {
        Self {
            token: token.into(),
            platform,
            device_id: device_id.into(),
            registered_at: Utc::now(),
        }
    }
}

/// Routing context attached to a notification so the device can deep-link
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Event type that produced the notification
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// An ephemeral notification, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: NotificationData,
}

/// Session lifecycle event emitted by the host development server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, alias = "sessionID")]
    pub session_id: Option<String>,
    /// Completion summary or error message
    #[serde(default)]
    pub message: Option<String>,
    /// Permission title for permission requests
    #[serde(default)]
    pub title: Option<String>,
}

/// Event types that produce a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    Completed,
    Errored,
    PermissionRequested,
}

impl SessionEventKind {
    /// Canonical event type carried in notification data
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEventKind::Completed => "session.completed",
            SessionEventKind::Errored => "session.error",
            SessionEventKind::PermissionRequested => "permission.requested",
        }
    }
}

impl SessionEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            session_id: None,
            message: None,
            title: None,
        }
    }

    /// Classify the event; `None` for types that never notify
    pub fn kind(&self) -> Option<SessionEventKind> {
        match self.event_type.as_str() {
            "session.idle" | "session.completed" => Some(SessionEventKind::Completed),
            "session.error" => Some(SessionEventKind::Errored),
            "permission.updated" | "permission.asked" | "permission.requested" => {
                Some(SessionEventKind::PermissionRequested)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_token_wire_format() {
        let token = PushToken::new("d1", "ExponentPushToken[abc]", Platform::Android);
        let value = serde_json::to_value(&token).unwrap();

        assert_eq!(value["deviceId"], "d1");
        assert_eq!(value["platform"], "android");
        assert!(value["registeredAt"].is_string());
    }

    #[test]
    fn test_notification_data_skips_missing_fields() {
        let data = NotificationData {
            event_type: "session.completed".to_string(),
            session_id: Some("s1".to_string()),
            ..Default::default()
        };

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["type"], "session.completed");
        assert_eq!(value["sessionId"], "s1");
        assert!(value.get("serverUrl").is_none());
    }

    #[test]
    fn test_session_event_kind() {
        let parse = |json: &str| serde_json::from_str::<SessionEvent>(json).unwrap();

        assert_eq!(
            parse(r#"{"type":"session.idle","sessionID":"s1"}"#).kind(),
            Some(SessionEventKind::Completed)
        );
        assert_eq!(
            parse(r#"{"type":"session.error","message":"boom"}"#).kind(),
            Some(SessionEventKind::Errored)
        );
        assert_eq!(
            parse(r#"{"type":"permission.updated","title":"Run rm"}"#).kind(),
            Some(SessionEventKind::PermissionRequested)
        );
        assert_eq!(parse(r#"{"type":"file.edited"}"#).kind(), None);
    }
}
