//! Session event → notification templates

use devbridge_proto::{Notification, NotificationData, SessionEvent, SessionEventKind};

/// Longest body text kept before truncation
pub const MAX_BODY_CHARS: usize = 100;

/// Bridge context attached to every notification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationContext {
    /// Public URL the device should connect to
    pub server_url: Option<String>,
    pub project_path: Option<String>,
}

/// Cut `text` to `max` characters, marking the cut with `...`
pub fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn body_or(text: Option<&str>, fallback: &str) -> String {
    match text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => truncate(text, MAX_BODY_CHARS),
        None => fallback.to_string(),
    }
}

fn data(event_type: &str, session_id: Option<&str>, ctx: &NotificationContext) -> NotificationData {
    NotificationData {
        event_type: event_type.to_string(),
        server_url: ctx.server_url.clone(),
        project_path: ctx.project_path.clone(),
        session_id: session_id.map(str::to_string),
    }
}

/// Map a session event to its notification; `None` for events that never notify
pub fn notification_for(event: &SessionEvent, ctx: &NotificationContext) -> Option<Notification> {
    let kind = event.kind()?;
    let (title, body) = match kind {
        SessionEventKind::Completed => (
            "✅ Session Complete",
            body_or(event.message.as_deref(), "Task completed"),
        ),
        SessionEventKind::Errored => (
            "❌ Session Error",
            body_or(event.message.as_deref(), "An error occurred"),
        ),
        SessionEventKind::PermissionRequested => (
            "🔐 Permission Required",
            body_or(
                event.title.as_deref().or(event.message.as_deref()),
                "Action requires approval",
            ),
        ),
    };

    Some(Notification {
        title: title.to_string(),
        body,
        data: data(kind.as_str(), event.session_id.as_deref(), ctx),
    })
}

/// Synthetic notification for diagnostics
pub fn test_notification(ctx: &NotificationContext) -> Notification {
    Notification {
        title: "🧪 Test Notification".to_string(),
        body: "Push notifications are working!".to_string(),
        data: data("test", None, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NotificationContext {
        NotificationContext {
            server_url: Some("https://abc.ngrok.app".to_string()),
            project_path: Some("/work/app".to_string()),
        }
    }

    #[test]
    fn test_completed_template() {
        let mut event = SessionEvent::new("session.idle");
        event.session_id = Some("s1".to_string());

        let n = notification_for(&event, &ctx()).unwrap();

        assert_eq!(n.title, "✅ Session Complete");
        assert_eq!(n.body, "Task completed");
        assert_eq!(n.data.event_type, "session.completed");
        assert_eq!(n.data.session_id.as_deref(), Some("s1"));
        assert_eq!(n.data.server_url.as_deref(), Some("https://abc.ngrok.app"));
        assert_eq!(n.data.project_path.as_deref(), Some("/work/app"));
    }

    #[test]
    fn test_error_message_is_truncated() {
        let mut event = SessionEvent::new("session.error");
        event.message = Some("x".repeat(250));

        let n = notification_for(&event, &ctx()).unwrap();

        assert_eq!(n.title, "❌ Session Error");
        assert_eq!(n.body.chars().count(), MAX_BODY_CHARS + 3);
        assert!(n.body.ends_with("..."));
    }

    #[test]
    fn test_permission_uses_title() {
        let mut event = SessionEvent::new("permission.updated");
        event.title = Some("Run `cargo publish`".to_string());

        let n = notification_for(&event, &ctx()).unwrap();

        assert_eq!(n.title, "🔐 Permission Required");
        assert_eq!(n.body, "Run `cargo publish`");
        assert_eq!(n.data.event_type, "permission.requested");
    }

    #[test]
    fn test_unknown_events_do_not_notify() {
        for event_type in ["file.edited", "session.updated", "message.part.updated", ""] {
            assert!(notification_for(&SessionEvent::new(event_type), &ctx()).is_none());
        }
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 3), "ééé...");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
        assert_eq!(truncate("  padded  ", 10), "padded");
    }

    #[test]
    fn test_test_notification() {
        let n = test_notification(&NotificationContext::default());
        assert_eq!(n.data.event_type, "test");
        assert!(n.data.server_url.is_none());
    }
}
