//! Fan-out of notifications to every registered device

use devbridge_proto::{Notification, Platform, PushToken, SessionEvent};
use serde::Serialize;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::error::PushError;
use crate::events::{notification_for, test_notification, NotificationContext};
use crate::relay::{RelayClient, RelayMessage};
use crate::store::TokenStore;

/// Outcome of one `send`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct DispatchReport {
    /// Messages handed to the relay
    pub attempted: usize,
    /// Messages the relay accepted
    pub delivered: usize,
    /// Tokens removed because the relay reported them permanently invalid
    pub pruned: usize,
}

/// Sends notifications to all stored tokens and prunes dead ones
#[derive(Debug)]
pub struct PushDispatcher {
    store: TokenStore,
    relay: RelayClient,
    context: RwLock<NotificationContext>,
}

impl PushDispatcher {
    pub fn new(store: TokenStore, relay: RelayClient) -> Self {
        Self {
            store,
            relay,
            context: RwLock::new(NotificationContext::default()),
        }
    }

    pub fn with_context(self, context: NotificationContext) -> Self {
        *self.context.write().unwrap_or_else(PoisonError::into_inner) = context;
        self
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn context(&self) -> NotificationContext {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Update the public URL carried in notification data
    pub fn set_server_url(&self, url: Option<String>) {
        self.context
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .server_url = url;
    }

    /// Register or rotate the token for `device_id`
    pub fn register(
        &self,
        device_id: &str,
        token: &str,
        platform: Platform,
    ) -> Result<(), PushError> {
        self.store.upsert(PushToken::new(device_id, token, platform))?;
        info!("📱 Registered push token for device {} ({})", device_id, platform.as_str());
        Ok(())
    }

    /// Forget `device_id`; unknown ids are not an error
    pub fn unregister(&self, device_id: &str) -> Result<(), PushError> {
        if self.store.remove(device_id)? {
            info!("Unregistered push token for device {}", device_id);
        } else {
            debug!("Unregister for unknown device {}", device_id);
        }
        Ok(())
    }

    /// Number of registered devices
    pub fn count(&self) -> usize {
        self.store.load().len()
    }

    /// Send `notification` to every stored token in one relay request
    pub async fn send(&self, notification: &Notification) -> Result<DispatchReport, PushError> {
        let tokens = self.store.load();
        if tokens.is_empty() {
            debug!("No push tokens registered, skipping '{}'", notification.title);
            return Ok(DispatchReport::default());
        }

        let messages: Vec<RelayMessage> = tokens
            .iter()
            .map(|t| {
                RelayMessage::new(
                    t.token.clone(),
                    &notification.title,
                    &notification.body,
                    &notification.data,
                )
            })
            .collect();

        let tickets = self.relay.send(&messages).await?;

        let mut report = DispatchReport {
            attempted: messages.len(),
            ..Default::default()
        };
        let mut invalid = Vec::new();
        for (token, ticket) in tokens.iter().zip(&tickets) {
            if ticket.is_ok() {
                report.delivered += 1;
            } else if ticket.is_permanent_failure() {
                warn!(
                    "Push token for device {} rejected ({}), removing it",
                    token.device_id,
                    ticket.error().unwrap_or("unknown")
                );
                invalid.push(token.token.clone());
            } else {
                warn!(
                    "Push to device {} failed: {} {}",
                    token.device_id,
                    ticket.error().unwrap_or("unknown"),
                    ticket.message.as_deref().unwrap_or("")
                );
            }
        }

        report.pruned = self.store.remove_tokens(&invalid)?;
        info!(
            "🔔 '{}' sent to {}/{} device(s), {} pruned",
            notification.title, report.delivered, report.attempted, report.pruned
        );
        Ok(report)
    }

    /// Notify for a session event; events without a template are ignored
    pub async fn send_event(
        &self,
        event: &SessionEvent,
    ) -> Result<Option<DispatchReport>, PushError> {
        match notification_for(event, &self.context()) {
            Some(notification) => self.send(&notification).await.map(Some),
            None => {
                debug!("No notification for event type '{}'", event.event_type);
                Ok(None)
            }
        }
    }

    /// Send a synthetic notification to every device
    pub async fn send_test(&self) -> Result<DispatchReport, PushError> {
        self.send(&test_notification(&self.context())).await
    }
}
