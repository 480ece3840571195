//! Expo push relay client

use devbridge_proto::NotificationData;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::PushError;

/// Default push relay endpoint
pub const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Relay error reasons meaning the token will never work again
pub const PERMANENT_TOKEN_ERRORS: &[&str] = &["DeviceNotRegistered", "InvalidCredentials"];

/// One message per device token
#[derive(Debug, Clone, Serialize)]
pub struct RelayMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    pub data: NotificationData,
    pub sound: &'static str,
    pub priority: &'static str,
}

impl RelayMessage {
    pub fn new(to: impl Into<String>, title: &str, body: &str, data: &NotificationData) -> Self {
        Self {
            to: to.into(),
            title: title.to_string(),
            body: body.to_string(),
            data: data.clone(),
            sound: "default",
            priority: "high",
        }
    }
}

/// Per-message delivery result, in request order
#[derive(Debug, Clone, Deserialize)]
pub struct RelayTicket {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<TicketDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketDetails {
    #[serde(default)]
    pub error: Option<String>,
}

impl RelayTicket {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    pub fn error(&self) -> Option<&str> {
        self.details.as_ref().and_then(|d| d.error.as_deref())
    }

    /// Whether the relay says this token should be forgotten
    pub fn is_permanent_failure(&self) -> bool {
        !self.is_ok()
            && self
                .error()
                .map(|e| PERMANENT_TOKEN_ERRORS.contains(&e))
                .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct RelayErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelayResponse {
    Tickets(Vec<RelayTicket>),
    Envelope {
        #[serde(default)]
        data: Option<Vec<RelayTicket>>,
        #[serde(default)]
        errors: Option<Vec<RelayErrorBody>>,
    },
}

fn describe(errors: &[RelayErrorBody]) -> String {
    errors
        .iter()
        .map(|e| match &e.code {
            Some(code) => format!("{}: {}", code, e.message),
            None => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Sends batches of messages to the relay in one request
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RelayClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send all `messages` in one request and return one ticket per message
    pub async fn send(&self, messages: &[RelayMessage]) -> Result<Vec<RelayTicket>, PushError> {
        debug!(
            "Sending {} push message(s) to {}",
            messages.len(),
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("accept", "application/json")
            .json(messages)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let parsed = serde_json::from_str::<RelayResponse>(&body);
        match parsed {
            Ok(RelayResponse::Envelope {
                errors: Some(errors),
                ..
            }) if !errors.is_empty() => Err(PushError::Relay {
                status: status.as_u16(),
                message: describe(&errors),
            }),
            _ if !status.is_success() => Err(PushError::Relay {
                status: status.as_u16(),
                message: body,
            }),
            Ok(RelayResponse::Tickets(tickets))
            | Ok(RelayResponse::Envelope {
                data: Some(tickets),
                ..
            }) => {
                if tickets.len() != messages.len() {
                    return Err(PushError::InvalidResponse(format!(
                        "expected {} tickets, got {}",
                        messages.len(),
                        tickets.len()
                    )));
                }
                Ok(tickets)
            }
            Ok(RelayResponse::Envelope { data: None, .. }) => Err(PushError::InvalidResponse(
                "response carries neither data nor errors".to_string(),
            )),
            Err(e) => Err(PushError::InvalidResponse(e.to_string())),
        }
    }
}
