//! Conversation channels between a requester and a provider. Lifecycle
//! transitions post system messages here as a side effect; a failure is
//! logged by the caller and never rolls back the transition.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("messaging failure: {0}")]
pub struct MessagingError(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct SystemMessage {
    pub id: Uuid,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct Messaging {
    channels: DashMap<String, Vec<SystemMessage>>,
}

impl Messaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_id(requester_id: Uuid, provider_id: Uuid) -> String {
        format!("{requester_id}_{provider_id}")
    }

    /// Creates the channel if it does not exist yet; reuses it otherwise.
    pub fn ensure_channel(&self, requester_id: Uuid, provider_id: Uuid) -> String {
        let id = Self::channel_id(requester_id, provider_id);
        self.channels.entry(id.clone()).or_default();
        id
    }

    pub fn post_system_message(
        &self,
        channel_id: &str,
        body: impl Into<String>,
    ) -> Result<SystemMessage, MessagingError> {
        let mut channel = self
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| MessagingError(format!("channel {channel_id} does not exist")))?;

        let message = SystemMessage {
            id: Uuid::new_v4(),
            body: body.into(),
            sent_at: Utc::now(),
        };
        channel.push(message.clone());
        Ok(message)
    }

    pub fn messages(&self, channel_id: &str) -> Option<Vec<SystemMessage>> {
        self.channels
            .get(channel_id)
            .map(|channel| channel.clone())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::Messaging;

    #[test]
    fn channel_is_reused_and_collects_messages() {
        let messaging = Messaging::new();
        let requester = Uuid::from_u128(1);
        let provider = Uuid::from_u128(2);

        let first = messaging.ensure_channel(requester, provider);
        let second = messaging.ensure_channel(requester, provider);
        assert_eq!(first, second);

        messaging.post_system_message(&first, "quote accepted").unwrap();
        messaging.post_system_message(&first, "order completed").unwrap();

        let messages = messaging.messages(&first).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, "quote accepted");
    }

    #[test]
    fn posting_to_missing_channel_fails() {
        let messaging = Messaging::new();
        assert!(messaging.post_system_message("nope", "hello").is_err());
    }
}
