//! NATS publisher for prediction replies

use crate::types::prediction::Reply;
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::debug;

/// Publishes replies to the request's inbox, or a fallback subject
#[derive(Clone)]
pub struct ReplyProducer {
    client: Client,
    fallback_subject: String,
}

impl ReplyProducer {
    pub fn new(client: Client, fallback_subject: &str) -> Self {
        Self {
            client,
            fallback_subject: fallback_subject.to_string(),
        }
    }

    /// Publish a reply. `reply_to` is the requester's inbox, if any.
    pub async fn publish(&self, reply_to: Option<Subject>, reply: &Reply) -> Result<()> {
        let payload = serde_json::to_vec(reply)?;
        let subject = reply_to.unwrap_or_else(|| Subject::from(self.fallback_subject.as_str()));

        debug!(
            request_id = %reply.request_id(),
            subject = %subject,
            "Publishing reply"
        );
        self.client.publish(subject, payload.into()).await?;

        Ok(())
    }

    pub fn fallback_subject(&self) -> &str {
        &self.fallback_subject
    }
}
