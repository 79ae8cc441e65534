use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::models::{message::QueueMessage, validation::validate_content};

/// Work performed by the entry and validation stages. The retry stage calls
/// the same methods when it re-attempts a failed stage.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Entry stage: basic intake checks.
    async fn intake(&self, message: &QueueMessage) -> Result<()>;

    /// Validation stage: per-channel delivery preparation.
    async fn prepare(&self, message: &QueueMessage) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelRules;

#[async_trait]
impl NotificationHandler for ChannelRules {
    async fn intake(&self, message: &QueueMessage) -> Result<()> {
        if message.trace_id.is_nil() {
            return Err(anyhow!("traceId must not be nil"));
        }

        if message.message_id.is_nil() {
            return Err(anyhow!("messageId must not be nil"));
        }

        if message.content_message.trim().is_empty() {
            return Err(anyhow!("contentMessage cannot be empty"));
        }

        Ok(())
    }

    async fn prepare(&self, message: &QueueMessage) -> Result<()> {
        validate_content(message.type_notification, &message.content_message)
    }
}
