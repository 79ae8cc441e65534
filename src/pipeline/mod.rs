//! Stage state machine: `entry → validation`, with failed stages parked on
//! `retry` where the failed work is re-attempted until it succeeds or the
//! notification is sent to `dlq`.
//!
//! [`Pipeline::handle`] is broker-agnostic: it decodes one delivery body,
//! runs the stage's work, republishes through a [`MessagePublisher`] and
//! updates the [`StatusStore`]. The caller acknowledges the delivery only
//! when it returns `Ok`.

pub mod consumer;
pub mod handler;

use std::{sync::Arc, time::Duration};

use anyhow::Error;
use tokio::{sync::watch, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    clients::rbmq::MessagePublisher,
    error::BrokerError,
    models::{
        message::{QueueMessage, QueueNames, Stage},
        retry::RetryConfig,
        status::{NotificationStatus, StatusUpdate},
    },
    pipeline::handler::NotificationHandler,
    store::StatusStore,
    utils::backoff_delay,
};

/// What the consumer should do with the delivery after handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// The body can never be processed; drop it without requeue.
    Reject,
    /// Shutdown interrupted the work; hand the delivery back to the broker.
    Requeue,
}

pub struct Pipeline {
    store: Arc<StatusStore>,
    publisher: Arc<dyn MessagePublisher>,
    handler: Arc<dyn NotificationHandler>,
    queues: QueueNames,
    retry: RetryConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Pipeline {
    pub fn new(
        store: Arc<StatusStore>,
        publisher: Arc<dyn MessagePublisher>,
        handler: Arc<dyn NotificationHandler>,
        queues: QueueNames,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            handler,
            queues,
            retry,
            shutdown: None,
        }
    }

    /// Lets a shutdown signal cut short the retry backoff.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn queues(&self) -> &QueueNames {
        &self.queues
    }

    pub async fn handle(&self, stage: Stage, payload: &[u8]) -> Result<Disposition, BrokerError> {
        let message = match serde_json::from_slice::<QueueMessage>(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(stage = %stage, error = %e, "Undecodable message rejected");
                return Ok(Disposition::Reject);
            }
        };

        info!(
            stage = %stage,
            trace_id = %message.trace_id,
            message_id = %message.message_id,
            retry_count = message.retry_count.get(),
            "Processing notification message"
        );

        if stage != Stage::DeadLetter && self.store.is_terminal(&message.trace_id).await {
            info!(
                stage = %stage,
                trace_id = %message.trace_id,
                "Notification already finished, skipping duplicate delivery"
            );
            return Ok(Disposition::Ack);
        }

        match stage {
            Stage::Entry => self.process_entry(message).await?,
            Stage::Validation => self.process_validation(message).await?,
            Stage::Retry => return self.process_retry(message).await,
            Stage::DeadLetter => self.process_dead_letter(message).await,
        }

        Ok(Disposition::Ack)
    }

    async fn process_entry(&self, message: QueueMessage) -> Result<(), BrokerError> {
        match self.handler.intake(&message).await {
            Ok(()) => self.complete_entry(&message).await,
            Err(e) => self.park_for_retry(Stage::Entry, &message, e).await,
        }
    }

    async fn process_validation(&self, message: QueueMessage) -> Result<(), BrokerError> {
        match self.handler.prepare(&message).await {
            Ok(()) => {
                self.complete_validation(&message).await;
                Ok(())
            }
            Err(e) => self.park_for_retry(Stage::Validation, &message, e).await,
        }
    }

    /// Hands a message whose intake succeeded to the validation stage. The
    /// status write is skipped by the store when validation already moved
    /// the record past this attempt.
    async fn complete_entry(&self, message: &QueueMessage) -> Result<(), BrokerError> {
        self.forward(Stage::Validation, &message.resumed()).await?;
        self.store
            .update_status(
                &message.trace_id,
                NotificationStatus::Processed,
                message.retry_count.get(),
                None,
            )
            .await;
        Ok(())
    }

    async fn complete_validation(&self, message: &QueueMessage) {
        self.store
            .update_status(
                &message.trace_id,
                NotificationStatus::Validated,
                message.retry_count.get(),
                None,
            )
            .await;

        info!(
            trace_id = %message.trace_id,
            type_notification = %message.type_notification,
            "Notification validated"
        );
    }

    async fn park_for_retry(
        &self,
        stage: Stage,
        message: &QueueMessage,
        error: Error,
    ) -> Result<(), BrokerError> {
        warn!(
            stage = %stage,
            trace_id = %message.trace_id,
            error = %error,
            "Stage failed, routing to retry"
        );

        let failed = message.failed_at(stage, error.to_string());
        self.forward(Stage::Retry, &failed).await?;
        self.mark_retrying(&failed).await;

        Ok(())
    }

    async fn process_retry(&self, message: QueueMessage) -> Result<Disposition, BrokerError> {
        let attempts = message.retry_count.get();

        if attempts >= self.retry.max_attempts {
            self.dead_letter(&message).await?;
            return Ok(Disposition::Ack);
        }

        let stage = Stage::resumable(message.failed_stage);
        let delay = backoff_delay(&self.retry, attempts);

        debug!(
            trace_id = %message.trace_id,
            stage = %stage,
            attempt = attempts + 1,
            delay_ms = delay.as_millis() as u64,
            "Waiting before retry attempt"
        );
        if !self.backoff(delay).await {
            info!(trace_id = %message.trace_id, "Retry backoff interrupted by shutdown");
            return Ok(Disposition::Requeue);
        }

        let outcome = match stage {
            Stage::Validation => self.handler.prepare(&message).await,
            _ => self.handler.intake(&message).await,
        };

        match outcome {
            Ok(()) => {
                info!(
                    trace_id = %message.trace_id,
                    stage = %stage,
                    attempts,
                    "Retry attempt succeeded"
                );

                let resumed = message.resumed();
                match stage {
                    Stage::Validation => self.complete_validation(&resumed).await,
                    _ => self.complete_entry(&resumed).await?,
                }
                Ok(Disposition::Ack)
            }
            Err(e) => {
                let failed = message.failed_at(stage, e.to_string());

                if failed.retry_count.get() >= self.retry.max_attempts {
                    self.dead_letter(&failed).await?;
                } else {
                    warn!(
                        trace_id = %failed.trace_id,
                        stage = %stage,
                        retry_count = failed.retry_count.get(),
                        error = %e,
                        "Retry attempt failed"
                    );
                    self.forward(Stage::Retry, &failed).await?;
                }

                self.mark_retrying(&failed).await;
                Ok(Disposition::Ack)
            }
        }
    }

    /// Waits out the retry delay. Returns `false` when shutdown fired first.
    async fn backoff(&self, delay: Duration) -> bool {
        let Some(mut shutdown) = self.shutdown.clone() else {
            sleep(delay).await;
            return true;
        };

        tokio::select! {
            _ = sleep(delay) => true,
            true = async { shutdown.wait_for(|stop| *stop).await.is_ok() } => false,
        }
    }

    async fn dead_letter(&self, message: &QueueMessage) -> Result<(), BrokerError> {
        warn!(
            trace_id = %message.trace_id,
            retry_count = message.retry_count.get(),
            max_attempts = self.retry.max_attempts,
            "Retry attempts exhausted, routing to dead-letter queue"
        );

        self.forward(Stage::DeadLetter, message).await
    }

    async fn process_dead_letter(&self, message: QueueMessage) {
        let reason = message
            .last_error
            .clone()
            .unwrap_or_else(|| "retry attempts exhausted".to_string());

        let update = self
            .store
            .update_status(
                &message.trace_id,
                NotificationStatus::FailedDlq,
                message.retry_count.get(),
                Some(reason.clone()),
            )
            .await;

        if update == StatusUpdate::Missing {
            warn!(trace_id = %message.trace_id, "Dead-lettered notification has no status record");
        }

        warn!(
            trace_id = %message.trace_id,
            message_id = %message.message_id,
            reason = %reason,
            "Notification failed permanently"
        );
    }

    async fn mark_retrying(&self, message: &QueueMessage) {
        self.store
            .update_status(
                &message.trace_id,
                NotificationStatus::Retrying,
                message.retry_count.get(),
                message.last_error.clone(),
            )
            .await;
    }

    async fn forward(&self, stage: Stage, message: &QueueMessage) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(message)?;
        self.publisher.publish(self.queues.name(stage), &body).await
    }
}
