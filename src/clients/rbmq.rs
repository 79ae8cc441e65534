use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{config::Config, error::BrokerError, models::message::QueueNames};

const PERSISTENT: u8 = 2;
const REPLY_SUCCESS: u16 = 200;

/// Publishing seam between the pipeline and the broker.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), BrokerError>;

    async fn check_connection(&self) -> Result<(), BrokerError>;
}

struct BrokerSession {
    connection: Connection,
    channel: Channel,
}

impl BrokerSession {
    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }
}

/// Owns the single connection and channel shared by the publisher side and
/// every stage consumer.
pub struct BrokerGateway {
    url: String,
    prefetch_count: u16,
    queues: QueueNames,
    session: Mutex<Option<BrokerSession>>,
}

impl BrokerGateway {
    pub fn new(config: &Config) -> Self {
        Self::with_queues(&config.rabbitmq_url, config.prefetch_count, config.queue_names())
    }

    pub fn with_queues(url: &str, prefetch_count: u16, queues: QueueNames) -> Self {
        Self {
            url: url.to_string(),
            prefetch_count,
            queues,
            session: Mutex::new(None),
        }
    }

    /// Opens the connection and channel unless an open session exists.
    pub async fn connect(&self) -> Result<(), BrokerError> {
        let mut session = self.session.lock().await;

        if session.as_ref().is_some_and(BrokerSession::is_open) {
            return Ok(());
        }

        *session = Some(self.open_session().await?);
        Ok(())
    }

    pub async fn close(&self) {
        let Some(session) = self.session.lock().await.take() else {
            debug!("Broker gateway already closed");
            return;
        };

        if let Err(e) = session.channel.close(REPLY_SUCCESS, "Gateway closing").await {
            debug!(error = %e, "Broker channel already closed");
        }

        if let Err(e) = session.connection.close(REPLY_SUCCESS, "Gateway closing").await {
            debug!(error = %e, "Broker connection already closed");
        }

        info!("RabbitMQ connection closed");
    }

    pub async fn subscribe(&self, queue: &str, consumer_tag: &str) -> Result<Consumer, BrokerError> {
        let (channel, _) = self.channel().await?;

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Connection(format!("Failed to create consumer: {}", e)))?;

        info!(queue, consumer_tag, "Consumer subscribed to queue");

        Ok(consumer)
    }

    /// Returns an open channel, reconnecting at most once. The flag reports
    /// whether a reconnect happened.
    async fn channel(&self) -> Result<(Channel, bool), BrokerError> {
        let mut session = self.session.lock().await;

        if let Some(open) = session.as_ref().filter(|s| s.is_open()) {
            return Ok((open.channel.clone(), false));
        }

        warn!("RabbitMQ channel unavailable, attempting to reconnect");

        let fresh = self.open_session().await.map_err(|e| {
            warn!(error = %e, "Reconnect to RabbitMQ failed");
            BrokerError::Unavailable(e.to_string())
        })?;
        let channel = fresh.channel.clone();
        *session = Some(fresh);

        info!("RabbitMQ connection re-established");

        Ok((channel, true))
    }

    async fn open_session(&self) -> Result<BrokerSession, BrokerError> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        connection.on_error(|error| {
            warn!(error = %error, "RabbitMQ connection lost");
        });

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(format!("Channel creation failed: {}", e)))?;

        channel
            .basic_qos(self.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Connection(format!("Failed to set up QoS: {}", e)))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| {
                BrokerError::Connection(format!("Failed to enable publisher confirms: {}", e))
            })?;

        for queue in self.queues.all() {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    BrokerError::Connection(format!("Failed to declare queue {}: {}", queue, e))
                })?;

            debug!(queue, "Durable queue declared");
        }

        info!(prefetch_count = self.prefetch_count, "RabbitMQ connection established");

        Ok(BrokerSession {
            connection,
            channel,
        })
    }

    async fn publish_on(channel: &Channel, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
        let publish_error = |e: lapin::Error| BrokerError::Publish {
            queue: queue.to_string(),
            reason: e.to_string(),
        };

        let confirmation = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_delivery_mode(PERSISTENT)
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;

        if confirmation.is_nack() {
            return Err(BrokerError::Nacked(queue.to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl MessagePublisher for BrokerGateway {
    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
        let (channel, reconnected) = self.channel().await?;

        match Self::publish_on(&channel, queue, body).await {
            Ok(()) => {}
            Err(BrokerError::Publish { reason, .. }) if !reconnected => {
                warn!(queue, error = %reason, "Publish failed, retrying on a fresh channel");

                let (channel, _) = self.channel().await?;
                Self::publish_on(&channel, queue, body).await?;
            }
            Err(e) => return Err(e),
        }

        debug!(queue, bytes = body.len(), "Message published");
        Ok(())
    }

    async fn check_connection(&self) -> Result<(), BrokerError> {
        let session = self.session.lock().await;

        match session.as_ref() {
            Some(s) if s.is_open() => Ok(()),
            Some(_) => Err(BrokerError::Unavailable("connection lost".to_string())),
            None => Err(BrokerError::Unavailable("not connected".to_string())),
        }
    }
}
