use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use futures_util::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions},
};
use tokio::{sync::watch, task::JoinSet};
use tracing::{debug, error, info, warn};

use crate::{
    clients::rbmq::BrokerGateway,
    models::{message::Stage, retry::RetryConfig},
    pipeline::{Disposition, Pipeline},
    utils::retry_with_backoff,
};

/// Starts one consumer task per stage queue.
pub fn spawn_consumers(
    gateway: Arc<BrokerGateway>,
    pipeline: Arc<Pipeline>,
    reconnect: RetryConfig,
    shutdown: watch::Receiver<bool>,
) -> JoinSet<(Stage, Result<(), Error>)> {
    let mut consumers = JoinSet::new();

    for stage in Stage::ALL {
        let gateway = Arc::clone(&gateway);
        let pipeline = Arc::clone(&pipeline);
        let reconnect = reconnect.clone();
        let shutdown = shutdown.clone();

        consumers.spawn(async move {
            let result = run_consumer(gateway, pipeline, stage, reconnect, shutdown).await;
            (stage, result)
        });
    }

    consumers
}

/// Consumes one stage queue until shutdown. Losing the subscription triggers
/// a bounded reconnect; exhausting it returns an error to the supervisor.
pub async fn run_consumer(
    gateway: Arc<BrokerGateway>,
    pipeline: Arc<Pipeline>,
    stage: Stage,
    reconnect: RetryConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let queue = pipeline.queues().name(stage).to_string();
    let consumer_tag = format!("{}_worker", stage);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let mut consumer = retry_with_backoff(&reconnect, || gateway.subscribe(&queue, &consumer_tag))
            .await
            .map_err(|e| anyhow!("Consumer for queue '{}' could not reconnect: {}", queue, e))?;

        info!(stage = %stage, queue = %queue, "Consumer running, waiting for messages");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(stage = %stage, "Consumer stopping");
                        return Ok(());
                    }
                }
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => process_delivery(&pipeline, stage, delivery).await,
                    Some(Err(e)) => {
                        warn!(stage = %stage, error = %e, "Consumer stream failed, resubscribing");
                        break;
                    }
                    None => {
                        warn!(stage = %stage, "Consumer stream ended, resubscribing");
                        break;
                    }
                },
            }
        }
    }

    Ok(())
}

async fn process_delivery(pipeline: &Pipeline, stage: Stage, delivery: Delivery) {
    let delivery_tag = delivery.delivery_tag;

    if delivery.redelivered {
        debug!(stage = %stage, delivery_tag, "Processing redelivered message");
    }

    let settled = match pipeline.handle(stage, &delivery.data).await {
        Ok(Disposition::Ack) => delivery.acker.ack(BasicAckOptions::default()).await,
        Ok(Disposition::Reject) => {
            delivery
                .acker
                .reject(BasicRejectOptions { requeue: false })
                .await
        }
        Ok(Disposition::Requeue) => {
            delivery
                .acker
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
        }
        Err(e) => {
            error!(stage = %stage, delivery_tag, error = %e, "Stage could not republish, requeueing message");
            delivery
                .acker
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
        }
    };

    if let Err(e) = settled {
        warn!(
            stage = %stage,
            delivery_tag,
            error = %e,
            "Failed to settle delivery, broker will redeliver"
        );
    }
}
