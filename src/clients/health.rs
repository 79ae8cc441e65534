use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::rbmq::MessagePublisher,
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
    store::StatusStore,
};

/// Occupancy ratio above which the status store reports degraded.
const STORE_DEGRADED_RATIO: f64 = 0.9;

pub struct HealthChecker {
    publisher: Arc<dyn MessagePublisher>,
    store: Arc<StatusStore>,
}

impl HealthChecker {
    pub fn new(publisher: Arc<dyn MessagePublisher>, store: Arc<StatusStore>) -> Self {
        Self { publisher, store }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        let broker_health = self.check_broker().await;
        checks.insert("message_broker".to_string(), broker_health);

        let store_health = self.check_status_store().await;
        checks.insert("status_store".to_string(), store_health);

        let overall_status = self.determine_overall_status(&checks);

        HealthCheckResponse {
            status: overall_status,
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_broker(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.publisher.check_connection().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Broker health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Broker health check failed");
                ServiceHealth::unhealthy(e.to_string())
            }
        }
    }

    async fn check_status_store(&self) -> ServiceHealth {
        let start = Instant::now();
        let len = self.store.len().await;
        let capacity = self.store.capacity();
        let detail = format!("{}/{} records", len, capacity);

        if len as f64 >= capacity as f64 * STORE_DEGRADED_RATIO {
            warn!(len, capacity, "Status store close to capacity");
            return ServiceHealth::degraded(detail);
        }

        ServiceHealth::healthy(start.elapsed().as_millis() as u64).with_detail(detail)
    }

    fn determine_overall_status(&self, checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
        let has_unhealthy = checks
            .values()
            .any(|health| health.status == HealthStatus::Unhealthy);

        let has_degraded = checks
            .values()
            .any(|health| health.status == HealthStatus::Degraded);

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
