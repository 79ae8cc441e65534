use std::collections::HashSet;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{message::QueueNames, retry::RetryConfig};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    #[serde(default = "default_entry_queue")]
    pub entry_queue_name: String,
    #[serde(default = "default_validation_queue")]
    pub validation_queue_name: String,
    #[serde(default = "default_retry_queue")]
    pub retry_queue_name: String,
    #[serde(default = "default_dlq_queue")]
    pub dlq_queue_name: String,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_reconnect_attempts")]
    pub broker_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub broker_reconnect_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub broker_reconnect_max_delay_ms: u64,

    #[serde(default = "default_store_capacity")]
    pub status_store_capacity: usize,
    #[serde(default = "default_status_ttl_seconds")]
    pub status_ttl_seconds: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub status_sweep_interval_seconds: u64,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_entry_queue() -> String {
    "entry".to_string()
}

fn default_validation_queue() -> String {
    "validation".to_string()
}

fn default_retry_queue() -> String {
    "retry".to_string()
}

fn default_dlq_queue() -> String {
    "dlq".to_string()
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> u64 {
    2
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_store_capacity() -> usize {
    100_000
}

fn default_status_ttl_seconds() -> u64 {
    3_600
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

fn default_server_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;

        Ok(config)
    }

    /// Builds a config from explicit `(NAME, value)` pairs instead of the
    /// process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let config = envy::from_iter::<_, Self>(
            vars.into_iter().map(|(k, v)| (k.into(), v.into())),
        )
        .map_err(|e| anyhow!("Invalid or missing configuration value: {}", e))?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.rabbitmq_url.trim().is_empty() {
            return Err(anyhow!("RABBITMQ_URL must not be empty"));
        }

        let queues = self.queue_names();
        let distinct: HashSet<&str> = queues.all().into_iter().collect();
        if distinct.len() != 4 {
            return Err(anyhow!("Queue names must be distinct"));
        }

        if self.max_retry_attempts == 0 {
            return Err(anyhow!("MAX_RETRY_ATTEMPTS must be at least 1"));
        }

        if self.broker_reconnect_attempts == 0 {
            return Err(anyhow!("BROKER_RECONNECT_ATTEMPTS must be at least 1"));
        }

        if self.retry_backoff_multiplier == 0 {
            return Err(anyhow!("RETRY_BACKOFF_MULTIPLIER must be at least 1"));
        }

        if self.status_store_capacity == 0 {
            return Err(anyhow!("STATUS_STORE_CAPACITY must be at least 1"));
        }

        if self.status_sweep_interval_seconds == 0 {
            return Err(anyhow!("STATUS_SWEEP_INTERVAL_SECONDS must be at least 1"));
        }

        Ok(())
    }

    pub fn queue_names(&self) -> QueueNames {
        QueueNames {
            entry: self.entry_queue_name.clone(),
            validation: self.validation_queue_name.clone(),
            retry: self.retry_queue_name.clone(),
            dlq: self.dlq_queue_name.clone(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn reconnect_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.broker_reconnect_attempts,
            initial_delay_ms: self.broker_reconnect_delay_ms,
            max_delay_ms: self.broker_reconnect_max_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }
}
