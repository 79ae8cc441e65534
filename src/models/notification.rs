use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use anyhow::{Error, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::models::status::NotificationStatus;

pub const ACCEPTED_MESSAGE: &str = "accepted-message";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationType {
    Email,
    Sms,
    Push,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Email => "EMAIL",
            NotificationType::Sms => "SMS",
            NotificationType::Push => "PUSH",
        }
    }
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "EMAIL" => Ok(NotificationType::Email),
            "SMS" => Ok(NotificationType::Sms),
            "PUSH" => Ok(NotificationType::Push),
            _ => Err(anyhow!(
                "Invalid typeNotification '{}'. Use one of these: EMAIL, SMS, PUSH",
                value
            )),
        }
    }
}

impl<'de> Deserialize<'de> for NotificationType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Body of `POST /api/notify`. Every field is optional at the decoding
/// layer so missing values surface as validation errors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    #[serde(default)]
    pub message_id: Option<Uuid>,
    #[serde(default)]
    pub content_message: Option<String>,
    #[serde(default)]
    pub type_notification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedNotification {
    pub message_id: Uuid,
    pub content_message: String,
    pub type_notification: NotificationType,
}

impl NotifyRequest {
    pub fn validate(self) -> Result<ValidatedNotification, Error> {
        let content_message = self
            .content_message
            .ok_or_else(|| anyhow!("contentMessage is required"))?;

        if content_message.trim().is_empty() {
            return Err(anyhow!("contentMessage cannot be empty"));
        }

        let type_notification = self
            .type_notification
            .ok_or_else(|| anyhow!("typeNotification is required"))?
            .parse::<NotificationType>()?;

        Ok(ValidatedNotification {
            message_id: self.message_id.unwrap_or_else(Uuid::new_v4),
            content_message,
            type_notification,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyAccepted {
    pub message_id: Uuid,
    pub trace_id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub trace_id: Uuid,
    pub message_id: Uuid,
    pub content_message: String,
    pub type_notification: NotificationType,
    pub status: NotificationStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn received(trace_id: Uuid, notification: &ValidatedNotification) -> Self {
        let now = Utc::now();

        Self {
            trace_id,
            message_id: notification.message_id,
            content_message: notification.content_message.clone(),
            type_notification: notification.type_notification,
            status: NotificationStatus::Received,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
