use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::models::notification::{NotificationType, ValidatedNotification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Entry,
    Validation,
    Retry,
    #[serde(rename = "dlq")]
    DeadLetter,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Entry, Stage::Validation, Stage::Retry, Stage::DeadLetter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Entry => "entry",
            Stage::Validation => "validation",
            Stage::Retry => "retry",
            Stage::DeadLetter => "dlq",
        }
    }

    /// Stage the retry consumer re-attempts on behalf of `failed_stage`.
    pub fn resumable(failed_stage: Option<Stage>) -> Stage {
        match failed_stage {
            Some(Stage::Validation) => Stage::Validation,
            _ => Stage::Entry,
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub entry: String,
    pub validation: String,
    pub retry: String,
    pub dlq: String,
}

impl QueueNames {
    pub fn name(&self, stage: Stage) -> &str {
        match stage {
            Stage::Entry => &self.entry,
            Stage::Validation => &self.validation,
            Stage::Retry => &self.retry,
            Stage::DeadLetter => &self.dlq,
        }
    }

    pub fn stage_for(&self, queue: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| self.name(*stage) == queue)
    }

    pub fn all(&self) -> Vec<&str> {
        Stage::ALL.iter().map(|stage| self.name(*stage)).collect()
    }
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            entry: Stage::Entry.as_str().to_string(),
            validation: Stage::Validation.as_str().to_string(),
            retry: Stage::Retry.as_str().to_string(),
            dlq: Stage::DeadLetter.as_str().to_string(),
        }
    }
}

/// Failed attempts carried in the message body. Decoding never fails:
/// absent, null, negative or non-numeric values count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attempts(pub u32);

impl Attempts {
    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn next(&self) -> Self {
        Attempts(self.0.saturating_add(1))
    }
}

impl Serialize for Attempts {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for Attempts {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        let count = match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .unwrap_or(0),
            Value::String(s) => s.trim().parse::<u64>().unwrap_or(0),
            _ => 0,
        };

        Ok(Attempts(u32::try_from(count).unwrap_or(u32::MAX)))
    }
}

fn lenient_stage<'de, D>(deserializer: D) -> Result<Option<Stage>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value::<Stage>(value).ok())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub trace_id: Uuid,
    pub message_id: Uuid,
    pub content_message: String,
    pub type_notification: NotificationType,

    #[serde(default, skip_serializing_if = "Attempts::is_zero")]
    pub retry_count: Attempts,

    #[serde(
        default,
        deserialize_with = "lenient_stage",
        skip_serializing_if = "Option::is_none"
    )]
    pub failed_stage: Option<Stage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueMessage {
    pub fn new(trace_id: Uuid, notification: &ValidatedNotification) -> Self {
        Self {
            trace_id,
            message_id: notification.message_id,
            content_message: notification.content_message.clone(),
            type_notification: notification.type_notification,
            retry_count: Attempts::default(),
            failed_stage: None,
            last_error: None,
        }
    }

    /// Copy routed to the retry queue after `stage` failed with `error`.
    pub fn failed_at(&self, stage: Stage, error: String) -> Self {
        Self {
            retry_count: self.retry_count.next(),
            failed_stage: Some(stage),
            last_error: Some(error),
            ..self.clone()
        }
    }

    /// Copy handed back to a pipeline stage; the attempt counter is kept.
    pub fn resumed(&self) -> Self {
        Self {
            failed_stage: None,
            last_error: None,
            ..self.clone()
        }
    }
}
