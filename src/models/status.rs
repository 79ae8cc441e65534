use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Received,
    Processed,
    Retrying,
    Validated,
    FailedDlq,
}

impl NotificationStatus {
    /// Terminal statuses are never replaced by a different status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NotificationStatus::Validated | NotificationStatus::FailedDlq
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Received => "RECEIVED",
            NotificationStatus::Processed => "PROCESSED",
            NotificationStatus::Retrying => "RETRYING",
            NotificationStatus::Validated => "VALIDATED",
            NotificationStatus::FailedDlq => "FAILED_DLQ",
        }
    }
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a single status update against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied,
    Unchanged,
    TerminalKept(NotificationStatus),
    /// A non-terminal update from an attempt the record already moved past.
    Stale,
    Missing,
}
