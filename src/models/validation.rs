use anyhow::{Result, anyhow};

use crate::models::notification::NotificationType;

pub const MAX_SMS_CHARS: usize = 1_600;
pub const MAX_PUSH_BYTES: usize = 4_096;
pub const MAX_EMAIL_CHARS: usize = 100_000;

pub fn validate_content(channel: NotificationType, content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(anyhow!("Content cannot be empty"));
    }

    let has_control_chars = content
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t');

    if has_control_chars {
        return Err(anyhow!("Content contains control characters"));
    }

    match channel {
        NotificationType::Sms => {
            let length = content.chars().count();
            if length > MAX_SMS_CHARS {
                return Err(anyhow!(
                    "SMS content too long ({} characters, maximum {})",
                    length,
                    MAX_SMS_CHARS
                ));
            }
        }
        NotificationType::Push => {
            if content.len() > MAX_PUSH_BYTES {
                return Err(anyhow!(
                    "Push content too long ({} bytes, maximum {})",
                    content.len(),
                    MAX_PUSH_BYTES
                ));
            }
        }
        NotificationType::Email => {
            let length = content.chars().count();
            if length > MAX_EMAIL_CHARS {
                return Err(anyhow!(
                    "Email content too long ({} characters, maximum {})",
                    length,
                    MAX_EMAIL_CHARS
                ));
            }
        }
    }

    Ok(())
}
