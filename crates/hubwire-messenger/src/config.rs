use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MessengerError, Result};

/// Which physical write primitive the outbound channel uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Fire-and-forget characteristic writes.
    #[default]
    WithoutResponse,
    /// Confirmed writes, for stacks that drop the link on silent writes.
    WithResponse,
}

/// Messenger timing and retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessengerConfig {
    /// Window for one attempt to settle, in milliseconds.
    pub message_send_timeout_ms: u64,
    /// How many times a timed-out attempt is retried.
    pub max_message_send_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub initial_message_send_retry_delay_ms: u64,
    /// Physical write primitive.
    pub write_mode: WriteMode,
    /// Capacity of each shared reply broadcast.
    pub reply_buffer: usize,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            message_send_timeout_ms: 200,
            max_message_send_attempts: 5,
            initial_message_send_retry_delay_ms: 50,
            write_mode: WriteMode::WithoutResponse,
            reply_buffer: 64,
        }
    }
}

impl MessengerConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)
            .map_err(|err| MessengerError::ConfigLoad(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|err| MessengerError::ConfigLoad(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&input)
    }

    /// Reject values the messenger cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.message_send_timeout_ms == 0 {
            return Err(MessengerError::Config {
                field: "message_send_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.reply_buffer == 0 {
            return Err(MessengerError::Config {
                field: "reply_buffer",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn message_send_timeout(&self) -> Duration {
        Duration::from_millis(self.message_send_timeout_ms)
    }

    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_message_send_retry_delay_ms)
    }

    /// Backoff before retry `attempt` (1-based): `2^(attempt-1) * initial`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let shift = (attempt - 1).min(31);
        let millis = self
            .initial_message_send_retry_delay_ms
            .saturating_mul(1u64 << shift);
        Duration::from_millis(millis)
    }
}
