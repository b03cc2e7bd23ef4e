//! Wire shape of a queue message and the four durable queues it travels
//! through (spec §4.2).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Ocr,
    Pipeline,
    Push,
    DeadLetter,
}

impl QueueName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Pipeline => "pipeline",
            Self::Push => "push",
            Self::DeadLetter => "dead_letter",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable message as read back from the queue table. `payload` is
/// the job id plus whatever stage-specific envelope the producer wrote;
/// consumers deserialize it against their own envelope type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: i64,
    pub queue: String,
    pub payload: serde_json::Value,
    pub retry_count: u32,
    pub lease_owner: Option<String>,
}
