//! Durable queue fabric backing the job pipeline's four stages.

mod fabric;
mod message;

pub use fabric::QueueFabric;
pub use message::{QueueMessage, QueueName};
