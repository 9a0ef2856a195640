// src/core/repository/traffic.rs

use crate::core::errors::CoreError;
use crate::core::model::TrafficRow;
use async_trait::async_trait;

/// Abstract access to the durable, append-only traffic accounting table.
#[async_trait]
pub trait TrafficRowRepository: Send + Sync {
    async fn insert_batch(&self, rows: Vec<TrafficRow>) -> Result<(), CoreError>;
}
