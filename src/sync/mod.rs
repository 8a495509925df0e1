//! Live occupancy ingestion from the parking sensor stream.
//!
//! One connection is held for the lifetime of the viewer. Each event on the
//! configured channel carries a full sensor payload; the payload replaces
//! the previous one wholesale, there is no incremental merge.

mod sse;

pub use sse::{SseDecoder, SseEvent};

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::models::{occupied_ids, SensorRecord};
use crate::store::MapStore;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Failed to build stream client: {0}")]
    ClientError(String),
}

/// Background task that feeds sensor payloads into the store.
pub struct FeedChannel {
    client: Client,
    config: StreamConfig,
    store: Arc<MapStore>,
}

impl FeedChannel {
    pub fn new(config: StreamConfig, store: Arc<MapStore>) -> Result<Self, FeedError> {
        // No overall timeout: the stream stays open indefinitely
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FeedError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            config,
            store,
        })
    }

    /// Connect and ingest until the stream terminally closes.
    pub async fn start(self: Arc<Self>) {
        info!(
            endpoint = %self.config.endpoint,
            event = %self.config.event,
            "Connecting to parking sensor stream"
        );

        if self.config.with_credentials {
            warn!("Credentialed streaming is not supported, connecting without credentials");
        }

        let response = match self
            .client
            .get(&self.config.endpoint)
            .header("Accept", "text/event-stream")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Failed to connect to sensor stream");
                return;
            }
        };

        if !response.status().is_success() {
            error!(
                status = response.status().as_u16(),
                "Sensor stream rejected the connection"
            );
            return;
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in decoder.push(&bytes) {
                        if event.name == self.config.event {
                            self.ingest(&event.data);
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Sensor stream read failed");
                    break;
                }
            }
        }

        warn!("SSE connection closed");
    }

    /// Apply one event payload to the store.
    fn ingest(&self, data: &str) {
        let records: Vec<SensorRecord> = match serde_json::from_str(data) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, data = excerpt(data, 120), "Non-JSON SSE payload, dropping");
                return;
            }
        };

        // Payloads that arrive before the car model is ready are dropped,
        // never queued; only pushes after readiness land in the store.
        if !self.store.car_model_ready() {
            debug!(records = records.len(), "Car model not ready, discarding sensor payload");
            return;
        }

        let occupied = occupied_ids(&records);
        info!(
            records = records.len(),
            occupied = occupied.len(),
            "Applying sensor payload"
        );
        self.store.set_parking_data(records, occupied);
    }
}

fn excerpt(data: &str, limit: usize) -> &str {
    match data.char_indices().nth(limit) {
        Some((idx, _)) => &data[..idx],
        None => data,
    }
}
