use serde::Serialize;
use tracing::{debug, warn};

/// Batch size used when the caller does not override it.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default ingestion endpoint base.
pub const DEFAULT_ENDPOINT: &str = "https://api.axiom.co";

/// Builds the ingest URL for a named dataset.
pub fn ingest_url(endpoint: &str, dataset: &str) -> String {
    format!(
        "{}/v1/datasets/{}/ingest",
        endpoint.trim_end_matches('/'),
        dataset
    )
}

/// Outcome of one batch submission. `detail` carries the HTTP status, or
/// the transport error text when no response arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub index: usize,
    pub records: usize,
    pub success: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForwardSummary {
    /// Records handed to the forwarder, counted regardless of delivery.
    pub total: usize,
    pub outcomes: Vec<BatchOutcome>,
}

impl ForwardSummary {
    pub fn failed_batches(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }
}

/// Submits records to the ingestion endpoint in fixed-size batches.
/// Each batch is attempted exactly once; retry policy belongs to the
/// caller, as does any request timeout.
pub struct Forwarder {
    client: reqwest::Client,
    ingest_url: String,
    api_token: String,
}

impl Forwarder {
    pub fn new(ingest_url: String, api_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            ingest_url,
            api_token,
        }
    }

    /// Partitions `records` into contiguous batches of at most
    /// `batch_size`, preserving order, and submits each as one JSON array.
    /// A rejected batch is recorded and does not stop the ones after it.
    pub async fn forward<T: Serialize>(&self, records: &[T], batch_size: usize) -> ForwardSummary {
        let batch_size = batch_size.max(1);
        let mut outcomes = Vec::new();

        for (index, batch) in records.chunks(batch_size).enumerate() {
            let response = self
                .client
                .post(&self.ingest_url)
                .bearer_auth(&self.api_token)
                .json(batch)
                .send()
                .await;

            let outcome = match response {
                Ok(response) if response.status().is_success() => {
                    debug!("batch {} delivered ({} records)", index + 1, batch.len());
                    BatchOutcome {
                        index,
                        records: batch.len(),
                        success: true,
                        detail: response.status().as_u16().to_string(),
                    }
                }
                Ok(response) => {
                    warn!("batch {} failed: {}", index + 1, response.status().as_u16());
                    BatchOutcome {
                        index,
                        records: batch.len(),
                        success: false,
                        detail: response.status().as_u16().to_string(),
                    }
                }
                Err(err) => {
                    warn!("batch {} failed: {}", index + 1, err);
                    BatchOutcome {
                        index,
                        records: batch.len(),
                        success: false,
                        detail: err.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        ForwardSummary {
            total: records.len(),
            outcomes,
        }
    }
}
