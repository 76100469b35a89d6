//! Non-blocking result delivery.
//!
//! [`ResultUploader`] takes finished results off the test loop: `submit`
//! waits only for an in-flight slot, then spawns the upload on the tokio
//! runtime. `finish` waits for every pending upload and reports each
//! outcome. A failed upload is reported and never affects the computed
//! result or other uploads.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::ApiClient;
use crate::error::{DocError, DocResult};
use crate::result::{TestResult, UploadBatch};

/// Delivery outcome of one result.
#[derive(Debug)]
pub struct UploadOutcome {
    /// Result the batch documented.
    pub result_id: String,
    /// Requests made, or the first error.
    pub outcome: DocResult<usize>,
}

impl UploadOutcome {
    /// Whether every request succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Bounded queue of background uploads.
#[derive(Debug)]
pub struct ResultUploader {
    client: ApiClient,
    permits: Arc<Semaphore>,
    tasks: JoinSet<UploadOutcome>,
    submitted: usize,
}

impl ResultUploader {
    /// Uploader bounded by the client's `max_in_flight`.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        let bound = client.config().max_in_flight.max(1);
        Self::with_bound(client, bound)
    }

    /// Uploader with an explicit bound on pending batches.
    #[must_use]
    pub fn with_bound(client: ApiClient, bound: usize) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(bound.max(1))),
            tasks: JoinSet::new(),
            submitted: 0,
        }
    }

    /// Queue a batch. Waits while the bound is reached.
    ///
    /// # Errors
    ///
    /// `NotReady` if the client is not ready; nothing is queued then.
    pub async fn submit(&mut self, batch: UploadBatch) -> DocResult<()> {
        let state = self.client.state();
        if state != super::ClientState::Ready {
            return Err(DocError::NotReady {
                state: state.to_string(),
            });
        }
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| DocError::NotReady {
                state: "closed".to_string(),
            })?;
        let client = self.client.clone();
        self.submitted += 1;
        self.tasks.spawn(async move {
            let _permit = permit;
            let result_id = batch.result_id.clone();
            let outcome = client.log_batch(batch).await;
            if let Err(e) = &outcome {
                tracing::warn!(result_id = %result_id, error = %e, "result upload failed");
            }
            UploadOutcome { result_id, outcome }
        });
        Ok(())
    }

    /// Convert a result with the client's number mode and queue it.
    ///
    /// # Errors
    ///
    /// `Serialization` if the result cannot be encoded; otherwise as
    /// [`Self::submit`].
    pub async fn submit_result(
        &mut self,
        result: &TestResult,
        section_id: Option<&str>,
        position: Option<usize>,
    ) -> DocResult<()> {
        let batch = result.to_upload_batch(section_id, position, self.client.number_mode())?;
        self.submit(batch).await
    }

    /// Batches queued so far.
    #[must_use]
    pub const fn submitted(&self) -> usize {
        self.submitted
    }

    /// Wait for every pending upload and return the outcomes in completion
    /// order.
    pub async fn finish(mut self) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            outcomes.push(joined.unwrap_or_else(|e| UploadOutcome {
                result_id: String::new(),
                outcome: Err(DocError::transport(format!("upload task failed: {e}"))),
            }));
        }
        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        tracing::info!(uploaded = outcomes.len() - failed, failed, "result delivery finished");
        outcomes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;

    #[tokio::test]
    async fn test_submit_requires_ready_client() {
        let client = ApiClient::new(ApiConfig::new("http://127.0.0.1:9"));
        let mut uploader = ResultUploader::new(client);
        let batch = UploadBatch {
            result_id: "r".to_string(),
            section_id: None,
            position: None,
            figures: Vec::new(),
            metric: None,
            test_result: None,
            metadata: Vec::new(),
        };
        assert!(matches!(
            uploader.submit(batch).await,
            Err(DocError::NotReady { .. })
        ));
        assert_eq!(uploader.submitted(), 0);
        assert!(uploader.finish().await.is_empty());
    }
}
