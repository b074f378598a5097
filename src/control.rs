use crate::config::Endpoints;
use crate::error::{Result, ViewerError};
use log::{debug, info};
use std::time::Duration;

/// Side-effecting backend requests issued on operator demand.
#[derive(Clone)]
pub struct ControlClient {
    client: reqwest::Client,
    endpoints: Endpoints,
    request_timeout: Duration,
}

impl ControlClient {
    pub fn new(client: reqwest::Client, endpoints: Endpoints, request_timeout: Duration) -> Self {
        Self {
            client,
            endpoints,
            request_timeout,
        }
    }

    /// Asks the backend to emit a synthetic log entry and returns its confirmation text.
    pub async fn send_test(&self) -> Result<String> {
        info!("Requesting test log entry");
        let response = self
            .client
            .post(self.endpoints.test())
            .timeout(self.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ViewerError::ControlRequest(format!(
                "test request returned status {}",
                response.status()
            )));
        }

        let confirmation = response.text().await?;
        debug!("Test request confirmed: {}", confirmation);
        Ok(confirmation)
    }

    /// Empties the backend log store.
    pub async fn clear_logs(&self) -> Result<()> {
        info!("Requesting backend log clear");
        let response = self
            .client
            .delete(self.endpoints.logs())
            .timeout(self.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ViewerError::ControlRequest(format!(
                "clear request returned status {}",
                response.status()
            )));
        }

        Ok(())
    }
}
