use crate::error::{Result, ViewerError};
use crate::log_entry::LogEntry;
use crate::types::LogsResponse;
use log::{debug, info};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Outcome of one scheduled fetch, tagged with the epoch of the interval that ran it.
#[derive(Debug)]
pub struct PollMessage {
    pub epoch: u64,
    pub result: Result<Vec<LogEntry>>,
}

#[derive(Clone)]
pub struct Poller {
    client: reqwest::Client,
    endpoint: String,
    request_timeout: Duration,
}

impl Poller {
    pub fn new(client: reqwest::Client, endpoint: String, request_timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            request_timeout,
        }
    }

    /// Fetches the full server-side log list.
    pub async fn fetch_once(&self) -> Result<Vec<LogEntry>> {
        debug!("Fetching logs via HTTP: {}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .timeout(self.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ViewerError::Fetch(format!(
                "server returned status {}",
                response.status()
            )));
        }

        let body: LogsResponse = response.json().await?;
        let logs = body.into_entries();
        debug!("Fetched {} log entries", logs.len());

        Ok(logs)
    }

    /// Fetches immediately, then once per `period`, until the handle is stopped.
    /// Failures are reported and the interval keeps running.
    pub fn start_interval(
        &self,
        period: Duration,
        epoch: u64,
        tx: mpsc::Sender<PollMessage>,
    ) -> PollHandle {
        info!("Starting HTTP polling every {:?} (epoch {})", period, epoch);
        let poller = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let result = poller.fetch_once().await;
                if tx.send(PollMessage { epoch, result }).await.is_err() {
                    break;
                }
            }
        });

        PollHandle { epoch, task: Some(task) }
    }
}

/// Ownership of a running poll interval. Stopping twice is a no-op.
pub struct PollHandle {
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Stopping HTTP polling (epoch {})", self.epoch);
            task.abort();
        }
    }

    #[cfg(test)]
    fn is_stopped(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
