//! Server-sent-events subscription to the backend log stream.
//!
//! A connection is owned by a spawned task that reports a closed set of
//! [`PushEvent`]s to a single consumer. Nothing here retries: once `Failed`
//! has been sent the task is finished and the consumer decides what to do.

use crate::error::ViewerError;
use crate::log_entry::LogEntry;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use log::{debug, info, trace, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";
const MESSAGE_EVENT: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// Handshake succeeded.
    Opened,
    /// One decoded log payload.
    Entry(LogEntry),
    /// The connection is unusable from now on.
    Failed(String),
}

/// A push event tagged with the epoch of the connection that produced it.
#[derive(Debug)]
pub struct PushMessage {
    pub epoch: u64,
    pub event: PushEvent,
}

#[derive(Clone)]
pub struct PushChannel {
    client: reqwest::Client,
    endpoint: String,
}

impl PushChannel {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }

    pub fn connect(&self, epoch: u64, tx: mpsc::Sender<PushMessage>) -> PushHandle {
        info!("Opening push stream (epoch {}): {}", epoch, self.endpoint);
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();

        let task = tokio::spawn(async move {
            let failure = stream_events(&client, &endpoint, epoch, &tx).await;
            warn!("Push stream failed (epoch {}): {}", epoch, failure);
            let _ = tx
                .send(PushMessage {
                    epoch,
                    event: PushEvent::Failed(failure.to_string()),
                })
                .await;
        });

        PushHandle { epoch, task: Some(task) }
    }
}

/// Runs until the connection breaks and returns why.
async fn stream_events(
    client: &reqwest::Client,
    endpoint: &str,
    epoch: u64,
    tx: &mpsc::Sender<PushMessage>,
) -> ViewerError {
    let response = match client
        .get(endpoint)
        .header(reqwest::header::ACCEPT, EVENT_STREAM_CONTENT_TYPE)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return ViewerError::Http(e),
    };

    if !response.status().is_success() {
        return ViewerError::Transport(format!("server returned status {}", response.status()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.starts_with(EVENT_STREAM_CONTENT_TYPE) {
        return ViewerError::Transport(format!("unexpected content type {:?}", content_type));
    }

    if tx
        .send(PushMessage {
            epoch,
            event: PushEvent::Opened,
        })
        .await
        .is_err()
    {
        return ViewerError::Transport("consumer dropped".to_string());
    }

    let mut stream = Box::pin(response.bytes_stream().eventsource());

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => return ViewerError::Transport(format!("stream error: {}", e)),
        };

        trace!("SSE event {:?}: {}", event.event, event.data);

        // Named events other than `message` are not log payloads.
        if !event.event.is_empty() && event.event != MESSAGE_EVENT {
            continue;
        }

        if event.data.trim().is_empty() {
            continue;
        }

        let entry = match decode_payload(&event.data) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Dropping push payload: {} ({})", e, event.data);
                continue;
            }
        };

        if tx
            .send(PushMessage {
                epoch,
                event: PushEvent::Entry(entry),
            })
            .await
            .is_err()
        {
            return ViewerError::Transport("consumer dropped".to_string());
        }
    }

    ViewerError::Transport("stream closed by server".to_string())
}

fn decode_payload(data: &str) -> Result<LogEntry, ViewerError> {
    Ok(serde_json::from_str(data)?)
}

/// Ownership of one push connection. Closing twice is a no-op.
pub struct PushHandle {
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

impl PushHandle {
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Closing push stream (epoch {})", self.epoch);
            task.abort();
        }
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_entry::LogLevel;
    use std::time::Duration;
    use tokio::time::timeout;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn next(rx: &mut mpsc::Receiver<PushMessage>) -> PushMessage {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for push event")
            .expect("push channel closed")
    }

    fn channel_for(server: &MockServer) -> PushChannel {
        PushChannel::new(
            reqwest::Client::new(),
            format!("{}/api/cliente/logs/stream", server.uri()),
        )
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert!(matches!(
            decode_payload("not json"),
            Err(ViewerError::PayloadMalformed(_))
        ));
        assert_eq!(
            decode_payload(r#"{"level":"INFO","timestamp":"T1","message":"M1"}"#).unwrap(),
            LogEntry::new(LogLevel::Info, "T1", "M1")
        );
    }

    #[tokio::test]
    async fn opens_delivers_and_fails_on_close() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"level\":\"ERROR\",\"timestamp\":\"T1\",\"message\":\"M1\"}\n\n",
            "data: garbage\n\n",
            "data: {\"level\":\"INFO\",\"timestamp\":\"T2\",\"message\":\"M2\"}\n\n",
        );
        Mock::given(method("GET"))
            .and(path("/api/cliente/logs/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::channel(16);
        let _handle = channel_for(&server).connect(7, tx);

        let opened = next(&mut rx).await;
        assert_eq!(opened.epoch, 7);
        assert_eq!(opened.event, PushEvent::Opened);

        assert_eq!(
            next(&mut rx).await.event,
            PushEvent::Entry(LogEntry::new(LogLevel::Error, "T1", "M1"))
        );
        assert_eq!(
            next(&mut rx).await.event,
            PushEvent::Entry(LogEntry::new(LogLevel::Info, "T2", "M2"))
        );
        assert!(matches!(next(&mut rx).await.event, PushEvent::Failed(_)));
    }

    #[tokio::test]
    async fn only_message_events_carry_entries() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: heartbeat\n",
            "data: {\"level\":\"INFO\",\"timestamp\":\"T0\",\"message\":\"ping\"}\n\n",
            "event: message\n",
            "data: {\"level\":\"INFO\",\"timestamp\":\"T1\",\"message\":\"M1\"}\n\n",
            "data: {\"level\":\"INFO\",\"timestamp\":\"T2\",\"message\":\"M2\"}\n\n",
        );
        Mock::given(method("GET"))
            .and(path("/api/cliente/logs/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::channel(16);
        let _handle = channel_for(&server).connect(1, tx);

        assert_eq!(next(&mut rx).await.event, PushEvent::Opened);
        assert_eq!(
            next(&mut rx).await.event,
            PushEvent::Entry(LogEntry::new(LogLevel::Info, "T1", "M1"))
        );
        assert_eq!(
            next(&mut rx).await.event,
            PushEvent::Entry(LogEntry::new(LogLevel::Info, "T2", "M2"))
        );
        assert!(matches!(next(&mut rx).await.event, PushEvent::Failed(_)));
    }

    #[tokio::test]
    async fn error_status_fails_without_opening() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cliente/logs/stream"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::channel(16);
        let _handle = channel_for(&server).connect(1, tx);

        match next(&mut rx).await.event {
            PushEvent::Failed(reason) => assert!(reason.contains("503")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn wrong_content_type_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cliente/logs/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::channel(16);
        let _handle = channel_for(&server).connect(1, tx);

        assert!(matches!(next(&mut rx).await.event, PushEvent::Failed(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let server = MockServer::start().await;
        let (tx, _rx) = mpsc::channel(16);
        let mut handle = channel_for(&server).connect(3, tx);

        handle.close();
        handle.close();
        assert!(handle.is_closed());
    }
}
