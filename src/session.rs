//! Event loop that owns a [`Reconciler`] and the transports it selects.
//!
//! Push events, poll results and control completions all arrive as messages and
//! are handled one at a time on the session task, so reconciler state is never
//! shared. Observers follow along through a `watch` channel of [`Snapshot`]s.

use crate::config::Config;
use crate::control::ControlClient;
use crate::error::{Result, ViewerError};
use crate::log_entry::LogEntry;
use crate::poller::{PollHandle, PollMessage, Poller};
use crate::push_channel::{PushChannel, PushHandle, PushMessage};
use crate::reconciler::{Action, Reconciler};
use crate::types::Snapshot;
use log::{error, info};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

const CHANNEL_CAPACITY: usize = 256;

enum Request {
    Refresh(oneshot::Sender<Result<usize>>),
    Clear(oneshot::Sender<Result<()>>),
    Test(oneshot::Sender<Result<String>>),
    Reconnect(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

enum Completion {
    Refreshed {
        result: Result<Vec<LogEntry>>,
        reply: oneshot::Sender<Result<usize>>,
    },
    Cleared {
        result: Result<()>,
        reply: oneshot::Sender<Result<()>>,
    },
}

pub struct LogSession {
    reconciler: Reconciler,
    push: PushChannel,
    poller: Poller,
    control: ControlClient,
    poll_interval: Duration,
    push_handle: Option<PushHandle>,
    poll_handle: Option<PollHandle>,
    push_tx: mpsc::Sender<PushMessage>,
    push_rx: mpsc::Receiver<PushMessage>,
    poll_tx: mpsc::Sender<PollMessage>,
    poll_rx: mpsc::Receiver<PollMessage>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    requests_rx: mpsc::Receiver<Request>,
    snapshot_tx: watch::Sender<Snapshot>,
    published_revision: Option<u64>,
}

impl LogSession {
    pub fn new(config: &Config) -> Result<(Self, SessionHandle)> {
        config.validate()?;

        // No overall timeout: the push stream stays open indefinitely. Fetch and
        // control requests set their own.
        let client = reqwest::Client::builder().build()?;
        let endpoints = config.endpoints();

        let (push_tx, push_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (poll_tx, poll_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (completion_tx, completion_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (requests_tx, requests_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());

        let session = Self {
            reconciler: Reconciler::new(),
            push: PushChannel::new(client.clone(), endpoints.stream()),
            poller: Poller::new(client.clone(), endpoints.logs(), config.request_timeout()),
            control: ControlClient::new(client, endpoints, config.request_timeout()),
            poll_interval: config.poll_interval(),
            push_handle: None,
            poll_handle: None,
            push_tx,
            push_rx,
            poll_tx,
            poll_rx,
            completion_tx,
            completion_rx,
            requests_rx,
            snapshot_tx,
            published_revision: None,
        };

        let handle = SessionHandle {
            requests: requests_tx,
            snapshots: snapshot_rx,
        };

        Ok((session, handle))
    }

    /// Runs until shutdown is requested or every handle has been dropped.
    pub async fn run(mut self) {
        info!("Starting log session");
        let actions = self.reconciler.start();
        self.execute(actions);
        self.publish();

        loop {
            tokio::select! {
                Some(msg) = self.push_rx.recv() => {
                    let actions = self.reconciler.on_push(msg.epoch, msg.event);
                    self.execute(actions);
                }
                Some(msg) = self.poll_rx.recv() => {
                    self.reconciler.on_poll(msg.epoch, msg.result);
                }
                Some(done) = self.completion_rx.recv() => {
                    self.complete(done);
                }
                request = self.requests_rx.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => self.teardown(),
                },
            }
            self.publish();

            if !self.reconciler.is_active() {
                break;
            }
        }

        info!("Log session stopped");
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Refresh(reply) => {
                let poller = self.poller.clone();
                let tx = self.completion_tx.clone();
                tokio::spawn(async move {
                    let result = poller.fetch_once().await;
                    let _ = tx.send(Completion::Refreshed { result, reply }).await;
                });
            }
            Request::Clear(reply) => {
                let control = self.control.clone();
                let tx = self.completion_tx.clone();
                tokio::spawn(async move {
                    let result = control.clear_logs().await;
                    let _ = tx.send(Completion::Cleared { result, reply }).await;
                });
            }
            Request::Test(reply) => {
                // Never touches session state; the entry it produces arrives
                // through whichever transport is active.
                let control = self.control.clone();
                tokio::spawn(async move {
                    let _ = reply.send(control.send_test().await);
                });
            }
            Request::Reconnect(reply) => {
                let actions = self.reconciler.reconnect();
                self.execute(actions);
                let _ = reply.send(());
            }
            Request::Shutdown(reply) => {
                self.teardown();
                let _ = reply.send(());
            }
        }
    }

    fn complete(&mut self, done: Completion) {
        match done {
            Completion::Refreshed { result, reply } => {
                let added = self.reconciler.on_refresh(result.as_deref());
                let _ = reply.send(result.map(|_| added));
            }
            Completion::Cleared { result, reply } => {
                match result {
                    Ok(()) => self.reconciler.on_cleared(),
                    Err(ref e) => error!("Error clearing logs: {}", e),
                }
                let _ = reply.send(result);
            }
        }
    }

    fn teardown(&mut self) {
        let actions = self.reconciler.teardown();
        self.execute(actions);
        // Close anything left over even if the reconciler had nothing running.
        if let Some(mut handle) = self.push_handle.take() {
            handle.close();
        }
        if let Some(mut handle) = self.poll_handle.take() {
            handle.stop();
        }
        self.publish();
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::OpenPush { epoch } => {
                    if let Some(mut previous) = self.push_handle.take() {
                        previous.close();
                    }
                    self.push_handle = Some(self.push.connect(epoch, self.push_tx.clone()));
                }
                Action::ClosePush => {
                    if let Some(mut handle) = self.push_handle.take() {
                        handle.close();
                    }
                }
                Action::StartPolling { epoch } => {
                    if let Some(mut previous) = self.poll_handle.take() {
                        previous.stop();
                    }
                    self.poll_handle = Some(self.poller.start_interval(
                        self.poll_interval,
                        epoch,
                        self.poll_tx.clone(),
                    ));
                }
                Action::StopPolling => {
                    if let Some(mut handle) = self.poll_handle.take() {
                        handle.stop();
                    }
                }
            }
        }
    }

    fn publish(&mut self) {
        let revision = self.reconciler.revision();
        if self.published_revision != Some(revision) {
            self.snapshot_tx.send_replace(self.reconciler.snapshot());
            self.published_revision = Some(revision);
        }
    }
}

/// Cloneable front door to a running [`LogSession`].
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    snapshots: watch::Receiver<Snapshot>,
}

impl SessionHandle {
    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Fetches the backend log list once and merges it; returns how many entries were new.
    pub async fn refresh(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Refresh(reply)).await?;
        rx.await.map_err(|_| not_running())?
    }

    /// Clears the backend log store and, on success, the local collection.
    pub async fn clear(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Clear(reply)).await?;
        rx.await.map_err(|_| not_running())?
    }

    /// Asks the backend for a test entry; returns its confirmation text.
    pub async fn test(&self) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Test(reply)).await?;
        rx.await.map_err(|_| not_running())?
    }

    /// Makes a new push connection attempt.
    pub async fn reconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Reconnect(reply)).await?;
        rx.await.map_err(|_| not_running())
    }

    /// Tears the session down and waits until its transports are closed.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Request::Shutdown(reply)).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn send(&self, request: Request) -> Result<()> {
        self.requests.send(request).await.map_err(|_| not_running())
    }
}

fn not_running() -> ViewerError {
    ViewerError::ControlRequest("log session is not running".to_string())
}
