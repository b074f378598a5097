//! Transport selection and merging of incoming entries into one log collection.
//!
//! The reconciler performs no I/O. Operations return [`Action`]s that the
//! session task carries out against the real transports. Each transport start
//! gets a fresh epoch; messages from any other epoch, or anything that arrives
//! after teardown, are ignored.

use crate::error::ViewerError;
use crate::log_entry::LogEntry;
use crate::push_channel::PushEvent;
use crate::status::{self, Status};
use crate::types::{ConnectionState, LogCollection, Snapshot};
use log::{debug, info, warn};

pub const PUSH_FALLBACK_NOTICE: &str = "SSE desconectado. Usando polling HTTP...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenPush { epoch: u64 },
    ClosePush,
    StartPolling { epoch: u64 },
    StopPolling,
}

#[derive(Debug)]
pub struct Reconciler {
    state: ConnectionState,
    logs: LogCollection,
    last_error: Option<String>,
    next_epoch: u64,
    push_epoch: Option<u64>,
    poll_epoch: Option<u64>,
    torn_down: bool,
    clear_count: u64,
    revision: u64,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            logs: LogCollection::new(),
            last_error: None,
            next_epoch: 0,
            push_epoch: None,
            poll_epoch: None,
            torn_down: false,
            clear_count: 0,
            revision: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status(&self) -> Status {
        status::project(self.state())
    }

    pub fn entries(&self) -> &[LogEntry] {
        self.logs.entries()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_active(&self) -> bool {
        !self.torn_down
    }

    /// Increases on every observable change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.entries().to_vec(),
            status: self.status(),
            last_error: self.last_error().map(str::to_string),
            clear_count: self.clear_count,
        }
    }

    /// `Disconnected -> ConnectingPush`.
    pub fn start(&mut self) -> Vec<Action> {
        if self.torn_down || self.state != ConnectionState::Disconnected {
            warn!("Ignoring start in state {:?}", self.state);
            return Vec::new();
        }
        self.open_push()
    }

    /// Explicit new push attempt. Polling is stopped first so that at most one
    /// transport runs at a time; a failure falls back to polling again.
    pub fn reconnect(&mut self) -> Vec<Action> {
        if self.torn_down {
            return Vec::new();
        }
        info!("Re-probing push transport from {:?}", self.state);
        let mut actions = self.stop_transports();
        actions.extend(self.open_push());
        actions
    }

    pub fn on_push(&mut self, epoch: u64, event: PushEvent) -> Vec<Action> {
        if self.torn_down || self.push_epoch != Some(epoch) {
            debug!("Ignoring stale push event (epoch {})", epoch);
            return Vec::new();
        }

        match event {
            PushEvent::Opened => {
                info!("Push stream connected");
                self.set_state(ConnectionState::PushActive);
                self.set_error(None);
                Vec::new()
            }
            PushEvent::Entry(entry) => {
                self.merge(std::iter::once(entry));
                Vec::new()
            }
            PushEvent::Failed(reason) => {
                warn!("Push transport failed, falling back to polling: {}", reason);
                self.push_epoch = None;
                let epoch = self.bump_epoch();
                self.poll_epoch = Some(epoch);
                self.set_state(ConnectionState::PollActive);
                self.set_error(Some(PUSH_FALLBACK_NOTICE.to_string()));
                vec![Action::ClosePush, Action::StartPolling { epoch }]
            }
        }
    }

    /// Returns whether the result was applied.
    pub fn on_poll(&mut self, epoch: u64, result: Result<Vec<LogEntry>, ViewerError>) -> bool {
        if self.torn_down || self.poll_epoch != Some(epoch) {
            debug!("Ignoring stale poll result (epoch {})", epoch);
            return false;
        }
        self.apply_fetch(result.as_deref());
        true
    }

    /// Manual refresh. Additive like every other merge; returns how many
    /// entries were new.
    pub fn on_refresh(&mut self, result: Result<&[LogEntry], &ViewerError>) -> usize {
        if self.torn_down {
            return 0;
        }
        self.apply_fetch(result)
    }

    /// The backend confirmed its log store is empty.
    pub fn on_cleared(&mut self) {
        if self.torn_down {
            return;
        }
        if !self.logs.is_empty() {
            info!("Clearing {} log entries", self.logs.len());
            self.logs.clear();
        }
        self.clear_count += 1;
        self.revision += 1;
    }

    /// Closes whatever is running. Safe to call more than once.
    pub fn teardown(&mut self) -> Vec<Action> {
        if self.torn_down {
            return Vec::new();
        }
        info!("Tearing down log session");
        let actions = self.stop_transports();
        self.torn_down = true;
        actions
    }

    fn apply_fetch(&mut self, result: Result<&[LogEntry], &ViewerError>) -> usize {
        match result {
            Ok(entries) => {
                let added = self.merge(entries.iter().cloned());
                self.set_error(None);
                added
            }
            Err(e) => {
                warn!("Log fetch failed: {}", e);
                self.set_error(Some(format!("Error HTTP: {}", e)));
                0
            }
        }
    }

    fn merge<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = LogEntry>,
    {
        let added = self.logs.merge_all(entries);
        if added > 0 {
            self.revision += 1;
        }
        added
    }

    fn open_push(&mut self) -> Vec<Action> {
        let epoch = self.bump_epoch();
        self.push_epoch = Some(epoch);
        self.set_state(ConnectionState::ConnectingPush);
        vec![Action::OpenPush { epoch }]
    }

    fn stop_transports(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.push_epoch.take().is_some() {
            actions.push(Action::ClosePush);
        }
        if self.poll_epoch.take().is_some() {
            actions.push(Action::StopPolling);
        }
        self.set_state(ConnectionState::Disconnected);
        actions
    }

    fn bump_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Connection state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.revision += 1;
        }
    }

    fn set_error(&mut self, error: Option<String>) {
        if self.last_error != error {
            self.last_error = error;
            self.revision += 1;
        }
    }
}
