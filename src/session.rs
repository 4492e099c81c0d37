//! Request/response controller for a single chat query.
//!
//! A [`ChatSession`] owns the query text, the response buffer and the
//! progress flag. Submitting spawns a task that drives the transport stream
//! and reports back through an mpsc channel as [`StreamEvent`]s; the owner
//! feeds those events into [`ChatSession::apply`] from its event loop, so all
//! state changes happen on one task.

use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::ChatTransport;

/// Shown in place of the response whenever the transport fails.
pub const BACKEND_ERROR_MESSAGE: &str = "Error: Unable to connect to the backend service.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    /// Full text received so far.
    Progress(String),
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub request: RequestId,
    pub update: StreamUpdate,
}

struct ActiveRequest {
    id: RequestId,
    task: JoinHandle<()>,
}

pub struct ChatSession {
    pub query: String,
    response: String,
    progress: bool,
    transport: Arc<dyn ChatTransport>,
    events: mpsc::UnboundedSender<StreamEvent>,
    last_request: u64,
    active: Option<ActiveRequest>,
}

impl ChatSession {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        Self {
            query: String::new(),
            response: String::new(),
            progress: false,
            transport,
            events,
            last_request: 0,
            active: None,
        }
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn in_progress(&self) -> bool {
        self.progress
    }

    pub fn current_request(&self) -> Option<RequestId> {
        self.active.as_ref().map(|active| active.id)
    }

    /// Send the current query. A request still in flight is aborted and
    /// replaced; its queued events are ignored by [`apply`](Self::apply).
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self) -> RequestId {
        if let Some(previous) = self.active.take() {
            tracing::info!(request = %previous.id, "replacing in-flight request");
            previous.task.abort();
        }

        self.response.clear();
        self.progress = true;
        self.last_request += 1;
        let id = RequestId(self.last_request);

        tracing::info!(request = %id, length = self.query.chars().count(), "submitting chat query");
        let task = tokio::spawn(run_request(
            id,
            Arc::clone(&self.transport),
            self.query.clone(),
            self.events.clone(),
        ));
        self.active = Some(ActiveRequest { id, task });
        id
    }

    /// Abort the in-flight request, keeping whatever text already arrived.
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        tracing::info!(request = %active.id, "chat request cancelled");
        active.task.abort();
        self.progress = false;
        true
    }

    /// Apply an event from a request task. Returns false for stale events.
    pub fn apply(&mut self, event: StreamEvent) -> bool {
        if self.current_request() != Some(event.request) {
            tracing::trace!(request = %event.request, "dropping event from stale request");
            return false;
        }

        match event.update {
            StreamUpdate::Progress(text) => self.response = text,
            StreamUpdate::Completed => {
                self.progress = false;
                self.active = None;
            }
            StreamUpdate::Failed => {
                self.response = BACKEND_ERROR_MESSAGE.to_string();
                self.progress = false;
                self.active = None;
            }
        }
        true
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

async fn run_request(
    id: RequestId,
    transport: Arc<dyn ChatTransport>,
    message: String,
    events: mpsc::UnboundedSender<StreamEvent>,
) {
    let send = |update: StreamUpdate| events.send(StreamEvent { request: id, update }).is_ok();

    let mut stream = transport.stream(&message);
    let mut snapshots = 0usize;
    while let Some(item) = stream.next().await {
        match item {
            Ok(text) => {
                snapshots += 1;
                tracing::trace!(request = %id, snapshots, bytes = text.len(), "stream progress");
                if !send(StreamUpdate::Progress(text)) {
                    return;
                }
            }
            Err(err) => {
                tracing::error!(
                    request = %id,
                    error = %format!("{err:#}"),
                    "Error calling backend"
                );
                send(StreamUpdate::Failed);
                return;
            }
        }
    }

    tracing::info!(request = %id, snapshots, "chat stream completed");
    send(StreamUpdate::Completed);
}
