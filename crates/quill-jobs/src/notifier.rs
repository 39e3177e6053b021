//! Best-effort push of job events to subscribers.
//!
//! Each live job has its own bounded broadcast channel plus one shared
//! channel carrying every job's events. A subscriber that falls behind skips
//! the events it missed. When a job publishes its terminal event the job's
//! channel is dropped, so its streams end after draining.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::Stream;
use futures::stream::unfold;
use quill_core::IgnoreLock as _;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{self, Receiver, Sender};

use crate::job::{JobEvent, JobId};

/// Per-job broadcast channels.
#[derive(Debug)]
pub struct EventNotifier {
    channels: Mutex<HashMap<JobId, Sender<JobEvent>>>,
    all: Sender<JobEvent>,
    capacity: usize,
}

impl EventNotifier {
    /// Creates a notifier whose channels buffer `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (all, _receiver) = broadcast::channel(capacity);
        Self {
            channels: Mutex::new(HashMap::new()),
            all,
            capacity,
        }
    }

    /// Opens the channel for a new job.
    pub fn register(&self, job_id: JobId) {
        let capacity = self.capacity;
        self.channels.with_lock(|channels| {
            channels
                .entry(job_id)
                .or_insert_with(|| broadcast::channel(capacity).0);
        });
    }

    /// Delivers an event to the job's subscribers and the global channel.
    ///
    /// A terminal event closes the job's channel.
    pub fn publish(&self, event: JobEvent) {
        let terminal = event.is_terminal();
        let sender = self.channels.with_lock(|channels| {
            if terminal {
                channels.remove(&event.job_id)
            } else {
                channels.get(&event.job_id).cloned()
            }
        });
        if let Some(sender) = sender {
            // No receivers is not an error.
            drop(sender.send(event.clone()));
        }
        drop(self.all.send(event));
    }

    /// Stream of a live job's events, or `None` if the job has no open channel.
    pub fn subscribe(&self, job_id: JobId) -> Option<JobEventStream> {
        self.channels.with_lock(|channels| {
            channels
                .get(&job_id)
                .map(|sender| JobEventStream::live(sender.subscribe()))
        })
    }

    /// Receiver of every job's events.
    pub fn subscribe_all(&self) -> Receiver<JobEvent> {
        self.all.subscribe()
    }

    /// Number of jobs with an open channel.
    pub fn open_channels(&self) -> usize {
        self.channels.with_lock(|channels| channels.len())
    }
}

/// Finite sequence of one job's events, ending after its terminal event.
#[derive(Debug)]
pub struct JobEventStream {
    receiver: Option<Receiver<JobEvent>>,
    pending: Option<JobEvent>,
}

impl JobEventStream {
    fn live(receiver: Receiver<JobEvent>) -> Self {
        Self {
            receiver: Some(receiver),
            pending: None,
        }
    }

    /// Stream that yields `event` once and ends; used for finished jobs.
    #[must_use]
    pub const fn finished(event: JobEvent) -> Self {
        Self {
            receiver: None,
            pending: Some(event),
        }
    }

    /// Next event, or `None` once the job has finished.
    pub async fn next(&mut self) -> Option<JobEvent> {
        if let Some(event) = self.pending.take() {
            self.receiver = None;
            return Some(event);
        }
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if event.is_terminal() {
                        self.receiver = None;
                    }
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Job event subscriber lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Adapts this stream to a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = JobEvent> {
        unfold(self, |mut stream| async move {
            stream.next().await.map(|event| (event, stream))
        })
    }
}
