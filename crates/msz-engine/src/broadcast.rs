//! Per-job progress fan-out.
//!
//! Each job gets a bounded broadcast channel. Publishing never blocks: a
//! slow subscriber lags and skips to newer events instead of stalling the
//! compression engine. The last published event is stored alongside the
//! sender so a new subscriber atomically gets {replay, receiver} with no gap
//! between the replayed state and the live stream.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;

use msz_models::{JobId, ProgressEvent};

/// Bounded per-job buffer; laggards drop the oldest events.
const CHANNEL_CAPACITY: usize = 64;

/// A live subscription to one job's event stream.
pub struct Subscription {
    /// The job's state at subscription time, delivered before live events.
    /// `None` only when nothing has been published yet.
    pub replay: Option<ProgressEvent>,
    /// Live events from here on, in emission order.
    pub receiver: broadcast::Receiver<ProgressEvent>,
}

struct Channel {
    tx: broadcast::Sender<ProgressEvent>,
    last: Option<ProgressEvent>,
}

impl Channel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, last: None }
    }
}

/// Publish/subscribe fan-out, one channel per job.
#[derive(Default)]
pub struct EventBroadcaster {
    channels: Mutex<HashMap<JobId, Channel>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fan an event out to all current subscribers of a job.
    ///
    /// Terminal events tear the channel down afterwards; subscribers see the
    /// stream close once they have drained it.
    pub fn publish(&self, job_id: &JobId, event: ProgressEvent) {
        let mut channels = self.channels.lock().expect("broadcaster lock poisoned");
        let terminal = event.is_terminal();

        let channel = channels
            .entry(job_id.clone())
            .or_insert_with(Channel::new);
        channel.last = Some(event.clone());
        // Send fails only when no subscriber is listening; that is fine,
        // late subscribers pick the state up from the replay.
        let _ = channel.tx.send(event);

        if terminal {
            debug!(job_id = %job_id, "terminal event published, closing channel");
            channels.remove(job_id);
        }
    }

    /// Subscribe to a job's event stream.
    ///
    /// The replayed event and the receiver are captured under one lock, so
    /// the first live event a subscriber sees is always newer than (or equal
    /// to) the replayed state.
    pub fn subscribe(&self, job_id: &JobId) -> Subscription {
        let mut channels = self.channels.lock().expect("broadcaster lock poisoned");
        let channel = channels
            .entry(job_id.clone())
            .or_insert_with(Channel::new);
        Subscription {
            replay: channel.last.clone(),
            receiver: channel.tx.subscribe(),
        }
    }

    /// Drop a job's channel when nothing is listening on it.
    ///
    /// `subscribe` recreates a channel for any job id, including finished
    /// ones whose channel the terminal publish already tore down. Callers
    /// that find the job already terminal (or gone) drop their receiver and
    /// call this, so those recreated channels do not accumulate. A channel
    /// with live subscribers is left alone; the terminal publish will still
    /// reach them and tear it down.
    pub fn forget_if_idle(&self, job_id: &JobId) {
        let mut channels = self.channels.lock().expect("broadcaster lock poisoned");
        if let Some(channel) = channels.get(job_id) {
            if channel.tx.receiver_count() == 0 {
                channels.remove(job_id);
            }
        }
    }

    /// Number of jobs with a live channel.
    pub fn channel_count(&self) -> usize {
        self.channels
            .lock()
            .expect("broadcaster lock poisoned")
            .len()
    }
}
