//! The `JobQueue` capability (spec Section 9, "Design Notes": "the
//! execution engine is a message consumer; model it as `execute(job_id)`
//! against a Queue capability; tests inject a synchronous queue").
//!
//! `ChannelQueue` is an in-process `mpsc`-backed implementation; a real
//! deployment would swap in a durable broker behind the same trait
//! (spec Section 1: "the queue broker's own implementation" is out of
//! scope).

use async_trait::async_trait;
use pipeguard_core::JobId;
use tokio::sync::{mpsc, Mutex};

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_id: JobId);
    async fn dequeue(&self) -> Option<JobId>;
}

pub struct ChannelQueue {
    sender: mpsc::UnboundedSender<JobId>,
    receiver: Mutex<mpsc::UnboundedReceiver<JobId>>,
}

impl ChannelQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver: Mutex::new(receiver) }
    }
}

impl Default for ChannelQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for ChannelQueue {
    async fn enqueue(&self, job_id: JobId) {
        // Sender half is held by `self` for the queue's whole lifetime, so
        // the receiver can never be dropped out from under this send.
        let _ = self.sender.send(job_id);
    }

    async fn dequeue(&self) -> Option<JobId> {
        self.receiver.lock().await.recv().await
    }
}
