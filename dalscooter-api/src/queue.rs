//! Work queues for background processing
//!
//! Booking ids travel from the request handler to the approval worker, and
//! concern ids to the concern worker, through these queues. Delivery is
//! at-least-once: a worker redelivers a message after a retryable failure,
//! so consumers must be idempotent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dalscooter_core::{BookingId, MessageId};
use tokio::sync::mpsc;

use crate::error::ApiError;

/// A queued unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage<T> {
    pub payload: T,
    pub enqueued_at: DateTime<Utc>,
    /// Deliveries before this one
    pub attempts: u32,
}

impl<T: Clone> QueueMessage<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }

    /// The same message, queued again
    pub fn redelivery(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            enqueued_at: Utc::now(),
            attempts: self.attempts + 1,
        }
    }
}

/// Producer side of a work queue
pub trait WorkQueue<T: Clone>: Send + Sync {
    fn send(&self, message: QueueMessage<T>) -> Result<(), ApiError>;

    /// Queue a fresh message
    fn enqueue(&self, payload: T) -> Result<(), ApiError> {
        self.send(QueueMessage::new(payload))
    }
}

/// In-process queue backed by a tokio channel
pub struct ChannelQueue<T> {
    name: &'static str,
    tx: mpsc::UnboundedSender<QueueMessage<T>>,
}

impl<T> Clone for ChannelQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
        }
    }
}

/// Consumer side of a [`ChannelQueue`]
pub struct QueueReceiver<T> {
    rx: mpsc::UnboundedReceiver<QueueMessage<T>>,
    batch_size: usize,
}

/// Create a connected queue and receiver
pub fn channel<T>(name: &'static str, batch_size: usize) -> (ChannelQueue<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChannelQueue { name, tx },
        QueueReceiver {
            rx,
            batch_size: batch_size.max(1),
        },
    )
}

impl<T: Clone + Send + Sync> WorkQueue<T> for ChannelQueue<T> {
    fn send(&self, message: QueueMessage<T>) -> Result<(), ApiError> {
        self.tx
            .send(message)
            .map_err(|_| ApiError::QueueUnavailable(format!("{} queue closed", self.name)))
    }
}

impl<T> QueueReceiver<T> {
    /// Wait for the next batch of up to `batch_size` messages.
    /// Returns `None` once every producer is gone and the queue is drained.
    pub async fn recv_batch(&mut self) -> Option<Vec<QueueMessage<T>>> {
        let first = self.rx.recv().await?;
        let mut batch = vec![first];
        while batch.len() < self.batch_size {
            match self.rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }
        Some(batch)
    }

    /// Take whatever is queued right now, without waiting
    pub fn drain(&mut self) -> Vec<QueueMessage<T>> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

/// Producers for every queue the service runs
#[derive(Clone)]
pub struct Queues {
    pub approvals: Arc<dyn WorkQueue<BookingId>>,
    pub concerns: Arc<dyn WorkQueue<MessageId>>,
}

/// Consumers matching [`Queues`]
pub struct QueueReceivers {
    pub approvals: QueueReceiver<BookingId>,
    pub concerns: QueueReceiver<MessageId>,
}

/// Create the service's in-process queues
pub fn queues(batch_size: usize) -> (Queues, QueueReceivers) {
    let (approvals, approval_receiver) = channel("approval", batch_size);
    let (concerns, concern_receiver) = channel("concern", batch_size);
    (
        Queues {
            approvals: Arc::new(approvals),
            concerns: Arc::new(concerns),
        },
        QueueReceivers {
            approvals: approval_receiver,
            concerns: concern_receiver,
        },
    )
}
