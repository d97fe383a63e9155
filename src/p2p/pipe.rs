//! In-memory duplex message pipe.
//!
//! Two connected [`PipeEnd`]s, each a [`MessageChannel`]. Messages written on
//! one end are read, in order, on the other. Closing either end closes both
//! directions and wakes any pending read.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use super::message::{Message, MessageChannel};

/// Errors produced by a [`PipeEnd`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeError {
    /// The pipe was closed or the other end was dropped.
    #[error("message pipe closed")]
    Closed,
}

/// Create a connected pair of pipe ends.
pub fn message_pipe() -> (PipeEnd, PipeEnd) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    let (close_tx, close_rx) = watch::channel(false);
    let close_tx = Arc::new(close_tx);

    let a = PipeEnd {
        tx: a_tx,
        rx: a_rx,
        closed: close_rx.clone(),
        closer: PipeCloser(close_tx.clone()),
    };
    let b = PipeEnd {
        tx: b_tx,
        rx: b_rx,
        closed: close_rx,
        closer: PipeCloser(close_tx),
    };
    (a, b)
}

/// Handle that closes a pipe from anywhere, e.g. another task.
#[derive(Debug, Clone)]
pub struct PipeCloser(Arc<watch::Sender<bool>>);

impl PipeCloser {
    /// Close both directions of the pipe. Idempotent.
    pub fn close(&self) {
        self.0.send_replace(true);
    }

    /// Whether the pipe has been closed.
    pub fn is_closed(&self) -> bool {
        *self.0.borrow()
    }
}

/// One end of a [`message_pipe`].
#[derive(Debug)]
pub struct PipeEnd {
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    closed: watch::Receiver<bool>,
    closer: PipeCloser,
}

impl PipeEnd {
    /// Close both directions of the pipe.
    pub fn close(&self) {
        self.closer.close();
    }

    /// A cloneable handle that can close this pipe later.
    pub fn closer(&self) -> PipeCloser {
        self.closer.clone()
    }
}

/// Resolve once the close flag is set or every closer is gone.
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl MessageChannel for PipeEnd {
    type Message = Message;
    type Error = PipeError;

    async fn read_message(&mut self) -> Result<Message, PipeError> {
        tokio::select! {
            biased;
            _ = wait_closed(&mut self.closed) => Err(PipeError::Closed),
            msg = self.rx.recv() => msg.ok_or(PipeError::Closed),
        }
    }

    async fn write_message(&mut self, msg: Message) -> Result<(), PipeError> {
        if self.closer.is_closed() {
            return Err(PipeError::Closed);
        }
        self.tx.send(msg).map_err(|_| PipeError::Closed)
    }
}
