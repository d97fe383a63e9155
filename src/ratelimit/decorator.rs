//! Stream decoration: rate accounting on a peer's read path.

use async_trait::async_trait;
use std::future::Future;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::limiter::PeerRateLimiter;
use crate::p2p::{MessageChannel, NodeId, Peer};

/// A [`MessageChannel`] that accounts every message it reads.
///
/// Writes pass straight through. Successful reads return exactly what the
/// wrapped channel returns: messages are never dropped, delayed or altered.
///
/// The first read failure is reported to the owning
/// [`decorate`](PeerRateLimiter::decorate) call and the loop gets a copy of
/// the error. Reads after that never complete.
pub struct RateLimitedChannel<'a, C: MessageChannel> {
    limiter: &'a PeerRateLimiter,
    inner: C,
    address: String,
    id: NodeId,
    failure: Option<oneshot::Sender<C::Error>>,
}

impl<'a, C: MessageChannel> RateLimitedChannel<'a, C> {
    /// Address the messages are accounted against.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Identity the messages are accounted against.
    pub fn peer_id(&self) -> NodeId {
        self.id
    }

    /// Unwrap the underlying channel.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[async_trait]
impl<'a, C> MessageChannel for RateLimitedChannel<'a, C>
where
    C: MessageChannel,
    C::Error: Clone,
{
    type Message = C::Message;
    type Error = C::Error;

    async fn read_message(&mut self) -> Result<C::Message, C::Error> {
        if self.failure.is_none() {
            return std::future::pending().await;
        }

        match self.inner.read_message().await {
            Ok(msg) => {
                self.limiter.account(&self.address, &self.id);
                Ok(msg)
            }
            Err(err) => {
                debug!(peer = %self.id, error = %err, "Peer channel read failed");
                let copy = err.clone();
                if let Some(failure) = self.failure.take() {
                    let _ = failure.send(err);
                }
                Err(copy)
            }
        }
    }

    async fn write_message(&mut self, msg: C::Message) -> Result<(), C::Error> {
        self.inner.write_message(msg).await
    }
}

impl PeerRateLimiter {
    /// Run a peer's protocol loop over a rate-limited view of `channel`.
    ///
    /// The peer's address and identity are resolved once, then `run_loop` is
    /// awaited exactly once on the calling task with the wrapped channel.
    ///
    /// Each successful read is accounted against both dimensions; every
    /// message over a limit triggers one handler call per exceeded dimension.
    /// Handler errors are logged and never surface here.
    ///
    /// A read failure ends `decorate` with the channel's own error, whether
    /// the loop propagates it, swallows it or keeps reading. Otherwise the
    /// loop's result is returned unchanged.
    ///
    /// There is no timeout. Closing `channel` out-of-band fails the pending
    /// read, which is how callers cancel.
    pub async fn decorate<'a, P, C, F, Fut, T>(
        &'a self,
        peer: &'a P,
        channel: C,
        run_loop: F,
    ) -> Result<T, C::Error>
    where
        P: Peer + ?Sized,
        C: MessageChannel,
        C::Error: Clone,
        F: FnOnce(&'a P, RateLimitedChannel<'a, C>) -> Fut,
        Fut: Future<Output = Result<T, C::Error>>,
    {
        let address = peer.address();
        let id = peer.id();
        debug!(address = %address, peer = %id, "Decorating peer channel");

        let (failure_tx, mut failure_rx) = oneshot::channel();
        let wrapped = RateLimitedChannel {
            limiter: self,
            inner: channel,
            address,
            id,
            failure: Some(failure_tx),
        };

        let run = run_loop(peer, wrapped);
        tokio::pin!(run);

        let result = tokio::select! {
            biased;
            Ok(err) = &mut failure_rx => Err(err),
            result = &mut run => match failure_rx.try_recv() {
                Ok(err) => Err(err),
                Err(_) => result,
            },
        };
        trace!(peer = %id, ok = result.is_ok(), "Peer loop finished");
        result
    }
}
