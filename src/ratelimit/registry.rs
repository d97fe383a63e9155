//! Shared counter tables keyed by address and by identity.

use dashmap::DashMap;
use std::borrow::Borrow;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::Clock;
use super::counter::{WindowCounter, WINDOW};
use crate::p2p::NodeId;

/// Key -> counter table shared by every connection worker.
///
/// Backed by a sharded map: two workers hitting the same key serialize on
/// that key's shard, unrelated keys mostly proceed in parallel.
pub struct CounterTable<K> {
    counters: DashMap<K, WindowCounter>,
    clock: Arc<dyn Clock>,
}

impl<K> CounterTable<K>
where
    K: Eq + Hash + Clone + Display,
{
    /// Create an empty table reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }

    /// Account one message for `key` and report whether it is over `limit`.
    ///
    /// A limit of `0` returns `false` without creating or touching a counter.
    pub fn throttle<Q>(&self, key: &Q, limit: u64) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Display + ToOwned<Owned = K> + ?Sized,
    {
        if limit == 0 {
            return false;
        }

        let now = self.clock.now();
        let count = match self.counters.get_mut(key) {
            Some(mut counter) => counter.hit(now),
            None => self
                .counters
                .entry(key.to_owned())
                .or_insert_with(|| {
                    debug!(key = %key, limit = limit, "Creating new window counter");
                    WindowCounter::new(now)
                })
                .hit(now),
        };

        trace!(key = %key, count = count, limit = limit, "Accounted message");
        count > limit
    }

    /// Messages counted for `key` in its current window, if tracked.
    ///
    /// A counter whose window already ended reports `0`.
    pub fn count<Q>(&self, key: &Q) -> Option<u64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        self.counters.get(key).map(|c| {
            if c.is_expired(now) {
                0
            } else {
                c.count()
            }
        })
    }

    /// Drop counters whose window started more than `max_idle` ago.
    ///
    /// `max_idle` is raised to at least one window, so only counters that
    /// would be reset by their next message are removed. Returns how many
    /// were removed.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let max_idle = max_idle.max(WINDOW);
        let now = self.clock.now();
        let before = self.counters.len();
        self.counters
            .retain(|_, c| now.saturating_duration_since(c.window_start()) < max_idle);
        before.saturating_sub(self.counters.len())
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// The two counter tables used by the peer rate limiter.
pub struct Registry {
    /// Counters by network address
    pub addresses: CounterTable<String>,
    /// Counters by peer identity
    pub identities: CounterTable<NodeId>,
}

impl Registry {
    /// Create empty tables sharing `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            addresses: CounterTable::new(clock.clone()),
            identities: CounterTable::new(clock),
        }
    }

    /// Prune both tables, returning the total number of counters removed.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        self.addresses.prune_idle(max_idle) + self.identities.prune_idle(max_idle)
    }
}
