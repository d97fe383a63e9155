//! Core peer rate limiter implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::counter::WINDOW;
use super::handler::{Dimension, LimitHandler};
use super::registry::Registry;
use crate::config::{PeerRateLimiterConfig, Whitelist};
use crate::p2p::NodeId;

/// Snapshot of limiter activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimiterStats {
    /// Messages read through decorated channels
    pub messages_processed: u64,
    /// Messages that exceeded the per-address limit
    pub address_limit_exceeded: u64,
    /// Messages that exceeded the per-identity limit
    pub identity_limit_exceeded: u64,
    /// Handler callbacks that returned an error
    pub handler_errors: u64,
    /// Addresses with a live counter
    pub tracked_addresses: usize,
    /// Identities with a live counter
    pub tracked_identities: usize,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    address_exceeded: AtomicU64,
    identity_exceeded: AtomicU64,
    handler_errors: AtomicU64,
}

/// Limits inbound messages per address and per peer identity.
///
/// One instance is shared by every connection worker. The configuration and
/// whitelists are fixed at construction; only the counter tables change.
pub struct PeerRateLimiter {
    config: PeerRateLimiterConfig,
    whitelist: Whitelist,
    registry: Registry,
    handler: Arc<dyn LimitHandler>,
    counters: Counters,
}

impl PeerRateLimiter {
    /// Create a limiter.
    ///
    /// `None` applies [`PeerRateLimiterConfig::recommended`]. Pass
    /// `Some(PeerRateLimiterConfig::default())` to disable both limits.
    pub fn new(config: Option<PeerRateLimiterConfig>, handler: Arc<dyn LimitHandler>) -> Self {
        Self::with_clock(config, handler, Arc::new(SystemClock))
    }

    /// Create a limiter that reads time from `clock`.
    pub fn with_clock(
        config: Option<PeerRateLimiterConfig>,
        handler: Arc<dyn LimitHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config.unwrap_or_else(PeerRateLimiterConfig::recommended);
        let whitelist = Whitelist::from_config(&config);

        info!(
            limit_per_address = config.limit_per_address,
            limit_per_identity = config.limit_per_identity,
            whitelisted_addresses = config.whitelisted_addresses.len(),
            whitelisted_identities = config.whitelisted_identities.len(),
            "Peer rate limiter initialized"
        );

        Self {
            config,
            whitelist,
            registry: Registry::new(clock),
            handler,
            counters: Counters::default(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &PeerRateLimiterConfig {
        &self.config
    }

    /// The shared counter tables.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Account one message from `address` and report whether it is over the
    /// per-address limit.
    ///
    /// Whitelisted addresses always return `false` and are not counted. An
    /// empty or unknown address is counted like any other.
    pub fn throttle_address(&self, address: &str) -> bool {
        if self.whitelist.contains_address(address) {
            return false;
        }
        self.registry
            .addresses
            .throttle(address, self.config.limit_per_address)
    }

    /// Account one message from `id` and report whether it is over the
    /// per-identity limit.
    ///
    /// Whitelisted identities always return `false` and are not counted.
    pub fn throttle_identity(&self, id: &NodeId) -> bool {
        if self.whitelist.contains_identity(id) {
            return false;
        }
        self.registry
            .identities
            .throttle(id, self.config.limit_per_identity)
    }

    /// Account a message read from a peer and notify the handler for each
    /// dimension it exceeded.
    pub(crate) fn account(&self, address: &str, id: &NodeId) {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        if self.throttle_address(address) {
            self.counters.address_exceeded.fetch_add(1, Ordering::Relaxed);
            self.notify(Dimension::Address, address, id);
        }
        if self.throttle_identity(id) {
            self.counters.identity_exceeded.fetch_add(1, Ordering::Relaxed);
            self.notify(Dimension::Identity, address, id);
        }
    }

    /// Invoke the handler. Its error is logged and counted, never returned.
    fn notify(&self, dimension: Dimension, address: &str, id: &NodeId) {
        debug!(
            dimension = %dimension,
            address = %address,
            peer = %id,
            "Peer rate limit exceeded"
        );

        if let Err(e) = self.handler.on_limit_exceeded(dimension) {
            self.counters.handler_errors.fetch_add(1, Ordering::Relaxed);
            warn!(
                dimension = %dimension,
                address = %address,
                peer = %id,
                error = %e,
                "Limit handler failed"
            );
        }
    }

    /// Current activity counters.
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            messages_processed: self.counters.processed.load(Ordering::Relaxed),
            address_limit_exceeded: self.counters.address_exceeded.load(Ordering::Relaxed),
            identity_limit_exceeded: self.counters.identity_exceeded.load(Ordering::Relaxed),
            handler_errors: self.counters.handler_errors.load(Ordering::Relaxed),
            tracked_addresses: self.registry.addresses.len(),
            tracked_identities: self.registry.identities.len(),
        }
    }

    /// Drop counters idle for longer than `max_idle` (at least one window).
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let removed = self.registry.prune_idle(max_idle);
        if removed > 0 {
            info!(removed = removed, "Pruned idle rate limit counters");
        }
        removed
    }

    /// Prune idle counters every `interval` on a background task.
    ///
    /// The interval is never shorter than one window. Abort the returned
    /// handle to stop pruning.
    pub fn spawn_pruner(self: Arc<Self>, interval: Duration, max_idle: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(WINDOW));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.prune_idle(max_idle);
            }
        })
    }
}
