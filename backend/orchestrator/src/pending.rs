//! In-flight grant attempts, keyed by the sending wallet's id.
//!
//! The stash lets a continuation path pick an attempt back up after consent,
//! and it is best-effort only: the ledger write on the finish callback never
//! reads from here, so losing this state (restart, expiry) cannot lose a
//! contribution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::info;

use crate::network::{GrantTokens, InteractiveGrant, Quote};
use crate::wallet::WalletAddress;

/// Everything negotiated for one payment attempt, up to the consent redirect.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct PendingAttempt {
    pub project_id: i64,
    /// Amount as the contributor entered it, in the receiving asset's
    /// nominal unit.
    pub nominal_amount: Decimal,
    pub sending_wallet: WalletAddress,
    pub receiving_wallet: WalletAddress,
    pub incoming_grant: GrantTokens,
    pub quote_grant: GrantTokens,
    pub quote: Quote,
    pub outgoing_grant: InteractiveGrant,
    /// Nonce embedded in the grant's finish stanza.
    pub nonce: String,
}

/// Concurrent map of sender id to in-flight attempt. Entries are stamped on
/// insert and swept once they outlive the TTL.
pub struct PendingStore {
    entries: DashMap<String, (PendingAttempt, Instant)>,
    ttl: Duration,
}

impl PendingStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Stash an attempt, replacing any earlier in-flight attempt by the same
    /// sender. Only the newest negotiation per sender can be continued.
    pub fn insert(&self, sending_wallet_id: String, attempt: PendingAttempt) {
        self.entries
            .insert(sending_wallet_id, (attempt, Instant::now()));
    }

    /// Drop attempts older than the TTL. Returns how many were evicted,
    /// counted inside the sweep itself: inserts racing the sweep must not
    /// skew the total (or underflow it) the way differencing two `len()`
    /// snapshots would.
    pub fn purge_expired(&self) -> usize {
        let mut evicted = 0;
        self.entries.retain(|_, (_, stamped)| {
            let live = stamped.elapsed() < self.ttl;
            if !live {
                evicted += 1;
            }
            live
        });
        evicted
    }
}

// Lookup surface for the continuation path; nothing drives it yet.
#[allow(dead_code)]
impl PendingStore {
    pub fn get(&self, sending_wallet_id: &str) -> Option<PendingAttempt> {
        self.entries
            .get(sending_wallet_id)
            .map(|entry| entry.value().0.clone())
    }

    pub fn remove(&self, sending_wallet_id: &str) -> Option<PendingAttempt> {
        self.entries
            .remove(sending_wallet_id)
            .map(|(_, (attempt, _))| attempt)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Background sweep loop; spawned once from `main`.
pub async fn run_sweeper(store: Arc<PendingStore>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately; skip it.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let purged = store.purge_expired();
        if purged > 0 {
            info!("Swept {purged} expired pending grant attempt(s)");
        }
    }
}
