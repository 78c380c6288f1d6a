// Per-generator ownership leases with TTL, built on the store's atomic primitives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::errors::StoreError;
use crate::domain::keys::KeySpace;
use crate::domain::ports::{Clock, KeyValueStore};

pub struct LockManager {
    store: Arc<dyn KeyValueStore>,
    keys: KeySpace,
    clock: Arc<dyn Clock>,
    server_id: String,
    ttl: Duration,
    // Leases this process believes it holds, with the local expiry (epoch seconds).
    held: RwLock<HashMap<String, u64>>,
}

impl LockManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        keys: KeySpace,
        clock: Arc<dyn Clock>,
        server_id: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            keys,
            clock,
            server_id: server_id.into(),
            ttl,
            held: RwLock::new(HashMap::new()),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // Single atomic create-if-absent. False means another live lease exists.
    pub async fn acquire(&self, id: &str) -> Result<bool, StoreError> {
        // Local expiry is measured from before the round trip, so it never outlives the remote one.
        let started = self.clock.now_epoch_seconds();
        let acquired = self
            .store
            .set_if_absent_with_expiry(&self.keys.lock(id), &self.server_id, self.ttl)
            .await?;
        if acquired {
            self.held
                .write()
                .await
                .insert(id.to_string(), started + self.ttl.as_secs());
        }
        Ok(acquired)
    }

    // Extends a lease this process still holds. False means the lease was lost.
    pub async fn renew(&self, id: &str) -> Result<bool, StoreError> {
        let started = self.clock.now_epoch_seconds();
        let renewed = self
            .store
            .refresh_expiry_if_equals(&self.keys.lock(id), &self.server_id, self.ttl)
            .await?;
        let mut held = self.held.write().await;
        if renewed {
            held.insert(id.to_string(), started + self.ttl.as_secs());
        } else {
            held.remove(id);
        }
        Ok(renewed)
    }

    // Authoritative check against the store.
    pub async fn holds(&self, id: &str) -> Result<bool, StoreError> {
        let holder = self.store.get(&self.keys.lock(id)).await?;
        Ok(holder.as_deref() == Some(self.server_id.as_str()))
    }

    // Cheap check against the local lease table.
    pub async fn holds_locally(&self, id: &str) -> bool {
        let now = self.clock.now_epoch_seconds();
        self.held
            .read()
            .await
            .get(id)
            .is_some_and(|expires_at| *expires_at > now)
    }

    // Atomic delete-if-holder.
    pub async fn release(&self, id: &str) -> Result<bool, StoreError> {
        self.held.write().await.remove(id);
        self.store
            .delete_if_equals(&self.keys.lock(id), &self.server_id)
            .await
    }

    // Drops the local record without touching the store (lease lost or deleted elsewhere).
    pub async fn forget(&self, id: &str) {
        self.held.write().await.remove(id);
    }

    // Ids with a locally unexpired lease, sorted for stable iteration.
    pub async fn held_ids(&self) -> Vec<String> {
        let now = self.clock.now_epoch_seconds();
        let mut ids: Vec<String> = self
            .held
            .read()
            .await
            .iter()
            .filter(|(_, expires_at)| **expires_at > now)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    // Every id still in the local table, expired or not.
    pub async fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.held.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn release_all(&self) -> usize {
        let ids: Vec<String> = self.held.write().await.drain().map(|(id, _)| id).collect();
        let mut released = 0;
        for id in ids {
            match self
                .store
                .delete_if_equals(&self.keys.lock(&id), &self.server_id)
                .await
            {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(err) => debug!(generator_id = %id, error = %err, "lease release failed; it will expire"),
            }
        }
        released
    }
}
