use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::errors::StoreError;
use crate::domain::ports::{BatchOp, Clock, KeyValueStore};

#[derive(Clone, Debug)]
enum Entry {
    Text {
        value: String,
        expires_at: Option<u64>,
    },
    Members(HashSet<String>),
}

// Process-local store adapter. Used for single-process runs and tests; several
// coordinators sharing one instance behave like processes sharing one remote store.
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    // Runs `f` against a staged view and commits only when it succeeds.
    async fn transact<T>(
        &self,
        f: impl FnOnce(&mut Staged<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let now = self.clock.now_epoch_seconds();
        let mut entries = self.entries.lock().await;
        let (result, overlay) = {
            let mut staged = Staged::new(&entries, now);
            let result = f(&mut staged)?;
            (result, staged.overlay)
        };
        for (key, entry) in overlay {
            match entry {
                Some(entry) => entries.insert(key, entry),
                None => entries.remove(&key),
            };
        }
        Ok(result)
    }
}

// Pending writes layered over the committed map.
struct Staged<'a> {
    base: &'a HashMap<String, Entry>,
    overlay: HashMap<String, Option<Entry>>,
    now: u64,
}

impl<'a> Staged<'a> {
    fn new(base: &'a HashMap<String, Entry>, now: u64) -> Self {
        Self {
            base,
            overlay: HashMap::new(),
            now,
        }
    }

    fn entry(&self, key: &str) -> Option<&Entry> {
        let entry = match self.overlay.get(key) {
            Some(staged) => staged.as_ref(),
            None => self.base.get(key),
        };
        match entry {
            Some(Entry::Text {
                expires_at: Some(expires_at),
                ..
            }) if *expires_at <= self.now => None,
            other => other,
        }
    }

    fn text(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entry(key) {
            Some(Entry::Text { value, .. }) => Ok(Some(value.clone())),
            Some(Entry::Members(_)) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    fn members(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        match self.entry(key) {
            Some(Entry::Members(members)) => Ok(members.clone()),
            Some(Entry::Text { .. }) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(HashSet::new()),
        }
    }

    fn put_text(&mut self, key: &str, value: String, expires_at: Option<u64>) {
        self.overlay
            .insert(key.to_string(), Some(Entry::Text { value, expires_at }));
    }

    fn put_members(&mut self, key: &str, members: HashSet<String>) {
        // Empty sets disappear, so emptiness and absence are the same thing.
        let entry = (!members.is_empty()).then_some(Entry::Members(members));
        self.overlay.insert(key.to_string(), entry);
    }

    fn remove(&mut self, key: &str) -> bool {
        let existed = self.entry(key).is_some();
        self.overlay.insert(key.to_string(), None);
        existed
    }

    fn add_member(&mut self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut members = self.members(key)?;
        let added = members.insert(member.to_string());
        self.put_members(key, members);
        Ok(added)
    }

    fn remove_member(&mut self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut members = self.members(key)?;
        let removed = members.remove(member);
        self.put_members(key, members);
        Ok(removed)
    }

    fn increment(&mut self, key: &str, by: i64) -> Result<i64, StoreError> {
        let current = match self.text(key)? {
            Some(value) => value
                .parse::<i64>()
                .map_err(|_| StoreError::WrongType(key.to_string()))?,
            None => 0,
        };
        let next = current + by;
        self.put_text(key, next.to_string(), None);
        Ok(next)
    }

    fn apply(&mut self, op: BatchOp) -> Result<(), StoreError> {
        match op {
            BatchOp::Set { key, value } => self.put_text(&key, value, None),
            BatchOp::SetIfPresent { key, value } => {
                if self.text(&key)?.is_some() {
                    self.put_text(&key, value, None);
                }
            }
            BatchOp::Delete { key } => {
                self.remove(&key);
            }
            BatchOp::SetAdd { key, member } => {
                self.add_member(&key, &member)?;
            }
            BatchOp::SetRemove { key, member } => {
                self.remove_member(&key, &member)?;
            }
            BatchOp::Increment { key, by } => {
                self.increment(&key, by)?;
            }
            BatchOp::SetRemoveIfEmpty { key, member, guard } => {
                if self.members(&guard)?.is_empty() {
                    self.remove_member(&key, &member)?;
                }
            }
        }
        Ok(())
    }
}

fn expiry(now: u64, ttl: Duration) -> u64 {
    now + ttl.as_secs().max(1)
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.transact(|staged| staged.text(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.transact(|staged| {
            staged.put_text(key, value.to_string(), None);
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.transact(|staged| Ok(staged.remove(key))).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.transact(|staged| staged.add_member(key, member)).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.transact(|staged| staged.remove_member(key, member))
            .await
    }

    async fn set_members(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        self.transact(|staged| staged.members(key)).await
    }

    async fn set_len(&self, key: &str) -> Result<usize, StoreError> {
        self.transact(|staged| staged.members(key).map(|members| members.len()))
            .await
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        self.transact(|staged| staged.increment(key, by)).await
    }

    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.transact(|staged| {
            if staged.entry(key).is_some() {
                return Ok(false);
            }
            let expires_at = expiry(staged.now, ttl);
            staged.put_text(key, value.to_string(), Some(expires_at));
            Ok(true)
        })
        .await
    }

    async fn refresh_expiry_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.transact(|staged| {
            if staged.text(key)?.as_deref() != Some(expected) {
                return Ok(false);
            }
            let expires_at = expiry(staged.now, ttl);
            staged.put_text(key, expected.to_string(), Some(expires_at));
            Ok(true)
        })
        .await
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.transact(|staged| {
            if staged.text(key)?.as_deref() != Some(expected) {
                return Ok(false);
            }
            Ok(staged.remove(key))
        })
        .await
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let now = self.clock.now_epoch_seconds();
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| {
                key.starts_with(prefix)
                    && matches!(entry, Entry::Text { expires_at, .. } if expires_at.is_none_or(|at| at > now))
            })
            .count())
    }

    async fn execute_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        self.transact(|staged| {
            for op in ops {
                staged
                    .apply(op)
                    .map_err(|err| StoreError::TransactionAborted(err.to_string()))?;
            }
            Ok(())
        })
        .await
    }
}
