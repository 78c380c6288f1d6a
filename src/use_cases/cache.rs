// Read-through, write-back overlay for the generators this process holds leases for.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::errors::StoreError;
use crate::domain::generator::ActiveGenerator;
use crate::use_cases::generators::GeneratorRepository;

#[derive(Clone, Debug)]
struct CachedGenerator {
    generator: ActiveGenerator,
    dirty: bool,
}

pub struct GeneratorCache {
    repository: Arc<GeneratorRepository>,
    entries: RwLock<HashMap<String, CachedGenerator>>,
}

impl GeneratorCache {
    pub fn new(repository: Arc<GeneratorRepository>) -> Self {
        Self {
            repository,
            entries: RwLock::new(HashMap::new()),
        }
    }

    // Cached copy, falling through to the store on a miss.
    pub async fn get(&self, id: &str) -> Result<Option<ActiveGenerator>, StoreError> {
        if let Some(cached) = self.cached(id).await {
            return Ok(Some(cached));
        }
        self.load(id).await
    }

    pub async fn cached(&self, id: &str) -> Option<ActiveGenerator> {
        self.entries
            .read()
            .await
            .get(id)
            .map(|entry| entry.generator.clone())
    }

    // Replaces the cached copy with the stored record (used when a lease is acquired).
    pub async fn load(&self, id: &str) -> Result<Option<ActiveGenerator>, StoreError> {
        let stored = self.repository.get(id).await?;
        let mut entries = self.entries.write().await;
        match &stored {
            Some(generator) => {
                entries.insert(
                    id.to_string(),
                    CachedGenerator {
                        generator: generator.clone(),
                        dirty: false,
                    },
                );
            }
            None => {
                entries.remove(id);
            }
        }
        Ok(stored)
    }

    // Caches a copy that already matches the store.
    pub async fn insert(&self, generator: ActiveGenerator) {
        self.entries.write().await.insert(
            generator.id(),
            CachedGenerator {
                generator,
                dirty: false,
            },
        );
    }

    // Records a local change to be written back on the next flush.
    // An invalidated entry stays gone; false means the change was discarded.
    pub async fn update(&self, generator: ActiveGenerator) -> bool {
        match self.entries.write().await.get_mut(&generator.id()) {
            Some(entry) => {
                entry.generator = generator;
                entry.dirty = true;
                true
            }
            None => false,
        }
    }

    // Writes through immediately and caches the result as clean.
    pub async fn persist(&self, generator: &ActiveGenerator) -> Result<(), StoreError> {
        self.repository.put(generator).await?;
        self.insert(generator.clone()).await;
        Ok(())
    }

    // Drops an entry without writing it back.
    pub async fn invalidate(&self, id: &str) -> Option<ActiveGenerator> {
        self.entries
            .write()
            .await
            .remove(id)
            .map(|entry| entry.generator)
    }

    // Saves the dirty entries among `ids` in one batch. Callers pass the ids they still hold.
    pub async fn flush_ids(&self, ids: &[String]) -> Result<usize, StoreError> {
        let dirty: Vec<ActiveGenerator> = {
            let entries = self.entries.read().await;
            ids.iter()
                .filter_map(|id| entries.get(id))
                .filter(|entry| entry.dirty)
                .map(|entry| entry.generator.clone())
                .collect()
        };
        self.write_back(dirty).await
    }

    async fn write_back(&self, dirty: Vec<ActiveGenerator>) -> Result<usize, StoreError> {
        if dirty.is_empty() {
            return Ok(0);
        }
        self.repository.save_batch(&dirty).await?;

        // Entries changed while the batch was in flight stay dirty.
        let mut entries = self.entries.write().await;
        for saved in &dirty {
            if let Some(entry) = entries.get_mut(&saved.id()) {
                if entry.generator == *saved {
                    entry.dirty = false;
                }
            }
        }
        Ok(dirty.len())
    }

    pub async fn dirty_count(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.dirty)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
