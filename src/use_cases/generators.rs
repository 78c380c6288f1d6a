// Entity store for generator instances and their denormalized indexes.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::domain::errors::StoreError;
use crate::domain::generator::ActiveGenerator;
use crate::domain::keys::KeySpace;
use crate::domain::ports::{BatchOp, KeyValueStore};

// Counters reported by the stats endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub generators: usize,
    pub owners: usize,
    pub worlds: usize,
    pub active_leases: usize,
}

pub struct GeneratorRepository {
    store: Arc<dyn KeyValueStore>,
    keys: KeySpace,
}

fn encode(generator: &ActiveGenerator) -> Result<String, StoreError> {
    serde_json::to_string(generator).map_err(|err| StoreError::Serialization(err.to_string()))
}

impl GeneratorRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    // Undecodable records are logged and reported as absent.
    pub async fn get(&self, id: &str) -> Result<Option<ActiveGenerator>, StoreError> {
        let Some(raw) = self.store.get(&self.keys.generator(id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<ActiveGenerator>(&raw) {
            Ok(generator) => Ok(Some(generator)),
            Err(err) => {
                warn!(generator_id = %id, error = %err, "stored generator does not decode; treating as absent");
                Ok(None)
            }
        }
    }

    // Overwrites the instance record of a registered generator. A record that was
    // unregistered in the meantime stays deleted.
    pub async fn put(&self, generator: &ActiveGenerator) -> Result<(), StoreError> {
        self.store
            .execute_batch(vec![BatchOp::SetIfPresent {
                key: self.keys.generator(&generator.id()),
                value: encode(generator)?,
            }])
            .await
    }

    // Deletes the instance record only; indexes are untouched.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.store.delete(&self.keys.generator(id)).await
    }

    // Writes many instance records in one round trip.
    pub async fn save_batch(&self, generators: &[ActiveGenerator]) -> Result<(), StoreError> {
        if generators.is_empty() {
            return Ok(());
        }
        let ops = generators
            .iter()
            .map(|generator| {
                Ok(BatchOp::SetIfPresent {
                    key: self.keys.generator(&generator.id()),
                    value: encode(generator)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.store.execute_batch(ops).await.inspect_err(|err| {
            error!(count = generators.len(), error = %err, "failed to save generator batch");
        })
    }

    // Writes the instance and every index entry atomically. Re-registering an
    // existing location replaces the record; an owner change moves the index entries.
    pub async fn register(&self, generator: &ActiveGenerator) -> Result<(), StoreError> {
        let id = generator.id();
        let mut ops = Vec::new();

        match self.get(&id).await? {
            Some(existing) if existing.owner == generator.owner => {
                ops.push(BatchOp::Set {
                    key: self.keys.generator(&id),
                    value: encode(generator)?,
                });
            }
            Some(existing) => {
                ops.extend(self.index_removal_ops(&existing));
                ops.extend(self.insert_ops(generator)?);
            }
            None => ops.extend(self.insert_ops(generator)?),
        }

        self.store.execute_batch(ops).await.inspect_err(|err| {
            error!(generator_id = %id, error = %err, "failed to register generator");
        })
    }

    // Removes the instance, its lease and its index entries atomically.
    pub async fn unregister(&self, id: &str) -> Result<Option<ActiveGenerator>, StoreError> {
        let Some(generator) = self.get(id).await? else {
            return Ok(None);
        };

        let mut ops = vec![
            BatchOp::Delete {
                key: self.keys.generator(id),
            },
            BatchOp::Delete {
                key: self.keys.lock(id),
            },
        ];
        ops.extend(self.index_removal_ops(&generator));

        self.store.execute_batch(ops).await.inspect_err(|err| {
            error!(generator_id = %id, error = %err, "failed to unregister generator");
        })?;
        Ok(Some(generator))
    }

    // Removes every generator of one owner in one batch. Returns the removed ids.
    pub async fn remove_all(&self, owner: &Uuid) -> Result<Vec<String>, StoreError> {
        let owner_key = owner.to_string();
        let worlds = self.worlds_by_owner(owner).await?;
        let mut removed = Vec::new();
        let mut ops = Vec::new();

        for world in &worlds {
            let world_key = self.keys.world(world);
            for id in self.ids_by_owner_and_world(owner, world).await? {
                ops.push(BatchOp::Delete {
                    key: self.keys.generator(&id),
                });
                ops.push(BatchOp::Delete {
                    key: self.keys.lock(&id),
                });
                ops.push(BatchOp::SetRemove {
                    key: world_key.clone(),
                    member: id.clone(),
                });
                removed.push(id);
            }
            ops.push(BatchOp::SetRemoveIfEmpty {
                key: self.keys.worlds(),
                member: world.clone(),
                guard: world_key,
            });
            ops.push(BatchOp::Delete {
                key: self.keys.owner_world(owner, world),
            });
        }
        ops.push(BatchOp::Delete {
            key: self.keys.owner_worlds(owner),
        });
        ops.push(BatchOp::Delete {
            key: self.keys.owner_count(owner),
        });
        ops.push(BatchOp::SetRemove {
            key: self.keys.owners(),
            member: owner_key,
        });

        self.store.execute_batch(ops).await.inspect_err(|err| {
            error!(owner = %owner, error = %err, "failed to remove all generators");
        })?;
        Ok(removed)
    }

    pub async fn ids_by_owner_and_world(
        &self,
        owner: &Uuid,
        world: &str,
    ) -> Result<HashSet<String>, StoreError> {
        self.store
            .set_members(&self.keys.owner_world(owner, world))
            .await
    }

    pub async fn ids_by_world(&self, world: &str) -> Result<HashSet<String>, StoreError> {
        self.store.set_members(&self.keys.world(world)).await
    }

    pub async fn worlds_by_owner(&self, owner: &Uuid) -> Result<HashSet<String>, StoreError> {
        self.store.set_members(&self.keys.owner_worlds(owner)).await
    }

    pub async fn owners(&self) -> Result<HashSet<String>, StoreError> {
        self.store.set_members(&self.keys.owners()).await
    }

    pub async fn worlds(&self) -> Result<HashSet<String>, StoreError> {
        self.store.set_members(&self.keys.worlds()).await
    }

    pub async fn count_by_owner(&self, owner: &Uuid) -> Result<i64, StoreError> {
        let raw = self.store.get(&self.keys.owner_count(owner)).await?;
        Ok(raw.and_then(|value| value.parse().ok()).unwrap_or(0))
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            generators: self
                .store
                .count_prefix(&self.keys.generator_prefix())
                .await?,
            owners: self.store.set_len(&self.keys.owners()).await?,
            worlds: self.store.set_len(&self.keys.worlds()).await?,
            active_leases: self.store.count_prefix(&self.keys.lock_prefix()).await?,
        })
    }

    fn insert_ops(&self, generator: &ActiveGenerator) -> Result<Vec<BatchOp>, StoreError> {
        let id = generator.id();
        let owner = &generator.owner;
        let world = &generator.location.world;
        Ok(vec![
            BatchOp::Set {
                key: self.keys.generator(&id),
                value: encode(generator)?,
            },
            BatchOp::SetAdd {
                key: self.keys.owner_world(owner, world),
                member: id.clone(),
            },
            BatchOp::SetAdd {
                key: self.keys.world(world),
                member: id,
            },
            BatchOp::SetAdd {
                key: self.keys.owner_worlds(owner),
                member: world.clone(),
            },
            BatchOp::Increment {
                key: self.keys.owner_count(owner),
                by: 1,
            },
            BatchOp::SetAdd {
                key: self.keys.owners(),
                member: owner.to_string(),
            },
            BatchOp::SetAdd {
                key: self.keys.worlds(),
                member: world.clone(),
            },
        ])
    }

    // Index cleanup for one generator. The guarded removals run after the plain
    // ones, so "last generator of this owner in this world" is decided inside the batch.
    fn index_removal_ops(&self, generator: &ActiveGenerator) -> Vec<BatchOp> {
        let id = generator.id();
        let owner = &generator.owner;
        let world = &generator.location.world;
        vec![
            BatchOp::SetRemove {
                key: self.keys.owner_world(owner, world),
                member: id.clone(),
            },
            BatchOp::SetRemove {
                key: self.keys.world(world),
                member: id,
            },
            BatchOp::Increment {
                key: self.keys.owner_count(owner),
                by: -1,
            },
            BatchOp::SetRemoveIfEmpty {
                key: self.keys.owner_worlds(owner),
                member: world.clone(),
                guard: self.keys.owner_world(owner, world),
            },
            BatchOp::SetRemoveIfEmpty {
                key: self.keys.worlds(),
                member: world.clone(),
                guard: self.keys.world(world),
            },
            BatchOp::SetRemoveIfEmpty {
                key: self.keys.owners(),
                member: owner.to_string(),
                guard: self.keys.owner_worlds(owner),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::generator::Location;
    use crate::use_cases::test_support::{FailingStore, FailureFlags, memory_store};

    fn generator(owner: Uuid, world: &str, x: i32) -> ActiveGenerator {
        ActiveGenerator::new(owner, Location::new(world, x, 64, 0), "coal")
    }

    #[tokio::test]
    async fn when_generator_is_registered_then_every_index_contains_it() {
        let repository = GeneratorRepository::new(memory_store(), KeySpace::default());
        let owner = Uuid::new_v4();
        let gen_a = generator(owner, "world", 1);

        repository.register(&gen_a).await.unwrap();

        let id = gen_a.id();
        assert_eq!(repository.get(&id).await.unwrap(), Some(gen_a.clone()));
        assert!(repository.ids_by_owner_and_world(&owner, "world").await.unwrap().contains(&id));
        assert!(repository.ids_by_world("world").await.unwrap().contains(&id));
        assert!(repository.worlds_by_owner(&owner).await.unwrap().contains("world"));
        assert!(repository.owners().await.unwrap().contains(&owner.to_string()));
        assert!(repository.worlds().await.unwrap().contains("world"));
        assert_eq!(repository.count_by_owner(&owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn when_generator_is_registered_then_unregistered_then_indexes_are_clean() {
        let repository = GeneratorRepository::new(memory_store(), KeySpace::default());
        let owner = Uuid::new_v4();
        let gen_a = generator(owner, "world", 1);

        repository.register(&gen_a).await.unwrap();
        let removed = repository.unregister(&gen_a.id()).await.unwrap();

        assert_eq!(removed, Some(gen_a.clone()));
        assert_eq!(repository.get(&gen_a.id()).await.unwrap(), None);
        assert!(repository.ids_by_owner_and_world(&owner, "world").await.unwrap().is_empty());
        assert!(repository.ids_by_world("world").await.unwrap().is_empty());
        assert!(repository.worlds_by_owner(&owner).await.unwrap().is_empty());
        assert!(repository.owners().await.unwrap().is_empty());
        assert!(repository.worlds().await.unwrap().is_empty());
        assert_eq!(repository.count_by_owner(&owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn when_last_generator_in_world_is_unregistered_then_other_worlds_stay_indexed() {
        let repository = GeneratorRepository::new(memory_store(), KeySpace::default());
        let owner = Uuid::new_v4();
        let in_world = generator(owner, "world", 1);
        let in_nether = generator(owner, "nether", 1);
        repository.register(&in_world).await.unwrap();
        repository.register(&in_nether).await.unwrap();

        repository.unregister(&in_world.id()).await.unwrap();

        let worlds = repository.worlds_by_owner(&owner).await.unwrap();
        assert!(!worlds.contains("world"));
        assert!(worlds.contains("nether"));
        assert!(repository.owners().await.unwrap().contains(&owner.to_string()));
    }

    #[tokio::test]
    async fn when_world_still_has_generators_then_unregister_keeps_world_in_owner_index() {
        let repository = GeneratorRepository::new(memory_store(), KeySpace::default());
        let owner = Uuid::new_v4();
        let first = generator(owner, "world", 1);
        let second = generator(owner, "world", 2);
        repository.register(&first).await.unwrap();
        repository.register(&second).await.unwrap();

        repository.unregister(&first.id()).await.unwrap();

        assert!(repository.worlds_by_owner(&owner).await.unwrap().contains("world"));
        assert_eq!(repository.count_by_owner(&owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn when_location_changes_owner_then_indexes_move_to_new_owner() {
        let repository = GeneratorRepository::new(memory_store(), KeySpace::default());
        let old_owner = Uuid::new_v4();
        let new_owner = Uuid::new_v4();
        repository.register(&generator(old_owner, "world", 1)).await.unwrap();

        repository.register(&generator(new_owner, "world", 1)).await.unwrap();

        assert!(repository.worlds_by_owner(&old_owner).await.unwrap().is_empty());
        assert_eq!(repository.count_by_owner(&new_owner).await.unwrap(), 1);
        assert_eq!(repository.ids_by_world("world").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn when_owner_is_removed_then_only_their_generators_disappear() {
        let repository = GeneratorRepository::new(memory_store(), KeySpace::default());
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        repository.register(&generator(owner, "world", 1)).await.unwrap();
        repository.register(&generator(owner, "nether", 2)).await.unwrap();
        repository.register(&generator(other, "world", 3)).await.unwrap();

        let removed = repository.remove_all(&owner).await.unwrap();

        assert_eq!(removed.len(), 2);
        assert!(repository.worlds_by_owner(&owner).await.unwrap().is_empty());
        assert_eq!(repository.worlds().await.unwrap(), HashSet::from(["world".to_string()]));
        assert_eq!(repository.ids_by_world("world").await.unwrap().len(), 1);
        assert_eq!(repository.owners().await.unwrap(), HashSet::from([other.to_string()]));
    }

    #[tokio::test]
    async fn when_record_is_gone_then_put_does_not_resurrect_it() {
        let repository = GeneratorRepository::new(memory_store(), KeySpace::default());
        let gen_a = generator(Uuid::new_v4(), "world", 1);

        repository.put(&gen_a).await.unwrap();
        assert_eq!(repository.get(&gen_a.id()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn when_record_does_not_decode_then_get_returns_none() {
        let store = memory_store();
        let keys = KeySpace::default();
        store.set(&keys.generator("world,1,2,3"), "{not json").await.unwrap();
        let repository = GeneratorRepository::new(store, keys);

        assert_eq!(repository.get("world,1,2,3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn when_batch_cannot_commit_then_register_fails_without_partial_indexes() {
        let inner = memory_store();
        let store = Arc::new(FailingStore::new(inner.clone()).with_failures(FailureFlags {
            batch: true,
            ..FailureFlags::default()
        }));
        let repository = GeneratorRepository::new(store, KeySpace::default());
        let owner = Uuid::new_v4();

        let result = repository.register(&generator(owner, "world", 1)).await;

        assert!(matches!(result, Err(StoreError::TransactionAborted(_))));
        let clean = GeneratorRepository::new(inner, KeySpace::default());
        assert!(clean.worlds_by_owner(&owner).await.unwrap().is_empty());
        assert!(clean.ids_by_world("world").await.unwrap().is_empty());
    }
}
