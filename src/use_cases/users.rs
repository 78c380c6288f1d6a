use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::StoreError;
use crate::domain::keys::KeySpace;
use crate::domain::ports::{BatchOp, KeyValueStore};
use crate::domain::user::UserProfile;

// User profiles keyed by id and, redundantly, by lowercase name.
pub struct UserRepository {
    store: Arc<dyn KeyValueStore>,
    keys: KeySpace,
    profiles: RwLock<HashMap<Uuid, UserProfile>>,
    names: RwLock<HashMap<String, Uuid>>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeySpace) -> Self {
        Self {
            store,
            keys,
            profiles: RwLock::new(HashMap::new()),
            names: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, id: &Uuid) -> Result<Option<UserProfile>, StoreError> {
        if let Some(profile) = self.profiles.read().await.get(id) {
            return Ok(Some(profile.clone()));
        }

        let Some(raw) = self.store.get(&self.keys.user(id)).await? else {
            return Ok(None);
        };
        let profile = match serde_json::from_str::<UserProfile>(&raw) {
            Ok(profile) => profile,
            Err(err) => {
                warn!(user_id = %id, error = %err, "stored profile does not decode; treating as absent");
                return Ok(None);
            }
        };
        self.remember(&profile).await;
        Ok(Some(profile))
    }

    // Loads the profile, creating and saving an empty one on first sight.
    pub async fn get_or_create(&self, id: Uuid, name: &str) -> Result<UserProfile, StoreError> {
        if let Some(profile) = self.get(&id).await? {
            return Ok(profile);
        }
        let profile = UserProfile::new(id, name);
        self.save(&profile).await?;
        info!(user_id = %id, name, "created user profile");
        Ok(profile)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<UserProfile>, StoreError> {
        let cached = self.names.read().await.get(&name.to_lowercase()).copied();
        let id = match cached {
            Some(id) => id,
            None => {
                let Some(raw) = self.store.get(&self.keys.user_name(name)).await? else {
                    return Ok(None);
                };
                match Uuid::parse_str(&raw) {
                    Ok(id) => id,
                    Err(err) => {
                        warn!(name, error = %err, "stored name index does not decode");
                        return Ok(None);
                    }
                }
            }
        };
        self.get(&id).await
    }

    pub async fn save(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.save_all_of(std::slice::from_ref(profile)).await
    }

    // Persists every cached profile in one batch.
    pub async fn save_all(&self) -> Result<usize, StoreError> {
        let profiles: Vec<UserProfile> = self.profiles.read().await.values().cloned().collect();
        self.save_all_of(&profiles).await?;
        Ok(profiles.len())
    }

    // Saves every cached profile, then forgets the saved ones `keep` rejects.
    // A profile changed after the save stays cached. Returns how many were evicted.
    pub async fn save_and_evict(
        &self,
        keep: impl Fn(&UserProfile) -> bool,
    ) -> Result<usize, StoreError> {
        let saved: Vec<UserProfile> = self.profiles.read().await.values().cloned().collect();
        self.save_all_of(&saved).await?;

        let mut profiles = self.profiles.write().await;
        let mut names = self.names.write().await;
        let mut evicted = 0;
        for profile in saved.iter().filter(|profile| !keep(profile)) {
            if profiles.get(&profile.id) == Some(profile) {
                profiles.remove(&profile.id);
                names.remove(&profile.name.to_lowercase());
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    pub async fn cached_count(&self) -> usize {
        self.profiles.read().await.len()
    }

    // Applies `change` to a cached profile without saving it. Returns the new value.
    pub async fn update_cached(
        &self,
        id: &Uuid,
        change: impl FnOnce(&mut UserProfile),
    ) -> Option<UserProfile> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles.get_mut(id)?;
        change(profile);
        Some(profile.clone())
    }

    pub async fn remove(&self, id: &Uuid) -> Result<bool, StoreError> {
        let Some(profile) = self.get(id).await? else {
            return Ok(false);
        };
        self.store
            .execute_batch(vec![
                BatchOp::Delete {
                    key: self.keys.user(id),
                },
                BatchOp::Delete {
                    key: self.keys.user_name(&profile.name),
                },
                BatchOp::SetRemove {
                    key: self.keys.users(),
                    member: id.to_string(),
                },
            ])
            .await?;
        self.profiles.write().await.remove(id);
        self.names.write().await.remove(&profile.name.to_lowercase());
        Ok(true)
    }

    async fn save_all_of(&self, profiles: &[UserProfile]) -> Result<(), StoreError> {
        if profiles.is_empty() {
            return Ok(());
        }
        let mut ops = Vec::with_capacity(profiles.len() * 3);
        for profile in profiles {
            let raw = serde_json::to_string(profile)
                .map_err(|err| StoreError::Serialization(err.to_string()))?;
            ops.push(BatchOp::Set {
                key: self.keys.user(&profile.id),
                value: raw,
            });
            ops.push(BatchOp::Set {
                key: self.keys.user_name(&profile.name),
                value: profile.id.to_string(),
            });
            ops.push(BatchOp::SetAdd {
                key: self.keys.users(),
                member: profile.id.to_string(),
            });
        }
        self.store.execute_batch(ops).await?;
        for profile in profiles {
            self.remember(profile).await;
        }
        Ok(())
    }

    async fn remember(&self, profile: &UserProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.id, profile.clone());
        self.names
            .write()
            .await
            .insert(profile.name.to_lowercase(), profile.id);
    }
}
