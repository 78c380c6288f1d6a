use std::collections::HashSet;

use crate::domain::errors::StoreError;
use crate::domain::presence::PresenceSnapshot;
use crate::use_cases::generators::GeneratorRepository;

// Generator ids this process should try to own: generators of online owners in
// loaded worlds, plus every generator in a loaded world when offline owners count.
pub async fn candidate_ids(
    repository: &GeneratorRepository,
    presence: &PresenceSnapshot,
    include_offline: bool,
) -> Result<HashSet<String>, StoreError> {
    let mut ids = HashSet::new();

    for owner in &presence.online {
        for world in presence.loaded_worlds() {
            ids.extend(repository.ids_by_owner_and_world(owner, world).await?);
        }
    }

    if include_offline {
        for world in presence.loaded_worlds() {
            ids.extend(repository.ids_by_world(world).await?);
        }
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::generator::{ActiveGenerator, Location};
    use crate::domain::keys::KeySpace;
    use crate::use_cases::test_support::memory_store;
    use uuid::Uuid;

    #[tokio::test]
    async fn when_offline_owners_are_excluded_then_only_online_generators_are_candidates() {
        let repository = GeneratorRepository::new(memory_store(), KeySpace::default());
        let online = Uuid::new_v4();
        let offline = Uuid::new_v4();
        let mine = ActiveGenerator::new(online, Location::new("world", 1, 64, 1), "coal");
        let theirs = ActiveGenerator::new(offline, Location::new("world", 2, 64, 2), "coal");
        let unloaded = ActiveGenerator::new(online, Location::new("nether", 3, 64, 3), "coal");
        for generator in [&mine, &theirs, &unloaded] {
            repository.register(generator).await.unwrap();
        }
        let mut presence = PresenceSnapshot::default();
        presence.online.insert(online);
        presence.worlds.insert("world".to_string(), None);

        let online_only = candidate_ids(&repository, &presence, false).await.unwrap();
        let everyone = candidate_ids(&repository, &presence, true).await.unwrap();

        assert_eq!(online_only, HashSet::from([mine.id()]));
        assert_eq!(everyone, HashSet::from([mine.id(), theirs.id()]));
    }
}
