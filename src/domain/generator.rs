use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// Chunk coordinate (16x16 block column) used for load checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

// World-qualified block position. Its canonical serialization is the generator id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Location {
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    pub fn id(&self) -> String {
        format!("{},{},{},{}", self.world, self.x, self.y, self.z)
    }

    // Parses "world,x,y,z". World names may themselves contain commas.
    pub fn parse(id: &str) -> Option<Self> {
        let mut parts = id.rsplitn(4, ',');
        let z = parts.next()?.trim().parse().ok()?;
        let y = parts.next()?.trim().parse().ok()?;
        let x = parts.next()?.trim().parse().ok()?;
        let world = parts.next()?;
        if world.is_empty() {
            return None;
        }
        Some(Self::new(world, x, y, z))
    }

    pub fn chunk(&self) -> ChunkPos {
        ChunkPos {
            x: self.x >> 4,
            z: self.z >> 4,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.world, self.x, self.y, self.z)
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_amount() -> u32 {
    1
}

// One weighted entry of a generator type's drop table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorDrop {
    pub item: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_amount")]
    pub amount: u32,
    // Unit price used by auto-sell. Drops without a price cannot be sold.
    #[serde(default)]
    pub sell_price: Option<f64>,
}

// Immutable generator configuration, loaded once from settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorType {
    pub id: String,
    pub display_name: String,
    /// Production interval in seconds.
    pub interval: f64,
    /// Block material placed in the world for this type.
    pub block: String,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub next_tier: Option<String>,
    #[serde(default)]
    pub fix_cost: f64,
    /// Chance in percent that a corruption candidate actually corrupts.
    #[serde(default)]
    pub corrupt_chance: f64,
    /// Per-type override of the global online-only policy.
    #[serde(default)]
    pub online_only: Option<bool>,
    #[serde(default)]
    pub drops: Vec<GeneratorDrop>,
}

impl GeneratorType {
    // Weighted pick from the drop table; None when the table is empty or all weights are zero.
    pub fn pick_drop<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&GeneratorDrop> {
        let index = WeightedIndex::new(self.drops.iter().map(|drop| drop.weight.max(0.0))).ok()?;
        self.drops.get(index.sample(rng))
    }
}

// Mutable per-location runtime state bound to a generator type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveGenerator {
    pub owner: Uuid,
    pub location: Location,
    pub generator_id: String,
    #[serde(default)]
    pub timer: f64,
    #[serde(default)]
    pub corrupted: bool,
}

impl ActiveGenerator {
    pub fn new(owner: Uuid, location: Location, generator_id: impl Into<String>) -> Self {
        Self {
            owner,
            location,
            generator_id: generator_id.into(),
            timer: 0.0,
            corrupted: false,
        }
    }

    pub fn id(&self) -> String {
        self.location.id()
    }
}

// Lookup table over every configured generator type.
#[derive(Clone, Debug, Default)]
pub struct GeneratorCatalog {
    types: HashMap<String, GeneratorType>,
    // Declaration order, so uniform picks are reproducible under a seeded rng.
    order: Vec<String>,
}

impl GeneratorCatalog {
    pub fn new(types: Vec<GeneratorType>) -> Self {
        let mut catalog = Self::default();
        for gen_type in types {
            if !catalog.types.contains_key(&gen_type.id) {
                catalog.order.push(gen_type.id.clone());
            }
            catalog.types.insert(gen_type.id.clone(), gen_type);
        }
        catalog
    }

    pub fn get(&self, id: &str) -> Option<&GeneratorType> {
        self.types.get(id)
    }

    pub fn next_tier(&self, gen_type: &GeneratorType) -> Option<&GeneratorType> {
        gen_type
            .next_tier
            .as_deref()
            .and_then(|next| self.types.get(next))
    }

    // Walks the upgrade chain up to `steps` times, stopping at the last tier.
    pub fn upgraded<'a>(&'a self, gen_type: &'a GeneratorType, steps: u32) -> &'a GeneratorType {
        let mut current = gen_type;
        for _ in 0..steps {
            match self.next_tier(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&GeneratorType> {
        self.order.choose(rng).and_then(|id| self.types.get(id))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneratorType> {
        self.order.iter().filter_map(|id| self.types.get(id))
    }

    // Rejects upgrade chains pointing at types that do not exist.
    pub fn validate(&self) -> Result<(), String> {
        for gen_type in self.iter() {
            if gen_type.interval <= 0.0 {
                return Err(format!(
                    "generator '{}' must have a positive interval",
                    gen_type.id
                ));
            }
            if let Some(next) = gen_type.next_tier.as_deref() {
                if !self.types.contains_key(next) {
                    return Err(format!(
                        "generator '{}' references unknown next tier '{next}'",
                        gen_type.id
                    ));
                }
            }
        }
        Ok(())
    }
}
