// Block safety rules for putting a stored generator back into a freshly loaded world.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementSafety {
    Safe,
    // Natural block that may be overwritten by the generator block.
    Replaceable,
    Unsafe,
}

const EMPTY_BLOCKS: &[&str] = &["air", "cave_air", "void_air"];

const REPLACEABLE_BLOCKS: &[&str] = &[
    "grass_block",
    "dirt",
    "stone",
    "cobblestone",
    "sand",
    "gravel",
    "grass",
    "short_grass",
    "tall_grass",
    "dead_bush",
    "snow",
    "ice",
];

pub fn classify(found_block: &str, generator_block: &str) -> PlacementSafety {
    let found = normalize(found_block);
    if EMPTY_BLOCKS.contains(&found) || found == normalize(generator_block) {
        return PlacementSafety::Safe;
    }
    if REPLACEABLE_BLOCKS.contains(&found) {
        return PlacementSafety::Replaceable;
    }
    // Containers, spawners, workstations and anything player-built stay untouched.
    PlacementSafety::Unsafe
}

fn normalize(block: &str) -> &str {
    let block = block.trim();
    block.strip_prefix("minecraft:").unwrap_or(block)
}
