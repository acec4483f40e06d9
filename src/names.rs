//! Fallback display-name generation.
//!
//! When a `register` frame omits `displayName` (or sends an empty string),
//! the registry assigns one drawn from this fixed pool before resolving
//! room-uniqueness (§4.4, §6.3).

use rand::seq::SliceRandom;

/// Fixed pool of animal-name tokens used as fallback display names.
pub const ANIMAL_NAMES: &[&str] = &[
    "otter", "falcon", "badger", "heron", "lynx", "puffin", "marten", "gecko", "ibex", "vole",
    "wombat", "tapir", "osprey", "jackal", "mink", "quokka", "narwhal", "civet", "serval", "egret",
    "caracal", "dingo", "shrew", "bittern", "genet", "pika", "stoat", "kestrel", "margay",
];

/// Pick a random entry from the animal-name pool.
pub fn random_animal_name() -> &'static str {
    ANIMAL_NAMES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("otter")
}
