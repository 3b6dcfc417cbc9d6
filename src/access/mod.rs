// src/access/mod.rs

pub mod cooldown;
pub mod edit_distance;
pub mod registry;
pub mod resolver;

pub use cooldown::CooldownLedger;
pub use edit_distance::edit_distance;
pub use registry::MemoryRegistry;
pub use resolver::{best_fuzzy_match, AccessResolver, Resolution, ResolverStats};
