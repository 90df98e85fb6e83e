//! Game state aggregation

mod aggregator;
mod entities;
mod error;
mod mutations;

pub use aggregator::GameStateAggregator;
pub use entities::{
    Commander, Engineer, GameState, Location, MaterialCategory, MaterialStorage, Rank, Reputation, Ship, Station,
    Trackable, Tracked,
};
pub use error::MutationError;
pub use mutations::{MutationFn, MutationRegistry, default_registry, mutation};
