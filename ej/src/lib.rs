//! edjournal - Elite Dangerous journal tailer and game state tracker
//!
//! Follows the rotating journal files the game writes, turns every line into
//! an [`Event`], fans events out over a typed publish/subscribe bus and folds
//! them into one change-tracked [`GameState`].
//!
//! # Core Concepts
//!
//! - **Tail, don't re-read**: the live journal is followed from a byte offset
//! - **One queue, one worker**: asynchronous publications are delivered in
//!   global publish order
//! - **Snapshots only**: subscribers receive clones, never the live state
//! - **Fail small**: bad lines, failing subscribers and failing mutations are
//!   logged and skipped
//!
//! # Modules
//!
//! - [`journal`] - Event model, journal reader and tailing loop
//! - [`bus`] - Typed signals and the dispatch worker
//! - [`signals`] - The process-wide signal set
//! - [`registry`] - Key to ordered handler list routing
//! - [`state`] - Game state tree, mutations and the aggregator
//! - [`supervisor`] - Background task lifecycle
//! - [`buffer`] - Batched journal events for periodic consumers
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod buffer;
pub mod bus;
pub mod cli;
pub mod config;
pub mod guard;
pub mod journal;
pub mod registry;
pub mod signals;
pub mod state;
pub mod supervisor;

// Re-export commonly used types
pub use buffer::EventBuffer;
pub use bus::{Bus, BusError, Dispatcher, DispatcherHandle, Payload, Signal};
pub use config::{Config, JournalConfig, PluginsConfig};
pub use journal::{
    Event, FieldValue, JournalError, JournalReader, JournalTailer, MalformedReason, TailState, TailerConfig,
    VersionInfo, parse_line,
};
pub use registry::{RouteError, RoutingRegistry};
pub use signals::AppSignals;
pub use state::{
    GameState, GameStateAggregator, MaterialCategory, MaterialStorage, MutationError, MutationFn, MutationRegistry,
    Trackable, Tracked, default_registry,
};
pub use supervisor::{StopSignal, Supervisor};
