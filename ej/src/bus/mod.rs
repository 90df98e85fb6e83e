//! Typed publish/subscribe bus
//!
//! Signals are defined against a [`Bus`]. Asynchronous publications go
//! through one FIFO queue drained by a single [`Dispatcher`] task;
//! synchronous publications run on the caller.

mod dispatcher;
mod error;
mod signal;

pub use dispatcher::{Bus, Dispatcher, DispatcherHandle};
pub use error::BusError;
pub use signal::{Payload, Signal};
