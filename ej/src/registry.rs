//! RoutingRegistry - string-keyed handler lists
//!
//! Maps a route key (an event type name, usually) to an ordered list of
//! handlers. The same handler may be registered under many keys. Invoking a
//! key runs its handlers in registration order; one handler failing never
//! prevents the next from running.

use std::collections::HashMap;
use std::fmt::Display;

use thiserror::Error;
use tracing::{debug, error};

use crate::guard;

/// Routing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("No handlers registered for '{0}'")]
    NotRegistered(String),
}

/// Ordered handler lists keyed by route
#[derive(Clone)]
pub struct RoutingRegistry<H> {
    routes: HashMap<String, Vec<H>>,
}

impl<H> Default for RoutingRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> std::fmt::Debug for RoutingRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.routes.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        keys.sort();
        f.debug_struct("RoutingRegistry").field("routes", &keys).finish()
    }
}

impl<H> RoutingRegistry<H> {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Append `handler` to the list for `key`
    pub fn register(&mut self, key: impl Into<String>, handler: H) {
        let key = key.into();
        debug!(route = %key, "RoutingRegistry::register: called");
        self.routes.entry(key).or_default().push(handler);
    }

    /// Register one handler under several keys
    pub fn register_many(&mut self, keys: &[&str], handler: H)
    where
        H: Clone,
    {
        for key in keys {
            self.register(*key, handler.clone());
        }
    }

    /// Handlers for `key`, in registration order
    pub fn handlers(&self, key: &str) -> &[H] {
        self.routes.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if at least one handler is registered for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.routes.get(key).is_some_and(|v| !v.is_empty())
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Run every handler for `key`, skipping failures
    ///
    /// An unknown key is not an error and yields nothing. Handler errors and
    /// panics are logged; the results of the handlers that succeeded are
    /// returned in order.
    pub fn invoke_all<R, E, F>(&self, key: &str, mut call: F) -> Vec<R>
    where
        E: Display,
        F: FnMut(&H) -> Result<R, E>,
    {
        let mut results = Vec::new();
        for (index, handler) in self.handlers(key).iter().enumerate() {
            match guard::catch(|| call(handler)) {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => error!(route = key, index, error = %e, "Route handler failed"),
                Err(panic) => error!(route = key, index, panic = %panic, "Route handler panicked"),
            }
        }
        results
    }

    /// Like [`RoutingRegistry::invoke_all`], but an unknown key is an error
    pub fn execute<R, E, F>(&self, key: &str, call: F) -> Result<Vec<R>, RouteError>
    where
        E: Display,
        F: FnMut(&H) -> Result<R, E>,
    {
        if !self.contains(key) {
            return Err(RouteError::NotRegistered(key.to_string()));
        }
        Ok(self.invoke_all(key, call))
    }
}
