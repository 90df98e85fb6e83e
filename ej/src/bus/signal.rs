//! Signal - a named, typed publication point
//!
//! A signal carries one payload type, fixed at definition. Subscribers are
//! plain closures taking the payload by value; each one receives its own clone,
//! so nothing a subscriber does to its copy is visible to the publisher or to
//! the other subscribers.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use super::dispatcher::{Bus, DispatchItem};
use super::error::BusError;
use crate::guard;

/// Anything that can travel on a signal
pub trait Payload: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Payload for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

type Callback<P> = Arc<dyn Fn(P) -> eyre::Result<()> + Send + Sync>;

struct Subscriber<P> {
    name: String,
    callback: Callback<P>,
}

impl<P> Clone for Subscriber<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            callback: self.callback.clone(),
        }
    }
}

struct SignalInner<P> {
    name: String,
    bus: Bus,
    subscribers: RwLock<Arc<Vec<Subscriber<P>>>>,
}

/// A named signal carrying payloads of type `P`
pub struct Signal<P: Payload> {
    inner: Arc<SignalInner<P>>,
}

impl<P: Payload> Clone for Signal<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Payload> fmt::Debug for Signal<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.inner.name)
            .field("signature", &self.signature())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<P: Payload> Signal<P> {
    /// Define a signal on `bus`
    pub fn define(name: impl Into<String>, bus: &Bus) -> Self {
        let name = name.into();
        debug!(signal = %name, signature = std::any::type_name::<P>(), "Signal::define: called");
        Self {
            inner: Arc::new(SignalInner {
                name,
                bus: bus.clone(),
                subscribers: RwLock::new(Arc::new(Vec::new())),
            }),
        }
    }

    /// Signal name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Name of the payload type
    pub fn signature(&self) -> &'static str {
        std::any::type_name::<P>()
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.snapshot().len()
    }

    /// Register a subscriber
    ///
    /// Subscribers run in registration order. A returned error or a panic is
    /// logged and does not stop delivery to the remaining subscribers.
    pub fn subscribe<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(P) -> eyre::Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(signal = %self.inner.name, subscriber = %name, "Signal::subscribe: called");
        let subscriber = Subscriber {
            name,
            callback: Arc::new(callback),
        };

        let mut slot = self.inner.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let mut list = Vec::clone(&slot);
        list.push(subscriber);
        *slot = Arc::new(list);
    }

    /// Register a subscriber that takes the payload as a JSON value
    pub fn subscribe_loose<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(Value) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(name, move |payload: P| callback(serde_json::to_value(&payload)?));
    }

    /// Queue `payload` for the dispatch worker and return immediately
    ///
    /// The subscriber list is captured now; subscribers added later do not see
    /// this publication.
    pub fn publish_async(&self, payload: P) -> Result<(), BusError> {
        let subscribers = self.snapshot();
        if subscribers.is_empty() {
            debug!(signal = %self.inner.name, "publish_async: no subscribers, skipping");
            return Ok(());
        }
        self.inner.bus.enqueue(Box::new(Delivery {
            signal: self.inner.name.clone(),
            subscribers,
            payload,
        }))
    }

    /// Deliver `payload` on the calling task, bypassing the queue
    pub fn publish_sync(&self, payload: P) {
        let subscribers = self.snapshot();
        debug!(signal = %self.inner.name, subscribers = subscribers.len(), "publish_sync: called");
        deliver(&self.inner.name, &subscribers, payload);
    }

    /// Publish a dynamically typed payload asynchronously
    ///
    /// Fails with [`BusError::SignatureMismatch`] when `value` does not
    /// describe a `P`.
    pub fn publish_json(&self, value: Value) -> Result<(), BusError> {
        let payload = self.decode(value)?;
        self.publish_async(payload)
    }

    /// Synchronous counterpart of [`Signal::publish_json`]
    pub fn publish_json_sync(&self, value: Value) -> Result<(), BusError> {
        let payload = self.decode(value)?;
        self.publish_sync(payload);
        Ok(())
    }

    fn decode(&self, value: Value) -> Result<P, BusError> {
        serde_json::from_value(value).map_err(|e| BusError::SignatureMismatch {
            signal: self.inner.name.clone(),
            expected: self.signature(),
            reason: e.to_string(),
        })
    }

    fn snapshot(&self) -> Arc<Vec<Subscriber<P>>> {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

struct Delivery<P> {
    signal: String,
    subscribers: Arc<Vec<Subscriber<P>>>,
    payload: P,
}

impl<P: Payload> DispatchItem for Delivery<P> {
    fn signal_name(&self) -> &str {
        &self.signal
    }

    fn dispatch(self: Box<Self>) {
        deliver(&self.signal, &self.subscribers, self.payload);
    }
}

fn deliver<P: Payload>(signal: &str, subscribers: &[Subscriber<P>], payload: P) {
    for subscriber in subscribers {
        let copy = payload.clone();
        match guard::catch(|| (subscriber.callback)(copy)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(signal, subscriber = %subscriber.name, error = %e, "Subscriber failed");
            }
            Err(panic) => {
                error!(signal, subscriber = %subscriber.name, panic = %panic, "Subscriber panicked");
            }
        }
    }
}
