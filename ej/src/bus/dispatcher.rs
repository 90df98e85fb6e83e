//! Dispatcher - the single worker that drains the bus queue
//!
//! Every asynchronous publish becomes one queued item carrying the payload and
//! the subscriber list captured at publish time. One worker task runs items
//! strictly in FIFO order, so a subscriber sees signals in global publish
//! order and no two items are ever dispatched in parallel.

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::error::BusError;

/// A queued publication, type-erased so all signals share one queue
pub(crate) trait DispatchItem: Send {
    /// Signal name, for logging
    fn signal_name(&self) -> &str;

    /// Invoke every captured subscriber
    fn dispatch(self: Box<Self>);
}

pub(crate) enum QueueMessage {
    Item(Box<dyn DispatchItem>),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Cheap handle used by signals to enqueue work
#[derive(Clone)]
pub struct Bus {
    tx: mpsc::UnboundedSender<QueueMessage>,
}

impl Bus {
    /// Create a bus and the dispatcher that must be run to drain it
    pub fn new() -> (Self, Dispatcher) {
        debug!("Bus::new: called");
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, Dispatcher { rx })
    }

    pub(crate) fn enqueue(&self, item: Box<dyn DispatchItem>) -> Result<(), BusError> {
        self.tx.send(QueueMessage::Item(item)).map_err(|_| BusError::Closed)
    }

    /// Wait until the queue is idle
    ///
    /// Resolves once everything published before the call, and anything those
    /// deliveries published in turn, has been dispatched.
    pub async fn flush(&self) -> Result<(), BusError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueMessage::Flush(reply_tx))
            .map_err(|_| BusError::Closed)?;
        reply_rx.await.map_err(|_| BusError::Closed)
    }

    /// Ask the dispatcher to stop once the items queued so far are delivered
    pub fn shutdown(&self) {
        debug!("Bus::shutdown: called");
        let _ = self.tx.send(QueueMessage::Shutdown);
    }

    /// True once the dispatcher is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The dispatch worker
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<QueueMessage>,
}

impl Dispatcher {
    /// Drain the queue until shutdown is requested or every bus handle is dropped
    pub async fn run(mut self) {
        info!("Dispatcher started");
        let mut dispatched: u64 = 0;
        let mut waiting: Vec<oneshot::Sender<()>> = Vec::new();

        loop {
            let msg = match self.rx.try_recv() {
                Ok(msg) => msg,
                Err(TryRecvError::Empty) => {
                    for reply in waiting.drain(..) {
                        let _ = reply.send(());
                    }
                    match self.rx.recv().await {
                        Some(msg) => msg,
                        None => break,
                    }
                }
                Err(TryRecvError::Disconnected) => break,
            };

            match msg {
                QueueMessage::Item(item) => {
                    debug!(signal = item.signal_name(), "Dispatcher: dispatching");
                    item.dispatch();
                    dispatched += 1;
                }
                QueueMessage::Flush(reply) => waiting.push(reply),
                QueueMessage::Shutdown => {
                    debug!("Dispatcher: shutdown requested");
                    break;
                }
            }
        }

        for reply in waiting {
            let _ = reply.send(());
        }
        info!(dispatched, "Dispatcher stopped");
    }

    /// Spawn the worker on the current runtime
    pub fn spawn(self) -> DispatcherHandle {
        DispatcherHandle {
            handle: tokio::spawn(self.run()),
        }
    }
}

/// Handle to a spawned dispatcher; dropping it detaches the worker
pub struct DispatcherHandle {
    handle: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Wait for the worker to exit, returning false if it ended abnormally
    pub async fn join(self) -> bool {
        match self.handle.await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Dispatcher ended abnormally");
                false
            }
        }
    }

    /// Stop the worker without draining the queue
    pub fn abort(&self) {
        self.handle.abort();
    }
}
