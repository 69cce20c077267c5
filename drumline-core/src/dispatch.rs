//! Side effects requested by the authority and the collaborators that run them.

use crate::database::PersistWriter;
use crate::error::{DrumlineError, ErrorKind, Result};
use crate::protocol::{Destination, Envelope};
use crate::types::Category;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Delivers envelopes to the panel or to the active document's page agent.
#[async_trait]
pub trait Courier: Send + Sync {
    async fn deliver(&self, envelope: Envelope) -> Result<()>;
}

/// Shows a notification to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, message: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fire-and-forget send to the panel or a page agent
    Deliver(Envelope),
    /// Checkpoint one category with its freshly encoded value
    Persist { category: Category, value: String },
    Notify { title: String, message: String },
}

/// Runs effects without ever blocking the handler that produced them.
///
/// Deliveries and notifications from every handler call go through one queue
/// drained by a single task, so they reach the host in emission order.
pub struct Dispatcher {
    queue: mpsc::UnboundedSender<Effect>,
    sender: JoinHandle<()>,
    writer: PersistWriter,
}

impl Dispatcher {
    /// Start the delivery task. Must be called from within a tokio runtime.
    pub fn new(courier: Arc<dyn Courier>, notifier: Arc<dyn Notifier>, writer: PersistWriter) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        Self {
            queue,
            sender: tokio::spawn(run_deliveries(rx, courier, notifier)),
            writer,
        }
    }

    /// Submit persists to the writer and queue everything else. Never blocks.
    pub fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Persist { category, value } => self.writer.submit(category, value),
                other => {
                    if self.queue.send(other).is_err() {
                        error!("Delivery task is gone; dropping effect");
                    }
                }
            }
        }
    }

    /// Log an error and, for user-facing kinds, notify.
    ///
    /// Protocol errors are also returned to the request's caller by the event
    /// loop; nothing here stops the process.
    pub fn report(&self, err: &DrumlineError) {
        match err.kind() {
            ErrorKind::Validation => {
                warn!("Rejected input: {}", err);
                let message = match err {
                    DrumlineError::Validation(m) => m.clone(),
                    other => other.to_string(),
                };
                self.dispatch(vec![Effect::Notify {
                    title: "Input error".into(),
                    message,
                }]);
            }
            ErrorKind::Storage => {
                warn!("{}", err);
                self.dispatch(vec![Effect::Notify {
                    title: "Storage error".into(),
                    message: err.to_string(),
                }]);
            }
            ErrorKind::Precondition | ErrorKind::Protocol => error!("{}", err),
        }
    }

    /// Send everything queued and flush pending checkpoints
    pub async fn shutdown(self) {
        let Self {
            queue,
            sender,
            writer,
        } = self;
        drop(queue);
        if let Err(e) = sender.await {
            error!("Delivery task failed: {}", e);
        }
        writer.shutdown().await;
    }
}

async fn run_deliveries(
    mut rx: mpsc::UnboundedReceiver<Effect>,
    courier: Arc<dyn Courier>,
    notifier: Arc<dyn Notifier>,
) {
    while let Some(effect) = rx.recv().await {
        match effect {
            Effect::Deliver(envelope) => {
                let destination = envelope.destination();
                if let Err(e) = courier.deliver(envelope).await {
                    // The panel is closed most of the time.
                    if destination == Destination::Panel {
                        debug!("Panel did not receive message: {}", e);
                    } else {
                        warn!("Failed to deliver message to {}: {}", destination, e);
                    }
                }
            }
            Effect::Notify { title, message } => {
                if let Err(e) = notifier.notify(&title, &message).await {
                    warn!("Failed to show notification {:?}: {}", title, e);
                }
            }
            Effect::Persist { .. } => {}
        }
    }
}
