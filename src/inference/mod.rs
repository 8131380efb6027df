//! Remote inference invocation
//!
//! The controller talks to inference through a command/event channel pair
//! serviced by a worker task. Each prompt is dispatched as its own request
//! so a cancelled turn's round trip never blocks the next turn; the
//! completion event carries the turn id and the controller discards
//! results whose turn is no longer active.

pub mod client;

pub use client::{InferenceClient, InferenceConfig};

use crate::turn::TurnId;
use crate::Result;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// Commands accepted by the inference worker
#[derive(Debug, Clone)]
pub enum InferenceCommand {
    /// Send one prompt on behalf of a turn
    Generate { turn: TurnId, prompt: String },

    /// Shut the worker down
    Shutdown,
}

/// Events emitted by the inference worker
#[derive(Debug)]
pub enum InferenceEvent {
    /// The round trip for a turn finished, successfully or not
    Completed {
        turn: TurnId,
        result: Result<String>,
    },
}

/// Spawn the inference worker task
///
/// Returns the command sender and the completion event receiver the
/// controller loop selects on.
pub fn spawn_worker(
    client: InferenceClient,
) -> (
    UnboundedSender<InferenceCommand>,
    UnboundedReceiver<InferenceEvent>,
) {
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<InferenceEvent>();

    tokio::spawn(async move {
        info!("inference worker starting");

        while let Some(command) = command_rx.recv().await {
            match command {
                InferenceCommand::Generate { turn, prompt } => {
                    debug!(turn, "dispatching prompt to inference service");
                    let client = client.clone();
                    let event_tx = event_tx.clone();
                    tokio::spawn(async move {
                        let result = client.send(&prompt).await;
                        let _ = event_tx.send(InferenceEvent::Completed { turn, result });
                    });
                }
                InferenceCommand::Shutdown => {
                    info!("inference worker shutting down");
                    break;
                }
            }
        }

        info!("inference worker stopped");
    });

    (command_tx, event_rx)
}
