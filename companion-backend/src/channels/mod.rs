pub mod dispatcher;
pub mod message;
pub mod types;

pub use dispatcher::MessageDispatcher;
pub use message::{Message, SelfMention};
pub use types::{ChatMessage, DispatchResult, IgnoreReason, Note, Notification, StreamEvent};

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Consumes stream events and hands each one to the dispatcher in its own task,
/// so a hook waiting on the network never holds up the next event
pub struct StreamListener {
    dispatcher: Arc<MessageDispatcher>,
}

impl StreamListener {
    pub fn new(dispatcher: Arc<MessageDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Run until the channel closes or `cancel` fires, then wait for in-flight events
    pub async fn run(&self, mut events: mpsc::Receiver<StreamEvent>, cancel: CancellationToken) {
        log::info!("[STREAM] Listening for events");
        let mut in_flight: Vec<JoinHandle<DispatchResult>> = Vec::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("[STREAM] Listener cancelled");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        log::info!("[STREAM] Event source closed");
                        break;
                    };
                    let dispatcher = self.dispatcher.clone();
                    in_flight.push(tokio::spawn(async move { dispatcher.dispatch(event).await }));
                    in_flight.retain(|h| !h.is_finished());
                }
            }
        }

        for handle in in_flight {
            match handle.await {
                Ok(result) => log::debug!("[STREAM] Event finished: {:?}", result),
                Err(e) => log::error!("[STREAM] Dispatch task failed: {}", e),
            }
        }
    }
}

/// Read newline-delimited JSON frames and forward the parsed events.
/// Malformed lines are logged and skipped.
pub async fn relay_lines<R>(
    reader: R,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match types::parse_frame(line) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    break;
                }
                forwarded += 1;
            }
            Err(e) => log::warn!("[STREAM] Skipping malformed frame: {}", e),
        }
    }
    Ok(forwarded)
}
