// Foreground dispatcher: presentation commands are applied in order by one task and
// streamed to the game server over a WebSocket.

use axum::extract::State;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::SinkExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::domain::ports::Presentation;
use crate::domain::presentation::PresentationCommand;
use crate::interface_adapters::state::AppState;

// Producer side. Never blocks: a full queue drops the command.
#[derive(Clone)]
pub struct ForegroundPresentation {
    tx: mpsc::Sender<PresentationCommand>,
}

pub fn channel(capacity: usize) -> (ForegroundPresentation, mpsc::Receiver<PresentationCommand>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ForegroundPresentation { tx }, rx)
}

impl Presentation for ForegroundPresentation {
    fn dispatch(&self, command: PresentationCommand) {
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                warn!(?command, "presentation queue full; dropping command");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("presentation dispatcher stopped; dropping command");
            }
        }
    }
}

// Serializes each command once and broadcasts the shared bytes to every feed subscriber.
pub async fn run_dispatcher(
    mut rx: mpsc::Receiver<PresentationCommand>,
    feed_tx: broadcast::Sender<Utf8Bytes>,
) {
    while let Some(command) = rx.recv().await {
        let txt = match serde_json::to_string(&command) {
            Ok(txt) => txt,
            Err(e) => {
                error!(error = ?e, "failed to serialize presentation command");
                continue;
            }
        };
        // No subscriber is fine; the command is simply not observed.
        let _ = feed_tx.send(Utf8Bytes::from(txt));
    }
    debug!("presentation queue closed; dispatcher exiting");
}

pub async fn feed_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let feed_rx = state.feed_tx.subscribe();
    ws.on_upgrade(|socket| stream_feed(socket, feed_rx))
}

async fn stream_feed(mut socket: WebSocket, mut feed_rx: broadcast::Receiver<Utf8Bytes>) {
    info!("feed subscriber connected");
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = ?err, "feed socket error");
                        break;
                    }
                }
            }
            outgoing = feed_rx.recv() => {
                match outgoing {
                    Ok(bytes) => {
                        if let Err(err) = socket.send(Message::Text(bytes)).await {
                            warn!(error = ?err, "failed to send presentation command");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "feed subscriber lagged; commands skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    info!("feed subscriber disconnected");
}
