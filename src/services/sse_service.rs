use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dto::sse::{Handshake, ServerEvent},
    services::sse_events::{EVENT_EFFECT, EVENT_HANDSHAKE},
    state::{SharedState, effects::EffectSubscription, scene::SceneKind},
};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Subscribe to the shared public SSE stream.
pub fn subscribe_public(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.public_sse().subscribe()
}

/// First event of every stream.
pub fn handshake(state: &SharedState, stream: &str) -> Option<ServerEvent> {
    let payload = Handshake {
        stream: stream.to_string(),
        message: format!("{stream} stream connected"),
        degraded: state.is_degraded(),
    };
    ServerEvent::json(Some(EVENT_HANDSHAKE.to_string()), &payload)
        .inspect_err(|err| warn!(error = %err, "failed to serialise handshake"))
        .ok()
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(KEEP_ALIVE_INTERVAL)
        .text("keep-alive")
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    handshake: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        if let Some(first) = handshake {
            if tx.send(Ok(to_event(first))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // Skip lagged messages but keep the stream alive.
                            warn!(skipped, "public SSE subscriber lagging");
                            continue;
                        }
                    }
                }
            }
        }

        info!("Public SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    Sse::new(ReceiverStream::new(rx)).keep_alive(keep_alive())
}

/// Logs when the effect stream of a scene is dropped by axum.
struct DetachLog(SceneKind);

impl Drop for DetachLog {
    fn drop(&mut self) {
        info!(scene = %self.0, "effect stream detached");
    }
}

/// Serve the effects of one scene. Dropping the response detaches the
/// consumer, and buffered effects are discarded with it.
pub fn effects_to_sse(
    scene: SceneKind,
    mut subscription: EffectSubscription,
    handshake: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let _detach = DetachLog(scene);
        if let Some(first) = handshake {
            yield Ok(to_event(first));
        }
        while let Some(effect) = subscription.recv().await {
            match ServerEvent::json(Some(EVENT_EFFECT.to_string()), &effect) {
                Ok(payload) => yield Ok(to_event(payload)),
                Err(err) => warn!(scene = %scene, error = %err, "failed to serialise effect"),
            }
        }
    };

    Sse::new(stream).keep_alive(keep_alive())
}
