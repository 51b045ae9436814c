use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug};

use crate::api::rest::ApiState;
use crate::config::HubConfig;
use crate::hub::DropReason;
use crate::observability::tracing::trace_observer;
use crate::types::ids::ObserverId;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> Response {
    ws.on_upgrade(move |socket| {
        let observer_id = ObserverId::new();
        let span = trace_observer(&observer_id);
        handle_socket(socket, observer_id, state).instrument(span)
    })
}

/// One connected observer: a delivery task drains the hub-owned outbound
/// queue and keeps the connection alive with pings; a read task enforces
/// the liveness deadline. Whichever side fails first decides the drop
/// reason, and the observer is unregistered exactly once.
async fn handle_socket(socket: WebSocket, observer_id: ObserverId, state: Arc<ApiState>) {
    let outbound = match state.hub.register(observer_id).await {
        Ok(receiver) => receiver,
        Err(_) => return,
    };
    let (sender, receiver) = socket.split();
    let hub_config = state.config.hub.clone();

    let mut delivery_task = tokio::spawn(deliver(sender, outbound, hub_config.clone()));
    let mut read_task = tokio::spawn(read(receiver, hub_config));

    let reason = tokio::select! {
        delivered = &mut delivery_task => {
            read_task.abort();
            delivered.ok().flatten()
        }
        inbound = &mut read_task => {
            delivery_task.abort();
            inbound.ok()
        }
    };

    if let Some(reason) = reason {
        let _ = state.hub.unregister(observer_id, reason).await;
    }
    debug!("Observer {} session ended", observer_id);
}

/// Returns the drop reason, or None when the hub already closed the queue
/// (overflow drop or shutdown) and no unregister is needed.
async fn deliver(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Arc<String>>,
    config: HubConfig,
) -> Option<DropReason> {
    let mut ping = tokio::time::interval(config.ping_interval());
    ping.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            payload = outbound.recv() => match payload {
                Some(payload) => {
                    let frame = Message::Text((*payload).clone());
                    match tokio::time::timeout(config.write_timeout(), sender.send(frame)).await {
                        Ok(Ok(())) => {}
                        _ => return Some(DropReason::WriteError),
                    }
                }
                None => {
                    let _ = sender.send(Message::Close(None)).await;
                    return None;
                }
            },
            _ = ping.tick() => {
                let ping_frame = Message::Ping(Vec::new());
                match tokio::time::timeout(config.write_timeout(), sender.send(ping_frame)).await {
                    Ok(Ok(())) => {}
                    _ => return Some(DropReason::WriteError),
                }
            }
        }
    }
}

async fn read(mut receiver: SplitStream<WebSocket>, config: HubConfig) -> DropReason {
    loop {
        // Any inbound frame, pongs included, refreshes the read deadline.
        match tokio::time::timeout(config.read_timeout(), receiver.next()).await {
            Err(_) => return DropReason::LivenessTimeout,
            Ok(None) => return DropReason::ClientClosed,
            Ok(Some(Err(_))) => return DropReason::ReadError,
            Ok(Some(Ok(Message::Close(_)))) => return DropReason::ClientClosed,
            Ok(Some(Ok(_))) => {}
        }
    }
}
