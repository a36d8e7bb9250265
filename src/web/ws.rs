//! WebSocket endpoint
//!
//! Each connection gets its own session task which multiplexes two
//! sources: frames from the client and the shared readings broadcast.
//! The client may send `{"type": "ping"}` and `{"type": "request_status"}`;
//! anything else is logged and ignored so protocol additions never kill
//! older dashboards.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_ws::{Message, MessageStream, Session};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::broadcast;

use crate::protocol::{ClientMessage, WsMessage};
use crate::web::AppState;

/// `GET /ws` - upgrade and hand the connection to a session task.
pub async fn ws_route(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (response, session, msg_stream) = actix_ws::handle(&req, body)?;

    let state = state.into_inner();
    let rx = state.tx.subscribe();
    let n = state.clients.fetch_add(1, Ordering::SeqCst) + 1;
    info!("websocket client connected ({n} active)");

    actix_web::rt::spawn(session_loop(session, msg_stream, rx, state));

    Ok(response)
}

async fn session_loop(
    mut session: Session,
    mut msg_stream: MessageStream,
    mut rx: broadcast::Receiver<String>,
    state: Arc<AppState>,
) {
    loop {
        tokio::select! {
            msg = msg_stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !handle_client_text(&mut session, &text, &state).await {
                        break;
                    }
                }
                Some(Ok(Message::Ping(bytes))) => {
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(reason))) => {
                    debug!("websocket closed by client: {reason:?}");
                    break;
                }
                Some(Ok(_)) => {} // binary, pong, continuation: ignore
                Some(Err(e)) => {
                    warn!("websocket protocol error: {e}");
                    break;
                }
                None => break,
            },
            broadcast = rx.recv() => match broadcast {
                Ok(text) => {
                    if session.text(text).await.is_err() {
                        break;
                    }
                }
                // slow client skipped some broadcasts, keep going
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("websocket client lagged, dropped {n} broadcast(s)");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let n = state.clients.fetch_sub(1, Ordering::SeqCst) - 1;
    info!("websocket client disconnected ({n} active)");
    let _ = session.close(None).await;
}

/// Returns false when the session should be torn down.
async fn handle_client_text(session: &mut Session, text: &str, state: &Arc<AppState>) -> bool {
    match client_reply(text, state).await {
        Some(reply) => session.text(reply.to_json()).await.is_ok(),
        None => true,
    }
}

/// The reply owed to a client text frame, if any. Unrecognized frames
/// and failed status queries are logged and produce no reply.
async fn client_reply(text: &str, state: &Arc<AppState>) -> Option<WsMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => Some(WsMessage::pong()),
        Ok(ClientMessage::RequestStatus) => {
            let rig = state.rig.clone();
            match web::block(move || rig.sensors().len()).await {
                Ok(sensor_count) => Some(WsMessage::status(
                    state.connected_clients(),
                    sensor_count,
                    state.uptime_s(),
                )),
                Err(e) => {
                    warn!("status query failed: {e}");
                    None
                }
            }
        }
        Err(e) => {
            debug!("ignoring unrecognized websocket message {text:?}: {e}");
            None
        }
    }
}
