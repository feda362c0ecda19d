use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::protocol::CommandResponse;
use crate::server::{DisconnectReason, SessionManager, SessionSignal};

/// The only path the WebSocket endpoint is served on.
pub const ENDPOINT_PATH: &str = "/mcp";

fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == ENDPOINT_PATH {
        return Ok(response);
    }
    let mut rejection = ErrorResponse::new(Some(format!(
        "no endpoint at {}, connect to {ENDPOINT_PATH}",
        request.uri().path()
    )));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}

/// Drive one client connection from handshake to teardown.
///
/// The handshake is bounded by the session hard timeout, and both the
/// handshake and any command in progress give way to `shutdown`.
pub async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    manager: Arc<SessionManager>,
    shutdown: CancellationToken,
) {
    let (id, mut signals) = manager.connect(Some(peer.to_string()), Instant::now()).await;
    let handshake_timeout = manager.limits().await.hard_timeout;

    let handshake = tokio::time::timeout(
        handshake_timeout,
        tokio_tungstenite::accept_hdr_async(stream, check_path),
    );
    tokio::pin!(handshake);

    let ws = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                manager.disconnect(id, DisconnectReason::Shutdown).await;
                return;
            }
            signal = signals.recv() => match signal {
                Some(SessionSignal::Probe) => continue,
                Some(SessionSignal::Close) | None => {
                    manager.disconnect(id, DisconnectReason::Expired).await;
                    return;
                }
            },
            accepted = &mut handshake => match accepted {
                Ok(Ok(ws)) => break ws,
                Ok(Err(e)) => {
                    manager
                        .disconnect(id, DisconnectReason::Abrupt(format!("handshake failed: {e}")))
                        .await;
                    return;
                }
                Err(_) => {
                    manager
                        .disconnect(id, DisconnectReason::Abrupt("handshake timed out".to_string()))
                        .await;
                    return;
                }
            },
        }
    };
    if let Err(e) = manager.activate(id, Instant::now()).await {
        manager.disconnect(id, DisconnectReason::Abrupt(e.to_string())).await;
        return;
    }

    let (mut sink, mut frames) = ws.split();

    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break DisconnectReason::Shutdown;
            }
            signal = signals.recv() => match signal {
                Some(SessionSignal::Probe) => {
                    if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                        break DisconnectReason::Abrupt(e.to_string());
                    }
                }
                Some(SessionSignal::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break DisconnectReason::Expired;
                }
            },
            frame = frames.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            let response = CommandResponse::error("Binary frames must carry UTF-8 JSON");
                            if let Err(e) = send_response(&mut sink, &response).await {
                                break DisconnectReason::Abrupt(e);
                            }
                            continue;
                        }
                    },
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        manager.record_activity(id, Instant::now()).await;
                        continue;
                    }
                    Some(Ok(Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break DisconnectReason::Graceful,
                    Some(Err(e)) => break DisconnectReason::Abrupt(e.to_string()),
                };

                // Dropping an unfinished command kills any load generator it started.
                let response = tokio::select! {
                    _ = shutdown.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break DisconnectReason::Shutdown;
                    }
                    response = manager.handle_message(id, &text, Instant::now()) => response,
                };
                if let Err(e) = send_response(&mut sink, &response).await {
                    break DisconnectReason::Abrupt(e);
                }
            }
        }
    };

    manager.disconnect(id, reason).await;
}

async fn send_response<S>(sink: &mut S, response: &CommandResponse) -> Result<(), String>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let body = serde_json::to_string(response).map_err(|e| e.to_string())?;
    sink.send(Message::Text(body)).await.map_err(|e| e.to_string())
}
