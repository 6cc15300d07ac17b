//! Per-connection task
//!
//! Runs one upgraded WebSocket: a writer task drains the connection's
//! outbound queue into the socket and sends heartbeat pings, while this task
//! reads inbound frames and feeds them to the lifecycle dispatcher. Whichever
//! side stops first ends the connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use crate::error::{Error, Result};
use crate::registry::{FrameKind, RelayFrame, RoomId};
use crate::server::config::{ServerConfig, MIN_PING_INTERVAL};
use crate::server::handler::RelayHandler;
use crate::session::LifecycleDispatcher;

/// Drive one connection from handshake to close
pub(crate) async fn run_connection<H: RelayHandler>(
    mut socket: WebSocket,
    dispatcher: Arc<LifecycleDispatcher<H>>,
    config: Arc<ServerConfig>,
    room: RoomId,
    peer_addr: Option<SocketAddr>,
) {
    let (mut session, outbound) = match dispatcher.connect(room, peer_addr).await {
        Ok(opened) => opened,
        Err(e) => {
            let code = match e {
                Error::Rejected => close_code::POLICY,
                _ => close_code::ERROR,
            };
            tracing::debug!(peer = ?peer_addr, error = %e, "Closing unregistered connection");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: "connection refused".into(),
                })))
                .await;
            return;
        }
    };

    let connection = Arc::clone(session.connection());
    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(
        sink,
        outbound,
        config.ping_interval,
        config.write_timeout,
    ));

    let outcome: Result<()> = loop {
        tokio::select! {
            // Any inbound traffic, pongs included, proves the peer is alive
            read = timeout(config.pong_timeout, stream.next()) => match read {
                Err(_) => break Err(Error::HeartbeatTimeout),
                Ok(None) => break Ok(()),
                Ok(Some(Err(e))) => break Err(Error::Transport(e)),
                Ok(Some(Ok(message))) => match message {
                    Message::Text(text) => match RelayFrame::utf8(text.into()) {
                        Ok(frame) => {
                            dispatcher.on_message(&mut session, frame).await;
                        }
                        Err(e) => {
                            tracing::warn!(conn_id = %session.id(), error = %e, "Dropping invalid text frame");
                        }
                    },
                    Message::Binary(data) => {
                        dispatcher.on_message(&mut session, RelayFrame::binary(data)).await;
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(frame) => {
                        tracing::debug!(
                            conn_id = %session.id(),
                            reason = ?frame,
                            "Client initiated close"
                        );
                        break Ok(());
                    }
                },
            },
            written = &mut writer => {
                break match written {
                    Ok(result) => result,
                    // Writer panicked or was cancelled; nothing left to report
                    Err(_) => Ok(()),
                };
            }
            _ = connection.closed() => {
                tracing::debug!(conn_id = %session.id(), "Connection closed by relay");
                break Ok(());
            }
        }
    };

    writer.abort();

    match outcome {
        Ok(()) => dispatcher.on_disconnect(&mut session).await,
        Err(e) => dispatcher.on_error(&mut session, &e).await,
    };
}

/// Forward queued frames to the socket and ping on a fixed interval
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<RelayFrame>,
    ping_interval: Duration,
    write_timeout: Duration,
) -> Result<()> {
    let ping_interval = ping_interval.max(MIN_PING_INTERVAL);
    let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => into_message(frame),
                None => break,
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        match timeout(write_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(Error::Transport(e)),
            Err(_) => return Err(Error::WriteTimeout),
        }
    }

    let _ = sink.close().await;
    Ok(())
}

/// Map a relay frame back onto the WebSocket frame kind it arrived as
fn into_message(frame: RelayFrame) -> Message {
    match frame.kind() {
        FrameKind::Text => match Utf8Bytes::try_from(frame.data().clone()) {
            Ok(text) => Message::Text(text),
            Err(_) => Message::Binary(frame.data().clone()),
        },
        FrameKind::Binary => Message::Binary(frame.data().clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_frame_stays_text() {
        match into_message(RelayFrame::text("hi")) {
            Message::Text(text) => assert_eq!(text.as_str(), "hi"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_text_frame_shares_buffer() {
        let frame = RelayFrame::text("shared payload");
        let ptr = frame.data().as_ptr();
        match into_message(frame) {
            Message::Text(text) => assert_eq!(Bytes::from(text).as_ptr(), ptr),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_binary_frame_stays_binary() {
        let data = Bytes::from_static(&[0, 159, 146, 150]);
        match into_message(RelayFrame::binary(data.clone())) {
            Message::Binary(bytes) => assert_eq!(bytes, data),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
