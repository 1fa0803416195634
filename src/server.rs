use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::channel;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use crate::desk::PitWall;
use crate::session::{Session, OUTBOUND_QUEUE};

/// Accepts websocket clients forever. Every processed event is broadcast to
/// the whole session, not only to the sender.
pub async fn serve(listener: TcpListener, desk: PitWall, session: Session) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(stream, peer, desk.clone(), session.clone()));
            }
            Err(e) => {
                tracing::error!("accept error: {}", e);
                // small delay to avoid tight loop in case of persistent errors
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, desk: PitWall, session: Session) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(%peer, "websocket handshake failed: {}", e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let (tx, mut rx) = channel::<Message>(OUTBOUND_QUEUE);
    let id = session.join(tx);
    tracing::info!(%peer, conn = id, members = session.len(), "client connected");

    // Writer: exits when the socket fails or the session drops our queue.
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                tracing::warn!(conn = id, "send failed: {}", e);
                break;
            }
        }
        let _ = write.close().await;
    });

    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Binary(b)) => String::from_utf8_lossy(&b).into_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(conn = id, "protocol error: {}", e);
                break;
            }
        };

        let out = desk.handle(&text).await;
        let delivered = session.broadcast(&out);
        tracing::info!(
            event = %out.event,
            delivered,
            "broadcast radio: {}",
            out.radio_call
        );
    }

    // Removing our queue lets the writer drain and close.
    session.leave(id);
    tracing::info!(%peer, conn = id, "client disconnected");
}
