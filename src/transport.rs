//! Background task that owns the socket and reports what happens on it.
//!
//! The task connects, then turns connection activity into
//! [`TransportEvent`]s on a bounded channel. It never sends data messages;
//! pongs and the close echo are handled by [`Connection`].

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::client::{Payload, TransportEvent};
use crate::config::ClientConfig;
use crate::connection::{self, Connection};
use crate::message::{CloseCode, Message};

/// Start the transport for `config` on the current tokio runtime.
///
/// Returns the receiving end of the event channel and the task handle.
/// Dropping the receiver makes the task close the connection with 1001.
pub fn spawn(config: ClientConfig) -> (mpsc::Receiver<TransportEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.event_capacity.max(1));
    let task = tokio::spawn(run(config, tx));
    (rx, task)
}

/// Connect and pump events into `tx` until the connection ends.
pub async fn run(config: ClientConfig, tx: mpsc::Sender<TransportEvent>) {
    match connection::connect(&config).await {
        Ok(conn) => pump(conn, tx).await,
        Err(err) => {
            debug!(endpoint = %config.endpoint, error = %err, "connection attempt failed");
            let reason = err.to_string();
            let _ = tx.send(TransportEvent::Error(reason.clone())).await;
            let _ = tx
                .send(TransportEvent::close(false, CloseCode::Abnormal.as_u16(), reason))
                .await;
        }
    }
}

/// How long a client-initiated close waits for the server's reply.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Report an established connection's lifecycle into `tx`.
///
/// Emits `Open` first and a single `Close` last. If the receiver goes away
/// first, the connection is closed with 1001 instead.
pub async fn pump<T>(mut conn: Connection<T>, tx: mpsc::Sender<TransportEvent>)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    if tx.send(TransportEvent::Open).await.is_err() {
        go_away(&mut conn).await;
        return;
    }

    let last = loop {
        // Pongs go out here so that the read below is all select! can cancel.
        if let Err(err) = conn.flush_pending().await {
            let reason = err.to_string();
            let _ = tx.send(TransportEvent::Error(reason.clone())).await;
            break TransportEvent::close(false, CloseCode::Abnormal.as_u16(), reason);
        }

        let received = tokio::select! {
            biased;
            () = tx.closed() => {
                debug!("event receiver dropped, closing");
                go_away(&mut conn).await;
                return;
            }
            received = conn.recv() => received,
        };

        let event = match received {
            Ok(Some(Message::Text(text))) => TransportEvent::Message(Payload::Text(text)),
            Ok(Some(Message::Binary(data))) => TransportEvent::Message(Payload::Binary(data)),
            Ok(Some(Message::Ping(data))) => {
                trace!(len = data.len(), "ping");
                continue;
            }
            Ok(Some(Message::Pong(_))) => continue,
            Ok(Some(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => TransportEvent::close(true, frame.code.as_u16(), frame.reason),
                    None => TransportEvent::close(true, CloseCode::NoStatus.as_u16(), ""),
                };
            }
            Ok(None) => {
                debug!("stream ended without a close frame");
                break TransportEvent::close(false, CloseCode::Abnormal.as_u16(), "");
            }
            Err(err) => {
                let reason = err.to_string();
                let _ = tx.send(TransportEvent::Error(reason.clone())).await;
                break TransportEvent::close(false, CloseCode::Abnormal.as_u16(), reason);
            }
        };

        if tx.send(event).await.is_err() {
            debug!("event receiver dropped, closing");
            go_away(&mut conn).await;
            return;
        }
    };

    let _ = tx.send(last).await;
}

/// Send close 1001 and wait up to [`CLOSE_TIMEOUT`] for the server's reply.
async fn go_away<T>(conn: &mut Connection<T>)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(err) = conn.close(CloseCode::GoingAway, "").await {
        debug!(error = %err, "close frame not sent");
        return;
    }
    let drain = async {
        while let Ok(Some(msg)) = conn.recv().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    };
    if tokio::time::timeout(CLOSE_TIMEOUT, drain).await.is_err() {
        debug!("no close reply from server");
    }
}
