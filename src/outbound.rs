use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::message::Message;
use crate::queue::{Drained, MessageQueue};
use crate::session::{Session, SessionState};
use crate::transport::Transport;

/// Reads lines from the local terminal and queues them for transmission.
///
/// The sentinel line, whether typed or implied by the end of input, is
/// queued like any other message so the transmitter flushes it to the peer
/// before the session ends. Whatever stops this task, it closes the
/// outbound queue on the way out; nothing else does.
pub async fn read_input<R>(mut input: R, outbound: Arc<MessageQueue>, session: Session)
where
    R: AsyncBufRead + Unpin,
{
    let mut shutdown = session.monitor();
    let mut line = String::new();
    loop {
        line.clear();
        let read = tokio::select! {
            read = input.read_line(&mut line) => read,
            _ = shutdown.wait() => {
                // Shutdown began elsewhere. If it is ours, from an idle
                // expiry or a dead socket, the peer still gets a goodbye.
                if session.state() == SessionState::LocalShutdown {
                    let _ = outbound.push(Message::sentinel()).await;
                }
                break;
            }
        };
        match read {
            Ok(0) => {
                debug!("input closed, sending the sentinel on the user's behalf");
                let _ = outbound.push(Message::sentinel()).await;
                session.begin_local_shutdown();
                break;
            }
            Ok(_) => {
                let message = Message::from_line(&line);
                let ends_session = message.is_sentinel();
                if outbound.push(message).await.is_err() {
                    break;
                }
                if ends_session {
                    session.begin_local_shutdown();
                    break;
                }
            }
            Err(error) => {
                warn!(%error, "could not read input, ending the session");
                let _ = outbound.push(Message::sentinel()).await;
                session.begin_local_shutdown();
                break;
            }
        }
    }
    outbound.close().await;
}

/// Sends queued messages to the peer in order, one datagram per message.
///
/// A failed send costs that one message; delivery is best effort anyway.
/// The task stops when the queue closes, after the final flush on a local
/// shutdown, or as soon as the peer is known to be gone, in which case
/// leftover messages are discarded unsent.
pub async fn transmit<T>(
    transport: Arc<T>,
    peer: SocketAddr,
    outbound: Arc<MessageQueue>,
    session: Session,
) where
    T: Transport,
{
    loop {
        match outbound.drain_all().await {
            Drained::Batch(batch) => {
                if session.state() == SessionState::RemoteShutdown {
                    debug!(discarded = batch.len(), "peer left, dropping unsent messages");
                    break;
                }
                debug!(count = batch.len(), "sending batch");
                for message in batch {
                    if let Err(error) = transport.send(message.as_bytes(), peer).await {
                        warn!(%error, "failed to send message, dropping it");
                    }
                }
            }
            Drained::Closed => break,
        }
    }
}
