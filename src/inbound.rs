use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::message::{MAX_MESSAGE_LEN, Message};
use crate::queue::{Drained, MessageQueue};
use crate::session::{Session, SessionState};
use crate::transport::{Peer, Transport};

enum Incoming {
    Datagram(usize, SocketAddr),
    IdleExpired,
    Failed(io::Error),
}

async fn next_incoming<T>(transport: &T, buf: &mut [u8], idle_timeout: Option<Duration>) -> Incoming
where
    T: Transport,
{
    let received = match idle_timeout {
        Some(limit) => match timeout(limit, transport.recv(buf)).await {
            Ok(received) => received,
            Err(_) => return Incoming::IdleExpired,
        },
        None => transport.recv(buf).await,
    };
    match received {
        Ok((len, from)) => Incoming::Datagram(len, from),
        Err(error) => Incoming::Failed(error),
    }
}

/// Datagram-socket errors that do not mean the socket is unusable, notably
/// the connection-reset style failures some platforms report after a send
/// to an unreachable port.
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
    )
}

/// Receives datagrams from the peer and queues them for printing.
///
/// Only datagrams from the pinned peer address count. The sentinel starts
/// the remote shutdown and is never queued as chat. With an idle timeout
/// configured, a silent peer ends the session through the local path.
/// Whatever stops this task, it closes the inbound queue on the way out;
/// nothing else does.
pub async fn receive<T>(
    transport: Arc<T>,
    peer: SocketAddr,
    inbound: Arc<MessageQueue>,
    session: Session,
    idle_timeout: Option<Duration>,
) where
    T: Transport,
{
    let mut shutdown = session.monitor();
    let mut buf = [0u8; MAX_MESSAGE_LEN];
    loop {
        let incoming = tokio::select! {
            incoming = next_incoming(transport.as_ref(), &mut buf, idle_timeout) => incoming,
            _ = shutdown.wait() => break,
        };
        match incoming {
            Incoming::Datagram(len, from) => {
                if from != peer {
                    debug!(%from, "ignoring datagram from unexpected source");
                    continue;
                }
                let message = Message::from_datagram(&buf[..len]);
                if message.is_sentinel() {
                    debug!("peer sent the sentinel");
                    session.begin_remote_shutdown();
                    break;
                }
                if inbound.push(message).await.is_err() {
                    break;
                }
            }
            Incoming::IdleExpired => {
                warn!("nothing received within the idle limit, ending the session");
                session.begin_local_shutdown();
                break;
            }
            Incoming::Failed(error) if is_transient(&error) => {
                debug!(%error, "transient receive error");
            }
            Incoming::Failed(error) => {
                warn!(%error, "receive failed, ending the session");
                session.begin_local_shutdown();
                break;
            }
        }
    }
    inbound.close().await;
}

/// Prints received messages, each prefixed with the peer identity, then
/// the closing notice once the inbound queue is fully drained. Draining
/// first means the notice never overtakes a chat message.
pub async fn print_received<W>(
    mut output: W,
    inbound: Arc<MessageQueue>,
    session: Session,
    peer: Peer,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        match inbound.drain_all().await {
            Drained::Batch(batch) => {
                for message in &batch {
                    let line = format!("{peer}: {}\n", message.text());
                    if let Err(error) = output.write_all(line.as_bytes()).await {
                        warn!(%error, "could not write to the terminal, ending the session");
                        session.begin_local_shutdown();
                        return;
                    }
                }
                if let Err(error) = output.flush().await {
                    warn!(%error, "could not flush the terminal, ending the session");
                    session.begin_local_shutdown();
                    return;
                }
            }
            Drained::Closed => break,
        }
    }

    let notice = match session.state() {
        SessionState::RemoteShutdown => format!("{peer} has ended the session.\n"),
        SessionState::LocalShutdown | SessionState::Terminated => {
            "Session Terminated.\n".to_string()
        }
        // The queue only closes after a shutdown has begun.
        SessionState::Active => return,
    };
    if output.write_all(notice.as_bytes()).await.is_ok() {
        let _ = output.flush().await;
    }
}
