use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::watch;
use tracing::debug;

use crate::inbound;
use crate::outbound;
use crate::queue::MessageQueue;
use crate::transport::{Peer, Transport};

/// Where the session is in its life. `Active` is the only state that
/// accepts chat traffic; the two shutdown states record which side ended
/// the session, and both converge to `Terminated` once every task has
/// stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    LocalShutdown,
    RemoteShutdown,
    Terminated,
}

/// Shared handle to the session state machine.
///
/// Transitions are guarded: only `Active` can move to a shutdown state, so
/// whichever side ends the session first wins and every later attempt is a
/// no-op. Tasks subscribe to transitions through [`Session::monitor`].
#[derive(Clone)]
pub struct Session {
    state: Arc<watch::Sender<SessionState>>,
}

impl Session {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Active);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Records that this side is ending the session. Returns false if a
    /// shutdown was already underway.
    pub fn begin_local_shutdown(&self) -> bool {
        self.leave_active(SessionState::LocalShutdown)
    }

    /// Records that the peer ended the session. Returns false if a
    /// shutdown was already underway.
    pub fn begin_remote_shutdown(&self) -> bool {
        self.leave_active(SessionState::RemoteShutdown)
    }

    /// Marks the session fully stopped. Only meaningful after a shutdown
    /// has begun; a session still `Active` is left untouched.
    pub fn mark_terminated(&self) -> bool {
        self.state.send_if_modified(|state| match state {
            SessionState::LocalShutdown | SessionState::RemoteShutdown => {
                *state = SessionState::Terminated;
                true
            }
            SessionState::Active | SessionState::Terminated => false,
        })
    }

    fn leave_active(&self, next: SessionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Active {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    pub fn monitor(&self) -> ShutdownSignal {
        ShutdownSignal {
            state: self.state.subscribe(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets a task sleep until the session leaves `Active`.
pub struct ShutdownSignal {
    state: watch::Receiver<SessionState>,
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.state.borrow() != SessionState::Active
    }

    /// Completes once the session is shutting down, immediately if it
    /// already is. Cancel safe.
    pub async fn wait(&mut self) {
        // An Err here means the session handle is gone, which cannot happen
        // while the pipeline tasks still hold clones of it.
        let _ = self
            .state
            .wait_for(|state| *state != SessionState::Active)
            .await;
    }
}

/// Everything [`run`] needs besides the transport and the terminal ends.
pub struct SessionConfig {
    pub peer: Peer,
    pub idle_timeout: Option<Duration>,
}

/// Runs one chat session to completion: spawns the four pipeline tasks,
/// waits for all of them to stop, then marks the session terminated.
///
/// The transport and both queues are reference counted by the tasks, so
/// the socket closes exactly once, when the last task using it exits.
pub async fn run<T, R, W>(config: SessionConfig, transport: T, input: R, output: W) -> Result<()>
where
    T: Transport + 'static,
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let SessionConfig { peer, idle_timeout } = config;
    let peer_addr = peer.addr;
    let transport = Arc::new(transport);
    let outbound_queue = Arc::new(MessageQueue::new());
    let inbound_queue = Arc::new(MessageQueue::new());
    let session = Session::new();

    let reader = tokio::spawn(outbound::read_input(
        input,
        Arc::clone(&outbound_queue),
        session.clone(),
    ));
    let transmitter = tokio::spawn(outbound::transmit(
        Arc::clone(&transport),
        peer_addr,
        Arc::clone(&outbound_queue),
        session.clone(),
    ));
    let receiver = tokio::spawn(inbound::receive(
        Arc::clone(&transport),
        peer_addr,
        Arc::clone(&inbound_queue),
        session.clone(),
        idle_timeout,
    ));
    let printer = tokio::spawn(inbound::print_received(
        output,
        Arc::clone(&inbound_queue),
        session.clone(),
        peer,
    ));
    drop(transport);
    drop(outbound_queue);
    drop(inbound_queue);

    let results = tokio::join!(reader, transmitter, receiver, printer);
    for result in [results.0, results.1, results.2, results.3] {
        result.context("chat task panicked")?;
    }

    session.mark_terminated();
    debug!("all chat tasks stopped");
    Ok(())
}
