//! Peer-to-peer chat between two terminals over UDP.
//!
//! Each instance binds a local port, resolves a single peer, and runs four
//! cooperating tasks joined by two FIFO queues:
//!
//! ```text
//! stdin ──> reader ──> outbound queue ──> transmitter ──> UDP send
//! UDP recv ──> receiver ──> inbound queue ──> printer ──> stdout
//! ```
//!
//! A line containing only `!`, or closing stdin, ends the session on both
//! sides. The sentinel travels the outbound queue like any other message,
//! so it is flushed to the peer before the process exits.
//!
//! - [`cli`] parses the command line.
//! - [`message`] is the capped, immutable payload and the sentinel rules.
//! - [`queue`] is the closeable FIFO handoff between producer and consumer.
//! - [`session`] owns the shutdown state machine and wires the four tasks.
//! - [`transport`] is the datagram seam: the [`transport::Transport`]
//!   trait, the real UDP socket, and peer resolution.
//! - [`outbound`] and [`inbound`] are the two halves of the pipeline.

pub mod cli;
pub mod inbound;
pub mod message;
pub mod outbound;
pub mod queue;
pub mod session;
pub mod transport;
