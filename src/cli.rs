use clap::Parser;

/// Two-terminal chat over UDP: bind a local port, aim at one remote peer,
/// and type. A line containing only `!` ends the session for both sides.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// UDP port to bind locally
    pub local_port: u16,

    /// Host name or address of the remote peer
    pub remote_host: String,

    /// UDP port the remote peer bound
    pub remote_port: u16,

    /// End the session when nothing arrives from the peer for this many
    /// seconds
    #[arg(long, value_name = "SECONDS")]
    pub idle_timeout: Option<u64>,
}
