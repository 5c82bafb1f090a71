//! End-to-end tests that spawn two real `udp-talk` processes, drive them
//! through their stdin pipes, and assert on the transcripts.

use std::net::UdpSocket;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

const READ_TIMEOUT: Duration = Duration::from_secs(3);
const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

struct PeerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl PeerProcess {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        let stdin = self.stdin.as_mut().context("stdin already closed")?;
        stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send line '{line}'"))?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Closes the pipe, which the peer reads as end of input.
    fn close_stdin(&mut self) {
        self.stdin.take();
    }

    async fn read_line(&mut self, description: &str) -> Result<String> {
        let mut line = String::new();
        let bytes = match timeout(READ_TIMEOUT, self.stdout.read_line(&mut line)).await {
            Ok(result) => result.with_context(|| format!("{description}: failed to read"))?,
            Err(_) => return Err(anyhow!("{description}: timed out waiting for output")),
        };
        if bytes == 0 {
            return Err(anyhow!("{description}: output closed"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

async fn spawn_peer(binary: &Path, local_port: u16, remote_port: u16) -> Result<PeerProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg(local_port.to_string())
        .arg("127.0.0.1")
        .arg(remote_port.to_string())
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn peer on port {local_port}"))?;
    let stdin = child.stdin.take().context("peer stdin missing after spawn")?;
    let stdout = child.stdout.take().context("peer stdout missing after spawn")?;
    let mut peer = PeerProcess {
        child,
        stdin: Some(stdin),
        stdout: BufReader::new(stdout),
    };

    // The banner doubles as the readiness signal: once it is printed, the
    // socket is bound and no datagram can be lost.
    let banner = peer.read_line("waiting for banner").await?;
    if !banner.starts_with("listening on ") {
        return Err(anyhow!("unexpected banner: {banner}"));
    }
    Ok(peer)
}

/// Finds two free UDP ports by binding ephemeral sockets and releasing
/// them for the children.
fn pick_udp_ports() -> Result<(u16, u16)> {
    let a = UdpSocket::bind("127.0.0.1:0").context("probe socket")?;
    let b = UdpSocket::bind("127.0.0.1:0").context("probe socket")?;
    Ok((a.local_addr()?.port(), b.local_addr()?.port()))
}

async fn ensure_success(child: &mut Child, name: &str) -> Result<()> {
    let status = timeout(EXIT_TIMEOUT, child.wait())
        .await
        .map_err(|_| anyhow!("{name} did not exit in time"))?
        .with_context(|| format!("failed to await {name}"))?;
    if !status.success() {
        return Err(anyhow!("{name} exited with status {status}"));
    }
    Ok(())
}

#[tokio::test]
async fn two_processes_chat_and_part_cleanly() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("udp-talk");
    let (x_port, y_port) = pick_udp_ports()?;
    let mut x = spawn_peer(&binary, x_port, y_port).await?;
    let mut y = spawn_peer(&binary, y_port, x_port).await?;

    x.send_line("hello from x").await?;
    let heard = y.read_line("y hears x").await?;
    assert_eq!(heard, format!("127.0.0.1 {x_port}: hello from x"));

    y.send_line("hi x").await?;
    let heard = x.read_line("x hears y").await?;
    assert_eq!(heard, format!("127.0.0.1 {y_port}: hi x"));

    x.send_line("!").await?;
    let x_notice = x.read_line("x goodbye").await?;
    assert_eq!(x_notice, "Session Terminated.");
    let y_notice = y.read_line("y disconnect notice").await?;
    assert_eq!(y_notice, format!("127.0.0.1 {x_port} has ended the session."));

    ensure_success(&mut x.child, "peer x").await?;
    ensure_success(&mut y.child, "peer y").await?;
    Ok(())
}

#[tokio::test]
async fn closing_stdin_notifies_the_peer() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("udp-talk");
    let (x_port, y_port) = pick_udp_ports()?;
    let mut x = spawn_peer(&binary, x_port, y_port).await?;
    let mut y = spawn_peer(&binary, y_port, x_port).await?;

    x.send_line("last message").await?;
    assert_eq!(
        y.read_line("y hears x").await?,
        format!("127.0.0.1 {x_port}: last message")
    );

    x.close_stdin();
    assert_eq!(x.read_line("x goodbye").await?, "Session Terminated.");
    assert_eq!(
        y.read_line("y disconnect notice").await?,
        format!("127.0.0.1 {x_port} has ended the session.")
    );

    ensure_success(&mut x.child, "peer x").await?;
    ensure_success(&mut y.child, "peer y").await?;
    Ok(())
}

#[test]
fn wrong_argument_count_is_a_usage_error() {
    let output = std::process::Command::new(assert_cmd::cargo::cargo_bin!("udp-talk"))
        .arg("5000")
        .arg("localhost")
        .output()
        .expect("run binary");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "stderr should show usage: {stderr}");
}

#[test]
fn an_occupied_port_is_a_startup_error() {
    let holder = UdpSocket::bind("0.0.0.0:0").expect("probe socket");
    let port = holder.local_addr().expect("addr").port();

    let output = std::process::Command::new(assert_cmd::cargo::cargo_bin!("udp-talk"))
        .arg(port.to_string())
        .arg("127.0.0.1")
        .arg("5999")
        .output()
        .expect("run binary");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to bind"),
        "stderr should name the bind failure: {stderr}"
    );
}
