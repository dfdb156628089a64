//! Interactive chat over an established connection.
//!
//! Lines typed locally are sent as data; lines from the peer are printed
//! behind the peer's name (`Server: <text>` on the client, `Client: <text>`
//! on the server).  `/quit` (or the end of input) closes the connection
//! immediately, whether or not the last lines have been acknowledged.

use std::io::{self, BufRead, Write};

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration};

use crate::connection::{ClosePolicy, ConnError, Connection, SessionStats};
use crate::state::Role;
use crate::stream::{ByteSink, ChannelSource};

/// Line that ends the session.
pub const QUIT: &str = "/quit";

/// Printed once the connection is up, before any line is read.
pub fn banner(role: Role) -> &'static str {
    match role {
        Role::Initiator => "Chat mode established. Type messages, /quit to exit.",
        Role::Responder => "Chat mode server established. Type messages, /quit to exit.",
    }
}

/// Prefix for lines received from the peer.
pub fn peer_prefix(role: Role) -> &'static str {
    match role {
        Role::Initiator => "Server: ",
        Role::Responder => "Client: ",
    }
}

/// Prints every complete line delivered by the peer behind a prefix.
pub struct LineSink<W> {
    out: W,
    prefix: &'static str,
    partial: Vec<u8>,
}

impl<W: Write> LineSink<W> {
    pub fn new(out: W, prefix: &'static str) -> Self {
        Self {
            out,
            prefix,
            partial: Vec::new(),
        }
    }

    /// Print whatever is left of an unterminated line.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.emit(&line)?;
        }
        Ok(self.out)
    }

    fn emit(&mut self, line: &[u8]) -> io::Result<()> {
        let text = String::from_utf8_lossy(line);
        writeln!(self.out, "{}{}", self.prefix, text.trim_end_matches('\r'))?;
        self.out.flush()
    }
}

impl<W: Write> ByteSink for LineSink<W> {
    fn deliver(&mut self, data: &[u8]) -> io::Result<()> {
        self.partial.extend_from_slice(data);
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            self.emit(&line[..pos])?;
        }
        Ok(())
    }
}

/// Read stdin on a dedicated thread; the channel closes at end of input.
///
/// A plain thread keeps a pending terminal read from holding up runtime
/// shutdown.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Forward typed lines to the engine until `/quit` or end of input, then
/// fire the close signal once the engine has taken every queued line.
async fn forward_lines(
    mut input: mpsc::Receiver<String>,
    lines: mpsc::Sender<Vec<u8>>,
    quit: oneshot::Sender<()>,
    poll: Duration,
) {
    while let Some(line) = input.recv().await {
        if line.trim() == QUIT {
            break;
        }
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');
        if lines.send(bytes).await.is_err() {
            return;
        }
    }
    while lines.capacity() < lines.max_capacity() && !lines.is_closed() {
        sleep(poll).await;
    }
    log::debug!("[chat] local close requested");
    let _ = quit.send(());
}

/// Chat over `conn` until either side quits.  Peer lines go to `out`,
/// prefixed per [`peer_prefix`].
pub async fn session<W: Write>(
    conn: &mut Connection,
    input: mpsc::Receiver<String>,
    out: W,
) -> Result<SessionStats, ConnError> {
    let (line_tx, line_rx) = mpsc::channel(64);
    let (quit_tx, quit_rx) = oneshot::channel();
    let forwarder = tokio::spawn(forward_lines(
        input,
        line_tx,
        quit_tx,
        conn.config().poll_interval,
    ));

    let mut source = ChannelSource::new(line_rx);
    let mut sink = LineSink::new(out, peer_prefix(conn.role));
    let result = conn
        .run(&mut source, &mut sink, ClosePolicy::OnSignal(quit_rx))
        .await;
    forwarder.abort();

    let stats = result?;
    sink.finish()?;
    Ok(stats)
}
