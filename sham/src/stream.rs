//! Byte-stream collaborators of the engine.
//!
//! [`crate::connection::Connection::run`] pulls outbound bytes from a
//! [`ByteSource`] and pushes in-order inbound bytes into a [`ByteSink`].
//! Neither side ever blocks the engine: a source with nothing ready returns
//! [`Chunk::Pending`] and the loop keeps servicing ACKs and timers.

use std::io::{self, ErrorKind, Read, Write};

use tokio::sync::mpsc::{self, error::TryRecvError};

/// Result of one [`ByteSource::read_chunk`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Up to `max` bytes, never empty.
    Data(Vec<u8>),
    /// Nothing available right now; ask again later.
    Pending,
    /// The source is exhausted.
    End,
}

/// Outbound application bytes.
pub trait ByteSource {
    fn read_chunk(&mut self, max: usize) -> io::Result<Chunk>;
}

/// Inbound, in-order application bytes.
pub trait ByteSink {
    fn deliver(&mut self, data: &[u8]) -> io::Result<()>;
}

// ─── Sources ────────────────────────────────────────────────────────────────

/// Reads from any blocking [`Read`] (a file, a byte slice).
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
    done: bool,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read_chunk(&mut self, max: usize) -> io::Result<Chunk> {
        if self.done {
            return Ok(Chunk::End);
        }
        let mut buf = vec![0u8; max];
        let mut filled = 0;
        // Fill the whole chunk where possible so packets stay full-sized.
        while filled < max {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.done = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        if filled == 0 {
            return Ok(Chunk::End);
        }
        buf.truncate(filled);
        Ok(Chunk::Data(buf))
    }
}

/// Messages handed over by another task, e.g. lines read from stdin.
///
/// Each message is transmitted as-is when it fits in `max`; longer
/// messages are split.  The source ends when every sender is dropped.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
    carry: Vec<u8>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            carry: Vec::new(),
        }
    }
}

impl ByteSource for ChannelSource {
    fn read_chunk(&mut self, max: usize) -> io::Result<Chunk> {
        if self.carry.is_empty() {
            match self.rx.try_recv() {
                Ok(msg) if msg.is_empty() => return Ok(Chunk::Pending),
                Ok(msg) => self.carry = msg,
                Err(TryRecvError::Empty) => return Ok(Chunk::Pending),
                Err(TryRecvError::Disconnected) => return Ok(Chunk::End),
            }
        }
        let take = self.carry.len().min(max);
        let rest = self.carry.split_off(take);
        Ok(Chunk::Data(std::mem::replace(&mut self.carry, rest)))
    }
}

/// A source that is already exhausted; used by receive-only endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySource;

impl ByteSource for EmptySource {
    fn read_chunk(&mut self, _max: usize) -> io::Result<Chunk> {
        Ok(Chunk::End)
    }
}

// ─── Sinks ──────────────────────────────────────────────────────────────────

impl ByteSink for Vec<u8> {
    fn deliver(&mut self, data: &[u8]) -> io::Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Writes every delivered chunk to a [`Write`] and flushes it.
#[derive(Debug)]
pub struct WriterSink<W> {
    inner: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ByteSink for WriterSink<W> {
    fn deliver(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data)?;
        self.inner.flush()
    }
}

/// Swallows everything.  Data that arrives while closing goes here.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl ByteSink for Discard {
    fn deliver(&mut self, _data: &[u8]) -> io::Result<()> {
        Ok(())
    }
}
