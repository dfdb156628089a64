//! File-sending initiator.
//!
//! The stream starts with the name the server should store the file under,
//! in a packet of its own, followed by the file contents.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use crate::config::ShamConfig;
use crate::connection::{ClosePolicy, ConnError, Connection, SessionStats};
use crate::socket::Socket;
use crate::stream::{ByteSource, Chunk, Discard, ReaderSource};

/// Source yielding a file name chunk, then the body.
#[derive(Debug)]
pub struct FileSource<R> {
    name: Option<Vec<u8>>,
    body: ReaderSource<R>,
}

impl<R: Read> FileSource<R> {
    pub fn new(name: &str, body: R) -> Self {
        Self {
            name: Some(name.as_bytes().to_vec()),
            body: ReaderSource::new(body),
        }
    }
}

impl<R: Read> ByteSource for FileSource<R> {
    fn read_chunk(&mut self, max: usize) -> io::Result<Chunk> {
        match self.name.take() {
            Some(name) if name.len() > max => Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("file name of {} bytes does not fit one packet", name.len()),
            )),
            Some(name) => Ok(Chunk::Data(name)),
            None => self.body.read_chunk(max),
        }
    }
}

/// Connect to `server` over `socket` and send `input`, asking the server to
/// store it as `output_name`.
pub async fn send_file(
    socket: Socket,
    server: SocketAddr,
    input: &Path,
    output_name: &str,
    config: ShamConfig,
) -> Result<SessionStats, ConnError> {
    if output_name.trim().is_empty() {
        return Err(ConnError::Io(io::Error::new(
            ErrorKind::InvalidInput,
            "output file name is empty",
        )));
    }
    let file = File::open(input)?;
    let mut source = FileSource::new(output_name, BufReader::new(file));

    let mut conn = Connection::connect(socket, server, config).await?;
    log::info!(
        "[client] sending {} to {server} as {output_name:?}",
        input.display()
    );
    log::debug!("SND FILENAME {output_name}");
    conn.run(&mut source, &mut Discard, ClosePolicy::WhenDrained)
        .await
}

/// Send one file from an ephemeral local port.
pub async fn run(
    server: SocketAddr,
    input: &Path,
    output_name: &str,
    config: ShamConfig,
) -> Result<SessionStats, ConnError> {
    let socket = Socket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
    send_file(socket, server, input, output_name, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_precedes_body() {
        let mut src = FileSource::new("copy.bin", &b"0123456789"[..]);
        assert_eq!(src.read_chunk(4).unwrap_err().kind(), ErrorKind::InvalidInput);

        let mut src = FileSource::new("copy.bin", &b"0123456789"[..]);
        assert_eq!(src.read_chunk(1024).unwrap(), Chunk::Data(b"copy.bin".to_vec()));
        assert_eq!(src.read_chunk(6).unwrap(), Chunk::Data(b"012345".to_vec()));
        assert_eq!(src.read_chunk(6).unwrap(), Chunk::Data(b"6789".to_vec()));
        assert_eq!(src.read_chunk(6).unwrap(), Chunk::End);
    }
}
