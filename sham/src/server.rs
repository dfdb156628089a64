//! File-receiving responder.
//!
//! The first payload of the inbound stream names the file to create; every
//! later byte is written to it.  The MD5 digest of the written contents is
//! computed on the fly and reported once the connection is closed.

use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Write};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use crate::config::ShamConfig;
use crate::connection::{ClosePolicy, ConnError, Connection, SessionStats};
use crate::socket::Socket;
use crate::stream::{ByteSink, EmptySource};

/// Outcome of one received file.
#[derive(Debug, Clone)]
pub struct Received {
    pub path: PathBuf,
    pub bytes: u64,
    /// Lowercase hex MD5 of the file contents.
    pub md5: String,
    pub stats: SessionStats,
}

/// Sink that creates a file named by the first delivered chunk.
pub struct FileSink {
    dir: PathBuf,
    out: Option<(PathBuf, BufWriter<File>)>,
    hasher: Md5,
    bytes: u64,
}

impl FileSink {
    /// Files are created inside `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            out: None,
            hasher: Md5::new(),
            bytes: 0,
        }
    }

    /// Flush the file and produce the digest.
    pub fn finish(self) -> io::Result<(PathBuf, u64, String)> {
        let Some((path, mut writer)) = self.out else {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "peer closed before sending a file name",
            ));
        };
        writer.flush()?;
        Ok((path, self.bytes, format!("{:x}", self.hasher.finalize())))
    }

    fn open(&mut self, name: &[u8]) -> io::Result<()> {
        let name = String::from_utf8_lossy(name);
        let name = name.trim_end_matches('\0').trim();
        // Only the final component is honoured; the peer does not pick
        // directories.
        let Some(file_name) = Path::new(name).file_name() else {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("unusable file name {name:?}"),
            ));
        };
        log::debug!("RCV FILENAME {name}");
        let path = self.dir.join(file_name);
        let file = File::create(&path)?;
        log::info!("[server] writing to {}", path.display());
        self.out = Some((path, BufWriter::new(file)));
        Ok(())
    }
}

impl ByteSink for FileSink {
    fn deliver(&mut self, data: &[u8]) -> io::Result<()> {
        match &mut self.out {
            None => self.open(data),
            Some((_, writer)) => {
                writer.write_all(data)?;
                self.hasher.update(data);
                self.bytes += data.len() as u64;
                Ok(())
            }
        }
    }
}

/// Accept one connection on `socket` and store the file it carries in `dir`.
pub async fn receive_file(
    socket: Socket,
    dir: &Path,
    config: ShamConfig,
) -> Result<Received, ConnError> {
    let mut conn = Connection::accept(socket, config).await?;
    let mut sink = FileSink::new(dir);
    let stats = conn
        .run(&mut EmptySource, &mut sink, ClosePolicy::AwaitPeer)
        .await?;
    let (path, bytes, md5) = sink.finish()?;
    Ok(Received {
        path,
        bytes,
        md5,
        stats,
    })
}

/// Listen on every interface at `port` and receive one file into the
/// working directory.
pub async fn run(port: u16, config: ShamConfig) -> Result<Received, ConnError> {
    let socket = Socket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await?;
    log::info!("[server] listening on {}", socket.local_addr);
    receive_file(socket, Path::new("."), config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sham-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn first_chunk_names_the_file() {
        let dir = scratch_dir("sink");
        let mut sink = FileSink::new(&dir);
        sink.deliver(b"out.txt").unwrap();
        sink.deliver(b"hello ").unwrap();
        sink.deliver(b"world").unwrap();

        let (path, bytes, md5) = sink.finish().unwrap();
        assert_eq!(path, dir.join("out.txt"));
        assert_eq!(bytes, 11);
        // md5("hello world")
        assert_eq!(md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn directories_in_the_name_are_stripped() {
        let dir = scratch_dir("strip");
        let mut sink = FileSink::new(&dir);
        sink.deliver(b"../../escape.bin").unwrap();
        let (path, bytes, md5) = sink.finish().unwrap();
        assert_eq!(path, dir.join("escape.bin"));
        assert_eq!(bytes, 0);
        // md5("")
        assert_eq!(md5, "d41d8cd98f00b204e9800998ecf8427e");
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn finish_without_name_fails() {
        let sink = FileSink::new(std::env::temp_dir());
        assert_eq!(sink.finish().unwrap_err().kind(), ErrorKind::UnexpectedEof);
    }
}
