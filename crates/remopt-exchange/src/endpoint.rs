//! Byte channels between a client and the optimizer.
//!
//! Each side holds a read end and a write end. They can be two independent one-way channels
//! (see [`pipe_pair`]) or two handles onto one bidirectional socket.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

pub trait Endpoint: Read + Write {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Endpoint for UnixStream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        UnixStream::set_nonblocking(self, nonblocking)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }
}

#[derive(Debug)]
pub struct Endpoints<E = UnixStream> {
    pub reader: E,
    pub writer: E,
}

impl Endpoints<UnixStream> {
    /// Split one connected socket into a read handle and a write handle.
    ///
    /// Both handles share the socket's non-blocking flag.
    pub fn from_stream(stream: UnixStream) -> io::Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: stream,
            writer,
        })
    }
}

/// Two one-way channels: the first value is the client's side, the second the optimizer's.
pub fn pipe_pair() -> io::Result<(Endpoints, Endpoints)> {
    let (client_tx, optimizer_rx) = UnixStream::pair()?;
    let (optimizer_tx, client_rx) = UnixStream::pair()?;
    Ok((
        Endpoints {
            reader: client_rx,
            writer: client_tx,
        },
        Endpoints {
            reader: optimizer_rx,
            writer: optimizer_tx,
        },
    ))
}
