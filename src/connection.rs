use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use crate::command::Request;
use crate::frame::FrameReader;
use crate::options::{Network, Options};
use crate::reply::Reply;

/// Byte stream to the server: plain TCP, a Unix domain socket, or TLS on top of TCP.
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Stream {
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(stream) => stream.set_read_timeout(timeout),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.set_read_timeout(timeout),
            Stream::Tls(stream) => stream.get_ref().set_read_timeout(timeout),
        }
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(stream) => stream.set_write_timeout(timeout),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.set_write_timeout(timeout),
            Stream::Tls(stream) => stream.get_ref().set_write_timeout(timeout),
        }
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.shutdown(Shutdown::Both),
            Stream::Tls(stream) => {
                stream.conn.send_close_notify();
                // The peer may already be gone, the socket shutdown below reports that.
                let _ = stream.flush();
                stream.get_ref().shutdown(Shutdown::Both)
            }
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.read(buf),
            Stream::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.write(buf),
            Stream::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.flush(),
            Stream::Tls(stream) => stream.flush(),
        }
    }
}

/// A live transport: the stream, the reply decoder bound to it, and the scratch buffer requests
/// are encoded into before being written.
pub struct Connection {
    id: Uuid,
    reader: FrameReader<BufReader<Stream>>,
    // Requests are encoded here first so that a whole batch goes out in one write.
    write_buf: BytesMut,
}

impl Connection {
    #[instrument(
        name = "connect",
        skip(options),
        fields(network = %options.network, addr = %options.addr, tls = options.tls.is_some(), connection_id)
    )]
    pub fn open(options: &Options) -> io::Result<Connection> {
        let stream = match options.network {
            Network::Tcp => {
                let socket = dial(&options.addr, options.dial_timeout)?;
                socket.set_nodelay(true)?;

                match &options.tls {
                    Some(config) => Stream::Tls(Box::new(handshake(
                        socket,
                        config,
                        options.host(),
                        options.dial_timeout,
                    )?)),
                    None => Stream::Tcp(socket),
                }
            }
            Network::Unix => dial_unix(options)?,
        };

        // Clear what the handshake armed, until the first operation sets its own deadline.
        stream.set_read_timeout(options.read_timeout)?;
        stream.set_write_timeout(options.write_timeout)?;

        let id = Uuid::new_v4();
        tracing::Span::current().record("connection_id", id.to_string());
        debug!("connected");

        Ok(Connection {
            id,
            reader: FrameReader::new(BufReader::new(stream)),
            // Allocate the buffer with 4kb of capacity.
            write_buf: BytesMut::with_capacity(4096),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stream(&self) -> &Stream {
        self.reader.get_ref().get_ref()
    }

    /// Encodes every request and writes them all in a single batch.
    pub fn write_requests<'a, I>(&mut self, requests: I, timeout: Option<Duration>) -> io::Result<usize>
    where
        I: IntoIterator<Item = &'a Request>,
    {
        self.write_buf.clear();

        let mut buf = (&mut self.write_buf).writer();
        for request in requests {
            trace!(connection_id = %self.id, command = %request.name, args = request.args.len(), "encoding request");
            // Writing into the buffer can't fail, `WriteError::written` only matters when
            // encoding straight into a stream. Buffering lets the batch go out in one write.
            request.write_to(&mut buf).map_err(|err| err.source)?;
        }

        let stream = self.reader.get_mut().get_mut();
        stream.set_write_timeout(timeout)?;

        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        let written = self.write_buf.len();
        self.write_buf.clear();

        trace!(connection_id = %self.id, written, "requests written");
        Ok(written)
    }

    /// Reads the next reply off the stream. Failures are returned as [`Reply::Transport`].
    pub fn read_reply(&mut self, timeout: Option<Duration>) -> Reply {
        if let Err(err) = self.stream().set_read_timeout(timeout) {
            return Reply::Transport(err.into());
        }

        let reply = self.reader.read();
        trace!(connection_id = %self.id, %reply, "reply read");

        reply
    }

    pub fn shutdown(mut self) -> io::Result<()> {
        debug!(connection_id = %self.id, "closing connection");
        self.reader.get_mut().get_mut().shutdown()
    }
}

fn dial(addr: &str, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let timeout = match timeout {
        Some(timeout) => timeout,
        None => return TcpStream::connect(addr),
    };

    let mut last_err = None;
    for addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(ErrorKind::InvalidInput, "could not resolve to any address")
    }))
}

#[cfg(unix)]
fn dial_unix(options: &Options) -> io::Result<Stream> {
    if options.tls.is_some() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            "tls is only supported over tcp",
        ));
    }

    Ok(Stream::Unix(UnixStream::connect(&options.addr)?))
}

#[cfg(not(unix))]
fn dial_unix(_options: &Options) -> io::Result<Stream> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        "unix sockets are not available on this platform",
    ))
}

fn handshake(
    mut socket: TcpStream,
    config: &Arc<ClientConfig>,
    host: &str,
    timeout: Option<Duration>,
) -> io::Result<StreamOwned<ClientConnection, TcpStream>> {
    let name = ServerName::try_from(host.to_string())
        .map_err(|err| io::Error::new(ErrorKind::InvalidInput, err))?;
    let mut conn = ClientConnection::new(config.clone(), name)
        .map_err(|err| io::Error::new(ErrorKind::Other, err))?;

    socket.set_read_timeout(timeout)?;
    socket.set_write_timeout(timeout)?;

    while conn.is_handshaking() {
        conn.complete_io(&mut socket)?;
    }

    Ok(StreamOwned::new(conn, socket))
}
