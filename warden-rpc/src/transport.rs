//! Stream transport over a unix domain socket or TCP.
//!
//! The HTTP layer above always needs a `Host` header. For unix sockets the
//! transport substitutes [`UNIX_REQUEST_HOST`]:[`UNIX_REQUEST_PORT`] for
//! header construction only; the connection still goes to the socket path.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use http::header::{CONNECTION, CONTENT_LENGTH, HOST};
use http::{HeaderMap, HeaderValue, Request};
use warden_core::endpoint::EndpointAddr;
use warden_core::types::Timeouts;

use crate::error::{io_err, TransportError};
use crate::wire::{self, HttpResponse};

/// Host written into request headers when talking over a unix socket.
pub const UNIX_REQUEST_HOST: &str = "localhost";
/// Port written into request headers when talking over a unix socket.
pub const UNIX_REQUEST_PORT: u16 = 80;

/// Where to open the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

impl Address {
    /// An absolute path selects unix-socket mode; anything else is a TCP host.
    pub fn parse(address: &str, port: u16) -> Self {
        if address.starts_with('/') {
            Address::Unix(PathBuf::from(address))
        } else {
            Address::Tcp {
                host: address.to_string(),
                port,
            }
        }
    }

    fn target(&self) -> String {
        match self {
            Address::Unix(path) => path.display().to_string(),
            Address::Tcp { host, port } => format!("{host}:{port}"),
        }
    }
}

impl From<&EndpointAddr> for Address {
    fn from(addr: &EndpointAddr) -> Self {
        match addr {
            EndpointAddr::Unix { path } => Address::Unix(path.clone()),
            EndpointAddr::Inet { host, port } => Address::Tcp {
                host: host.clone(),
                port: *port,
            },
        }
    }
}

/// An open stream of either kind.
#[derive(Debug)]
pub enum Connection {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Connection {
    fn set_timeouts(&self, read: Option<Duration>, write: Option<Duration>) -> io::Result<()> {
        match self {
            Connection::Unix(s) => {
                s.set_read_timeout(read)?;
                s.set_write_timeout(write)
            }
            Connection::Tcp(s) => {
                s.set_read_timeout(read)?;
                s.set_write_timeout(write)
            }
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Unix(s) => s.read(buf),
            Connection::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Unix(s) => s.write(buf),
            Connection::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Unix(s) => s.flush(),
            Connection::Tcp(s) => s.flush(),
        }
    }
}

/// Zero means "no timeout" for every std socket API we call.
fn non_zero(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then_some(d)
}

/// HTTP/1.1 transport bound to one address.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    address: Address,
    request_host: String,
    request_port: u16,
    open_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(address: Address) -> Self {
        let defaults = Timeouts::default();
        let (request_host, request_port) = match &address {
            Address::Unix(_) => (UNIX_REQUEST_HOST.to_string(), UNIX_REQUEST_PORT),
            Address::Tcp { host, port } => (host.clone(), *port),
        };
        Self {
            address,
            request_host,
            request_port,
            open_timeout: defaults.open(),
            read_timeout: defaults.read(),
            write_timeout: Some(defaults.write()),
        }
    }

    pub fn with_timeouts(mut self, timeouts: &Timeouts) -> Self {
        self.open_timeout = timeouts.open();
        self.read_timeout = timeouts.read();
        self.write_timeout = non_zero(timeouts.write());
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Host used for the `Host` header (not necessarily the one connected to).
    pub fn request_host(&self) -> &str {
        &self.request_host
    }

    pub fn request_port(&self) -> u16 {
        self.request_port
    }

    /// `Host` header value; the port is omitted when it is 80.
    pub fn host_header(&self) -> String {
        if self.request_port == 80 {
            self.request_host.clone()
        } else {
            format!("{}:{}", self.request_host, self.request_port)
        }
    }

    /// Open the stream and apply read/write timeouts.
    pub fn connect(&self) -> Result<Connection, TransportError> {
        let target = self.address.target();
        tracing::debug!(target = %target, "opening connection");
        let conn = match &self.address {
            Address::Unix(path) => Connection::Unix(connect_unix(path, self.open_timeout)?),
            Address::Tcp { host, port } => {
                Connection::Tcp(connect_tcp(host, *port, self.open_timeout)?)
            }
        };
        conn.set_timeouts(non_zero(self.read_timeout), self.write_timeout)
            .map_err(|e| io_err(&target, e))?;
        tracing::debug!(target = %target, "opened");
        Ok(conn)
    }

    /// Connect, then hand the stream to `on_connect` before returning it.
    pub fn connect_with<F>(&self, on_connect: F) -> Result<Connection, TransportError>
    where
        F: FnOnce(&mut Connection) -> io::Result<()>,
    {
        let mut conn = self.connect()?;
        on_connect(&mut conn).map_err(|e| self.classify(e, "write"))?;
        Ok(conn)
    }

    /// POST `body` to `path` and read the whole response.
    ///
    /// `Host`, `Content-Length` and `Connection: close` are filled in here.
    pub fn post(
        &self,
        path: &str,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Result<HttpResponse, TransportError> {
        let mut request = Request::post(path)
            .header(HOST, self.host_header())
            .header(CONTENT_LENGTH, body.len())
            .header(CONNECTION, HeaderValue::from_static("close"))
            .body(body)
            .map_err(|e| TransportError::Request {
                target: self.address.target(),
                detail: e.to_string(),
            })?;
        request.headers_mut().extend(headers);

        let mut conn = self.connect_with(|conn| wire::write_request(conn, &request))?;
        wire::read_response(&mut conn).map_err(|e| match e {
            wire::ReadError::Io(e) => self.classify(e, "read"),
            wire::ReadError::Malformed(detail) => TransportError::Malformed {
                target: self.address.target(),
                detail,
            },
        })
    }

    fn classify(&self, e: io::Error, phase: &'static str) -> TransportError {
        let after = match phase {
            "read" => Some(self.read_timeout),
            _ => self.write_timeout,
        };
        match (e.kind(), after) {
            (io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut, Some(after)) => {
                TransportError::Timeout {
                    target: self.address.target(),
                    phase,
                    after,
                }
            }
            _ => io_err(self.address.target(), e),
        }
    }
}

/// `UnixStream::connect` has no timeout of its own; race it against one.
fn connect_unix(path: &Path, timeout: Duration) -> Result<UnixStream, TransportError> {
    let target = path.display().to_string();
    let Some(timeout) = non_zero(timeout) else {
        return UnixStream::connect(path).map_err(|source| TransportError::Connect { target, source });
    };

    let (tx, rx) = mpsc::channel();
    let owned = path.to_path_buf();
    thread::spawn(move || {
        let _ = tx.send(UnixStream::connect(owned));
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(TransportError::Connect { target, source }),
        Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout {
            target,
            phase: "connect",
            after: timeout,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(TransportError::Connect {
            target,
            source: io::Error::other("connect thread exited without a result"),
        }),
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TransportError> {
    let target = format!("{host}:{port}");
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Connect {
            target: target.clone(),
            source,
        })?;

    let mut last_err = None;
    for addr in addrs {
        let attempt = match non_zero(timeout) {
            Some(t) => TcpStream::connect_timeout(&addr, t),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(TransportError::Timeout {
                    target,
                    phase: "connect",
                    after: timeout,
                })
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(TransportError::Connect {
        target,
        source: last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unix_address_substitutes_request_host() {
        let transport = HttpTransport::new(Address::parse("/var/run/x.sock", 9001));
        assert_eq!(transport.address(), &Address::Unix("/var/run/x.sock".into()));
        assert_eq!(transport.request_host(), UNIX_REQUEST_HOST);
        assert_eq!(transport.request_port(), UNIX_REQUEST_PORT);
        assert_eq!(transport.host_header(), "localhost");
    }

    #[test]
    fn tcp_address_is_used_verbatim() {
        let transport = HttpTransport::new(Address::parse("10.0.0.5", 9001));
        assert_eq!(
            transport.address(),
            &Address::Tcp {
                host: "10.0.0.5".into(),
                port: 9001
            }
        );
        assert_eq!(transport.request_host(), "10.0.0.5");
        assert_eq!(transport.request_port(), 9001);
        assert_eq!(transport.host_header(), "10.0.0.5:9001");
    }

    #[test]
    fn endpoint_addr_converts() {
        let addr = EndpointAddr::Inet {
            host: "127.0.0.1".into(),
            port: 9001,
        };
        assert_eq!(
            Address::from(&addr),
            Address::Tcp {
                host: "127.0.0.1".into(),
                port: 9001
            }
        );
    }

    #[test]
    fn missing_socket_is_connect_error() {
        let dir = TempDir::new().unwrap();
        let transport = HttpTransport::new(Address::Unix(dir.path().join("nope.sock")));
        let err = transport.connect().unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }), "got: {err}");
    }

    #[test]
    fn refused_tcp_is_connect_error() {
        // Bind then drop to get a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let transport = HttpTransport::new(Address::Tcp {
            host: "127.0.0.1".into(),
            port,
        });
        let err = transport.connect().unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }), "got: {err}");
    }

    #[test]
    fn connect_with_runs_hook() {
        let dir = TempDir::new().unwrap();
        let sock = dir.path().join("hook.sock");
        let listener = std::os::unix::net::UnixListener::bind(&sock).unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            buf
        });

        let transport = HttpTransport::new(Address::Unix(sock));
        transport
            .connect_with(|conn| conn.write_all(b"hello"))
            .expect("connect");
        assert_eq!(&server.join().unwrap(), b"hello");
    }
}
