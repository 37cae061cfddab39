//! Control endpoint resolution.
//!
//! A listen value resolves to exactly one transport:
//!
//! | Listen value      | Endpoint                                  |
//! |-------------------|-------------------------------------------|
//! | absent            | unix `/tmp/supervisor[-<name>].sock`      |
//! | `9001`, `:9001`   | inet `127.0.0.1:9001`                     |
//! | `*:9001`          | inet `127.0.0.1:9001`                     |
//! | `10.0.0.5:9001`   | inet `10.0.0.5:9001`                      |
//! | anything else     | unix socket at that path                  |
//!
//! Resolution is pure; nothing here touches the network or filesystem.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::EndpointError;
use crate::types::{ListenSpec, DEFAULT_DAEMON_NAME};

/// Bind host used when the listen value names no host or `*`.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Where the daemon's RPC interface listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAddr {
    Unix { path: PathBuf },
    Inet { host: String, port: u16 },
}

impl EndpointAddr {
    pub fn kind(&self) -> &'static str {
        match self {
            EndpointAddr::Unix { .. } => "unix",
            EndpointAddr::Inet { .. } => "inet",
        }
    }

    pub fn is_inet(&self) -> bool {
        matches!(self, EndpointAddr::Inet { .. })
    }

    /// URL form used for the `supervisorctl` `serverurl` key.
    pub fn server_url(&self) -> String {
        match self {
            EndpointAddr::Unix { path } => format!("unix://{}", path.display()),
            EndpointAddr::Inet { host, port } => format!("http://{host}:{port}"),
        }
    }
}

impl fmt::Display for EndpointAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.server_url())
    }
}

/// HTTP basic-auth credentials for the RPC interface.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A resolved transport descriptor plus optional credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEndpoint {
    pub addr: EndpointAddr,
    pub credentials: Option<Credentials>,
}

/// Default socket path for a daemon with the given logical name.
pub fn default_socket_path(daemon_name: &str) -> PathBuf {
    let file = if daemon_name == DEFAULT_DAEMON_NAME {
        "supervisor.sock".to_string()
    } else {
        format!("supervisor-{daemon_name}.sock")
    };
    Path::new("/tmp").join(file)
}

/// Resolve a listen value into an [`EndpointAddr`].
pub fn resolve(listen: Option<&ListenSpec>, daemon_name: &str) -> Result<EndpointAddr, EndpointError> {
    let Some(listen) = listen else {
        return Ok(EndpointAddr::Unix {
            path: default_socket_path(daemon_name),
        });
    };
    let raw = listen.to_string();
    match match_inet(&raw) {
        Some((host, digits)) => {
            let port = digits
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| EndpointError::InvalidPort { spec: raw.clone() })?;
            let host = if host.is_empty() || host == "*" {
                LOOPBACK_HOST.to_string()
            } else {
                host.to_string()
            };
            Ok(EndpointAddr::Inet { host, port })
        }
        None => Ok(EndpointAddr::Unix {
            path: PathBuf::from(raw),
        }),
    }
}

/// Returns `true` when a listen value that resolved to a unix path does not
/// look like one (not absolute), i.e. it fell through the inet grammar.
pub fn is_ambiguous_path(addr: &EndpointAddr) -> bool {
    matches!(addr, EndpointAddr::Unix { path } if !path.is_absolute())
}

/// Match `[host:]port` where host is empty, `*`, or digits and dots.
/// A non-empty host requires the `:` separator.
fn match_inet(spec: &str) -> Option<(&str, &str)> {
    let (host, port) = match spec.rsplit_once(':') {
        Some((host, port)) => (host, port),
        None => ("", spec),
    };
    let port_ok = !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit());
    let host_ok = host == "*" || host.bytes().all(|b| b.is_ascii_digit() || b == b'.');
    (port_ok && host_ok).then_some((host, port))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
