//! Typed client for the daemon's `supervisor.*` RPC namespace.

use base64::Engine as _;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};

use warden_core::endpoint::{ControlEndpoint, EndpointAddr};
use warden_core::types::{Daemon, Timeouts};

use crate::error::RpcError;
use crate::transport::{Address, HttpTransport};
use crate::xmlrpc::{self, Value};

/// Request path the daemon serves XML-RPC on.
pub const RPC_PATH: &str = "/RPC2";
/// Method namespace prefix.
pub const NAMESPACE: &str = "supervisor";

/// Result of `reloadConfig`: group names the daemon sees as new, changed,
/// and gone relative to its running configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl ReloadDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// The remote operations reconciliation needs.
///
/// Implemented by [`RpcClient`]; tests substitute a recording fake.
pub trait SupervisorApi {
    fn reload_config(&self) -> Result<ReloadDiff, RpcError>;
    fn add_process_group(&self, name: &str) -> Result<(), RpcError>;
    fn remove_process_group(&self, name: &str) -> Result<(), RpcError>;
    fn start_process(&self, name: &str) -> Result<(), RpcError>;
    fn stop_process(&self, name: &str) -> Result<(), RpcError>;
    fn start_process_group(&self, name: &str) -> Result<(), RpcError>;
    fn stop_process_group(&self, name: &str) -> Result<(), RpcError>;
}

/// One client per daemon; each call opens a fresh connection.
#[derive(Debug, Clone)]
pub struct RpcClient {
    addr: EndpointAddr,
    transport: HttpTransport,
    authorization: Option<String>,
}

impl RpcClient {
    pub fn new(endpoint: &ControlEndpoint, timeouts: &Timeouts) -> Self {
        let transport = HttpTransport::new(Address::from(&endpoint.addr)).with_timeouts(timeouts);
        let authorization = endpoint.credentials.as_ref().map(|c| {
            let token = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", c.username, c.password));
            format!("Basic {token}")
        });
        Self {
            addr: endpoint.addr.clone(),
            transport,
            authorization,
        }
    }

    /// Resolve `daemon`'s endpoint and build a client with its timeouts.
    pub fn for_daemon(daemon: &Daemon) -> Result<Self, RpcError> {
        Ok(Self::new(&daemon.endpoint()?, &daemon.timeouts))
    }

    pub fn endpoint(&self) -> &EndpointAddr {
        &self.addr
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Call `supervisor.<method>` and return its single result value.
    pub fn call(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let full = format!("{NAMESPACE}.{method}");
        tracing::debug!(method = %full, endpoint = %self.addr, "rpc call");

        let body = xmlrpc::encode_call(&full, params)?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/xml"));
        if let Some(auth) = &self.authorization {
            let value = HeaderValue::from_str(auth)
                .map_err(|e| RpcError::Encode(format!("authorization header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let response = self.transport.post(RPC_PATH, headers, body.into_bytes())?;
        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }
        let text = String::from_utf8_lossy(response.body());
        let result = xmlrpc::decode_response(&text);
        if let Err(RpcError::Fault { code, message }) = &result {
            tracing::debug!(method = %full, code, message = %message, "rpc fault");
        }
        result
    }

    fn call_with_name(&self, method: &str, name: &str) -> Result<(), RpcError> {
        self.call(method, &[Value::from(name)]).map(|_| ())
    }
}

fn string_list(value: &Value, what: &str) -> Result<Vec<String>, RpcError> {
    let items = value
        .as_array()
        .ok_or_else(|| RpcError::Protocol(format!("{what}: expected array, got {value}")))?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| RpcError::Protocol(format!("{what}: expected string, got {v}")))
        })
        .collect()
}

/// `reloadConfig` answers `[[added, changed, removed]]`.
fn parse_reload_diff(value: &Value) -> Result<ReloadDiff, RpcError> {
    let outer = value
        .as_array()
        .and_then(|a| a.first())
        .and_then(Value::as_array)
        .ok_or_else(|| RpcError::Protocol(format!("reloadConfig: unexpected result {value}")))?;
    let [added, changed, removed] = outer else {
        return Err(RpcError::Protocol(format!(
            "reloadConfig: expected 3 lists, got {}",
            outer.len()
        )));
    };
    Ok(ReloadDiff {
        added: string_list(added, "added")?,
        changed: string_list(changed, "changed")?,
        removed: string_list(removed, "removed")?,
    })
}

impl SupervisorApi for RpcClient {
    fn reload_config(&self) -> Result<ReloadDiff, RpcError> {
        parse_reload_diff(&self.call("reloadConfig", &[])?)
    }

    fn add_process_group(&self, name: &str) -> Result<(), RpcError> {
        self.call_with_name("addProcessGroup", name)
    }

    fn remove_process_group(&self, name: &str) -> Result<(), RpcError> {
        self.call_with_name("removeProcessGroup", name)
    }

    fn start_process(&self, name: &str) -> Result<(), RpcError> {
        self.call_with_name("startProcess", name)
    }

    fn stop_process(&self, name: &str) -> Result<(), RpcError> {
        self.call_with_name("stopProcess", name)
    }

    fn start_process_group(&self, name: &str) -> Result<(), RpcError> {
        self.call_with_name("startProcessGroup", name)
    }

    fn stop_process_group(&self, name: &str) -> Result<(), RpcError> {
        self.call_with_name("stopProcessGroup", name)
    }
}
