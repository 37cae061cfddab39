use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use warden_core::endpoint::{ControlEndpoint, Credentials, EndpointAddr};
use warden_core::types::Timeouts;
use warden_rpc::xmlrpc::{decode_call, encode_fault, encode_response};
use warden_rpc::{RpcClient, RpcError, SupervisorApi, TransportError, Value};

/// What the fake daemon saw.
struct Captured {
    head: String,
    method: String,
    params: Vec<Value>,
}

fn read_request<S: Read>(stream: S) -> Captured {
    let mut reader = BufReader::new(stream);
    let mut head = String::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = v.trim().parse().unwrap();
        }
        head.push_str(&line);
        if line == "\r\n" {
            break;
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).unwrap();
    let (method, params) = decode_call(&String::from_utf8(body).unwrap()).unwrap();
    Captured {
        head,
        method,
        params,
    }
}

fn http_ok(xml: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\n\r\n{xml}",
        xml.len()
    )
}

fn serve_unix_once(sock: PathBuf, reply: String) -> JoinHandle<Captured> {
    let listener = UnixListener::bind(&sock).unwrap();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let captured = read_request(stream.try_clone().unwrap());
        (&stream).write_all(reply.as_bytes()).unwrap();
        captured
    })
}

fn serve_tcp_once(reply: String) -> (u16, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let captured = read_request(stream.try_clone().unwrap());
        (&stream).write_all(reply.as_bytes()).unwrap();
        captured
    });
    (port, handle)
}

fn unix_client(sock: &std::path::Path, credentials: Option<Credentials>) -> RpcClient {
    let endpoint = ControlEndpoint {
        addr: EndpointAddr::Unix {
            path: sock.to_path_buf(),
        },
        credentials,
    };
    RpcClient::new(&endpoint, &Timeouts::default())
}

#[test]
fn reload_config_over_unix_socket() {
    let dir = TempDir::new().unwrap();
    let sock = dir.path().join("supervisor.sock");
    let result = Value::Array(vec![Value::Array(vec![
        Value::Array(vec![Value::from("g1")]),
        Value::Array(vec![]),
        Value::Array(vec![Value::from("g2")]),
    ])]);
    let server = serve_unix_once(sock.clone(), http_ok(&encode_response(&result).unwrap()));

    let diff = unix_client(&sock, None).reload_config().expect("reload");
    assert_eq!(diff.added, vec!["g1"]);
    assert!(diff.changed.is_empty());
    assert_eq!(diff.removed, vec!["g2"]);

    let seen = server.join().unwrap();
    assert_eq!(seen.method, "supervisor.reloadConfig");
    assert!(seen.params.is_empty());
    assert!(seen.head.starts_with("POST /RPC2 HTTP/1.1\r\n"), "{}", seen.head);
    assert!(seen.head.contains("host: localhost\r\n"), "{}", seen.head);
    assert!(seen.head.contains("content-type: text/xml\r\n"), "{}", seen.head);
    assert!(!seen.head.contains("authorization"), "{}", seen.head);
}

#[test]
fn start_process_sends_name_and_basic_auth() {
    let dir = TempDir::new().unwrap();
    let sock = dir.path().join("auth.sock");
    let server = serve_unix_once(
        sock.clone(),
        http_ok(&encode_response(&Value::Bool(true)).unwrap()),
    );

    let creds = Credentials {
        username: "user".into(),
        password: "123".into(),
    };
    unix_client(&sock, Some(creds))
        .start_process("web")
        .expect("startProcess");

    let seen = server.join().unwrap();
    assert_eq!(seen.method, "supervisor.startProcess");
    assert_eq!(seen.params, vec![Value::from("web")]);
    assert!(
        seen.head.contains("authorization: Basic dXNlcjoxMjM=\r\n"),
        "{}",
        seen.head
    );
}

#[test]
fn tcp_host_header_carries_port() {
    let (port, server) = serve_tcp_once(http_ok(&encode_response(&Value::Bool(true)).unwrap()));
    let endpoint = ControlEndpoint {
        addr: EndpointAddr::Inet {
            host: "127.0.0.1".into(),
            port,
        },
        credentials: None,
    };
    RpcClient::new(&endpoint, &Timeouts::default())
        .add_process_group("web")
        .expect("addProcessGroup");

    let seen = server.join().unwrap();
    assert_eq!(seen.method, "supervisor.addProcessGroup");
    assert!(
        seen.head.contains(&format!("host: 127.0.0.1:{port}\r\n")),
        "{}",
        seen.head
    );
}

#[test]
fn fault_is_surfaced_with_code() {
    let dir = TempDir::new().unwrap();
    let sock = dir.path().join("fault.sock");
    let server = serve_unix_once(
        sock.clone(),
        http_ok(&encode_fault(60, "ALREADY_STARTED: web").unwrap()),
    );

    let err = unix_client(&sock, None).start_process("web").unwrap_err();
    server.join().unwrap();
    assert_eq!(err.fault_code(), Some(60));
    assert!(
        matches!(&err, RpcError::Fault { message, .. } if message == "ALREADY_STARTED: web"),
        "got: {err}"
    );
}

#[test]
fn http_error_status_is_reported() {
    let dir = TempDir::new().unwrap();
    let sock = dir.path().join("401.sock");
    let server = serve_unix_once(
        sock.clone(),
        "HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\n\r\n".to_string(),
    );

    let err = unix_client(&sock, None).stop_process("web").unwrap_err();
    server.join().unwrap();
    assert!(
        matches!(err, RpcError::Http { status: 401, .. }),
        "got: {err}"
    );
}

#[test]
fn chunked_response_is_decoded() {
    let dir = TempDir::new().unwrap();
    let sock = dir.path().join("chunked.sock");
    let xml = encode_response(&Value::Bool(true)).unwrap();
    let (a, b) = xml.split_at(xml.len() / 2);
    let reply = format!(
        "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{a}\r\n{:x}\r\n{b}\r\n0\r\n\r\n",
        a.len(),
        b.len()
    );
    let server = serve_unix_once(sock.clone(), reply);

    unix_client(&sock, None)
        .stop_process_group("web")
        .expect("stopProcessGroup");
    assert_eq!(server.join().unwrap().method, "supervisor.stopProcessGroup");
}

#[test]
fn missing_socket_is_transport_error() {
    let dir = TempDir::new().unwrap();
    let err = unix_client(&dir.path().join("absent.sock"), None)
        .remove_process_group("web")
        .unwrap_err();
    assert!(
        matches!(err, RpcError::Transport(TransportError::Connect { .. })),
        "got: {err}"
    );
}

#[test]
fn silent_server_hits_read_timeout() {
    let dir = TempDir::new().unwrap();
    let sock = dir.path().join("slow.sock");
    let listener = UnixListener::bind(&sock).unwrap();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let _ = read_request(stream.try_clone().unwrap());
        // Hold the connection open without replying.
        thread::sleep(std::time::Duration::from_secs(3));
        drop(stream);
    });

    let endpoint = ControlEndpoint {
        addr: EndpointAddr::Unix { path: sock },
        credentials: None,
    };
    let timeouts = Timeouts {
        open_secs: 5,
        read_secs: 1,
        write_secs: 5,
    };
    let err = RpcClient::new(&endpoint, &timeouts)
        .start_process_group("web")
        .unwrap_err();
    assert!(
        matches!(
            err,
            RpcError::Transport(TransportError::Timeout { phase: "read", .. })
        ),
        "got: {err}"
    );
    server.join().unwrap();
}

#[test]
fn oversized_content_length_is_malformed_not_a_crash() {
    let dir = TempDir::new().unwrap();
    let sock = dir.path().join("huge.sock");
    let server = serve_unix_once(
        sock.clone(),
        "HTTP/1.1 200 OK\r\nContent-Length: 18446744073709551615\r\n\r\n".to_string(),
    );

    let err = unix_client(&sock, None).reload_config().unwrap_err();
    server.join().unwrap();
    assert!(
        matches!(err, RpcError::Transport(TransportError::Malformed { .. })),
        "got: {err}"
    );
}

#[test]
fn overflowing_chunk_size_is_malformed_not_a_crash() {
    let dir = TempDir::new().unwrap();
    let sock = dir.path().join("chunk.sock");
    let server = serve_unix_once(
        sock.clone(),
        "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n1\r\na\r\nffffffffffffffff\r\n".to_string(),
    );

    let err = unix_client(&sock, None).reload_config().unwrap_err();
    server.join().unwrap();
    assert!(
        matches!(err, RpcError::Transport(TransportError::Malformed { .. })),
        "got: {err}"
    );
}
