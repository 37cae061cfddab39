//! Manifest loading against real files, plus endpoint resolution end to end.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use warden_core::{manifest, EndpointAddr, ManifestError, LOOPBACK_HOST};

const MANIFEST: &str = r#"
daemons:
  - name: supervisor
    listen: 9001
    username: admin
    password: secret
  - name: app
    programs:
      - name: worker
        command: /usr/bin/worker --queue default
"#;

#[test]
fn load_from_disk_resolves_each_daemon_endpoint() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("warden.yaml");
    file.write_str(MANIFEST).expect("write manifest");
    file.assert(predicate::path::is_file());

    let manifest = manifest::load_at(file.path()).expect("load");
    assert_eq!(manifest.daemons.len(), 2);

    let inet = manifest.daemons[0].endpoint().expect("endpoint");
    assert_eq!(
        inet.addr,
        EndpointAddr::Inet {
            host: LOOPBACK_HOST.to_string(),
            port: 9001
        }
    );
    let creds = inet.credentials.expect("credentials");
    assert_eq!(creds.username, "admin");
    assert_eq!(creds.password, "secret");

    let unix = manifest.daemons[1].endpoint().expect("endpoint");
    assert_eq!(
        unix.addr,
        EndpointAddr::Unix {
            path: "/tmp/supervisor-app.sock".into()
        }
    );
    assert!(unix.credentials.is_none());
}

#[test]
fn load_wrong_shape_returns_parse_error() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("warden.yaml");
    file.write_str("- this is a list, not a mapping\n").expect("write");

    let err = manifest::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ManifestError::Parse { .. }), "got: {err}");
}

#[test]
fn program_without_command_is_a_parse_error() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("warden.yaml");
    file.write_str("daemons:\n  - programs:\n      - name: a\n")
        .expect("write");

    let err = manifest::load_at(file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("warden.yaml"), "must contain file path, got: {msg}");
}
