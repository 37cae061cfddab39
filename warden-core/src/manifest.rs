//! Desired-state manifest loading and validation.
//!
//! A manifest is one YAML document listing daemons, each owning its groups,
//! programs and FastCGI programs. Loading always validates: a manifest that
//! breaks a naming or ownership invariant is rejected before anything acts
//! on it.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{io_err, ManifestError};
use crate::types::{Daemon, Manifest};

/// Load and validate the manifest at `path`.
///
/// Returns `ManifestError::Io` if unreadable,
/// `ManifestError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<Manifest, ManifestError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let manifest: Manifest = serde_yaml::from_str(&contents).map_err(|e| ManifestError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    validate(&manifest)?;
    Ok(manifest)
}

/// Parse and validate a manifest held in memory.
pub fn from_str(yaml: &str) -> Result<Manifest, ManifestError> {
    let manifest: Manifest = serde_yaml::from_str(yaml)?;
    validate(&manifest)?;
    Ok(manifest)
}

/// Check every cross-entity invariant of `manifest`.
pub fn validate(manifest: &Manifest) -> Result<(), ManifestError> {
    let mut daemon_names = HashSet::new();
    for daemon in &manifest.daemons {
        if !daemon_names.insert(daemon.name.as_str()) {
            return Err(ManifestError::DuplicateDaemon(daemon.name.clone()));
        }
        validate_daemon(daemon)?;
    }
    Ok(())
}

fn validate_daemon(daemon: &Daemon) -> Result<(), ManifestError> {
    if daemon.name.is_empty() {
        return Err(empty(daemon, "daemon", "name"));
    }
    check_name(daemon, "daemon", &daemon.name)?;

    daemon.endpoint().map_err(|source| ManifestError::Endpoint {
        daemon: daemon.name.clone(),
        source,
    })?;

    let mut groups = HashSet::new();
    for group in &daemon.groups {
        if group.name.0.is_empty() {
            return Err(empty(daemon, "group", "name"));
        }
        check_name(daemon, "group", &group.name.0)?;
        if !groups.insert(group.name.0.as_str()) {
            return Err(ManifestError::DuplicateGroup {
                daemon: daemon.name.clone(),
                name: group.name.0.clone(),
            });
        }
    }

    // Plain and FastCGI programs share one process namespace in the daemon.
    let mut programs = HashSet::new();
    for program in daemon.all_programs() {
        if program.name.0.is_empty() {
            return Err(empty(daemon, "program", "name"));
        }
        check_name(daemon, "program", &program.name.0)?;
        if program.command.trim().is_empty() {
            return Err(empty(daemon, &format!("program {:?}", program.name.0), "command"));
        }
        if !programs.insert(program.name.0.as_str()) {
            return Err(ManifestError::DuplicateProgram {
                daemon: daemon.name.clone(),
                name: program.name.0.clone(),
            });
        }
        if let Some(parent) = &program.group {
            if daemon.find_group(parent).is_none() {
                return Err(ManifestError::UnknownParentGroup {
                    daemon: daemon.name.clone(),
                    program: program.name.0.clone(),
                    group: parent.0.clone(),
                });
            }
        }
    }

    for fcgi in &daemon.fcgi_programs {
        if fcgi.socket.is_empty() {
            return Err(empty(
                daemon,
                &format!("fcgi-program {:?}", fcgi.program.name.0),
                "socket",
            ));
        }
    }
    Ok(())
}

/// Names become file name stems under the include directory and section
/// names in supervisor's INI, so path separators, `..`, the `:` section
/// delimiter, the `,` list delimiter and whitespace are all out.
fn check_name(daemon: &Daemon, entity: &'static str, name: &str) -> Result<(), ManifestError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@');
    if name.starts_with('.') || !name.chars().all(allowed) {
        return Err(ManifestError::InvalidName {
            daemon: daemon.name.clone(),
            entity,
            name: name.to_string(),
        });
    }
    Ok(())
}

fn empty(daemon: &Daemon, entity: &str, field: &'static str) -> ManifestError {
    ManifestError::EmptyField {
        daemon: daemon.name.clone(),
        entity: entity.to_string(),
        field,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, ListenSpec, Scalar};
    use rstest::rstest;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const FULL: &str = r#"
daemons:
  - name: app
    listen: "*:9001"
    username: admin
    password: secret
    path: /opt/sv
    config:
      logfile: /var/log/sv.log
    groups:
      - name: web
    programs:
      - name: api
        command: /usr/bin/api
        environment:
          FOO: bar
          BAZ: qux
        group: web
        actions: [add, start]
    fcgi_programs:
      - name: php
        command: /usr/bin/php-cgi
        socket: unix:///var/run/php.sock
        socket_mode: "0700"
"#;

    #[test]
    fn parses_full_manifest() {
        let manifest = from_str(FULL).expect("parse");
        let daemon = &manifest.daemons[0];
        assert_eq!(daemon.name, "app");
        assert_eq!(daemon.listen, Some(ListenSpec::from("*:9001")));
        assert_eq!(daemon.path, PathBuf::from("/opt/sv"));
        assert_eq!(daemon.config["logfile"], Scalar::from("/var/log/sv.log"));
        assert_eq!(daemon.actions, vec![Action::Enable]);

        let api = &daemon.programs[0];
        let keys: Vec<_> = api.environment.keys().cloned().collect();
        assert_eq!(keys, vec!["FOO", "BAZ"], "environment keeps declaration order");
        assert_eq!(api.actions, vec![Action::Add, Action::Start]);

        let php = &daemon.fcgi_programs[0];
        assert_eq!(php.program.name.0, "php");
        assert_eq!(php.socket_mode.as_deref(), Some("0700"));
        assert_eq!(php.program.actions, vec![Action::Add]);
    }

    #[test]
    fn defaults_apply_when_fields_absent() {
        let manifest = from_str("daemons:\n  - {}\n").expect("parse");
        let daemon = &manifest.daemons[0];
        assert_eq!(daemon.name, "supervisor");
        assert_eq!(daemon.path, PathBuf::from("/etc"));
        assert_eq!(daemon.config_name, "supervisord.conf");
        assert_eq!(daemon.confd_dir, "supervisor.d");
        assert_eq!(daemon.timeouts.open_secs, 5);
    }

    #[test]
    fn duplicate_program_across_kinds_is_rejected() {
        let yaml = r#"
daemons:
  - programs:
      - { name: a, command: /bin/a }
    fcgi_programs:
      - { name: a, command: /bin/a, socket: tcp://localhost:9000 }
"#;
        let err = from_str(yaml).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateProgram { .. }), "got: {err}");
    }

    #[test]
    fn duplicate_group_is_rejected() {
        let yaml = "daemons:\n  - groups:\n      - { name: g }\n      - { name: g }\n";
        let err = from_str(yaml).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateGroup { .. }), "got: {err}");
    }

    #[test]
    fn duplicate_daemon_is_rejected() {
        let yaml = "daemons:\n  - { name: a }\n  - { name: a }\n";
        let err = from_str(yaml).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateDaemon(_)), "got: {err}");
    }

    #[test]
    fn parent_group_must_belong_to_same_daemon() {
        let yaml = r#"
daemons:
  - name: one
    groups: [{ name: web }]
  - name: two
    programs:
      - { name: api, command: /bin/api, group: web }
"#;
        let err = from_str(yaml).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownParentGroup { .. }), "got: {err}");
        assert!(err.to_string().contains("\"two\""));
    }

    #[test]
    fn empty_command_is_rejected() {
        let yaml = "daemons:\n  - programs:\n      - { name: a, command: '  ' }\n";
        let err = from_str(yaml).unwrap_err();
        assert!(matches!(err, ManifestError::EmptyField { field: "command", .. }), "got: {err}");
    }

    #[rstest]
    #[case::traversal("x/../../../outside")]
    #[case::parent_dir("..")]
    #[case::hidden(".conf")]
    #[case::section_delimiter("a:b")]
    #[case::list_delimiter("a,b")]
    #[case::space("a b")]
    #[case::newline("a\nb")]
    #[case::absolute("/etc/passwd")]
    fn unsafe_program_names_are_rejected(#[case] name: &str) {
        let yaml = format!("daemons:\n  - programs:\n      - {{ name: {name:?}, command: /bin/a }}\n");
        let err = from_str(&yaml).unwrap_err();
        assert!(
            matches!(&err, ManifestError::InvalidName { entity: "program", name: n, .. } if n == name),
            "got: {err}"
        );
    }

    #[rstest]
    #[case::group("daemons:\n  - groups: [{ name: 'web/x' }]\n", "group")]
    #[case::daemon("daemons:\n  - { name: 'a b' }\n", "daemon")]
    #[case::fcgi(
        "daemons:\n  - fcgi_programs:\n      - { name: 'php:1', command: /bin/php, socket: tcp://localhost:9000 }\n",
        "program"
    )]
    fn unsafe_names_are_rejected_for_every_entity(#[case] yaml: &str, #[case] kind: &str) {
        let err = from_str(yaml).unwrap_err();
        assert!(
            matches!(&err, ManifestError::InvalidName { entity, .. } if *entity == kind),
            "got: {err}"
        );
    }

    #[rstest]
    #[case("api")]
    #[case("php-fpm.7")]
    #[case("worker_2")]
    #[case("queue@high")]
    fn ordinary_names_are_accepted(#[case] name: &str) {
        let yaml = format!("daemons:\n  - programs:\n      - {{ name: {name}, command: /bin/a }}\n");
        from_str(&yaml).expect("valid name");
    }

    #[test]
    fn invalid_port_is_reported_with_daemon() {
        let err = from_str("daemons:\n  - { name: x, listen: 99999 }\n").unwrap_err();
        assert!(matches!(err, ManifestError::Endpoint { .. }), "got: {err}");
    }

    #[test]
    fn load_missing_file_returns_io_error_with_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.yaml");
        let err = load_at(&path).unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
        assert!(err.to_string().contains("missing.yaml"));
    }

    #[test]
    fn load_corrupt_yaml_returns_parse_error_with_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warden.yaml");
        std::fs::write(&path, "daemons: [unclosed").unwrap();
        let err = load_at(&path).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }), "got: {err}");
        assert!(err.to_string().contains("warden.yaml"));
    }
}
