//! Per-entity configuration sources.
//!
//! Every managed entity knows where its artifact lives and which document it
//! renders to. The document is always `defaults` merged with the entity's
//! overlay, so user keys win at identical keys.
//!
//! | Entity       | Artifact                                   | Section                 |
//! |--------------|--------------------------------------------|-------------------------|
//! | Daemon       | `<root>/<config_name>`                     | several (see below)     |
//! | Program      | `<root>/<confd>/program_<name>.conf`       | `[program:<name>]`      |
//! | FcgiProgram  | `<root>/<confd>/fcgi-program_<name>.conf`  | `[fcgi-program:<name>]` |
//! | Group        | `<root>/<confd>/group_<name>.conf`         | `[group:<name>]`        |

use std::path::{Path, PathBuf};

use warden_core::endpoint::{self, EndpointAddr};
use warden_core::types::{Daemon, EntityKind, EntityRef, FcgiProgram, Group, Program};

use crate::document::{format_environment, ConfigDocument};
use crate::error::RenderError;

const RPC_INTERFACE_FACTORY: &str = "supervisor.rpcinterface:make_main_rpcinterface";

/// Something that renders to one configuration artifact.
pub trait ConfigSource {
    fn kind(&self) -> EntityKind;

    fn name(&self) -> &str;

    /// Absolute path of the artifact under `daemon`'s root.
    fn config_path(&self, daemon: &Daemon) -> PathBuf;

    /// Computed keys before the user overlay is applied.
    fn default_document(&self, daemon: &Daemon) -> Result<ConfigDocument, RenderError>;

    /// User overlay, shaped as a document.
    fn overlay(&self) -> ConfigDocument;

    /// Optional user template used instead of the built-in INI serializer.
    fn template(&self) -> Option<&Path>;

    /// Defaults merged with the overlay.
    fn render_document(&self, daemon: &Daemon) -> Result<ConfigDocument, RenderError> {
        Ok(self.default_document(daemon)?.merged(&self.overlay()))
    }
}

/// View a daemon-owned entity through its [`ConfigSource`] implementation.
pub fn source_for(entity: EntityRef<'_>) -> &dyn ConfigSource {
    match entity {
        EntityRef::Group(g) => g as &dyn ConfigSource,
        EntityRef::Program(p) => p as &dyn ConfigSource,
        EntityRef::FcgiProgram(f) => f as &dyn ConfigSource,
    }
}

fn confd_file(daemon: &Daemon, prefix: &str, name: &str) -> PathBuf {
    daemon.confd_path().join(format!("{prefix}_{name}.conf"))
}

fn program_section(prefix: &str, program: &Program) -> String {
    format!("{prefix}:{}", program.name)
}

/// Keys shared by plain and FastCGI programs, written into `section`.
fn program_defaults(doc: &mut ConfigDocument, section: &str, program: &Program) {
    doc.insert(section, "command", program.command.as_str());
    doc.insert_opt(
        section,
        "directory",
        program.directory.as_ref().map(|d| d.display().to_string()),
    );
    if !program.environment.is_empty() {
        doc.insert(section, "environment", format_environment(&program.environment));
    }
    doc.insert_opt(section, "user", program.user.as_deref());
}

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

impl ConfigSource for Program {
    fn kind(&self) -> EntityKind {
        EntityKind::Program
    }

    fn name(&self) -> &str {
        &self.name.0
    }

    fn config_path(&self, daemon: &Daemon) -> PathBuf {
        confd_file(daemon, "program", &self.name.0)
    }

    fn default_document(&self, _daemon: &Daemon) -> Result<ConfigDocument, RenderError> {
        let mut doc = ConfigDocument::new();
        program_defaults(&mut doc, &program_section("program", self), self);
        Ok(doc)
    }

    fn overlay(&self) -> ConfigDocument {
        ConfigDocument::from_overlay(&program_section("program", self), &self.config)
    }

    fn template(&self) -> Option<&Path> {
        self.template.as_deref()
    }
}

// ---------------------------------------------------------------------------
// FcgiProgram
// ---------------------------------------------------------------------------

impl ConfigSource for FcgiProgram {
    fn kind(&self) -> EntityKind {
        EntityKind::FcgiProgram
    }

    fn name(&self) -> &str {
        &self.program.name.0
    }

    fn config_path(&self, daemon: &Daemon) -> PathBuf {
        confd_file(daemon, "fcgi-program", &self.program.name.0)
    }

    fn default_document(&self, _daemon: &Daemon) -> Result<ConfigDocument, RenderError> {
        let section = program_section("fcgi-program", &self.program);
        let mut doc = ConfigDocument::new();
        program_defaults(&mut doc, &section, &self.program);
        doc.insert(&section, "socket", self.socket.as_str());
        doc.insert_opt(&section, "socket_mode", self.socket_mode.as_deref());
        doc.insert_opt(&section, "socket_owner", self.socket_owner.as_deref());
        Ok(doc)
    }

    fn overlay(&self) -> ConfigDocument {
        ConfigDocument::from_overlay(
            &program_section("fcgi-program", &self.program),
            &self.program.config,
        )
    }

    fn template(&self) -> Option<&Path> {
        self.program.template.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

impl ConfigSource for Group {
    fn kind(&self) -> EntityKind {
        EntityKind::Group
    }

    fn name(&self) -> &str {
        &self.name.0
    }

    fn config_path(&self, daemon: &Daemon) -> PathBuf {
        confd_file(daemon, "group", &self.name.0)
    }

    fn default_document(&self, daemon: &Daemon) -> Result<ConfigDocument, RenderError> {
        let mut doc = ConfigDocument::new();
        doc.insert(
            &format!("group:{}", self.name),
            "programs",
            daemon.group_members(self).join(","),
        );
        Ok(doc)
    }

    fn overlay(&self) -> ConfigDocument {
        ConfigDocument::from_overlay(&format!("group:{}", self.name), &self.config)
    }

    fn template(&self) -> Option<&Path> {
        self.template.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

impl ConfigSource for Daemon {
    fn kind(&self) -> EntityKind {
        EntityKind::Daemon
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn config_path(&self, _daemon: &Daemon) -> PathBuf {
        Daemon::config_path(self)
    }

    /// `[supervisord]`, `[supervisorctl]`, `[rpcinterface:supervisor]`,
    /// `[include]`, then the inet or unix http server section.
    fn default_document(&self, _daemon: &Daemon) -> Result<ConfigDocument, RenderError> {
        let endpoint = self.endpoint()?;
        let mut doc = ConfigDocument::new();
        doc.section_mut("supervisord");
        doc.insert("supervisorctl", "serverurl", endpoint.addr.server_url());
        doc.insert(
            "rpcinterface:supervisor",
            "supervisor.rpcinterface_factory",
            RPC_INTERFACE_FACTORY,
        );
        doc.insert(
            "include",
            "files",
            self.confd_path().join("*.conf").display().to_string(),
        );

        let server = match &endpoint.addr {
            EndpointAddr::Inet { .. } => {
                let raw = self.listen.as_ref().map(|l| l.to_string()).unwrap_or_default();
                doc.insert("inet_http_server", "port", raw);
                "inet_http_server"
            }
            EndpointAddr::Unix { path } => {
                doc.insert("unix_http_server", "file", path.display().to_string());
                "unix_http_server"
            }
        };
        doc.insert_opt(server, "password", self.password.as_deref());
        doc.insert_opt(server, "username", self.username.as_deref());
        if let (EndpointAddr::Unix { .. }, Some(owner)) = (&endpoint.addr, &self.owner) {
            let chown = match &self.group {
                Some(group) => format!("{owner}:{group}"),
                None => owner.clone(),
            };
            doc.insert(server, "chown", chown);
        }

        doc.insert_opt("supervisorctl", "password", self.password.as_deref());
        doc.insert_opt("supervisorctl", "username", self.username.as_deref());
        Ok(doc)
    }

    fn overlay(&self) -> ConfigDocument {
        ConfigDocument::from_overlay("supervisord", &self.config)
    }

    fn template(&self) -> Option<&Path> {
        self.template.as_deref()
    }
}

/// Whether `daemon`'s listen value fell through to a non-absolute unix path.
pub fn has_ambiguous_listen(daemon: &Daemon) -> bool {
    daemon
        .endpoint()
        .map(|e| endpoint::is_ambiguous_path(&e.addr))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use warden_core::types::{GroupName, ListenSpec, Scalar};

    fn daemon() -> Daemon {
        let mut d = Daemon::new("supervisor");
        d.path = PathBuf::from("/etc");
        d
    }

    #[test]
    fn program_document_and_path() {
        let mut p = Program::new("api", "/usr/bin/api --port 80");
        p.directory = Some(PathBuf::from("/srv/api"));
        p.environment.insert("FOO".into(), "bar".into());
        p.environment.insert("BAZ".into(), "qux".into());
        p.user = Some("www".into());

        let d = daemon();
        assert_eq!(
            p.config_path(&d),
            PathBuf::from("/etc/supervisor.d/program_api.conf")
        );
        assert_eq!(
            p.render_document(&d).unwrap().to_ini(),
            "[program:api]\n\
             command = /usr/bin/api --port 80\n\
             directory = /srv/api\n\
             environment = FOO=\"bar\",BAZ=\"qux\"\n\
             user = www\n"
        );
    }

    #[test]
    fn program_overlay_wins_at_identical_keys() {
        let mut p = Program::new("api", "/bin/api");
        p.config.insert("command".into(), Scalar::from("/bin/other"));
        p.config.insert("autorestart".into(), Scalar::Bool(true));
        assert_eq!(
            p.render_document(&daemon()).unwrap().to_ini(),
            "[program:api]\ncommand = /bin/other\nautorestart = true\n"
        );
    }

    #[test]
    fn empty_environment_is_omitted() {
        let p = Program::new("api", "/bin/api");
        let doc = p.render_document(&daemon()).unwrap();
        assert!(!doc.section("program:api").unwrap().contains_key("environment"));
    }

    #[test]
    fn fcgi_program_adds_socket_keys() {
        let fcgi = FcgiProgram {
            program: Program::new("php", "/usr/bin/php-cgi"),
            socket: "unix:///var/run/php.sock".into(),
            socket_mode: Some("0700".into()),
            socket_owner: None,
        };
        let d = daemon();
        assert_eq!(
            fcgi.config_path(&d),
            PathBuf::from("/etc/supervisor.d/fcgi-program_php.conf")
        );
        assert_eq!(
            fcgi.render_document(&d).unwrap().to_ini(),
            "[fcgi-program:php]\n\
             command = /usr/bin/php-cgi\n\
             socket = unix:///var/run/php.sock\n\
             socket_mode = 0700\n"
        );
    }

    #[test]
    fn fcgi_overlay_applies_after_socket_keys() {
        let mut program = Program::new("php", "/usr/bin/php-cgi");
        program.config.insert("socket".into(), Scalar::from("tcp://:9000"));
        let fcgi = FcgiProgram {
            program,
            socket: "unix:///var/run/php.sock".into(),
            socket_mode: None,
            socket_owner: None,
        };
        let doc = fcgi.render_document(&daemon()).unwrap();
        assert_eq!(
            doc.section("fcgi-program:php").unwrap()["socket"],
            Scalar::from("tcp://:9000")
        );
    }

    #[test]
    fn group_members_are_computed_from_parent_references() {
        let mut d = daemon();
        let group = Group::new("web");
        let mut a = Program::new("a", "/bin/a");
        a.group = Some(GroupName::from("web"));
        let mut b = Program::new("b", "/bin/b");
        b.group = Some(GroupName::from("web"));
        d.groups = vec![group.clone()];
        d.programs = vec![a, b];

        assert_eq!(
            group.config_path(&d),
            PathBuf::from("/etc/supervisor.d/group_web.conf")
        );
        assert_eq!(
            group.render_document(&d).unwrap().to_ini(),
            "[group:web]\nprograms = a,b\n"
        );
    }

    #[test]
    fn daemon_unix_document() {
        let mut d = Daemon::new("app");
        d.owner = Some("deploy".into());
        d.group = Some("staff".into());
        d.username = Some("admin".into());
        d.password = Some("secret".into());
        d.config.insert("logfile".into(), Scalar::from("/var/log/sv.log"));

        assert_eq!(
            d.render_document(&d).unwrap().to_ini(),
            "[supervisord]\n\
             logfile = /var/log/sv.log\n\
             \n\
             [supervisorctl]\n\
             serverurl = unix:///tmp/supervisor-app.sock\n\
             password = secret\n\
             username = admin\n\
             \n\
             [rpcinterface:supervisor]\n\
             supervisor.rpcinterface_factory = supervisor.rpcinterface:make_main_rpcinterface\n\
             \n\
             [include]\n\
             files = /etc/supervisor.d/*.conf\n\
             \n\
             [unix_http_server]\n\
             file = /tmp/supervisor-app.sock\n\
             password = secret\n\
             username = admin\n\
             chown = deploy:staff\n"
        );
    }

    #[test]
    fn daemon_inet_document() {
        let mut d = Daemon::new("supervisor");
        d.listen = Some(ListenSpec::from("*:9001"));
        let doc = d.render_document(&d).unwrap();
        let ctl = doc.section("supervisorctl").unwrap();
        assert_eq!(ctl["serverurl"], Scalar::from("http://127.0.0.1:9001"));
        let server = doc.section("inet_http_server").unwrap();
        assert_eq!(server["port"], Scalar::from("*:9001"));
        assert!(doc.section("unix_http_server").is_none());
    }

    #[test]
    fn source_for_dispatches_by_kind() {
        let mut d = daemon();
        d.groups = vec![Group::new("g")];
        d.programs = vec![Program::new("p", "/bin/p")];
        let kinds: Vec<_> = d
            .entities()
            .into_iter()
            .map(|e| source_for(e).kind())
            .collect();
        assert_eq!(kinds, vec![EntityKind::Group, EntityKind::Program]);
    }

    #[test]
    fn ambiguous_listen_is_detected() {
        let mut d = daemon();
        d.listen = Some(ListenSpec::from("run/sv.sock"));
        assert!(has_ambiguous_listen(&d));
    }
}
