//! Domain types for the desired-state manifest.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! All types are deserializable via serde + serde_yaml.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::endpoint::{self, ControlEndpoint, Credentials};
use crate::error::EndpointError;

/// Service name that maps to the unsuffixed default socket path.
pub const DEFAULT_DAEMON_NAME: &str = "supervisor";
/// Default filesystem root for daemon configuration.
pub const DEFAULT_ROOT: &str = "/etc";
/// Default file name of the main daemon document under the root.
pub const DEFAULT_CONFIG_NAME: &str = "supervisord.conf";
/// Default include directory (relative to the root) for per-entity files.
pub const DEFAULT_CONFD_DIR: &str = "supervisor.d";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a supervised program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgramName(pub String);

impl fmt::Display for ProgramName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProgramName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProgramName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed name for a program group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(pub String);

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for GroupName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GroupName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Scalars and overlays
// ---------------------------------------------------------------------------

/// A single configuration value. Rendered with `Display`, never quoted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => b.fmt(f),
            Scalar::Integer(i) => i.fmt(f),
            Scalar::Float(x) => x.fmt(f),
            Scalar::String(s) => s.fmt(f),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Integer(i)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// Free-form user keys merged over computed defaults at render time.
pub type Overlay = IndexMap<String, Scalar>;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Raw listen value as declared: a bare port number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListenSpec {
    Port(u64),
    Address(String),
}

impl fmt::Display for ListenSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenSpec::Port(p) => p.fmt(f),
            ListenSpec::Address(s) => s.fmt(f),
        }
    }
}

impl From<&str> for ListenSpec {
    fn from(s: &str) -> Self {
        ListenSpec::Address(s.to_owned())
    }
}

/// A reconciliation action that can be requested for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Remove,
    Start,
    Stop,
    Restart,
    Reread,
    Enable,
    Disable,
    Reload,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Add => "add",
            Action::Remove => "remove",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Reread => "reread",
            Action::Enable => "enable",
            Action::Disable => "disable",
            Action::Reload => "reload",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "add" => Action::Add,
            "remove" => Action::Remove,
            "start" => Action::Start,
            "stop" => Action::Stop,
            "restart" => Action::Restart,
            "reread" => Action::Reread,
            "enable" => Action::Enable,
            "disable" => Action::Disable,
            "reload" => Action::Reload,
            other => return Err(format!("unknown action {other:?}")),
        })
    }
}

/// The kind of a managed entity. Used as the dispatch key for action handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Daemon,
    Group,
    Program,
    FcgiProgram,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Daemon => "daemon",
            EntityKind::Group => "group",
            EntityKind::Program => "program",
            EntityKind::FcgiProgram => "fcgi-program",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "daemon" => EntityKind::Daemon,
            "group" => EntityKind::Group,
            "program" => EntityKind::Program,
            "fcgi-program" => EntityKind::FcgiProgram,
            other => return Err(format!("unknown entity kind {other:?}")),
        })
    }
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Socket timeouts applied to every RPC connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub open_secs: u64,
    pub read_secs: u64,
    pub write_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            open_secs: 5,
            read_secs: 30,
            write_secs: 30,
        }
    }
}

impl Timeouts {
    pub fn open(&self) -> Duration {
        Duration::from_secs(self.open_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

fn default_entity_actions() -> Vec<Action> {
    vec![Action::Add]
}

fn default_daemon_actions() -> Vec<Action> {
    vec![Action::Enable]
}

fn default_daemon_name() -> String {
    DEFAULT_DAEMON_NAME.to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT)
}

fn default_config_name() -> String {
    DEFAULT_CONFIG_NAME.to_string()
}

fn default_confd_dir() -> String {
    DEFAULT_CONFD_DIR.to_string()
}

/// A supervised command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub name: ProgramName,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Rendered in declaration order.
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Parent group; must be declared in the same daemon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupName>,
    #[serde(default)]
    pub config: Overlay,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    #[serde(default = "default_entity_actions")]
    pub actions: Vec<Action>,
}

impl Program {
    /// A program with only the required fields set.
    pub fn new(name: impl Into<ProgramName>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            directory: None,
            environment: IndexMap::new(),
            user: None,
            group: None,
            config: Overlay::new(),
            template: None,
            actions: default_entity_actions(),
        }
    }
}

/// A FastCGI program: a [`Program`] bound to a listening socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcgiProgram {
    #[serde(flatten)]
    pub program: Program,
    pub socket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_owner: Option<String>,
}

/// A named aggregate of programs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: GroupName,
    /// Explicit members. When absent, membership is computed from the
    /// programs that name this group as their parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub programs: Option<Vec<ProgramName>>,
    #[serde(default)]
    pub config: Overlay,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    #[serde(default = "default_entity_actions")]
    pub actions: Vec<Action>,
}

impl Group {
    pub fn new(name: impl Into<GroupName>) -> Self {
        Self {
            name: name.into(),
            programs: None,
            config: Overlay::new(),
            template: None,
            actions: default_entity_actions(),
        }
    }
}

/// The supervisor daemon and everything it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Daemon {
    /// Logical service name; drives the default socket path.
    #[serde(default = "default_daemon_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<ListenSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_root")]
    pub path: PathBuf,
    #[serde(default = "default_config_name")]
    pub config_name: String,
    #[serde(default = "default_confd_dir")]
    pub confd_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Overlay for the `[supervisord]` section.
    #[serde(default)]
    pub config: Overlay,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    #[serde(default = "default_daemon_actions")]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub programs: Vec<Program>,
    #[serde(default)]
    pub fcgi_programs: Vec<FcgiProgram>,
}

impl Daemon {
    /// A daemon with every optional field at its default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listen: None,
            username: None,
            password: None,
            path: default_root(),
            config_name: default_config_name(),
            confd_dir: default_confd_dir(),
            owner: None,
            group: None,
            config: Overlay::new(),
            timeouts: Timeouts::default(),
            template: None,
            actions: default_daemon_actions(),
            groups: vec![],
            programs: vec![],
            fcgi_programs: vec![],
        }
    }

    /// `<path>/<config_name>`
    pub fn config_path(&self) -> PathBuf {
        self.path.join(&self.config_name)
    }

    /// `<path>/<confd_dir>`
    pub fn confd_path(&self) -> PathBuf {
        self.path.join(&self.confd_dir)
    }

    /// Resolve the listen value into a transport descriptor with credentials.
    pub fn endpoint(&self) -> Result<ControlEndpoint, EndpointError> {
        let addr = endpoint::resolve(self.listen.as_ref(), &self.name)?;
        let credentials = self.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.password.clone().unwrap_or_default(),
        });
        Ok(ControlEndpoint { addr, credentials })
    }

    /// Owned entities in declaration order: groups, programs, fcgi programs.
    pub fn entities(&self) -> Vec<EntityRef<'_>> {
        self.groups
            .iter()
            .map(EntityRef::Group)
            .chain(self.programs.iter().map(EntityRef::Program))
            .chain(self.fcgi_programs.iter().map(EntityRef::FcgiProgram))
            .collect()
    }

    /// Owned entities with programs ahead of the groups that list them.
    ///
    /// Writing in this order means a reread never sees a group file naming a
    /// program file that is not there yet. Removal walks it backwards.
    pub fn apply_order(&self) -> Vec<EntityRef<'_>> {
        self.programs
            .iter()
            .map(EntityRef::Program)
            .chain(self.fcgi_programs.iter().map(EntityRef::FcgiProgram))
            .chain(self.groups.iter().map(EntityRef::Group))
            .collect()
    }

    /// Every program-like entity (plain and FastCGI) in declaration order.
    pub fn all_programs(&self) -> impl Iterator<Item = &Program> {
        self.programs
            .iter()
            .chain(self.fcgi_programs.iter().map(|f| &f.program))
    }

    pub fn find_group(&self, name: &GroupName) -> Option<&Group> {
        self.groups.iter().find(|g| &g.name == name)
    }

    /// Member names for `group`: the explicit list if declared, otherwise the
    /// programs of this daemon whose parent is `group`.
    pub fn group_members(&self, group: &Group) -> Vec<String> {
        match &group.programs {
            Some(explicit) => explicit.iter().map(|p| p.0.clone()).collect(),
            None => self
                .all_programs()
                .filter(|p| p.group.as_ref() == Some(&group.name))
                .map(|p| p.name.0.clone())
                .collect(),
        }
    }
}

/// A borrowed view of one entity owned by a [`Daemon`].
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Group(&'a Group),
    Program(&'a Program),
    FcgiProgram(&'a FcgiProgram),
}

impl<'a> EntityRef<'a> {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Group(_) => EntityKind::Group,
            EntityRef::Program(_) => EntityKind::Program,
            EntityRef::FcgiProgram(_) => EntityKind::FcgiProgram,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            EntityRef::Group(g) => &g.name.0,
            EntityRef::Program(p) => &p.name.0,
            EntityRef::FcgiProgram(f) => &f.program.name.0,
        }
    }

    pub fn actions(&self) -> &'a [Action] {
        match self {
            EntityRef::Group(g) => &g.actions,
            EntityRef::Program(p) => &p.actions,
            EntityRef::FcgiProgram(f) => &f.program.actions,
        }
    }
}

/// Root of the desired-state manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Manifest {
    #[serde(default)]
    pub daemons: Vec<Daemon>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
