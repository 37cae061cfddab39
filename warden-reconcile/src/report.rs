//! What a reconciliation run did, per daemon, entity and action.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use warden_core::types::{Action, EntityKind};

/// A single observable effect (or skipped effect) of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Artifact content changed (or did not exist) and was written.
    Written { path: PathBuf },
    /// Rendered content matches what is on disk.
    Unchanged { path: PathBuf },
    /// Dry run: the artifact would have been written.
    WouldWrite { path: PathBuf },
    Deleted { path: PathBuf },
    /// Nothing to delete.
    Absent { path: PathBuf },
    WouldDelete { path: PathBuf },
    /// A remote or service call that was issued.
    Called { call: String },
    /// Dry run: a call that would have been issued.
    WouldCall { call: String },
}

impl Outcome {
    pub fn is_write(&self) -> bool {
        matches!(self, Outcome::Written { .. } | Outcome::Deleted { .. })
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Outcome::Called { .. })
    }

    /// Short label used in tables and status lines.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Written { .. } => "written",
            Outcome::Unchanged { .. } => "unchanged",
            Outcome::WouldWrite { .. } => "would write",
            Outcome::Deleted { .. } => "deleted",
            Outcome::Absent { .. } => "absent",
            Outcome::WouldDelete { .. } => "would delete",
            Outcome::Called { .. } => "called",
            Outcome::WouldCall { .. } => "would call",
        }
    }

    /// The path or call this outcome concerns.
    pub fn subject(&self) -> String {
        match self {
            Outcome::Written { path }
            | Outcome::Unchanged { path }
            | Outcome::WouldWrite { path }
            | Outcome::Deleted { path }
            | Outcome::Absent { path }
            | Outcome::WouldDelete { path } => path.display().to_string(),
            Outcome::Called { call } | Outcome::WouldCall { call } => call.clone(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label(), self.subject())
    }
}

/// Outcomes of one action on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    pub kind: EntityKind,
    pub name: String,
    pub action: Action,
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaemonReport {
    pub daemon: String,
    pub actions: Vec<ActionReport>,
}

impl DaemonReport {
    pub fn new(daemon: impl Into<String>) -> Self {
        Self {
            daemon: daemon.into(),
            actions: Vec::new(),
        }
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.actions.iter().flat_map(|a| a.outcomes.iter())
    }
}

/// Report for a whole manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub daemons: Vec<DaemonReport>,
}

impl RunReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.daemons.iter().flat_map(|d| d.outcomes())
    }

    pub fn write_count(&self) -> usize {
        self.outcomes().filter(|o| o.is_write()).count()
    }

    pub fn call_count(&self) -> usize {
        self.outcomes().filter(|o| o.is_call()).count()
    }

    /// True when nothing was, or would have been, changed.
    pub fn is_noop(&self) -> bool {
        self.outcomes().all(|o| {
            matches!(o, Outcome::Unchanged { .. } | Outcome::Absent { .. })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcomes: Vec<Outcome>) -> RunReport {
        RunReport {
            dry_run: false,
            daemons: vec![DaemonReport {
                daemon: "supervisor".into(),
                actions: vec![ActionReport {
                    kind: EntityKind::Program,
                    name: "api".into(),
                    action: Action::Add,
                    outcomes,
                }],
            }],
        }
    }

    #[test]
    fn counts_writes_and_calls() {
        let r = report(vec![
            Outcome::Written { path: "/a".into() },
            Outcome::Called { call: "supervisor.reloadConfig".into() },
            Outcome::Called { call: "supervisor.addProcessGroup(api)".into() },
        ]);
        assert_eq!(r.write_count(), 1);
        assert_eq!(r.call_count(), 2);
        assert!(!r.is_noop());
    }

    #[test]
    fn unchanged_only_is_noop() {
        let r = report(vec![Outcome::Unchanged { path: "/a".into() }]);
        assert!(r.is_noop());
        assert_eq!(r.write_count(), 0);
    }

    #[test]
    fn outcome_display() {
        let o = Outcome::WouldDelete { path: "/etc/x.conf".into() };
        assert_eq!(o.to_string(), "would delete: /etc/x.conf");
    }
}
