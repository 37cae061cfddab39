//! Config artifact writer.
//!
//! Writes are plain content writes followed by a mode and ownership change.
//! A crash mid-write can leave a partial file; the next run rewrites it since
//! the content will differ.
//!
//! Every function takes `dry_run` and reports what it did (or would do) as an
//! [`Outcome`] rather than returning a bare `()`.

use std::fs::{self, Permissions};
use std::io::ErrorKind;
use std::os::unix::fs::{chown, PermissionsExt};
use std::path::Path;

use warden_core::types::Daemon;

use crate::error::{io_err, ReconcileError};
use crate::report::Outcome;

/// Mode for rendered config artifacts.
pub const CONFIG_MODE: u32 = 0o600;
/// Mode for the include directory.
pub const CONFD_MODE: u32 = 0o700;

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

/// Numeric owner/group applied to everything written for a daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Ownership {
    /// Look up `daemon.owner` / `daemon.group` by name.
    ///
    /// When only an owner is set, the owner's primary group is used.
    pub fn for_daemon(daemon: &Daemon) -> Result<Self, ReconcileError> {
        let mut ownership = Ownership::default();
        if let Some(owner) = &daemon.owner {
            let user = uzers::get_user_by_name(owner).ok_or_else(|| {
                ReconcileError::UnknownOwner {
                    kind: "user",
                    name: owner.clone(),
                }
            })?;
            ownership.uid = Some(user.uid());
            ownership.gid = Some(user.primary_group_id());
        }
        if let Some(group) = &daemon.group {
            let group = uzers::get_group_by_name(group).ok_or_else(|| {
                ReconcileError::UnknownOwner {
                    kind: "group",
                    name: group.clone(),
                }
            })?;
            ownership.gid = Some(group.gid());
        }
        Ok(ownership)
    }

    pub fn is_set(&self) -> bool {
        self.uid.is_some() || self.gid.is_some()
    }

    fn apply(&self, path: &Path) -> Result<(), ReconcileError> {
        if self.is_set() {
            chown(path, self.uid, self.gid).map_err(|e| io_err(path, e))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Read / write / delete
// ---------------------------------------------------------------------------

/// Current on-disk bytes, or `None` if the artifact does not exist.
pub fn read_existing(path: &Path) -> Result<Option<Vec<u8>>, ReconcileError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Write `content` to `path` unless the file already holds exactly that.
///
/// Mode and ownership are enforced either way; an unchanged file that drifted
/// from them is fixed in place and still reported as `Unchanged`.
pub fn write_config(
    path: &Path,
    content: &str,
    ownership: &Ownership,
    dry_run: bool,
) -> Result<Outcome, ReconcileError> {
    if read_existing(path)?.as_deref() == Some(content.as_bytes()) {
        if !dry_run {
            restrict(path, ownership)?;
        }
        tracing::debug!(path = %path.display(), "unchanged");
        return Ok(Outcome::Unchanged {
            path: path.to_path_buf(),
        });
    }

    if dry_run {
        tracing::info!(path = %path.display(), "[dry-run] would write");
        return Ok(Outcome::WouldWrite {
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    fs::write(path, content).map_err(|e| io_err(path, e))?;
    restrict(path, ownership)?;

    tracing::info!(path = %path.display(), "wrote");
    Ok(Outcome::Written {
        path: path.to_path_buf(),
    })
}

fn restrict(path: &Path, ownership: &Ownership) -> Result<(), ReconcileError> {
    fs::set_permissions(path, Permissions::from_mode(CONFIG_MODE)).map_err(|e| io_err(path, e))?;
    ownership.apply(path)
}

/// Delete `path` if it exists.
pub fn delete_config(path: &Path, dry_run: bool) -> Result<Outcome, ReconcileError> {
    if read_existing(path)?.is_none() {
        return Ok(Outcome::Absent {
            path: path.to_path_buf(),
        });
    }
    if dry_run {
        tracing::info!(path = %path.display(), "[dry-run] would delete");
        return Ok(Outcome::WouldDelete {
            path: path.to_path_buf(),
        });
    }
    fs::remove_file(path).map_err(|e| io_err(path, e))?;
    tracing::info!(path = %path.display(), "deleted");
    Ok(Outcome::Deleted {
        path: path.to_path_buf(),
    })
}

/// Create the include directory with [`CONFD_MODE`].
pub fn ensure_confd(path: &Path, ownership: &Ownership, dry_run: bool) -> Result<(), ReconcileError> {
    if dry_run || path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| io_err(path, e))?;
    fs::set_permissions(path, Permissions::from_mode(CONFD_MODE)).map_err(|e| io_err(path, e))?;
    ownership.apply(path)?;
    tracing::info!(path = %path.display(), "created include directory");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
