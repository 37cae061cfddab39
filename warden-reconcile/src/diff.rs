//! Unified diff between on-disk artifacts and what would be rendered.

use std::path::{Path, PathBuf};

use similar::TextDiff;

use warden_core::types::{Action, Daemon, Manifest};
use warden_renderer::{source_for, Renderer};

use crate::error::ReconcileError;
use crate::writer::read_existing;

/// A single rendered file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: PathBuf,
    pub unified_diff: String,
}

/// Diff what an apply of `daemon` would write or delete. No files are written.
///
/// The main document and entities declaring `add` diff against disk, with
/// missing files treated as empty. Entities declaring `remove` whose file
/// exists diff against `/dev/null`. Anything else is left out.
pub fn diff_daemon(daemon: &Daemon, renderer: &Renderer) -> Result<Vec<FileDiff>, ReconcileError> {
    let mut diffs = Vec::new();
    let main = renderer.render(daemon, daemon)?;
    diffs.extend(diff_rendered(daemon, main.path, &main.content)?);

    for entity in daemon.entities() {
        let actions = entity.actions();
        if actions.contains(&Action::Add) {
            let rendered = renderer.render_entity(entity, daemon)?;
            diffs.extend(diff_rendered(daemon, rendered.path, &rendered.content)?);
        } else if actions.contains(&Action::Remove) {
            let path = source_for(entity).config_path(daemon);
            if let Some(existing) = read_text(&path)? {
                let unified = unified(&existing, "", &header("a", &path, daemon), "/dev/null");
                diffs.push(FileDiff {
                    path,
                    unified_diff: unified,
                });
            }
        }
    }
    Ok(diffs)
}

fn diff_rendered(daemon: &Daemon, path: PathBuf, content: &str) -> Result<Option<FileDiff>, ReconcileError> {
    let existing = read_text(&path)?.unwrap_or_default();
    if existing == content {
        return Ok(None);
    }
    let unified = unified(
        &existing,
        content,
        &header("a", &path, daemon),
        &header("b", &path, daemon),
    );
    Ok(Some(FileDiff {
        path,
        unified_diff: unified,
    }))
}

fn read_text(path: &Path) -> Result<Option<String>, ReconcileError> {
    Ok(read_existing(path)?.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
}

fn unified(old: &str, new: &str, old_header: &str, new_header: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .header(old_header, new_header)
        .context_radius(3)
        .to_string()
}

fn header(side: &str, path: &Path, daemon: &Daemon) -> String {
    format!("{side}/{}", display_relative(path, &daemon.path))
}

pub fn diff_manifest(manifest: &Manifest, renderer: &Renderer) -> Result<Vec<FileDiff>, ReconcileError> {
    let mut diffs = Vec::new();
    for daemon in &manifest.daemons {
        diffs.extend(diff_daemon(daemon, renderer)?);
    }
    Ok(diffs)
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;
    use warden_core::types::{Group, Program};

    use super::*;

    fn daemon_in(dir: &Path) -> Daemon {
        let mut daemon = Daemon::new("supervisor");
        daemon.path = dir.to_path_buf();
        daemon.programs = vec![Program::new("api", "/bin/api")];
        daemon
    }

    fn write_all(daemon: &Daemon, renderer: &Renderer) {
        for out in renderer.render_all(daemon).unwrap() {
            fs::create_dir_all(out.path.parent().unwrap()).unwrap();
            fs::write(&out.path, out.content).unwrap();
        }
    }

    #[test]
    fn missing_artifacts_diff_against_empty() {
        let root = TempDir::new().unwrap();
        let daemon = daemon_in(root.path());
        let renderer = Renderer::new().unwrap();
        let diffs = diff_daemon(&daemon, &renderer).unwrap();
        assert_eq!(diffs.len(), 2);
        assert!(diffs[1].unified_diff.contains("+[program:api]"));
    }

    #[test]
    fn no_diffs_when_disk_matches() {
        let root = TempDir::new().unwrap();
        let daemon = daemon_in(root.path());
        let renderer = Renderer::new().unwrap();
        write_all(&daemon, &renderer);
        assert!(diff_daemon(&daemon, &renderer).unwrap().is_empty());
    }

    #[test]
    fn local_edit_produces_unified_diff() {
        let root = TempDir::new().unwrap();
        let daemon = daemon_in(root.path());
        let renderer = Renderer::new().unwrap();
        write_all(&daemon, &renderer);

        let target = root.path().join("supervisor.d/program_api.conf");
        fs::write(&target, "[program:api]\ncommand = /bin/old\n").unwrap();

        let diffs = diff_daemon(&daemon, &renderer).unwrap();
        assert_eq!(diffs.len(), 1);
        let d = &diffs[0].unified_diff;
        assert!(d.contains("--- a/supervisor.d/program_api.conf"), "{d}");
        assert!(d.contains("+++ b/supervisor.d/program_api.conf"), "{d}");
        assert!(d.contains("-command = /bin/old"), "{d}");
        assert!(d.contains("+command = /bin/api"), "{d}");
        assert!(d.contains("@@"), "{d}");
    }

    #[test]
    fn entities_without_add_are_not_diffed() {
        let root = TempDir::new().unwrap();
        let mut daemon = daemon_in(root.path());
        daemon.programs[0].actions = vec![Action::Start];
        let renderer = Renderer::new().unwrap();

        let diffs = diff_daemon(&daemon, &renderer).unwrap();
        let paths: Vec<_> = diffs.iter().map(|d| d.path.clone()).collect();
        assert_eq!(paths, vec![root.path().join("supervisord.conf")]);
    }

    #[test]
    fn removed_entity_diffs_against_dev_null_only_when_present() {
        let root = TempDir::new().unwrap();
        let mut daemon = daemon_in(root.path());
        daemon.groups = vec![Group::new("web")];
        let renderer = Renderer::new().unwrap();
        write_all(&daemon, &renderer);

        daemon.programs[0].actions = vec![Action::Remove];
        daemon.groups[0].actions = vec![Action::Remove];
        fs::remove_file(root.path().join("supervisor.d/group_web.conf")).unwrap();

        let diffs = diff_daemon(&daemon, &renderer).unwrap();
        assert_eq!(diffs.len(), 1, "{diffs:?}");
        assert_eq!(diffs[0].path, root.path().join("supervisor.d/program_api.conf"));
        let d = &diffs[0].unified_diff;
        assert!(d.contains("--- a/supervisor.d/program_api.conf"), "{d}");
        assert!(d.contains("+++ /dev/null"), "{d}");
        assert!(d.contains("-[program:api]"), "{d}");
        assert!(!d.lines().any(|l| l.starts_with('+') && !l.starts_with("+++")), "{d}");
    }
}
