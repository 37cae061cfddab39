//! Rendering entry point — [`Renderer`] and the user [`TemplateEngine`].
//!
//! Without a template an entity renders through the built-in INI serializer.
//! With one, the same merged document is exposed to Tera as a
//! [`TemplateContext`], so section and key order still come from the document.
//!
//! A `template` value is looked up first by name among the templates loaded
//! from the template directory, then as a file path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tera::Tera;

use warden_core::types::{Daemon, EntityRef};

use crate::context::TemplateContext;
use crate::error::{io_err, RenderError};
use crate::source::{source_for, ConfigSource};

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Tera-based engine for user-supplied templates.
///
/// Templates are named by their path relative to the template directory.
pub struct TemplateEngine {
    tera: Tera,
    names: HashSet<String>,
}

impl TemplateEngine {
    /// Load every `.tera` file under `user_template_dir`, if given.
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        let tera = match user_template_dir {
            Some(dir) if dir.is_dir() => Tera::new(&format!("{}/**/*.tera", dir.display()))?,
            _ => Tera::default(),
        };
        let names = tera.get_template_names().map(str::to_owned).collect();
        Ok(TemplateEngine { tera, names })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Render `template` (a loaded template name or a file path) with `ctx`.
    pub fn render(&self, template: &Path, ctx: &TemplateContext) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        if let Some(name) = template.to_str().filter(|n| self.names.contains(*n)) {
            return Ok(self.tera.render(name, &tera_ctx)?);
        }
        let source = std::fs::read_to_string(template).map_err(|e| io_err(template, e))?;
        Ok(Tera::one_off(&source, &tera_ctx, false)?)
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// One rendered artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub path: PathBuf,
    pub content: String,
}

/// Renders entities to their configuration artifacts.
///
/// Create once with [`Renderer::new`] and reuse for a whole run.
pub struct Renderer {
    engine: TemplateEngine,
}

impl Renderer {
    /// A renderer with no template directory.
    pub fn new() -> Result<Self, RenderError> {
        Self::with_template_dir(None)
    }

    pub fn with_template_dir(dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(Renderer {
            engine: TemplateEngine::new(dir)?,
        })
    }

    /// Render `source` as owned by `daemon`.
    pub fn render(
        &self,
        source: &dyn ConfigSource,
        daemon: &Daemon,
    ) -> Result<RenderedConfig, RenderError> {
        let path = source.config_path(daemon);
        let doc = source.render_document(daemon)?;
        let content = match source.template() {
            Some(template) => {
                let ctx = TemplateContext::from_document(source, &path, &doc);
                self.engine.render(template, &ctx)?
            }
            None => doc.to_ini(),
        };
        Ok(RenderedConfig { path, content })
    }

    /// Render one daemon-owned entity.
    pub fn render_entity(
        &self,
        entity: EntityRef<'_>,
        daemon: &Daemon,
    ) -> Result<RenderedConfig, RenderError> {
        self.render(source_for(entity), daemon)
    }

    /// Render the daemon's main document followed by every owned entity.
    pub fn render_all(&self, daemon: &Daemon) -> Result<Vec<RenderedConfig>, RenderError> {
        let mut out = vec![self.render(daemon, daemon)?];
        for entity in daemon.entities() {
            out.push(self.render_entity(entity, daemon)?);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use warden_core::types::{Group, Program};

    #[test]
    fn renderer_new_succeeds() {
        Renderer::new().expect("Renderer::new should succeed without templates");
    }

    #[test]
    fn builtin_ini_is_used_without_template() {
        let renderer = Renderer::new().unwrap();
        let daemon = Daemon::new("supervisor");
        let program = Program::new("api", "/bin/api");
        let out = renderer.render(&program, &daemon).unwrap();
        assert_eq!(out.content, "[program:api]\ncommand = /bin/api\n");
        assert_eq!(
            out.path,
            PathBuf::from("/etc/supervisor.d/program_api.conf")
        );
    }

    #[test]
    fn render_all_lists_main_document_first() {
        let renderer = Renderer::new().unwrap();
        let mut daemon = Daemon::new("supervisor");
        daemon.groups = vec![Group::new("g")];
        daemon.programs = vec![Program::new("p", "/bin/p")];
        let paths: Vec<_> = renderer
            .render_all(&daemon)
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/etc/supervisord.conf"),
                PathBuf::from("/etc/supervisor.d/group_g.conf"),
                PathBuf::from("/etc/supervisor.d/program_p.conf"),
            ]
        );
    }

    #[test]
    fn named_template_from_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("compact.tera"),
            "{% for s in sections %}<{{ s.name }}>{% for e in s.entries %}{{ e.key }}={{ e.value }};{% endfor %}{% endfor %}",
        )
        .unwrap();
        let renderer = Renderer::with_template_dir(Some(dir.path())).unwrap();
        assert!(renderer.engine.has_template("compact.tera"));

        let mut program = Program::new("api", "/bin/api");
        program.template = Some(PathBuf::from("compact.tera"));
        let out = renderer.render(&program, &Daemon::new("supervisor")).unwrap();
        assert_eq!(out.content, "<program:api>command=/bin/api;");
    }

    #[test]
    fn nested_templates_are_named_by_relative_path() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("programs")).unwrap();
        std::fs::write(dir.path().join("programs/short.tera"), "{{ name }}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "{{ broken").unwrap();

        let renderer = Renderer::with_template_dir(Some(dir.path())).unwrap();
        assert!(renderer.engine.has_template("programs/short.tera"));
        assert!(!renderer.engine.has_template("notes.txt"));

        let mut program = Program::new("api", "/bin/api");
        program.template = Some(PathBuf::from("programs/short.tera"));
        let out = renderer.render(&program, &Daemon::new("supervisor")).unwrap();
        assert_eq!(out.content, "api");
    }

    #[test]
    fn missing_template_dir_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = TemplateEngine::new(Some(&dir.path().join("absent"))).unwrap();
        assert!(!engine.has_template("anything.tera"));
    }

    #[test]
    fn template_file_path_is_rendered_one_off() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("group.conf.tera");
        std::fs::write(&file, "{{ kind }} {{ name }}").unwrap();

        let renderer = Renderer::new().unwrap();
        let mut group = Group::new("web");
        group.template = Some(file);
        let out = renderer.render(&group, &Daemon::new("supervisor")).unwrap();
        assert_eq!(out.content, "group web");
    }

    #[test]
    fn missing_template_file_is_io_error() {
        let renderer = Renderer::new().unwrap();
        let mut program = Program::new("api", "/bin/api");
        program.template = Some(PathBuf::from("/nonexistent/t.tera"));
        let err = renderer
            .render(&program, &Daemon::new("supervisor"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Io { .. }), "got: {err}");
    }
}
