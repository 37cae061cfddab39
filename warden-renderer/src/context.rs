//! Template context — serializable rendering payload built from a [`ConfigDocument`].

use serde::{Deserialize, Serialize};

use crate::document::ConfigDocument;
use crate::error::RenderError;
use crate::source::ConfigSource;

/// Payload handed to user templates.
///
/// Sections and entries are lists rather than maps so that templates iterate
/// them in document order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateContext {
    /// Entity name (program, group, or daemon name).
    pub name: String,
    /// Entity kind, e.g. `program` or `fcgi-program`.
    pub kind: String,
    /// Artifact path the rendered content is written to.
    pub path: String,
    pub sections: Vec<SectionCtx>,
    pub meta: MetaCtx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionCtx {
    pub name: String,
    pub entries: Vec<EntryCtx>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryCtx {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaCtx {
    pub warden_version: String,
}

impl TemplateContext {
    /// Build a [`TemplateContext`] for `source` from its merged document.
    pub fn from_document(
        source: &dyn ConfigSource,
        path: &std::path::Path,
        doc: &ConfigDocument,
    ) -> Self {
        let sections = doc
            .sections()
            .map(|(name, entries)| SectionCtx {
                name: name.to_string(),
                entries: entries
                    .iter()
                    .map(|(key, value)| EntryCtx {
                        key: key.clone(),
                        value: value.to_string(),
                    })
                    .collect(),
            })
            .collect();

        TemplateContext {
            name: source.name().to_string(),
            kind: source.kind().to_string(),
            path: path.display().to_string(),
            sections,
            meta: MetaCtx {
                warden_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use warden_core::types::{Daemon, Program, Scalar};

    #[test]
    fn context_preserves_document_order() {
        let mut program = Program::new("api", "/bin/api");
        program.config.insert("priority".into(), Scalar::Integer(5));
        let doc = program.render_document(&Daemon::new("supervisor")).unwrap();
        let ctx = TemplateContext::from_document(&program, Path::new("/x.conf"), &doc);

        assert_eq!(ctx.name, "api");
        assert_eq!(ctx.kind, "program");
        assert_eq!(ctx.sections.len(), 1);
        assert_eq!(ctx.sections[0].name, "program:api");
        let keys: Vec<_> = ctx.sections[0].entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["command", "priority"]);
        assert_eq!(ctx.sections[0].entries[1].value, "5");
    }

    #[test]
    fn to_tera_context_succeeds() {
        let program = Program::new("api", "/bin/api");
        let doc = program.render_document(&Daemon::new("supervisor")).unwrap();
        let ctx = TemplateContext::from_document(&program, Path::new("/x.conf"), &doc);
        ctx.to_tera_context().expect("context conversion");
    }
}
