//! # warden-renderer
//!
//! Builds the ordered configuration document for each managed entity and
//! serializes it as INI text (or through a user Tera template).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use warden_renderer::Renderer;
//! use warden_core::types::Daemon;
//!
//! fn render_all(daemon: &Daemon) {
//!     if let Ok(renderer) = Renderer::new() {
//!         if let Ok(outputs) = renderer.render_all(daemon) {
//!             for out in outputs {
//!                 println!("{}: {} bytes", out.path.display(), out.content.len());
//!             }
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod document;
pub mod engine;
pub mod error;
pub mod source;

pub use context::TemplateContext;
pub use document::{format_environment, ConfigDocument, Section};
pub use engine::{RenderedConfig, Renderer, TemplateEngine};
pub use error::RenderError;
pub use source::{source_for, ConfigSource};
