//! Ordered INI document model and serializer.
//!
//! A [`ConfigDocument`] is an ordered map of section name to an ordered map of
//! key to [`Scalar`]. Sections and keys render in insertion order, so the same
//! document always serializes to the same bytes.
//!
//! Values are written verbatim: no quoting and no escaping. A value holding a
//! newline or a `;` produces an INI file the daemon may read differently.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use warden_core::types::{Overlay, Scalar};

/// Ordered key/value pairs of one `[section]`.
pub type Section = IndexMap<String, Scalar>;

/// Nested, insertion-ordered configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigDocument {
    sections: IndexMap<String, Section>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or append the section named `name`.
    pub fn section_mut(&mut self, name: &str) -> &mut Section {
        self.sections.entry(name.to_string()).or_default()
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// Set `key` in `section`, appending either if new.
    pub fn insert(&mut self, section: &str, key: &str, value: impl Into<Scalar>) {
        self.section_mut(section).insert(key.to_string(), value.into());
    }

    /// Set `key` only when `value` is present.
    pub fn insert_opt<V: Into<Scalar>>(&mut self, section: &str, key: &str, value: Option<V>) {
        if let Some(value) = value {
            self.insert(section, key, value);
        }
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter().map(|(name, section)| (name.as_str(), section))
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Merge `overlay` into `self`, section by section and key by key.
    ///
    /// An overlay key replaces the existing value in place (its position is
    /// kept); keys only in the overlay are appended; untouched keys stay.
    pub fn merge(&mut self, overlay: &ConfigDocument) {
        for (name, entries) in &overlay.sections {
            let section = self.section_mut(name);
            for (key, value) in entries {
                section.insert(key.clone(), value.clone());
            }
        }
    }

    /// Consuming form of [`merge`](Self::merge).
    pub fn merged(mut self, overlay: &ConfigDocument) -> Self {
        self.merge(overlay);
        self
    }

    /// A single-section document holding `overlay`.
    pub fn from_overlay(section: &str, overlay: &Overlay) -> Self {
        let mut doc = Self::new();
        doc.section_mut(section).extend(overlay.clone());
        doc
    }

    /// Serialize as INI text.
    pub fn to_ini(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, section)) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{name}]")?;
            for (key, value) in section {
                writeln!(f, "{key} = {value}")?;
            }
        }
        Ok(())
    }
}

/// Render an environment mapping as `KEY="value",KEY2="value2"`.
///
/// Embedded `"` in values is not escaped.
pub fn format_environment<'a, I>(environment: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    environment
        .into_iter()
        .map(|(key, value)| format!("{key}=\"{value}\""))
        .collect::<Vec<_>>()
        .join(",")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
