//! Documentation templates.
//!
//! A template is a tree of sections, each holding an ordered list of
//! content blocks. Test and metric blocks name a test id and optionally
//! bind inputs and parameters; other blocks (text) are carried along for
//! placement but never executed.
//!
//! Templates come from YAML/JSON files or from the handshake's
//! `documentation_template`, where sections may be listed flat with a
//! `parent_section` reference instead of being nested.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{DocError, DocResult};
use crate::inputs::Params;

/// Kind of a content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// A threshold test.
    Test,
    /// A metric or unit metric.
    Metric,
    /// Anything not executed (text, placeholders).
    #[serde(other)]
    Text,
}

impl ContentType {
    /// Whether blocks of this type run a test.
    #[must_use]
    pub const fn is_executable(self) -> bool {
        matches!(self, Self::Test | Self::Metric)
    }
}

/// One content block of a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRef {
    /// Block kind.
    pub content_type: ContentType,
    /// Test id (with optional `:tag`) or text slot id.
    pub content_id: String,
    /// Logical input name to the name of a host-provided object.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, String>,
    /// Parameter overrides.
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
}

impl ContentRef {
    /// Test block for `test_id`.
    #[must_use]
    pub fn test(test_id: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Test,
            content_id: test_id.into(),
            inputs: IndexMap::new(),
            params: Params::new(),
        }
    }

    /// Metric block for `test_id`.
    #[must_use]
    pub fn metric(test_id: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Metric,
            ..Self::test(test_id)
        }
    }

    /// Text block.
    #[must_use]
    pub fn text(content_id: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Text,
            ..Self::test(content_id)
        }
    }

    /// Bind logical input `name` to host object `source`.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), source.into());
        self
    }

    /// Override a parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// A template section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionTemplate {
    /// Section id, unique within the template.
    pub id: String,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Presentation order among siblings.
    #[serde(default)]
    pub order: i64,
    /// Parent section id, for flat section lists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_section: Option<String>,
    /// Content blocks in template order.
    #[serde(default)]
    pub contents: Vec<ContentRef>,
    /// Nested sections.
    #[serde(default)]
    pub sections: Vec<SectionTemplate>,
}

impl SectionTemplate {
    /// Empty section.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            order: 0,
            parent_section: None,
            contents: Vec::new(),
            sections: Vec::new(),
        }
    }

    /// Set the title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the presentation order.
    #[must_use]
    pub const fn order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    /// Append a content block.
    #[must_use]
    pub fn content(mut self, content: ContentRef) -> Self {
        self.contents.push(content);
        self
    }

    /// Append a nested section.
    #[must_use]
    pub fn section(mut self, section: Self) -> Self {
        self.sections.push(section);
        self
    }
}

/// A documentation template.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SuiteTemplate {
    /// Template id.
    #[serde(default, alias = "template_id")]
    pub id: String,
    /// Display title.
    #[serde(default, alias = "template_name")]
    pub title: Option<String>,
    /// Top-level sections.
    #[serde(default)]
    pub sections: Vec<SectionTemplate>,
}

impl SuiteTemplate {
    /// Empty template.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Append a top-level section.
    #[must_use]
    pub fn section(mut self, section: SectionTemplate) -> Self {
        self.sections.push(section);
        self
    }

    /// Parse a YAML (or JSON) template.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or the section tree is invalid.
    pub fn from_yaml(yaml: &str) -> DocResult<Self> {
        let template: Self = serde_yaml::from_str(yaml)?;
        template.nested()
    }

    /// Load a template file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> DocResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Build from the handshake's `documentation_template` payload.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the payload is not a template.
    pub fn from_documentation_template(value: &Value) -> DocResult<Self> {
        let template: Self = serde_json::from_value(value.clone()).map_err(|e| {
            DocError::config(format!("invalid documentation template: {e}"))
        })?;
        template.nested()
    }

    /// Move flat sections under their `parent_section` and check ids.
    fn nested(mut self) -> DocResult<Self> {
        let mut ids = HashSet::new();
        check_ids(&self.sections, &mut ids)?;

        let (mut pending, roots): (Vec<_>, Vec<_>) = std::mem::take(&mut self.sections)
            .into_iter()
            .partition(|s| s.parent_section.is_some());
        self.sections = roots;

        // Attach in passes so children may precede their parents.
        while !pending.is_empty() {
            let before = pending.len();
            let mut unresolved = Vec::new();
            for mut section in pending {
                let parent_id = section.parent_section.take().unwrap_or_default();
                match find_section_mut(&mut self.sections, &parent_id) {
                    Some(parent) => parent.sections.push(section),
                    None => {
                        section.parent_section = Some(parent_id);
                        unresolved.push(section);
                    }
                }
            }
            if unresolved.len() == before {
                let dangling: Vec<_> = unresolved
                    .iter()
                    .map(|s| format!("{} -> {}", s.id, s.parent_section.as_deref().unwrap_or("")))
                    .collect();
                return Err(DocError::config(format!(
                    "sections reference unknown parents: {}",
                    dangling.join(", ")
                )));
            }
            pending = unresolved;
        }
        Ok(self)
    }

    /// Number of executable content blocks.
    #[must_use]
    pub fn test_count(&self) -> usize {
        fn count(sections: &[SectionTemplate]) -> usize {
            sections
                .iter()
                .map(|s| {
                    s.contents
                        .iter()
                        .filter(|c| c.content_type.is_executable())
                        .count()
                        + count(&s.sections)
                })
                .sum()
        }
        count(&self.sections)
    }
}

fn check_ids<'a>(sections: &'a [SectionTemplate], ids: &mut HashSet<&'a str>) -> DocResult<()> {
    for section in sections {
        if section.id.is_empty() {
            return Err(DocError::config("section id must not be empty"));
        }
        if !ids.insert(section.id.as_str()) {
            return Err(DocError::config(format!(
                "duplicate section id '{}'",
                section.id
            )));
        }
        check_ids(&section.sections, ids)?;
    }
    Ok(())
}

fn find_section_mut<'a>(
    sections: &'a mut [SectionTemplate],
    id: &str,
) -> Option<&'a mut SectionTemplate> {
    for section in sections {
        if section.id == id {
            return Some(section);
        }
        if let Some(found) = find_section_mut(&mut section.sections, id) {
            return Some(found);
        }
    }
    None
}
