//! Test registry: maps globally unique test ids to runnable units.
//!
//! Registration happens once at startup through `&mut self`; afterwards the
//! registry is shared behind an `Arc` and lookups are plain reads with no
//! locking. Ids whose first segment matches a registered provider namespace
//! are routed to that [`TestProvider`] instead of the built-in table.

pub mod builtin;
pub mod unit;

pub use unit::{RunFn, TestDescriptor, TestOutcome, TestUnit};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{DocError, DocResult};
use crate::result::TestKind;

/// A test id with an optional result tag (`namespace.area.Name:tag`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestId {
    base: String,
    tag: Option<String>,
}

impl TestId {
    /// Parse and validate an id.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for empty ids, empty segments or an
    /// empty tag.
    pub fn parse(id: &str) -> DocResult<Self> {
        let (base, tag) = match id.split_once(':') {
            Some((base, tag)) => (base, Some(tag)),
            None => (id, None),
        };
        if base.is_empty() || base.split('.').any(str::is_empty) {
            return Err(DocError::config(format!("invalid test id '{id}'")));
        }
        if tag.is_some_and(|t| t.is_empty() || t.contains(':')) {
            return Err(DocError::config(format!("invalid result tag in '{id}'")));
        }
        Ok(Self {
            base: base.to_string(),
            tag: tag.map(str::to_string),
        })
    }

    /// Registered id, without the tag.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Result tag, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// First dotted segment.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.base.split('.').next().unwrap_or(&self.base)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{tag}", self.base),
            None => f.write_str(&self.base),
        }
    }
}

/// Loads test units for one id namespace from outside the built-in table.
pub trait TestProvider: Send + Sync {
    /// Load the unit registered under `test_id`, if the provider has it.
    fn load(&self, test_id: &str) -> Option<Arc<dyn TestUnit>>;

    /// Ids the provider can load, for listing.
    fn list(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Listing entry for a registered test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDescription {
    /// Test id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Kind.
    pub kind: TestKind,
    /// Description.
    pub description: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Declared input keys.
    pub inputs: Vec<String>,
    /// Declared parameter names.
    pub params: Vec<String>,
}

impl TestDescription {
    fn of(unit: &dyn TestUnit) -> Self {
        Self {
            id: unit.id().to_string(),
            name: unit.name().to_string(),
            kind: unit.kind(),
            description: unit.description().to_string(),
            tags: unit.tags().to_vec(),
            inputs: unit.required_inputs().iter().map(|r| r.key()).collect(),
            params: unit.params().iter().map(|p| p.name.clone()).collect(),
        }
    }
}

/// Registry of test units and namespace providers.
#[derive(Default)]
pub struct TestRegistry {
    tests: HashMap<String, Arc<dyn TestUnit>>,
    providers: HashMap<String, Arc<dyn TestProvider>>,
}

impl fmt::Debug for TestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.tests.keys().collect();
        ids.sort();
        let mut namespaces: Vec<_> = self.providers.keys().collect();
        namespaces.sort();
        f.debug_struct("TestRegistry")
            .field("tests", &ids)
            .field("providers", &namespaces)
            .finish()
    }
}

impl TestRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in catalog.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_builtins(&mut registry);
        registry
    }

    /// Register a unit under its own id.
    ///
    /// Registering the same unit (same allocation) twice is a no-op.
    ///
    /// # Errors
    ///
    /// - `DuplicateTest` if a different unit already owns the id
    /// - `Config` if the id is malformed or carries a result tag
    pub fn register(&mut self, unit: Arc<dyn TestUnit>) -> DocResult<()> {
        let id = TestId::parse(unit.id())?;
        if id.tag().is_some() {
            return Err(DocError::config(format!(
                "test '{id}' cannot be registered with a result tag"
            )));
        }
        if let Some(existing) = self.tests.get(id.base()) {
            if same_unit(existing, &unit) {
                return Ok(());
            }
            return Err(DocError::DuplicateTest {
                test_id: id.base().to_string(),
            });
        }
        tracing::debug!(test_id = %id, kind = ?unit.kind(), "registered test");
        self.tests.insert(id.base().to_string(), unit);
        Ok(())
    }

    /// Register a typed plugin descriptor, returning its id.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register`].
    pub fn load_external(&mut self, descriptor: TestDescriptor) -> DocResult<String> {
        let id = descriptor.id().to_string();
        self.register(Arc::new(descriptor))?;
        Ok(id)
    }

    /// Route every id in `namespace` to `provider`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the namespace already has a provider.
    pub fn register_provider(
        &mut self,
        namespace: impl Into<String>,
        provider: Arc<dyn TestProvider>,
    ) -> DocResult<()> {
        let namespace = namespace.into();
        if namespace.is_empty() || namespace.contains('.') {
            return Err(DocError::config(format!(
                "invalid provider namespace '{namespace}'"
            )));
        }
        if self.providers.contains_key(&namespace) {
            return Err(DocError::config(format!(
                "namespace '{namespace}' already has a provider"
            )));
        }
        tracing::debug!(namespace = %namespace, "registered test provider");
        self.providers.insert(namespace, provider);
        Ok(())
    }

    /// Resolve an id (tag allowed) to its unit.
    ///
    /// # Errors
    ///
    /// `TestNotFound` naming the id when neither the table nor the
    /// namespace provider knows it.
    pub fn lookup(&self, test_id: &str) -> DocResult<Arc<dyn TestUnit>> {
        let id = TestId::parse(test_id).map_err(|_| DocError::not_found(test_id))?;
        if let Some(unit) = self.tests.get(id.base()) {
            return Ok(Arc::clone(unit));
        }
        self.providers
            .get(id.namespace())
            .and_then(|provider| provider.load(id.base()))
            .ok_or_else(|| DocError::not_found(test_id))
    }

    /// Whether `test_id` resolves.
    #[must_use]
    pub fn contains(&self, test_id: &str) -> bool {
        self.lookup(test_id).is_ok()
    }

    /// Describe one test.
    ///
    /// # Errors
    ///
    /// `TestNotFound` if the id does not resolve.
    pub fn describe(&self, test_id: &str) -> DocResult<TestDescription> {
        self.lookup(test_id)
            .map(|unit| TestDescription::of(unit.as_ref()))
    }

    /// List tests whose id contains `filter` or that carry it as a tag.
    ///
    /// Provider tests are included when the provider can list them. Results
    /// are sorted by id.
    #[must_use]
    pub fn list(&self, filter: Option<&str>) -> Vec<TestDescription> {
        let mut out: Vec<TestDescription> = self
            .tests
            .values()
            .map(|u| TestDescription::of(u.as_ref()))
            .collect();
        for provider in self.providers.values() {
            for id in provider.list() {
                if let Some(unit) = provider.load(&id) {
                    out.push(TestDescription::of(unit.as_ref()));
                }
            }
        }
        if let Some(filter) = filter {
            let needle = filter.to_lowercase();
            out.retain(|d| {
                d.id.to_lowercase().contains(&needle)
                    || d.tags.iter().any(|t| t.eq_ignore_ascii_case(filter))
            });
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out.dedup_by(|a, b| a.id == b.id);
        out
    }

    /// Number of units in the built-in table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Whether the built-in table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

fn same_unit(a: &Arc<dyn TestUnit>, b: &Arc<dyn TestUnit>) -> bool {
    std::ptr::eq(a.identity(), b.identity())
        && a.kind() == b.kind()
        && a.required_inputs() == b.required_inputs()
        && a.params() == b.params()
}
