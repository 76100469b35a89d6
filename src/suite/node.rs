//! Suite tree and pass/fail aggregation.

use indexmap::IndexMap;

use super::template::{ContentType, SectionTemplate, SuiteTemplate};
use crate::error::{DocError, DocResult, ErrorClass};
use crate::inputs::{Inputs, Params};
use crate::registry::TestRegistry;
use crate::result::{NumberMode, TestKind, TestResult, UploadBatch};

/// What running a leaf produced.
#[derive(Debug, Clone, Default)]
pub enum NodeOutcome {
    /// Not run yet.
    #[default]
    Pending,
    /// Ran to completion.
    Completed(TestResult),
    /// The test declined to run.
    Skipped {
        /// Reason given by the test.
        reason: String,
    },
    /// Resolution or execution failed.
    Failed {
        /// Original error message.
        message: String,
        /// Error class.
        class: ErrorClass,
    },
}

impl NodeOutcome {
    /// Convert an engine result into an outcome.
    #[must_use]
    pub fn from_execution(result: DocResult<TestResult>) -> Self {
        match result {
            Ok(r) => Self::Completed(r),
            Err(DocError::TestSkipped { reason, .. }) => Self::Skipped { reason },
            Err(e) => Self::failed(&e),
        }
    }

    /// Failed outcome carrying the error's message and class.
    #[must_use]
    pub fn failed(err: &DocError) -> Self {
        Self::Failed {
            message: err.to_string(),
            class: err.class(),
        }
    }
}

/// A test reference inside a section.
#[derive(Debug, Clone)]
pub struct TestLeaf {
    /// Test id, with optional tag.
    pub test_id: String,
    /// Logical input name to host object name.
    pub bindings: IndexMap<String, String>,
    /// Parameter overrides.
    pub params: Params,
    /// Kind, when the registry knew the id at build time.
    pub kind: Option<TestKind>,
    /// Index among the section's content blocks.
    pub position: usize,
    /// Result of running the leaf.
    pub outcome: NodeOutcome,
}

impl TestLeaf {
    /// Inputs for this leaf: the host pool with bindings applied on top.
    ///
    /// # Errors
    ///
    /// Returns [`DocError::MissingInput`] naming the source when a binding
    /// points at an object the pool does not hold.
    pub fn bound_inputs(&self, pool: &Inputs) -> DocResult<Inputs> {
        let mut inputs = pool.clone();
        for (name, source) in &self.bindings {
            let value = pool
                .get(source)
                .ok_or_else(|| DocError::missing_input(&self.test_id, source))?;
            inputs.insert(name.clone(), value.clone());
        }
        Ok(inputs)
    }

    /// Contribution to the aggregate verdict.
    ///
    /// Completed threshold tests contribute their verdict and failed
    /// threshold tests contribute `false`. Metrics, skips and pending
    /// leaves contribute nothing.
    #[must_use]
    pub fn verdict(&self) -> Option<bool> {
        match &self.outcome {
            NodeOutcome::Completed(result) => result.passed(),
            NodeOutcome::Failed { .. } if self.kind == Some(TestKind::ThresholdTest) => {
                Some(false)
            }
            _ => None,
        }
    }
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A section with children.
    Section,
    /// An executable test reference.
    Test(TestLeaf),
    /// Non-executed content.
    Text {
        /// Content slot id.
        content_id: String,
    },
}

/// A node of the suite tree.
#[derive(Debug, Clone)]
pub struct TestSuiteNode {
    /// Section id or content id.
    pub id: String,
    /// Display title.
    pub title: Option<String>,
    /// Presentation order among siblings.
    pub order: i64,
    /// Node payload.
    pub kind: NodeKind,
    /// Children in template order.
    pub children: Vec<TestSuiteNode>,
    passed: Option<bool>,
}

impl TestSuiteNode {
    fn section(template: &SectionTemplate, registry: &TestRegistry) -> Self {
        let mut children = Vec::with_capacity(template.contents.len() + template.sections.len());
        for (position, content) in template.contents.iter().enumerate() {
            let kind = if content.content_type == ContentType::Text {
                NodeKind::Text {
                    content_id: content.content_id.clone(),
                }
            } else {
                NodeKind::Test(TestLeaf {
                    test_id: content.content_id.clone(),
                    bindings: content.inputs.clone(),
                    params: content.params.clone(),
                    kind: registry.describe(&content.content_id).ok().map(|d| d.kind),
                    position,
                    outcome: NodeOutcome::Pending,
                })
            };
            children.push(Self {
                id: content.content_id.clone(),
                title: None,
                order: i64::try_from(position).unwrap_or(i64::MAX),
                kind,
                children: Vec::new(),
                passed: None,
            });
        }
        children.extend(template.sections.iter().map(|s| Self::section(s, registry)));
        Self {
            id: template.id.clone(),
            title: template.title.clone(),
            order: template.order,
            kind: NodeKind::Section,
            children,
            passed: None,
        }
    }

    /// Aggregate verdict of this subtree: the AND of every threshold
    /// outcome below it, `None` when there is none.
    #[must_use]
    pub const fn passed(&self) -> Option<bool> {
        self.passed
    }

    /// The leaf, for test nodes.
    #[must_use]
    pub fn leaf(&self) -> Option<&TestLeaf> {
        match &self.kind {
            NodeKind::Test(leaf) => Some(leaf),
            _ => None,
        }
    }

    fn aggregate(&mut self) -> Option<bool> {
        let own = match &self.kind {
            NodeKind::Test(leaf) => leaf.verdict(),
            _ => None,
        };
        let passed = self
            .children
            .iter_mut()
            .map(Self::aggregate)
            .fold(own, and_verdicts);
        self.passed = passed;
        passed
    }

    fn visit<'a>(&'a self, section: &'a str, out: &mut Vec<(&'a str, &'a TestLeaf)>) {
        let section = if matches!(self.kind, NodeKind::Section) {
            self.id.as_str()
        } else {
            section
        };
        if let NodeKind::Test(leaf) = &self.kind {
            out.push((section, leaf));
        }
        for child in &self.children {
            child.visit(section, out);
        }
    }

    fn visit_mut<'a>(&'a mut self, out: &mut Vec<&'a mut TestLeaf>) {
        if let NodeKind::Test(leaf) = &mut self.kind {
            out.push(leaf);
        }
        for child in &mut self.children {
            child.visit_mut(out);
        }
    }
}

const fn and_verdicts(acc: Option<bool>, next: Option<bool>) -> Option<bool> {
    match (acc, next) {
        (None, v) | (v, None) => v,
        (Some(a), Some(b)) => Some(a && b),
    }
}

/// A failed leaf, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteFailure {
    /// Section holding the leaf.
    pub section_id: String,
    /// Test id of the leaf.
    pub test_id: String,
    /// Original error message.
    pub message: String,
    /// Error class.
    pub class: ErrorClass,
}

/// A built suite: the root of the node tree.
#[derive(Debug, Clone)]
pub struct TestSuite {
    /// Template id.
    pub id: String,
    /// Display title.
    pub title: Option<String>,
    /// Top-level section nodes.
    pub sections: Vec<TestSuiteNode>,
    passed: Option<bool>,
}

impl TestSuite {
    /// Build the node tree for `template`.
    ///
    /// Unknown test ids do not fail the build; they fail their own leaf
    /// when the suite runs.
    #[must_use]
    pub fn build(template: &SuiteTemplate, registry: &TestRegistry) -> Self {
        Self {
            id: template.id.clone(),
            title: template.title.clone(),
            sections: template
                .sections
                .iter()
                .map(|s| TestSuiteNode::section(s, registry))
                .collect(),
            passed: None,
        }
    }

    /// Aggregate verdict over the whole suite.
    #[must_use]
    pub const fn passed(&self) -> Option<bool> {
        self.passed
    }

    /// Recompute every node's aggregate verdict.
    pub fn aggregate(&mut self) -> Option<bool> {
        self.passed = self
            .sections
            .iter_mut()
            .map(TestSuiteNode::aggregate)
            .fold(None, and_verdicts);
        self.passed
    }

    /// Leaves in depth-first order, with their section id.
    #[must_use]
    pub fn leaves(&self) -> Vec<(&str, &TestLeaf)> {
        let mut out = Vec::new();
        for section in &self.sections {
            section.visit(&section.id, &mut out);
        }
        out
    }

    /// Mutable leaves in the same depth-first order as [`Self::leaves`].
    pub fn leaves_mut(&mut self) -> Vec<&mut TestLeaf> {
        let mut out = Vec::new();
        for section in &mut self.sections {
            section.visit_mut(&mut out);
        }
        out
    }

    /// Find a section by id.
    #[must_use]
    pub fn section(&self, id: &str) -> Option<&TestSuiteNode> {
        fn find<'a>(nodes: &'a [TestSuiteNode], id: &str) -> Option<&'a TestSuiteNode> {
            nodes.iter().find_map(|n| {
                if matches!(n.kind, NodeKind::Section) && n.id == id {
                    Some(n)
                } else {
                    find(&n.children, id)
                }
            })
        }
        find(&self.sections, id)
    }

    /// Completed results in depth-first order.
    #[must_use]
    pub fn results(&self) -> Vec<&TestResult> {
        self.leaves()
            .into_iter()
            .filter_map(|(_, leaf)| match &leaf.outcome {
                NodeOutcome::Completed(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Failed leaves in depth-first order.
    #[must_use]
    pub fn failures(&self) -> Vec<SuiteFailure> {
        self.leaves()
            .into_iter()
            .filter_map(|(section, leaf)| match &leaf.outcome {
                NodeOutcome::Failed { message, class } => Some(SuiteFailure {
                    section_id: section.to_string(),
                    test_id: leaf.test_id.clone(),
                    message: message.clone(),
                    class: *class,
                }),
                _ => None,
            })
            .collect()
    }

    /// Upload batches for every completed leaf, placed in its section.
    ///
    /// # Errors
    ///
    /// Fails on the first result that cannot be serialized under `mode`.
    pub fn upload_batches(&self, mode: NumberMode) -> DocResult<Vec<UploadBatch>> {
        self.leaves()
            .into_iter()
            .filter_map(|(section, leaf)| match &leaf.outcome {
                NodeOutcome::Completed(r) => {
                    Some(r.to_upload_batch(Some(section), Some(leaf.position), mode))
                }
                _ => None,
            })
            .collect()
    }
}
