//! Test suite composer.
//!
//! A [`SuiteTemplate`] describes sections and the tests placed in them.
//! [`TestSuite::build`] turns it into a node tree and [`SuiteRunner`]
//! executes every leaf through the [`crate::engine::ExecutionEngine`],
//! recording per-leaf outcomes and each section's aggregate verdict.

pub mod node;
pub mod runner;
pub mod template;

pub use node::{NodeKind, NodeOutcome, SuiteFailure, TestLeaf, TestSuite, TestSuiteNode};
pub use runner::{SuiteRunSummary, SuiteRunner};
pub use template::{ContentRef, ContentType, SectionTemplate, SuiteTemplate};
