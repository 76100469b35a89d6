//! # modeldoc
//!
//! Model-validation harness: runs a catalog of named tests against
//! datasets and models, caches their results, aggregates them into
//! documentation suites and ships them to a documentation service.
//!
//! - [`registry`]: test ids to runnable units, plus provider namespaces
//! - [`inputs`]: declared inputs and parameters resolved per invocation
//! - [`engine`]: at-most-once execution per fingerprint, failure isolation
//! - [`result`]: tables, figures and verdicts, and their wire records
//! - [`suite`]: templates, suite trees and pass/fail aggregation
//! - [`api`]: handshake, bounded-concurrency uploads, shutdown
//!
//! ## Example
//!
//! ```rust
//! use modeldoc::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(TestRegistry::with_builtins());
//! let engine = ExecutionEngine::new(Arc::clone(&registry));
//!
//! let dataset = TabularDataset::builder("raw_data")
//!     .column("age", vec![31.0, 0.0, 45.0, 52.0])
//!     .build()?;
//! let inputs = Inputs::new().dataset("dataset", Arc::new(dataset));
//!
//! let result = engine.execute("modeldoc.data_validation.Zeros", &inputs, &Params::new())?;
//! assert_eq!(result.passed(), Some(false));
//! # Ok::<(), modeldoc::DocError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::too_many_lines,
    clippy::missing_const_for_fn,  // Many functions can't be const in stable Rust
    clippy::float_cmp,             // Zero counts compare exact values on purpose
)]

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod inputs;
pub mod logging;
pub mod registry;
pub mod result;
pub mod suite;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::api::{ApiClient, ClientState, Credentials, ResultUploader};
    pub use crate::config::{ApiConfig, ExecutionConfig, HarnessConfig, HarnessConfigBuilder};
    pub use crate::engine::{ExecutionEngine, Fingerprint, ResultCache};
    pub use crate::error::{DocError, DocResult, ErrorClass};
    pub use crate::inputs::{
        Dataset, InputContext, InputRequirement, Inputs, Model, ParamSpec, Params, TabularDataset,
    };
    pub use crate::logging::{init_logging, Verbosity};
    pub use crate::registry::{
        TestDescriptor, TestId, TestOutcome, TestProvider, TestRegistry, TestUnit,
    };
    pub use crate::result::{
        Figure, NumberMode, RawResult, ResultSummary, ResultTable, ResultValue, TestKind,
        TestResult,
    };
    pub use crate::suite::{ContentRef, SectionTemplate, SuiteRunner, SuiteTemplate, TestSuite};
}

/// Re-export for public API
pub use error::{DocError, DocResult};
