//! Execution layer - identity expansion, dependency resolution, scheduling
//! and status aggregation.

#![warn(missing_docs)]

pub mod aggregate;
pub mod cache;
pub mod engine;
pub mod error;
pub mod expander;
pub mod resolver;
pub mod scheduler;

pub use cache::{CacheKey, ConditionCache};
pub use engine::{RunReport, Runner};
pub use error::{Fault, RunnerError};
pub use expander::Planned;
pub use resolver::Resolver;
pub use scheduler::{Budget, StopHandle};
