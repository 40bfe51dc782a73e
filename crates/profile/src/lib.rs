//! Bakery profiles (declarations layer)
//!
//! Checks, conditions, expected values and the profiles that group them,
//! plus run configuration and status overrides.

#![warn(missing_docs)]

pub mod args;
pub mod callable;
pub mod catalog;
pub mod config;
pub mod error;
pub mod profile;
pub mod section;

pub use args::{ArgError, Args, Report};
pub use callable::{
    Check, CheckBody, CheckBuilder, Condition, ConditionBody, ConditionRef, DerivedIterable,
    ExpectedValue, FnCheck, FnCondition, Iterarg, Param, Testable, CONFIG_PARAM, NO_PARAMS,
};
pub use catalog::ProfileCatalog;
pub use config::{CheckConfig, ConfigError, Configuration, OverrideRule, Overrides};
pub use error::{Result, SetupError};
pub use profile::{new_profile, NameKind, Profile, SkipFilter};
pub use section::Section;
