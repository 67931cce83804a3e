#![deny(missing_docs, unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # flagvault
//!
//! Versioned remote configuration: feature flags and structured values per
//! environment, edited directly or through reviewed proposals, and served
//! to SDKs with conditional overrides.
//!
//! ## Core Types
//!
//! - [`ConfigManager`]: every mutating use case, one transaction each
//! - [`Database`] and [`DatabaseConfig`]: the SQLite version store
//! - [`ConfigReplica`]: in-memory projection and per-project change feed
//! - [`SdkResolver`]: the read path SDK clients use
//! - [`overrides::evaluate`]: first-match override evaluation
//! - [`Error`] and [`Result`]: Error handling types
//! - [`Logger`] and [`LogLevel`]: Logging infrastructure
//!
//! ## Examples
//!
//! ```
//! use flagvault::overrides::{evaluate, Condition, EvaluationContext, Operator, Override};
//! use serde_json::json;
//!
//! let overrides = vec![Override::new("staff", json!(true))
//!     .with_condition(Condition::new("email", Operator::EndsWith, json!("@example.com")))];
//!
//! let mut context = EvaluationContext::new();
//! context.insert("email".into(), json!("ada@example.com"));
//! assert_eq!(evaluate(&context, &overrides, &json!(false)).value, json!(true));
//! ```

pub mod database;
pub mod error;
pub mod jsonc;
pub mod keys;
pub mod logging;
pub mod model;
pub mod operations;
pub mod overrides;
pub mod permissions;
pub mod replica;
pub mod sdk;
pub mod settings;
pub mod validation;

// Re-export key types at crate root for convenience
pub use database::{Database, DatabaseConfig};
pub use error::{Error, ErrorKind, Result};
pub use logging::{init_logger, install_logger, LogLevel, Logger};
pub use model::{Identity, Patch, ProposalDiff, ProposalTarget, VariantInput, VariantPatch};
pub use operations::{
    ConfigManager, CreateConfigOptions, CreateProjectOptions, CreateProposalOptions,
    PatchConfigOptions,
};
pub use overrides::{Evaluation, EvaluationContext, Override};
pub use replica::{ConfigReplica, ReplicaEvent, ReplicaEventKind, Subscription};
pub use sdk::{SdkConfig, SdkResolver};
pub use settings::{Settings, SettingsBuilder};
