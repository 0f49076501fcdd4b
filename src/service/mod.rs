//! Generic resource engine: validation, hooks, eager loading and the CRUD pipeline.

pub mod engine;
pub mod hooks;
pub mod relations;
pub mod validation;

pub use engine::ResourceEngine;
pub use hooks::{HookContext, NoHooks, ResourceHooks};
pub use validation::{Mode, RequestValidator, RuleSet};
