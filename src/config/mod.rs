//! Configuration and policy
//!
//! Allowlist definition, loading, validation, and the access policy built
//! from it.

pub mod loader;
pub mod policy;
pub mod presets;
pub mod types;
pub mod validator;
