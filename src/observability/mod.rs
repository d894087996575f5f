//! Observability
//!
//! Structured audit trail of resolver decisions and session lifecycle.

pub mod audit;
