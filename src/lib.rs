//! scriptbox: compile untrusted plugin source at runtime and run it behind a
//! single entry contract
//!
//! # Architecture
//!
//! The sandbox is a resolution boundary. A toolchain compiling plugin code may
//! only ask a session-scoped resolver what exists, and the resolver answers
//! from an explicit allowlist. Everything else is simply not there.
//!
//! ## Configuration & Policy ([`config`])
//! - [`config::loader`]: Configuration loading (JSON, defaults)
//! - [`config::validator`]: Configuration checks
//! - [`config::types`]: Session states and the crate error type
//! - [`config::presets`]: Versioned default allowlist
//! - [`config::policy`]: Default-deny library access policy
//!
//! ## Sandbox Core ([`core`])
//! - [`core::unit`]: Plugin units and compiled artifacts
//! - [`core::resolver`]: The resolution protocol and its sandboxed implementation
//! - [`core::loader`]: Session-scoped loader with link-time policy checks
//! - [`core::types`]: Locations, listing entries, diagnostics, decisions
//!
//! ## Platform ([`platform`])
//! - Immutable symbol catalogue shared across sessions
//! - [`platform::natives`]: Native function implementations
//!
//! ## Toolchain ([`toolchain`])
//! - [`toolchain::lexer`], [`toolchain::parser`]: Plugin language front end
//! - `toolchain::compiler`: Checker and code generator (feature `builtin-toolchain`)
//! - [`toolchain::bytecode`]: Compiled module format
//!
//! ## Runtime ([`runtime`])
//! - [`runtime::contract`]: The entry contract and plugin failures
//! - [`runtime::vm`]: Bytecode interpreter
//!
//! ## Execution Control ([`exec`])
//! - [`exec::session`]: Type-state enforced session lifecycle
//! - [`exec::orchestrator`]: One session end to end, with a serializable report
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured audit events
//!
//! # Design Principles
//!
//! 1. **Default deny** - A package is visible only if allowlisted
//! 2. **Starve, don't throw** - Denial is an empty listing, never an error
//! 3. **Session isolation** - No artifact, loader or decision outlives its session
//! 4. **Types prevent errors** - Illegal lifecycle orderings do not compile

// Configuration & Policy
pub mod config;

// Sandbox core
pub mod core;

// Platform catalogue
pub mod platform;

// Plugin compiler
pub mod toolchain;

// Plugin runtime
pub mod runtime;

// Execution Control
pub mod exec;

// Observability
pub mod observability;

// CLI entrypoint wiring for the scriptbox binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
pub use exec::{CompilationOrchestrator, CompileOutcome, Session, SessionReport};
