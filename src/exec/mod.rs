//! Execution control
//!
//! Session lifecycle with type-state enforcement, and the orchestrator that
//! drives one session end to end.

pub mod orchestrator;
pub mod session;

pub use orchestrator::{CompilationOrchestrator, SessionReport};
pub use session::{CompileOutcome, ExecutionFailure, Session};
