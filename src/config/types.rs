/// Core error and state types shared across the scriptbox sandbox
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of one compile-and-run session.
///
/// `CompiledFailed`, `Executed` and `ExecutionFailed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Pending,
    Compiling,
    CompiledOk,
    CompiledFailed,
    Executed,
    ExecutionFailed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::CompiledFailed | SessionState::Executed | SessionState::ExecutionFailed
        )
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Pending, Compiling)
                | (Compiling, CompiledOk)
                | (Compiling, CompiledFailed)
                | (CompiledOk, Executed)
                | (CompiledOk, ExecutionFailed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Pending => "pending",
            SessionState::Compiling => "compiling",
            SessionState::CompiledOk => "compiled-ok",
            SessionState::CompiledFailed => "compiled-failed",
            SessionState::Executed => "executed",
            SessionState::ExecutionFailed => "execution-failed",
        };
        f.write_str(name)
    }
}

/// Error types for the sandbox
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("No toolchain available: the plugin compiler is not part of this build")]
    NoToolchainAvailable,

    #[error("Symbol `{0}` was not produced by this session")]
    ClassNotFoundInSession(String),

    #[error("Entry point instantiation failed for `{name}`: {reason}")]
    EntryPointInstantiation { name: String, reason: String },

    #[error("Artifact `{name}` is malformed: {reason}")]
    MalformedArtifact { name: String, reason: String },

    #[error("Artifact `{name}` links `{symbol}`, which is not visible to plugins")]
    LinkRejected { name: String, symbol: String },

    #[error("Invalid plugin unit name `{0}`")]
    InvalidUnitName(String),

    #[error("Plugin unit `{0}` is already registered in this session")]
    DuplicateUnit(String),

    #[error("Output binding error: {0}")]
    Output(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;
