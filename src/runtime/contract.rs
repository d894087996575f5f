//! The entry contract every compiled plugin satisfies.
//!
//! The host never knows a plugin's concrete type: it loads by name and
//! invokes through this trait.

use thiserror::Error;

/// Why a plugin did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginFailure {
    /// The plugin signalled failure itself (`fail(...)`)
    #[error("plugin signalled failure: {0}")]
    Signaled(String),

    /// The plugin broke a runtime rule (type mismatch, overflow, ...)
    #[error("plugin runtime fault: {0}")]
    Fault(String),

    /// The entry type could not be constructed
    #[error("plugin instantiation failed: {0}")]
    Instantiation(String),
}

pub trait Plugin {
    /// Qualified name of the unit that produced this plugin
    fn name(&self) -> &str;

    fn execute(&mut self) -> Result<(), PluginFailure>;
}
