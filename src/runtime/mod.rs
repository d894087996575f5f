//! Plugin runtime: the entry contract, values and the interpreter.

pub mod contract;
pub mod value;
pub mod vm;

pub use contract::{Plugin, PluginFailure};
pub use value::Value;
pub use vm::ScriptPlugin;
