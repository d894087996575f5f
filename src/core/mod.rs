//! Sandbox core.
//!
//! Core owns the session's view of the world: plugin units, the resolver the
//! toolchain is confined to, compiled artifacts and the loader that turns
//! them back into runnable modules.

pub mod loader;
pub mod resolver;
pub mod types;
pub mod unit;
