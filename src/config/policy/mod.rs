//! Policy modules
//!
//! Library visibility policy enforced by the sandboxed resolver.

pub mod library_access;

pub use library_access::LibraryAccessPolicy;
