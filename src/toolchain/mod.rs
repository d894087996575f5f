//! Toolchain
//!
//! The compiler seam. A session hands a [`Toolchain`] its units, a
//! [`SymbolResolver`] and a diagnostic sink; the toolchain may learn about the
//! outside world only through the resolver.

pub mod bytecode;
#[cfg(feature = "builtin-toolchain")]
pub mod compiler;
pub mod lexer;
pub mod parser;

use crate::core::resolver::SymbolResolver;
use crate::core::types::DiagnosticCollector;
use crate::core::unit::PluginUnit;
use std::sync::Arc;

/// A lexical or syntactic problem at a source position
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

pub trait Toolchain: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compile every unit in one task. Returns true iff no Error diagnostic
    /// was reported. Output is written only through
    /// [`SymbolResolver::output_for`].
    fn compile(
        &self,
        units: &[Arc<PluginUnit>],
        resolver: &mut dyn SymbolResolver,
        diagnostics: &mut DiagnosticCollector,
    ) -> bool;
}

/// The toolchain this build ships with, if any.
pub fn system_toolchain() -> Option<Arc<dyn Toolchain>> {
    #[cfg(feature = "builtin-toolchain")]
    {
        Some(Arc::new(compiler::ScriptCompiler::new()))
    }
    #[cfg(not(feature = "builtin-toolchain"))]
    {
        None
    }
}
