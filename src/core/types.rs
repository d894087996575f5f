use crate::core::unit::PluginUnit;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A place the toolchain asks about. Visibility is evaluated per realm.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Location {
    /// One platform module, e.g. `core.base`
    SystemModule(String),
    /// User-code realm: host class path, plugin units, the contract type
    ClassPath,
    SourcePath,
    /// Where compiled output is bound
    ClassOutput,
}

impl Location {
    pub fn realm(&self) -> String {
        match self {
            Location::SystemModule(module) => crate::config::presets::system_module_realm(module),
            Location::ClassPath => "class-path".to_string(),
            Location::SourcePath => "source-path".to_string(),
            Location::ClassOutput => "class-output".to_string(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.realm())
    }
}

/// Kinds of listing entries the toolchain can ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryKind {
    /// Plugin source text
    Source,
    /// Precompiled type (the contract)
    Compiled,
    /// Platform-provided function
    Native,
}

/// The single abstract type every plugin implements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractType {
    pub package: String,
    pub name: String,
}

impl ContractType {
    /// The one operation a plugin must export; takes no arguments.
    pub const ENTRY_OPERATION: &'static str = "execute";

    pub fn new(package: &str, name: &str) -> Self {
        Self {
            package: package.to_string(),
            name: name.to_string(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }
}

/// A platform function as seen by the toolchain. The implementation stays in
/// the platform catalogue and is linked by the loader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySymbol {
    pub package: String,
    pub name: String,
    pub arity: usize,
}

impl LibrarySymbol {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }
}

/// One result of a listing request.
#[derive(Clone, Debug)]
pub enum Entry {
    Unit(Arc<PluginUnit>),
    Contract(ContractType),
    Library(LibrarySymbol),
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Unit(_) => EntryKind::Source,
            Entry::Contract(_) => EntryKind::Compiled,
            Entry::Library(_) => EntryKind::Native,
        }
    }
}

/// Diagnostic severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Note => f.write_str("note"),
        }
    }
}

/// A compile-time report. Line and column are 1-based.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub line: usize,
    pub column: usize,
    /// Qualified name of the unit the diagnostic points into
    pub unit: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(unit) = &self.unit {
            write!(f, "{}:", unit)?;
        }
        write!(
            f,
            "{}:{}: {}: {}",
            self.line, self.column, self.severity, self.message
        )
    }
}

/// Ordered, exhaustive collection of diagnostics for one compile task.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Outcome of one listing request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionVerdict {
    /// Forwarded to the platform's default listing
    Allowed,
    /// Answered from the session: plugin units plus the contract type
    Contract,
    /// Starved: empty listing
    Denied,
}

/// Audit record of one resolver decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionDecision {
    pub realm: String,
    pub package: String,
    pub kinds: Vec<EntryKind>,
    pub verdict: ResolutionVerdict,
    pub entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realm_names() {
        assert_eq!(
            Location::SystemModule("core.base".to_string()).realm(),
            "system-modules[core.base]"
        );
        assert_eq!(Location::ClassPath.realm(), "class-path");
        assert_eq!(Location::ClassOutput.to_string(), "class-output");
    }

    #[test]
    fn test_collector_error_detection() {
        let mut collector = DiagnosticCollector::new();
        collector.report(Diagnostic {
            severity: Severity::Warning,
            message: "unused import".to_string(),
            line: 1,
            column: 1,
            unit: None,
        });
        assert!(!collector.has_errors());

        collector.report(Diagnostic {
            severity: Severity::Error,
            message: "cannot find symbol".to_string(),
            line: 2,
            column: 5,
            unit: Some("contract.A".to_string()),
        });
        assert!(collector.has_errors());
        assert_eq!(collector.error_count(), 1);
        assert_eq!(
            collector.diagnostics()[1].to_string(),
            "contract.A:2:5: error: cannot find symbol"
        );
    }
}
