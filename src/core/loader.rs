//! Session-scoped loader.
//!
//! Materializes compiled modules from one session's [`ArtifactSet`] and
//! nothing else. Every native import is re-checked against the policy before
//! it is linked, so an artifact that names a hidden symbol cannot run even if
//! its bytes did not come from the resolver-supervised compiler.

use crate::config::policy::LibraryAccessPolicy;
use crate::config::types::{Result, SandboxError};
use crate::core::types::Location;
use crate::core::unit::{sha256_hex, ArtifactSet};
use crate::observability::audit::{self, CorrelationIds};
use crate::platform::natives::NativeFn;
use crate::platform::PlatformLibrary;
use crate::toolchain::bytecode::{Module, Op, FORMAT_VERSION};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// A decoded, verified and linked module
#[derive(Debug)]
pub struct LoadedModule {
    pub module: Module,
    /// SHA-256 of exactly the bytes that were decoded
    pub digest: String,
    pub byte_len: usize,
    natives: HashMap<(Location, String), NativeFn>,
}

impl LoadedModule {
    pub fn native(&self, location: &Location, symbol: &str) -> Option<NativeFn> {
        self.natives
            .get(&(location.clone(), symbol.to_string()))
            .copied()
    }

    pub fn linked_symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.natives.keys().map(|(_, s)| s.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();
        symbols
    }
}

pub struct IsolatedLoader<'a> {
    artifacts: &'a ArtifactSet,
    policy: &'a LibraryAccessPolicy,
    platform: &'a PlatformLibrary,
    correlation: CorrelationIds,
    cache: RefCell<HashMap<String, Rc<LoadedModule>>>,
    materialized: Cell<usize>,
}

impl<'a> IsolatedLoader<'a> {
    pub fn new(
        artifacts: &'a ArtifactSet,
        policy: &'a LibraryAccessPolicy,
        platform: &'a PlatformLibrary,
        correlation: CorrelationIds,
    ) -> Self {
        Self {
            artifacts,
            policy,
            platform,
            correlation,
            cache: RefCell::new(HashMap::new()),
            materialized: Cell::new(0),
        }
    }

    /// Number of modules decoded so far. Each name counts at most once.
    pub fn materialized_count(&self) -> usize {
        self.materialized.get()
    }

    pub fn load(&self, qualified_name: &str) -> Result<Rc<LoadedModule>> {
        if let Some(loaded) = self.cache.borrow().get(qualified_name) {
            return Ok(Rc::clone(loaded));
        }

        let artifact = match self.artifacts.get(qualified_name) {
            Some(artifact) => artifact,
            None => {
                audit::load_rejected(self.correlation.clone(), qualified_name);
                return Err(SandboxError::ClassNotFoundInSession(
                    qualified_name.to_string(),
                ));
            }
        };

        let bytes = artifact.bytes();
        let malformed = |reason: String| SandboxError::MalformedArtifact {
            name: qualified_name.to_string(),
            reason,
        };

        let module = Module::decode(bytes).map_err(|e| malformed(e.to_string()))?;
        if module.format_version != FORMAT_VERSION {
            return Err(malformed(format!(
                "unsupported format version {}",
                module.format_version
            )));
        }
        if module.name != qualified_name {
            return Err(malformed(format!("module declares name {}", module.name)));
        }
        if module.contract != self.policy.contract().qualified_name() {
            return Err(malformed(format!(
                "module implements {} instead of {}",
                module.contract,
                self.policy.contract().qualified_name()
            )));
        }
        verify_code(&module).map_err(malformed)?;

        let natives = self.link(&module)?;
        let digest = sha256_hex(bytes);
        audit::artifact_materialized(self.correlation.clone(), qualified_name, &digest);
        log::debug!(
            "Materialized {} ({} bytes, {} natives)",
            qualified_name,
            bytes.len(),
            natives.len()
        );

        let loaded = Rc::new(LoadedModule {
            module,
            digest,
            byte_len: bytes.len(),
            natives,
        });
        self.materialized.set(self.materialized.get() + 1);
        self.cache
            .borrow_mut()
            .insert(qualified_name.to_string(), Rc::clone(&loaded));
        Ok(loaded)
    }

    /// Build the link table. Only platform-module symbols the policy allows
    /// are linkable, and only at the location the module names.
    fn link(&self, module: &Module) -> Result<HashMap<(Location, String), NativeFn>> {
        let mut natives = HashMap::new();
        for (location, symbol) in module.native_imports() {
            let linkable = match location {
                Location::SystemModule(_) => self
                    .platform
                    .lookup(&location, &symbol)
                    .filter(|native| {
                        self.policy
                            .is_visible(&location.realm(), &native.symbol.package)
                    }),
                _ => None,
            };
            match linkable {
                Some(native) => {
                    natives.insert((location, symbol), native.func);
                }
                None => {
                    audit::link_rejected(self.correlation.clone(), &module.name, &symbol);
                    return Err(SandboxError::LinkRejected {
                        name: module.name.clone(),
                        symbol,
                    });
                }
            }
        }
        Ok(natives)
    }
}

/// Structural checks so the interpreter never indexes out of bounds on
/// well-formed input
fn verify_code(module: &Module) -> std::result::Result<(), String> {
    for function in &module.functions {
        if function.locals < function.arity {
            return Err(format!(
                "{}: {} locals cannot hold {} parameters",
                function.name, function.locals, function.arity
            ));
        }
        let len = function.code.len();
        if !matches!(function.code.last(), Some(Op::Return) | Some(Op::Jump(_))) {
            return Err(format!("{}: code does not end in a return", function.name));
        }
        for (pc, op) in function.code.iter().enumerate() {
            let ok = match op {
                Op::Load(slot) | Op::Store(slot) => *slot < function.locals,
                Op::Jump(target) | Op::JumpIfFalse(target) => *target < len,
                Op::Call { function: index, argc } => module
                    .functions
                    .get(*index)
                    .map(|callee| callee.arity == *argc)
                    .unwrap_or(false),
                _ => true,
            };
            if !ok {
                return Err(format!("{}: invalid instruction {:?} at {}", function.name, op, pc));
            }
        }
    }
    Ok(())
}
