//! Platform library
//!
//! The host's own symbol catalogue and its unrestricted resolution protocol.
//! The sandbox never hands [`StandardResolver`] to a toolchain directly; it
//! forwards to it only for pre-approved realms.

pub mod natives;

use crate::config::presets::{CORE_BASE_MODULE, CORE_LOGGING_MODULE};
use crate::config::types::{Result, SandboxError};
use crate::core::resolver::SymbolResolver;
use crate::core::types::{ContractType, Entry, EntryKind, LibrarySymbol, Location};
use crate::core::unit::PluginUnit;
use natives::NativeFn;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

/// A platform function with its implementation
#[derive(Clone)]
pub struct NativeFunction {
    pub symbol: LibrarySymbol,
    pub location: Location,
    pub func: NativeFn,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("symbol", &self.symbol)
            .field("location", &self.location)
            .finish()
    }
}

/// Immutable catalogue of everything the platform could offer. Shared across
/// sessions through `Arc`; holds no mutable state.
#[derive(Debug, Clone)]
pub struct PlatformLibrary {
    /// location -> package -> functions
    packages: BTreeMap<Location, BTreeMap<String, Vec<NativeFunction>>>,
    contract: ContractType,
}

impl PlatformLibrary {
    pub fn empty(contract: ContractType) -> Self {
        Self {
            packages: BTreeMap::new(),
            contract,
        }
    }

    /// The standard catalogue: base language, logging, and host internals.
    pub fn standard(contract: ContractType) -> Self {
        let base = Location::SystemModule(CORE_BASE_MODULE.to_string());
        let logging = Location::SystemModule(CORE_LOGGING_MODULE.to_string());
        let contract_package = contract.package.clone();

        let mut library = Self::empty(contract);
        library
            .define(&base, "lang", "fail", 1, natives::lang_fail)
            .define(&base, "lang", "to_string", 1, natives::lang_to_string)
            .define(&base, "lang", "len", 1, natives::lang_len)
            .define(&base, "lang", "assert", 2, natives::lang_assert)
            .define(&base, "util.function", "identity", 1, natives::function_identity)
            .define(&base, "io", "print", 1, natives::io_print)
            .define(&base, "math", "abs", 1, natives::math_abs)
            .define(&base, "math", "max", 2, natives::math_max)
            .define(&base, "math", "min", 2, natives::math_min)
            .define(&base, "math", "pow", 2, natives::math_pow)
            .define(&base, "fs", "read_to_string", 1, natives::fs_read_to_string)
            .define(&base, "process", "env_var", 1, natives::process_env_var)
            .define(&logging, "util.logging", "info", 1, natives::logging_info)
            .define(&logging, "util.logging", "warn", 1, natives::logging_warn)
            .define(&logging, "util.logging", "debug", 1, natives::logging_debug)
            .define(
                &Location::ClassPath,
                "host.config",
                "secret",
                0,
                natives::host_config_secret,
            )
            .define(
                &Location::ClassPath,
                &contract_package,
                "registry",
                0,
                natives::host_registry,
            );
        library
    }

    pub fn define(
        &mut self,
        location: &Location,
        package: &str,
        name: &str,
        arity: usize,
        func: NativeFn,
    ) -> &mut Self {
        let symbol = LibrarySymbol {
            package: package.to_string(),
            name: name.to_string(),
            arity,
        };
        self.packages
            .entry(location.clone())
            .or_default()
            .entry(package.to_string())
            .or_default()
            .push(NativeFunction {
                symbol,
                location: location.clone(),
                func,
            });
        self
    }

    pub fn contract(&self) -> &ContractType {
        &self.contract
    }

    /// Module locations, in catalogue order
    pub fn module_locations(&self) -> Vec<Location> {
        self.packages
            .keys()
            .filter(|loc| matches!(loc, Location::SystemModule(_)))
            .cloned()
            .collect()
    }

    pub fn symbols(&self, location: &Location, package: &str) -> Vec<LibrarySymbol> {
        self.packages
            .get(location)
            .and_then(|packages| packages.get(package))
            .map(|functions| functions.iter().map(|f| f.symbol.clone()).collect())
            .unwrap_or_default()
    }

    /// Find a function by qualified name at one location. Two modules may
    /// define the same package; only `location` is consulted.
    pub fn lookup(&self, location: &Location, qualified_name: &str) -> Option<&NativeFunction> {
        let (package, name) = qualified_name.rsplit_once('.')?;
        self.packages
            .get(location)?
            .get(package)?
            .iter()
            .find(|f| f.symbol.name == name)
    }
}

/// The platform's default resolution protocol: lists everything it has.
pub struct StandardResolver {
    platform: Arc<PlatformLibrary>,
}

impl StandardResolver {
    pub fn new(platform: Arc<PlatformLibrary>) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &Arc<PlatformLibrary> {
        &self.platform
    }
}

impl SymbolResolver for StandardResolver {
    fn module_locations(&self) -> Vec<Location> {
        self.platform.module_locations()
    }

    fn list(&mut self, location: &Location, package: &str, kinds: &[EntryKind]) -> Vec<Entry> {
        let mut entries = Vec::new();
        if kinds.contains(&EntryKind::Native) {
            entries.extend(
                self.platform
                    .symbols(location, package)
                    .into_iter()
                    .map(Entry::Library),
            );
        }
        if kinds.contains(&EntryKind::Compiled)
            && *location == Location::ClassPath
            && package == self.platform.contract().package
        {
            entries.push(Entry::Contract(self.platform.contract().clone()));
        }
        entries
    }

    fn infer_name(&self, _location: &Location, entry: &Entry) -> Option<String> {
        match entry {
            Entry::Library(symbol) => Some(symbol.qualified_name()),
            Entry::Contract(contract) => Some(contract.qualified_name()),
            Entry::Unit(_) => None,
        }
    }

    fn output_for(
        &mut self,
        location: &Location,
        qualified_name: &str,
        _sibling: &PluginUnit,
    ) -> Result<&mut dyn Write> {
        Err(SandboxError::Output(format!(
            "no output binding for {} at {}",
            qualified_name, location
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> Arc<PlatformLibrary> {
        Arc::new(PlatformLibrary::standard(ContractType::new("contract", "Plugin")))
    }

    #[test]
    fn test_standard_resolver_lists_everything() {
        let mut resolver = StandardResolver::new(platform());
        let fs = resolver.list(
            &Location::SystemModule("core.base".to_string()),
            "fs",
            &[EntryKind::Native],
        );
        assert_eq!(fs.len(), 1);

        let host = resolver.list(&Location::ClassPath, "host.config", &[EntryKind::Native]);
        assert_eq!(host.len(), 1);

        let contract = resolver.list(
            &Location::ClassPath,
            "contract",
            &[EntryKind::Native, EntryKind::Compiled],
        );
        assert_eq!(contract.len(), 2);
    }

    #[test]
    fn test_kind_filter() {
        let mut resolver = StandardResolver::new(platform());
        let entries = resolver.list(
            &Location::SystemModule("core.base".to_string()),
            "math",
            &[EntryKind::Source],
        );
        assert!(entries.is_empty());
    }

    #[test]
    fn test_lookup_by_location_and_qualified_name() {
        let platform = platform();
        let base = Location::SystemModule("core.base".to_string());
        let logging = Location::SystemModule("core.logging".to_string());

        let max = platform.lookup(&base, "math.max").unwrap();
        assert_eq!(max.symbol.arity, 2);
        assert_eq!(max.location, base);
        assert!(platform.lookup(&logging, "util.logging.info").is_some());
        assert!(platform.lookup(&logging, "math.max").is_none());
        assert!(platform.lookup(&base, "math.sqrt").is_none());
        assert!(platform.lookup(&base, "nodots").is_none());
    }

    #[test]
    fn test_same_package_in_two_modules_stays_apart() {
        let base = Location::SystemModule("core.base".to_string());
        let extra = Location::SystemModule("core.extra".to_string());
        let mut platform = PlatformLibrary::standard(ContractType::new("contract", "Plugin"));
        platform.define(&extra, "math", "max", 3, natives::math_max);

        assert_eq!(platform.lookup(&base, "math.max").unwrap().symbol.arity, 2);
        assert_eq!(platform.lookup(&extra, "math.max").unwrap().symbol.arity, 3);
        assert_eq!(platform.lookup(&extra, "math.max").unwrap().location, extra);
    }

    #[test]
    fn test_module_locations() {
        let locations = platform().module_locations();
        assert_eq!(
            locations,
            vec![
                Location::SystemModule("core.base".to_string()),
                Location::SystemModule("core.logging".to_string()),
            ]
        );
    }
}
