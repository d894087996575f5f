/// Versioned allowlist presets
///
/// A preset names the realms and packages a plugin may reference when the
/// host supplies no explicit configuration.
use std::collections::{BTreeMap, BTreeSet};

/// Platform module holding the base language packages.
pub const CORE_BASE_MODULE: &str = "core.base";
/// Platform module holding the logging package.
pub const CORE_LOGGING_MODULE: &str = "core.logging";

/// Package that hosts plugin units and the contract type.
pub const DEFAULT_CONTRACT_PACKAGE: &str = "contract";
/// Simple name of the contract type.
pub const DEFAULT_CONTRACT_TYPE: &str = "Plugin";

/// Identifier of the preset produced by [`default_allowlist`].
pub const DEFAULT_PRESET_ID: &str = "plugin-minimal-v1";

/// Realm name of a platform module, as reported by `Location::realm`.
pub fn system_module_realm(module: &str) -> String {
    format!("system-modules[{}]", module)
}

/// Base-language utilities only: no filesystem, process or host packages.
pub fn default_allowlist() -> BTreeMap<String, BTreeSet<String>> {
    let mut allowlist = BTreeMap::new();
    allowlist.insert(
        system_module_realm(CORE_BASE_MODULE),
        ["lang", "util.function", "io", "math"]
            .iter()
            .map(|p| p.to_string())
            .collect(),
    );
    allowlist.insert(
        system_module_realm(CORE_LOGGING_MODULE),
        std::iter::once("util.logging".to_string()).collect(),
    );
    allowlist
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allowlist_excludes_host_packages() {
        let allowlist = default_allowlist();
        let base = &allowlist[&system_module_realm(CORE_BASE_MODULE)];
        assert!(base.contains("math"));
        assert!(!base.contains("fs"));
        assert!(!base.contains("process"));
        assert!(!allowlist.contains_key("class-path"));
    }
}
