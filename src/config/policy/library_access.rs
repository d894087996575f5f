//! Library access policy
//!
//! Immutable, default-deny allowlist of (realm, package) pairs a compiling
//! plugin may reference. The contract package is implicitly visible in the
//! user-code realm. Nothing mutates the policy after construction.

use crate::config::loader::SandboxConfig;
use crate::core::types::{ContractType, Location};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct LibraryAccessPolicy {
    allowed: BTreeMap<String, BTreeSet<String>>,
    contract: ContractType,
}

impl LibraryAccessPolicy {
    pub fn new(allowlist: BTreeMap<String, BTreeSet<String>>, contract: ContractType) -> Self {
        let mut allowed = allowlist;
        allowed
            .entry(Location::ClassPath.realm())
            .or_default()
            .insert(contract.package.clone());
        Self { allowed, contract }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(
            config.allowlist.clone(),
            ContractType::new(&config.contract.package, &config.contract.type_name),
        )
    }

    /// Default-deny visibility check
    pub fn is_visible(&self, realm: &str, package: &str) -> bool {
        self.allowed
            .get(realm)
            .map(|packages| packages.contains(package))
            .unwrap_or(false)
    }

    pub fn contract(&self) -> &ContractType {
        &self.contract
    }

    /// Realm in which plugin units and the contract type are listed
    pub fn user_realm(&self) -> String {
        Location::ClassPath.realm()
    }

    pub fn is_contract_listing(&self, location: &Location, package: &str) -> bool {
        location.realm() == self.user_realm() && package == self.contract.package
    }

    /// Effective (realm, package) pairs, contract pair included
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.allowed.iter().flat_map(|(realm, packages)| {
            packages
                .iter()
                .map(move |package| (realm.as_str(), package.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LibraryAccessPolicy {
        LibraryAccessPolicy::from_config(&SandboxConfig::default())
    }

    #[test]
    fn test_allowlisted_pairs_are_visible() {
        let policy = policy();
        assert!(policy.is_visible("system-modules[core.base]", "math"));
        assert!(policy.is_visible("system-modules[core.logging]", "util.logging"));
        assert!(policy.is_visible("class-path", "contract"));
    }

    #[test]
    fn test_default_deny() {
        let policy = policy();
        assert!(!policy.is_visible("system-modules[core.base]", "fs"));
        assert!(!policy.is_visible("system-modules[core.base]", "process"));
        assert!(!policy.is_visible("class-path", "host.config"));
        // Packages are realm-scoped: logging is not visible through core.base.
        assert!(!policy.is_visible("system-modules[core.base]", "util.logging"));
        assert!(!policy.is_visible("system-modules[unknown]", "math"));
        assert!(!policy.is_visible("source-path", "contract"));
    }

    #[test]
    fn test_contract_listing_detection() {
        let policy = policy();
        assert!(policy.is_contract_listing(&Location::ClassPath, "contract"));
        assert!(!policy.is_contract_listing(&Location::ClassPath, "host.config"));
        assert!(!policy.is_contract_listing(
            &Location::SystemModule("core.base".to_string()),
            "contract"
        ));
    }

    #[test]
    fn test_entries_include_contract_pair() {
        let policy = policy();
        let entries: Vec<_> = policy.entries().collect();
        assert!(entries.contains(&("class-path", "contract")));
        assert!(entries.contains(&("system-modules[core.base]", "io")));
    }
}
