//! Resolution protocol and its sandboxed implementation.
//!
//! A toolchain only ever talks to a [`SymbolResolver`]. The sandbox installs
//! [`SandboxedResolver`] as that sole authority: it implements the same
//! surface as the platform's [`StandardResolver`] and forwards to it only for
//! (realm, package) pairs the policy allows.

use crate::config::policy::LibraryAccessPolicy;
use crate::config::types::Result;
use crate::core::types::{Entry, EntryKind, Location, ResolutionDecision, ResolutionVerdict};
use crate::core::unit::{ArtifactSet, CompiledArtifact, PluginUnit};
use crate::observability::audit::{self, CorrelationIds};
use crate::platform::{PlatformLibrary, StandardResolver};
use std::io::Write;
use std::sync::Arc;

/// What a toolchain may ask while compiling.
pub trait SymbolResolver {
    /// Platform module locations to search for library packages
    fn module_locations(&self) -> Vec<Location>;

    /// Entries of `package` at `location` whose kind is in `kinds`
    fn list(&mut self, location: &Location, package: &str, kinds: &[EntryKind]) -> Vec<Entry>;

    /// Fully-qualified name of a listed entry
    fn infer_name(&self, location: &Location, entry: &Entry) -> Option<String>;

    /// Writer for the compiled bytes of `qualified_name`, produced from `sibling`
    fn output_for(
        &mut self,
        location: &Location,
        qualified_name: &str,
        sibling: &PluginUnit,
    ) -> Result<&mut dyn Write>;
}

/// Session-scoped resolver enforcing a [`LibraryAccessPolicy`].
pub struct SandboxedResolver {
    inner: StandardResolver,
    policy: LibraryAccessPolicy,
    units: Vec<Arc<PluginUnit>>,
    artifacts: ArtifactSet,
    decisions: Vec<ResolutionDecision>,
    correlation: CorrelationIds,
}

impl SandboxedResolver {
    pub fn new(
        platform: Arc<PlatformLibrary>,
        policy: LibraryAccessPolicy,
        correlation: CorrelationIds,
    ) -> Self {
        Self {
            inner: StandardResolver::new(platform),
            policy,
            units: Vec::new(),
            artifacts: ArtifactSet::new(),
            decisions: Vec::new(),
            correlation,
        }
    }

    pub fn register_unit(&mut self, unit: Arc<PluginUnit>) {
        self.units.push(unit);
    }

    pub fn units(&self) -> &[Arc<PluginUnit>] {
        &self.units
    }

    pub fn policy(&self) -> &LibraryAccessPolicy {
        &self.policy
    }

    pub fn platform(&self) -> &Arc<PlatformLibrary> {
        self.inner.platform()
    }

    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    pub fn decisions(&self) -> &[ResolutionDecision] {
        &self.decisions
    }

    /// Freeze every artifact once the toolchain has returned
    pub fn seal(&mut self) {
        self.artifacts.seal_all();
    }

    /// Artifact for `qualified_name`, created and registered on first request.
    pub fn bind_output(
        &mut self,
        location: &Location,
        qualified_name: &str,
        unit: &PluginUnit,
    ) -> &mut CompiledArtifact {
        let created = !self.artifacts.contains(qualified_name);
        if created {
            log::debug!(
                "Binding output {} at {} (from {})",
                qualified_name,
                location,
                unit.virtual_path()
            );
            audit::output_bound(self.correlation.clone(), qualified_name, unit.qualified_name());
        }
        self.artifacts.get_or_create(qualified_name)
    }

    /// The policy decision for one listing. Denial never raises: the
    /// toolchain is simply starved of the symbol.
    pub fn list_visible(
        &mut self,
        location: &Location,
        package: &str,
        kinds: &[EntryKind],
    ) -> Vec<Entry> {
        let realm = location.realm();

        let (verdict, entries) = if self.policy.is_contract_listing(location, package) {
            let mut entries: Vec<Entry> = self
                .units
                .iter()
                .map(|unit| Entry::Unit(Arc::clone(unit)))
                .collect();
            entries.push(Entry::Contract(self.policy.contract().clone()));
            entries.retain(|entry| kinds.contains(&entry.kind()));
            (ResolutionVerdict::Contract, entries)
        } else if self.policy.is_visible(&realm, package) {
            (
                ResolutionVerdict::Allowed,
                self.inner.list(location, package, kinds),
            )
        } else {
            (ResolutionVerdict::Denied, Vec::new())
        };

        let decision = ResolutionDecision {
            realm,
            package: package.to_string(),
            kinds: kinds.to_vec(),
            verdict,
            entries: entries.len(),
        };
        match verdict {
            ResolutionVerdict::Denied => log::warn!(
                "LOCATION FILTERED: {} package: {} kinds: {:?}",
                decision.realm,
                decision.package,
                decision.kinds
            ),
            _ => log::debug!(
                "LOCATION INCLUDED: {} package: {} kinds: {:?} ({} entries)",
                decision.realm,
                decision.package,
                decision.kinds,
                decision.entries
            ),
        }
        audit::resolution_decision(self.correlation.clone(), &decision);
        self.decisions.push(decision);

        entries
    }

    pub fn resolve_name(&self, location: &Location, entry: &Entry) -> Option<String> {
        match entry {
            Entry::Unit(unit) => Some(unit.qualified_name().to_string()),
            Entry::Contract(contract) => Some(contract.qualified_name()),
            Entry::Library(_) => self.inner.infer_name(location, entry),
        }
    }
}

impl SymbolResolver for SandboxedResolver {
    fn module_locations(&self) -> Vec<Location> {
        self.inner.module_locations()
    }

    fn list(&mut self, location: &Location, package: &str, kinds: &[EntryKind]) -> Vec<Entry> {
        self.list_visible(location, package, kinds)
    }

    fn infer_name(&self, location: &Location, entry: &Entry) -> Option<String> {
        self.resolve_name(location, entry)
    }

    fn output_for(
        &mut self,
        location: &Location,
        qualified_name: &str,
        sibling: &PluginUnit,
    ) -> Result<&mut dyn Write> {
        let artifact: &mut dyn Write = self.bind_output(location, qualified_name, sibling);
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::SandboxConfig;
    use crate::core::types::ContractType;

    fn resolver() -> SandboxedResolver {
        let config = SandboxConfig::default();
        let platform = Arc::new(PlatformLibrary::standard(ContractType::new(
            "contract", "Plugin",
        )));
        let mut resolver = SandboxedResolver::new(
            platform,
            LibraryAccessPolicy::from_config(&config),
            CorrelationIds::new("test-session"),
        );
        resolver.register_unit(Arc::new(
            PluginUnit::new("contract.MyScript", "plugin MyScript : Plugin {}").unwrap(),
        ));
        resolver
    }

    const ALL_KINDS: &[EntryKind] = &[EntryKind::Source, EntryKind::Compiled, EntryKind::Native];

    #[test]
    fn test_allowed_listing_forwards_to_platform() {
        let mut resolver = resolver();
        let entries = resolver.list(
            &Location::SystemModule("core.base".to_string()),
            "math",
            ALL_KINDS,
        );
        assert_eq!(entries.len(), 4);
        assert_eq!(resolver.decisions()[0].verdict, ResolutionVerdict::Allowed);
    }

    #[test]
    fn test_denied_listing_is_empty() {
        let mut resolver = resolver();
        let base = Location::SystemModule("core.base".to_string());
        assert!(resolver.list(&base, "fs", ALL_KINDS).is_empty());
        assert!(resolver.list(&base, "process", ALL_KINDS).is_empty());
        assert!(resolver
            .list(&Location::ClassPath, "host.config", ALL_KINDS)
            .is_empty());
        assert!(resolver
            .decisions()
            .iter()
            .all(|d| d.verdict == ResolutionVerdict::Denied));
    }

    #[test]
    fn test_contract_listing_hides_host_symbols() {
        let mut resolver = resolver();
        let entries = resolver.list(&Location::ClassPath, "contract", ALL_KINDS);
        let names: Vec<String> = entries
            .iter()
            .filter_map(|e| resolver.infer_name(&Location::ClassPath, e))
            .collect();
        assert_eq!(names, vec!["contract.MyScript", "contract.Plugin"]);
    }

    #[test]
    fn test_contract_listing_respects_kinds() {
        let mut resolver = resolver();
        let compiled = resolver.list(&Location::ClassPath, "contract", &[EntryKind::Compiled]);
        assert_eq!(compiled.len(), 1);
        assert!(matches!(compiled[0], Entry::Contract(_)));
    }

    #[test]
    fn test_bind_output_is_idempotent() {
        let mut resolver = resolver();
        let unit = resolver.units()[0].clone();
        let first = resolver
            .bind_output(&Location::ClassOutput, "contract.MyScript", &unit)
            .id();
        resolver
            .output_for(&Location::ClassOutput, "contract.MyScript", &unit)
            .unwrap()
            .write_all(b"bytes")
            .unwrap();
        let second = resolver
            .bind_output(&Location::ClassOutput, "contract.MyScript", &unit)
            .id();
        assert_eq!(first, second);
        assert_eq!(resolver.artifacts().len(), 1);
        assert_eq!(
            resolver.artifacts().get("contract.MyScript").unwrap().bytes(),
            b"bytes"
        );
    }
}
