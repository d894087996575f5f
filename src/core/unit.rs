//! In-memory compilation units and their compiled artifacts.
//!
//! Nothing here touches persistent storage: source text arrives from the
//! host as a string and compiled bytes live in a growable buffer.

use crate::config::types::{Result, SandboxError};
use crate::config::validator::is_dotted_name;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{self, Write};
use uuid::Uuid;

/// One plugin's source text, identified by its fully-qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginUnit {
    qualified_name: String,
    short_name: String,
    package: String,
    source: String,
}

impl PluginUnit {
    /// `qualified_name` is dotted, e.g. `contract.MyScript`
    pub fn new(qualified_name: &str, source: impl Into<String>) -> Result<Self> {
        if !is_dotted_name(qualified_name) {
            return Err(SandboxError::InvalidUnitName(qualified_name.to_string()));
        }

        let (package, short_name) = match qualified_name.rfind('.') {
            Some(idx) => (&qualified_name[..idx], &qualified_name[idx + 1..]),
            None => ("", qualified_name),
        };

        Ok(Self {
            qualified_name: qualified_name.to_string(),
            short_name: short_name.to_string(),
            package: package.to_string(),
            source: source.into(),
        })
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Empty for units in the default package
    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Virtual path used in logs, never opened
    pub fn virtual_path(&self) -> String {
        format!("{}.plugin", self.qualified_name.replace('.', "/"))
    }
}

/// Per-instance identity of an artifact, distinct from its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactId(Uuid);

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Compiled output for one name. Writable until sealed.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    id: ArtifactId,
    qualified_name: String,
    buffer: Vec<u8>,
    sealed: bool,
}

impl CompiledArtifact {
    pub(crate) fn new(qualified_name: &str) -> Self {
        Self {
            id: ArtifactId(Uuid::new_v4()),
            qualified_name: qualified_name.to_string(),
            buffer: Vec::new(),
            sealed: false,
        }
    }

    pub fn id(&self) -> ArtifactId {
        self.id
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn digest(&self) -> String {
        sha256_hex(&self.buffer)
    }
}

impl Write for CompiledArtifact {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.sealed {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("artifact {} is sealed", self.qualified_name),
            ));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Session-scoped name -> artifact table. Exactly one artifact per name.
#[derive(Debug, Default, Clone)]
pub struct ArtifactSet {
    artifacts: BTreeMap<String, CompiledArtifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the artifact for `qualified_name`, creating it if absent
    pub fn get_or_create(&mut self, qualified_name: &str) -> &mut CompiledArtifact {
        self.artifacts
            .entry(qualified_name.to_string())
            .or_insert_with(|| CompiledArtifact::new(qualified_name))
    }

    pub fn get(&self, qualified_name: &str) -> Option<&CompiledArtifact> {
        self.artifacts.get(qualified_name)
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.artifacts.contains_key(qualified_name)
    }

    pub fn names(&self) -> Vec<String> {
        self.artifacts.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn seal_all(&mut self) {
        for artifact in self.artifacts.values_mut() {
            artifact.seal();
        }
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_name_split() {
        let unit = PluginUnit::new("contract.MyScript", "plugin MyScript : Plugin {}").unwrap();
        assert_eq!(unit.short_name(), "MyScript");
        assert_eq!(unit.package(), "contract");
        assert_eq!(unit.virtual_path(), "contract/MyScript.plugin");

        let bare = PluginUnit::new("Loose", "").unwrap();
        assert_eq!(bare.package(), "");
        assert_eq!(bare.short_name(), "Loose");
    }

    #[test]
    fn test_unit_name_validation() {
        assert!(PluginUnit::new("contract.", "").is_err());
        assert!(PluginUnit::new("contract.My-Script", "").is_err());
        assert!(PluginUnit::new("", "").is_err());
    }

    #[test]
    fn test_artifact_seal_blocks_writes() {
        let mut artifact = CompiledArtifact::new("contract.A");
        artifact.write_all(b"abc").unwrap();
        artifact.seal();
        assert!(artifact.write_all(b"def").is_err());
        assert_eq!(artifact.bytes(), b"abc");
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut set = ArtifactSet::new();
        let first = set.get_or_create("contract.A").id();
        set.get_or_create("contract.A").write_all(b"x").unwrap();
        let second = set.get_or_create("contract.A").id();
        assert_eq!(first, second);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("contract.A").unwrap().bytes(), b"x");
    }
}
