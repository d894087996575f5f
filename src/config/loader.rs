use crate::config::presets;
use crate::config::types::{Result, SandboxError};
/// Configuration loading from scriptbox.json
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the contract type lives and what it is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    pub package: String,
    pub type_name: String,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            package: presets::DEFAULT_CONTRACT_PACKAGE.to_string(),
            type_name: presets::DEFAULT_CONTRACT_TYPE.to_string(),
        }
    }
}

/// Host-supplied sandbox configuration. Read once at startup, never reloaded
/// mid-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Realm name -> packages a plugin may reference in that realm
    pub allowlist: BTreeMap<String, BTreeSet<String>>,
    /// Contract package and type
    pub contract: ContractConfig,
    /// JSON-lines audit file (optional)
    pub audit_log: Option<PathBuf>,
    /// Host-side deadline for the execute phase in milliseconds (optional)
    pub execution_deadline_ms: Option<u64>,
    /// Maximum nested plugin calls before the VM faults
    pub max_call_depth: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            allowlist: presets::default_allowlist(),
            contract: ContractConfig::default(),
            audit_log: None,
            execution_deadline_ms: None,
            max_call_depth: 256,
        }
    }
}

impl SandboxConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_content = std::fs::read_to_string(path)
            .map_err(|e| SandboxError::Config(format!("Failed to read config file: {}", e)))?;

        let config: SandboxConfig = serde_json::from_str(&config_content)
            .map_err(|e| SandboxError::Config(format!("Failed to parse config JSON: {}", e)))?;

        crate::config::validator::validate_config(&config)?;
        Ok(config)
    }

    /// Load ./scriptbox.json, falling back to the built-in preset when absent
    pub fn load_default() -> Result<Self> {
        let config_path = std::env::current_dir()
            .map_err(|e| SandboxError::Config(format!("Failed to get current directory: {}", e)))?
            .join("scriptbox.json");

        if !config_path.exists() {
            log::info!(
                "scriptbox.json not found, using preset {}",
                presets::DEFAULT_PRESET_ID
            );
            return Ok(Self::default());
        }

        Self::load_from_file(config_path)
    }

    /// Run the startup checks without loading anything
    pub fn validate(&self) -> Result<crate::config::validator::ValidationResult> {
        crate::config::validator::validate_config(self)
    }

    pub fn execution_deadline(&self) -> Option<Duration> {
        self.execution_deadline_ms.map(Duration::from_millis)
    }

    /// Fully-qualified name of the contract type, e.g. `contract.Plugin`
    pub fn contract_qualified_name(&self) -> String {
        format!("{}.{}", self.contract.package, self.contract.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_preset() {
        let config = SandboxConfig::default();
        assert_eq!(config.contract_qualified_name(), "contract.Plugin");
        assert!(config.allowlist.contains_key("system-modules[core.base]"));
        assert!(config.execution_deadline().is_none());
    }

    #[test]
    fn test_load_from_file_with_partial_json() {
        let path = std::env::temp_dir().join(format!(
            "scriptbox-config-{}.json",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(
            &path,
            r#"{
                "allowlist": { "system-modules[core.base]": ["lang", "math"] },
                "contract": { "package": "plugins", "type_name": "Task" },
                "execution_deadline_ms": 250
            }"#,
        )
        .unwrap();

        let config = SandboxConfig::load_from_file(&path).unwrap();
        assert_eq!(config.contract_qualified_name(), "plugins.Task");
        assert_eq!(config.execution_deadline(), Some(Duration::from_millis(250)));
        assert_eq!(config.max_call_depth, 256);
        assert_eq!(config.allowlist.len(), 1);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_from_file_rejects_bad_json() {
        let path = std::env::temp_dir().join(format!(
            "scriptbox-config-bad-{}.json",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "{ not json").unwrap();
        let err = SandboxConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));
        let _ = std::fs::remove_file(path);
    }
}
