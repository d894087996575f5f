// Config validation
// Invalid allowlists fail fast at startup with actionable errors

use crate::config::loader::SandboxConfig;
use crate::config::types::{Result, SandboxError};

/// Validation result with detailed errors
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate config at startup. Errors are always fatal, warnings are logged.
pub fn validate_config(config: &SandboxConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_contract(config, &mut result);
    validate_allowlist(config, &mut result);

    if config.max_call_depth == 0 {
        result.add_error("max_call_depth cannot be zero".to_string());
    }
    if config.execution_deadline_ms == Some(0) {
        result.add_error("execution_deadline_ms cannot be zero".to_string());
    }

    for warning in &result.warnings {
        log::warn!("config: {}", warning);
    }

    if !result.is_valid() {
        return Err(SandboxError::Config(format!(
            "Config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

/// A dotted name whose every segment is an identifier: `util.logging`
pub fn is_dotted_name(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_identifier)
}

pub fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_contract(config: &SandboxConfig, result: &mut ValidationResult) {
    if !is_dotted_name(&config.contract.package) {
        result.add_error(format!(
            "contract.package `{}` is not a dotted package name",
            config.contract.package
        ));
    }
    if !is_identifier(&config.contract.type_name) {
        result.add_error(format!(
            "contract.type_name `{}` is not an identifier",
            config.contract.type_name
        ));
    }
}

fn validate_allowlist(config: &SandboxConfig, result: &mut ValidationResult) {
    if config.allowlist.is_empty() {
        result.add_warning("allowlist is empty; plugins can only see the contract".to_string());
    }

    for (realm, packages) in &config.allowlist {
        if realm.trim().is_empty() {
            result.add_error("allowlist contains an empty realm name".to_string());
        }
        if realm == "class-path" {
            // Opening the user realm would expose host internals on the class path.
            result.add_error(
                "allowlist must not name the class-path realm; the contract package is implicit"
                    .to_string(),
            );
        }
        for package in packages {
            if !is_dotted_name(package) {
                result.add_error(format!(
                    "allowlist realm `{}` lists invalid package `{}`",
                    realm, package
                ));
            }
        }
        if packages.is_empty() {
            result.add_warning(format!("allowlist realm `{}` lists no packages", realm));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let result = validate_config(&SandboxConfig::default()).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_rejects_class_path_realm() {
        let mut config = SandboxConfig::default();
        config
            .allowlist
            .insert("class-path".to_string(), ["host.config".to_string()].into());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_bad_contract_names() {
        let mut config = SandboxConfig::default();
        config.contract.package = "contract..x".to_string();
        config.contract.type_name = "9Plugin".to_string();
        let err = validate_config(&config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("contract.package"));
        assert!(message.contains("contract.type_name"));
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier(""));
        assert!(is_dotted_name("util.logging"));
        assert!(!is_dotted_name("util."));
    }
}
