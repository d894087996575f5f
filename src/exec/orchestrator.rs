//! Compilation orchestrator
//!
//! Drives one session end to end: open, register, compile, and on success
//! load and execute the first unit. The outcome is summarized in a
//! serializable [`SessionReport`].

use crate::config::loader::SandboxConfig;
use crate::config::types::{Result, SandboxError, SessionState};
use crate::core::types::{ContractType, Diagnostic, ResolutionDecision};
use crate::core::unit::PluginUnit;
use crate::exec::session::{CompileOutcome, ExecutionFailure, Session};
use crate::platform::PlatformLibrary;
use crate::toolchain::{system_toolchain, Toolchain};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One compiled artifact as seen in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub name: String,
    pub sha256: String,
    pub bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub state: SessionState,
    pub history: Vec<SessionState>,
    pub diagnostics: Vec<Diagnostic>,
    pub artifacts: Vec<ArtifactSummary>,
    pub output: Vec<String>,
    pub failure: Option<ExecutionFailure>,
    pub decisions: Vec<ResolutionDecision>,
}

impl SessionReport {
    fn from_session<S>(session: &Session<S>) -> Self {
        let artifacts = session.artifacts();
        Self {
            session_id: session.id().to_string(),
            state: session.state(),
            history: session.history().to_vec(),
            diagnostics: session.diagnostics().to_vec(),
            artifacts: artifacts
                .names()
                .into_iter()
                .filter_map(|name| artifacts.get(&name))
                .map(|artifact| ArtifactSummary {
                    name: artifact.qualified_name().to_string(),
                    sha256: artifact.digest(),
                    bytes: artifact.bytes().len(),
                })
                .collect(),
            output: Vec::new(),
            failure: None,
            decisions: session.decisions().to_vec(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == SessionState::Executed
    }

    pub fn compiled(&self) -> bool {
        self.history.contains(&SessionState::CompiledOk)
    }
}

enum ExecMode {
    CompileOnly,
    Inline,
    Deadline(Duration),
}

pub struct CompilationOrchestrator {
    config: SandboxConfig,
    platform: Arc<PlatformLibrary>,
    toolchain: Option<Arc<dyn Toolchain>>,
}

impl CompilationOrchestrator {
    /// Standard platform catalogue and the toolchain this build ships with
    pub fn new(config: SandboxConfig) -> Self {
        let contract = ContractType::new(&config.contract.package, &config.contract.type_name);
        let platform = Arc::new(PlatformLibrary::standard(contract));
        Self::with_parts(config, platform, system_toolchain())
    }

    pub fn with_parts(
        config: SandboxConfig,
        platform: Arc<PlatformLibrary>,
        toolchain: Option<Arc<dyn Toolchain>>,
    ) -> Self {
        Self {
            config,
            platform,
            toolchain,
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn platform(&self) -> &Arc<PlatformLibrary> {
        &self.platform
    }

    /// Compile `units` and execute the first one. Uses the configured
    /// deadline, if any.
    pub fn run(&self, units: Vec<PluginUnit>) -> Result<SessionReport> {
        let mode = match self.config.execution_deadline() {
            Some(deadline) => ExecMode::Deadline(deadline),
            None => ExecMode::Inline,
        };
        self.drive(units, mode)
    }

    pub fn run_with_deadline(
        &self,
        units: Vec<PluginUnit>,
        deadline: Duration,
    ) -> Result<SessionReport> {
        self.drive(units, ExecMode::Deadline(deadline))
    }

    /// Compile only; nothing is loaded or executed
    pub fn check(&self, units: Vec<PluginUnit>) -> Result<SessionReport> {
        self.drive(units, ExecMode::CompileOnly)
    }

    fn drive(&self, units: Vec<PluginUnit>, mode: ExecMode) -> Result<SessionReport> {
        let entry = units
            .first()
            .map(|unit| unit.qualified_name().to_string())
            .ok_or_else(|| SandboxError::Config("at least one plugin unit is required".into()))?;

        let mut session = Session::start(
            self.config.clone(),
            Arc::clone(&self.platform),
            self.toolchain.clone(),
        )?;
        for unit in units {
            session.register(unit)?;
        }

        let compiled = match session.compile() {
            CompileOutcome::Ok(compiled) => compiled,
            CompileOutcome::Failed(failed) => return Ok(SessionReport::from_session(&failed)),
        };

        let finished = match mode {
            ExecMode::CompileOnly => return Ok(SessionReport::from_session(&compiled)),
            ExecMode::Inline => compiled.execute(&entry),
            ExecMode::Deadline(deadline) => compiled.execute_with_deadline(&entry, deadline),
        };

        let mut report = SessionReport::from_session(&finished);
        report.output = finished.output().to_vec();
        report.failure = finished.failure().cloned();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, source: &str) -> PluginUnit {
        PluginUnit::new(name, source).unwrap()
    }

    #[test]
    fn test_run_reports_output() {
        let orchestrator = CompilationOrchestrator::new(SandboxConfig::default());
        let report = orchestrator
            .run(vec![unit(
                "contract.Hello",
                "import io.print; plugin Hello : Plugin { fn execute() { print(\"hi\"); } }",
            )])
            .unwrap();
        assert!(report.succeeded());
        assert_eq!(report.output, vec!["hi".to_string()]);
        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(report.artifacts[0].name, "contract.Hello");
    }

    #[test]
    fn test_check_does_not_execute() {
        let orchestrator = CompilationOrchestrator::new(SandboxConfig::default());
        let report = orchestrator
            .check(vec![unit(
                "contract.Loud",
                "plugin Loud : Plugin { fn execute() { fail(\"ran\"); } }",
            )])
            .unwrap();
        assert_eq!(report.state, SessionState::CompiledOk);
        assert!(report.failure.is_none());
    }

    #[test]
    fn test_no_units_is_an_error() {
        let orchestrator = CompilationOrchestrator::new(SandboxConfig::default());
        assert!(matches!(
            orchestrator.run(Vec::new()),
            Err(SandboxError::Config(_))
        ));
    }

    #[test]
    fn test_missing_toolchain() {
        let config = SandboxConfig::default();
        let platform = Arc::new(PlatformLibrary::standard(ContractType::new(
            "contract", "Plugin",
        )));
        let orchestrator = CompilationOrchestrator::with_parts(config, platform, None);
        assert!(matches!(
            orchestrator.run(vec![unit("contract.A", "")]),
            Err(SandboxError::NoToolchainAvailable)
        ));
    }
}
