/// Audit event logging for scriptbox
/// Structured record of every resolution decision and session lifecycle step
///
/// - Correlation IDs (session_id, request_id)
/// - Event types: session start, resolution decisions, output binding,
///   compile outcome, loader activity, execution outcome
use crate::config::types::{Result, SandboxError, SessionState};
use crate::core::types::{ResolutionDecision, ResolutionVerdict};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use uuid::Uuid;

/// Audit event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditSeverity {
    Critical,
    High,
    Medium,
    Low,
}

/// Types of audit events we track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    // Lifecycle events
    SessionStart,
    CompileFinished,
    ExecutionEnd,

    // Resolver events
    ResolutionAllowed,
    ResolutionContract,
    ResolutionDenied,
    OutputBound,

    // Loader events
    ArtifactMaterialized,
    LoadRejected,
    LinkRejected,
}

impl AuditEventType {
    /// Get the default severity for this event type
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::SessionStart => AuditSeverity::Low,
            AuditEventType::CompileFinished => AuditSeverity::Low,
            AuditEventType::ExecutionEnd => AuditSeverity::Low,

            AuditEventType::ResolutionAllowed => AuditSeverity::Low,
            AuditEventType::ResolutionContract => AuditSeverity::Low,
            AuditEventType::ResolutionDenied => AuditSeverity::Medium,
            AuditEventType::OutputBound => AuditSeverity::Low,

            AuditEventType::ArtifactMaterialized => AuditSeverity::Low,
            // A lookup miss means a name the compiler produced is missing.
            AuditEventType::LoadRejected => AuditSeverity::High,
            AuditEventType::LinkRejected => AuditSeverity::Critical,
        }
    }
}

/// Correlation identifiers for event tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationIds {
    /// Session identifier (one compile-and-run cycle)
    pub session_id: String,
    /// Unique request identifier
    pub request_id: String,
}

impl CorrelationIds {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Individual audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    pub correlation: Option<CorrelationIds>,
    pub decision: Option<ResolutionDecision>,
    pub symbol: Option<String>,
    pub state: Option<SessionState>,
}

impl AuditEvent {
    /// Create a new audit event with default severity
    pub fn new(event_type: AuditEventType, details: String) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: Utc::now(),
            details,
            correlation: None,
            decision: None,
            symbol: None,
            state: None,
        }
    }

    pub fn with_correlation(mut self, correlation: CorrelationIds) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn with_decision(mut self, decision: ResolutionDecision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn with_state(mut self, state: SessionState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Append-only JSON-lines audit sink
pub struct AuditLogger {
    audit_file: Arc<Mutex<File>>,
    audit_path: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_path: PathBuf) -> Result<Self> {
        if let Some(parent) = audit_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SandboxError::Config(format!("Failed to create audit log directory: {}", e))
            })?;
        }

        let audit_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&audit_path)
            .map_err(|e| SandboxError::Config(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            audit_file: Arc::new(Mutex::new(audit_file)),
            audit_path,
        })
    }

    pub fn log_event(&self, event: &AuditEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        if let Ok(mut file) = self.audit_file.lock() {
            if let Err(e) = writeln!(file, "{}", line) {
                error!("Failed to write to audit log: {}", e);
            }
            if let Err(e) = file.flush() {
                error!("Failed to flush audit log: {}", e);
            }
        } else {
            error!("Failed to acquire lock on audit file");
        }
    }

    pub fn audit_path(&self) -> &PathBuf {
        &self.audit_path
    }
}

/// Global audit sink. Append-only; never read back by a session.
static AUDIT_LOGGER: OnceLock<AuditLogger> = OnceLock::new();

/// Initialize the global audit logger. A second call is ignored.
pub fn init_audit_logger(audit_path: PathBuf) -> Result<()> {
    let logger = AuditLogger::new(audit_path)?;
    let path = logger.audit_path().clone();
    if AUDIT_LOGGER.set(logger).is_err() {
        warn!("Audit logger already initialized");
    } else {
        info!("Audit logger initialized at {}", path.display());
    }
    Ok(())
}

/// Record an event, falling back to the log facade when no sink is set
pub fn log_audit_event(event: AuditEvent) {
    if let Some(logger) = AUDIT_LOGGER.get() {
        logger.log_event(&event);
    }

    match event.severity {
        AuditSeverity::Critical | AuditSeverity::High => {
            error!(target: "audit", "{:?} - {}", event.event_type, event.details);
        }
        AuditSeverity::Medium => {
            log::debug!(target: "audit", "{:?} - {}", event.event_type, event.details);
        }
        AuditSeverity::Low => {
            log::trace!(target: "audit", "{:?} - {}", event.event_type, event.details);
        }
    }
}

pub fn session_start(correlation: CorrelationIds, toolchain: &str) {
    log_audit_event(
        AuditEvent::new(
            AuditEventType::SessionStart,
            format!("Session started with toolchain {}", toolchain),
        )
        .with_correlation(correlation)
        .with_state(SessionState::Pending),
    );
}

pub fn resolution_decision(correlation: CorrelationIds, decision: &ResolutionDecision) {
    let event_type = match decision.verdict {
        ResolutionVerdict::Allowed => AuditEventType::ResolutionAllowed,
        ResolutionVerdict::Contract => AuditEventType::ResolutionContract,
        ResolutionVerdict::Denied => AuditEventType::ResolutionDenied,
    };
    log_audit_event(
        AuditEvent::new(
            event_type,
            format!(
                "{} package {} kinds {:?}: {} entries",
                decision.realm, decision.package, decision.kinds, decision.entries
            ),
        )
        .with_correlation(correlation)
        .with_decision(decision.clone()),
    );
}

pub fn output_bound(correlation: CorrelationIds, qualified_name: &str, unit: &str) {
    log_audit_event(
        AuditEvent::new(
            AuditEventType::OutputBound,
            format!("Output for {} bound from unit {}", qualified_name, unit),
        )
        .with_correlation(correlation)
        .with_symbol(qualified_name),
    );
}

pub fn compile_finished(correlation: CorrelationIds, state: SessionState, errors: usize) {
    log_audit_event(
        AuditEvent::new(
            AuditEventType::CompileFinished,
            format!("Compilation finished: {} ({} errors)", state, errors),
        )
        .with_correlation(correlation)
        .with_state(state),
    );
}

pub fn artifact_materialized(correlation: CorrelationIds, qualified_name: &str, digest: &str) {
    log_audit_event(
        AuditEvent::new(
            AuditEventType::ArtifactMaterialized,
            format!("Materialized {} (sha256 {})", qualified_name, digest),
        )
        .with_correlation(correlation)
        .with_symbol(qualified_name),
    );
}

pub fn load_rejected(correlation: CorrelationIds, qualified_name: &str) {
    log_audit_event(
        AuditEvent::new(
            AuditEventType::LoadRejected,
            format!("{} is not in this session's artifact set", qualified_name),
        )
        .with_correlation(correlation)
        .with_symbol(qualified_name),
    );
}

pub fn link_rejected(correlation: CorrelationIds, qualified_name: &str, symbol: &str) {
    log_audit_event(
        AuditEvent::new(
            AuditEventType::LinkRejected,
            format!("{} links forbidden symbol {}", qualified_name, symbol),
        )
        .with_correlation(correlation)
        .with_symbol(symbol),
    );
}

pub fn execution_end(correlation: CorrelationIds, state: SessionState, details: String) {
    let event = AuditEvent::new(AuditEventType::ExecutionEnd, details)
        .with_correlation(correlation)
        .with_state(state);
    let event = if state == SessionState::ExecutionFailed {
        event.with_severity(AuditSeverity::Medium)
    } else {
        event
    };
    log_audit_event(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EntryKind;

    #[test]
    fn test_correlation_ids_creation() {
        let correlation = CorrelationIds::new("session-1");
        assert_eq!(correlation.session_id, "session-1");
        assert!(!correlation.request_id.is_empty());
    }

    #[test]
    fn test_event_type_severity() {
        assert_eq!(
            AuditEventType::ResolutionDenied.default_severity(),
            AuditSeverity::Medium
        );
        assert_eq!(
            AuditEventType::LinkRejected.default_severity(),
            AuditSeverity::Critical
        );
        assert_eq!(
            AuditEventType::SessionStart.default_severity(),
            AuditSeverity::Low
        );
    }

    #[test]
    fn test_audit_event_serialization() {
        let decision = ResolutionDecision {
            realm: "class-path".to_string(),
            package: "host.config".to_string(),
            kinds: vec![EntryKind::Native],
            verdict: ResolutionVerdict::Denied,
            entries: 0,
        };
        let event = AuditEvent::new(AuditEventType::ResolutionDenied, "denied".to_string())
            .with_correlation(CorrelationIds::new("session-1"))
            .with_decision(decision);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "ResolutionDenied");
        assert_eq!(json["decision"]["package"], "host.config");
        assert_eq!(json["correlation"]["session_id"], "session-1");
    }

    #[test]
    fn test_audit_logger_appends_json_lines() {
        let path = std::env::temp_dir().join(format!("scriptbox-audit-{}.log", Uuid::new_v4()));
        let logger = AuditLogger::new(path.clone()).unwrap();
        logger.log_event(&AuditEvent::new(
            AuditEventType::SessionStart,
            "one".to_string(),
        ));
        logger.log_event(&AuditEvent::new(
            AuditEventType::ExecutionEnd,
            "two".to_string(),
        ));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["details"], "one");

        let _ = std::fs::remove_file(path);
    }
}
