use crate::config::loader::SandboxConfig;
use crate::config::policy::LibraryAccessPolicy;
use crate::config::types::{Result, SandboxError, SessionState};
use crate::core::loader::IsolatedLoader;
use crate::core::resolver::SandboxedResolver;
use crate::core::types::{Diagnostic, DiagnosticCollector, ResolutionDecision, Severity};
use crate::core::unit::{ArtifactSet, PluginUnit};
use crate::observability::audit::{self, CorrelationIds};
use crate::platform::PlatformLibrary;
use crate::runtime::contract::{Plugin, PluginFailure};
use crate::runtime::vm::ScriptPlugin;
use crate::toolchain::Toolchain;
/// Session lifecycle
///
/// One compile-then-execute cycle, expressed as a type-state chain so the
/// illegal orderings cannot compile:
///
/// Pending -> (compile) -> CompiledOk | CompiledFailed
/// CompiledOk -> (execute) -> Finished (Executed | ExecutionFailed)
///
/// Each step consumes the prior state.
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Type-state marker: units may be registered
pub struct Pending;

/// Type-state marker: compiled without errors, ready to execute
pub struct CompiledOk;

/// Type-state marker: compilation failed (terminal)
pub struct CompiledFailed;

/// Type-state marker: execution finished one way or the other (terminal)
pub struct Finished;

/// Why the execute phase did not complete
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionFailure {
    #[error("load failed: {0}")]
    Load(String),

    #[error("{0}")]
    Instantiation(String),

    #[error("plugin signalled failure: {0}")]
    Signaled(String),

    #[error("plugin runtime fault: {0}")]
    Fault(String),

    #[error("plugin panicked: {0}")]
    Panicked(String),

    #[error("execution abandoned after {millis} ms deadline")]
    DeadlineExceeded { millis: u64 },
}

impl From<PluginFailure> for ExecutionFailure {
    fn from(failure: PluginFailure) -> Self {
        match failure {
            PluginFailure::Signaled(msg) => ExecutionFailure::Signaled(msg),
            PluginFailure::Fault(msg) => ExecutionFailure::Fault(msg),
            PluginFailure::Instantiation(msg) => ExecutionFailure::Instantiation(msg),
        }
    }
}

/// Sandbox session with type-state tracking
///
/// Units are registered while `Pending`; only a `CompiledOk` session can
/// execute.
///
/// ```
/// # use scriptbox::config::loader::SandboxConfig;
/// # use scriptbox::core::types::ContractType;
/// # use scriptbox::core::unit::PluginUnit;
/// # use scriptbox::exec::{CompileOutcome, Session};
/// # use scriptbox::platform::PlatformLibrary;
/// # use scriptbox::toolchain::system_toolchain;
/// # use std::sync::Arc;
/// # let platform = Arc::new(PlatformLibrary::standard(ContractType::new("contract", "Plugin")));
/// let mut session = Session::start(SandboxConfig::default(), platform, system_toolchain()).unwrap();
/// # session
/// #     .register(PluginUnit::new("contract.A", "plugin A : Plugin { fn execute() { } }").unwrap())
/// #     .unwrap();
/// if let CompileOutcome::Ok(compiled) = session.compile() {
///     assert!(compiled.execute("contract.A").succeeded());
/// }
/// ```
///
/// A pending session cannot execute:
///
/// ```compile_fail
/// # use scriptbox::config::loader::SandboxConfig;
/// # use scriptbox::core::types::ContractType;
/// # use scriptbox::core::unit::PluginUnit;
/// # use scriptbox::exec::{CompileOutcome, Session};
/// # use scriptbox::platform::PlatformLibrary;
/// # use scriptbox::toolchain::system_toolchain;
/// # use std::sync::Arc;
/// # let platform = Arc::new(PlatformLibrary::standard(ContractType::new("contract", "Plugin")));
/// let mut session = Session::start(SandboxConfig::default(), platform, system_toolchain()).unwrap();
/// # session
/// #     .register(PluginUnit::new("contract.A", "plugin A : Plugin { fn execute() { } }").unwrap())
/// #     .unwrap();
/// session.execute("contract.A");
/// ```
///
/// Neither can one that failed to compile:
///
/// ```compile_fail
/// # use scriptbox::config::loader::SandboxConfig;
/// # use scriptbox::core::types::ContractType;
/// # use scriptbox::core::unit::PluginUnit;
/// # use scriptbox::exec::{CompileOutcome, Session};
/// # use scriptbox::platform::PlatformLibrary;
/// # use scriptbox::toolchain::system_toolchain;
/// # use std::sync::Arc;
/// # let platform = Arc::new(PlatformLibrary::standard(ContractType::new("contract", "Plugin")));
/// let mut session = Session::start(SandboxConfig::default(), platform, system_toolchain()).unwrap();
/// # session
/// #     .register(PluginUnit::new("contract.A", "plugin A : Plugin { fn execute() { } }").unwrap())
/// #     .unwrap();
/// if let CompileOutcome::Failed(failed) = session.compile() {
///     failed.execute("contract.A");
/// }
/// ```
///
/// `compile` consumes the pending session:
///
/// ```compile_fail
/// # use scriptbox::config::loader::SandboxConfig;
/// # use scriptbox::core::types::ContractType;
/// # use scriptbox::core::unit::PluginUnit;
/// # use scriptbox::exec::{CompileOutcome, Session};
/// # use scriptbox::platform::PlatformLibrary;
/// # use scriptbox::toolchain::system_toolchain;
/// # use std::sync::Arc;
/// # let platform = Arc::new(PlatformLibrary::standard(ContractType::new("contract", "Plugin")));
/// let mut session = Session::start(SandboxConfig::default(), platform, system_toolchain()).unwrap();
/// # session
/// #     .register(PluginUnit::new("contract.A", "plugin A : Plugin { fn execute() { } }").unwrap())
/// #     .unwrap();
/// let outcome = session.compile();
/// session.compile();
/// ```
///
/// Units cannot be added once compiled:
///
/// ```compile_fail
/// # use scriptbox::config::loader::SandboxConfig;
/// # use scriptbox::core::types::ContractType;
/// # use scriptbox::core::unit::PluginUnit;
/// # use scriptbox::exec::{CompileOutcome, Session};
/// # use scriptbox::platform::PlatformLibrary;
/// # use scriptbox::toolchain::system_toolchain;
/// # use std::sync::Arc;
/// # let platform = Arc::new(PlatformLibrary::standard(ContractType::new("contract", "Plugin")));
/// let mut session = Session::start(SandboxConfig::default(), platform, system_toolchain()).unwrap();
/// # session
/// #     .register(PluginUnit::new("contract.A", "plugin A : Plugin { fn execute() { } }").unwrap())
/// #     .unwrap();
/// if let CompileOutcome::Ok(mut compiled) = session.compile() {
///     compiled.register(PluginUnit::new("contract.B", "").unwrap());
/// }
/// ```
pub struct Session<S> {
    id: String,
    config: SandboxConfig,
    toolchain: Arc<dyn Toolchain>,
    resolver: SandboxedResolver,
    correlation: CorrelationIds,
    history: Vec<SessionState>,
    diagnostics: Vec<Diagnostic>,
    output: Vec<String>,
    failure: Option<ExecutionFailure>,
    _state: PhantomData<S>,
}

/// Result of [`Session::compile`]
pub enum CompileOutcome {
    Ok(Session<CompiledOk>),
    Failed(Session<CompiledFailed>),
}

impl CompileOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            CompileOutcome::Ok(_) => SessionState::CompiledOk,
            CompileOutcome::Failed(_) => SessionState::CompiledFailed,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileOutcome::Ok(session) => session.diagnostics(),
            CompileOutcome::Failed(session) => session.diagnostics(),
        }
    }
}

impl<S> Session<S> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current state (last entry of the history)
    pub fn state(&self) -> SessionState {
        self.history
            .last()
            .copied()
            .unwrap_or(SessionState::Pending)
    }

    /// Every state this session passed through, in order
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn decisions(&self) -> &[ResolutionDecision] {
        self.resolver.decisions()
    }

    pub fn artifacts(&self) -> &ArtifactSet {
        self.resolver.artifacts()
    }

    pub fn units(&self) -> &[Arc<PluginUnit>] {
        self.resolver.units()
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn correlation(&self) -> &CorrelationIds {
        &self.correlation
    }

    fn transition<T>(mut self, next: SessionState) -> Session<T> {
        debug_assert!(self.state().can_transition_to(next));
        log::debug!("Session {}: {} -> {}", self.id, self.state(), next);
        self.history.push(next);
        Session {
            id: self.id,
            config: self.config,
            toolchain: self.toolchain,
            resolver: self.resolver,
            correlation: self.correlation,
            history: self.history,
            diagnostics: self.diagnostics,
            output: self.output,
            failure: self.failure,
            _state: PhantomData,
        }
    }
}

impl Session<Pending> {
    /// Open a session. Fails before reaching `Pending` when no toolchain is
    /// available.
    pub fn start(
        config: SandboxConfig,
        platform: Arc<PlatformLibrary>,
        toolchain: Option<Arc<dyn Toolchain>>,
    ) -> Result<Self> {
        let toolchain = toolchain.ok_or(SandboxError::NoToolchainAvailable)?;
        let id = Uuid::new_v4().to_string();
        let correlation = CorrelationIds::new(&id);
        let policy = LibraryAccessPolicy::from_config(&config);
        let resolver = SandboxedResolver::new(platform, policy, correlation.clone());

        log::info!("Session {} started (toolchain {})", id, toolchain.name());
        audit::session_start(correlation.clone(), toolchain.name());

        Ok(Self {
            id,
            config,
            toolchain,
            resolver,
            correlation,
            history: vec![SessionState::Pending],
            diagnostics: Vec::new(),
            output: Vec::new(),
            failure: None,
            _state: PhantomData,
        })
    }

    /// Add a unit to the compile task. Names are unique per session.
    pub fn register(&mut self, unit: PluginUnit) -> Result<()> {
        if self
            .resolver
            .units()
            .iter()
            .any(|u| u.qualified_name() == unit.qualified_name())
        {
            return Err(SandboxError::DuplicateUnit(
                unit.qualified_name().to_string(),
            ));
        }
        log::debug!("Session {}: registered {}", self.id, unit.qualified_name());
        self.resolver.register_unit(Arc::new(unit));
        Ok(())
    }

    /// Run the toolchain once over every registered unit. Artifacts are
    /// sealed when it returns.
    pub fn compile(self) -> CompileOutcome {
        let mut session: Session<Pending> = self.transition(SessionState::Compiling);
        let units = session.resolver.units().to_vec();
        let toolchain = Arc::clone(&session.toolchain);
        let mut collector = DiagnosticCollector::new();

        let reported_ok = {
            let resolver = &mut session.resolver;
            let collector = &mut collector;
            panic::catch_unwind(AssertUnwindSafe(|| {
                toolchain.compile(&units, resolver, collector)
            }))
        };
        let reported_ok = match reported_ok {
            Ok(ok) => ok,
            Err(payload) => {
                collector.report(Diagnostic {
                    severity: Severity::Error,
                    message: format!("toolchain crashed: {}", panic_message(payload.as_ref())),
                    line: 1,
                    column: 1,
                    unit: None,
                });
                false
            }
        };
        session.resolver.seal();

        let ok = reported_ok && !collector.has_errors();
        let errors = collector.error_count();
        for diagnostic in collector.diagnostics() {
            log::debug!("Session {}: {}", session.id, diagnostic);
        }
        session.diagnostics = collector.into_diagnostics();

        let state = if ok {
            SessionState::CompiledOk
        } else {
            SessionState::CompiledFailed
        };
        log::info!(
            "Session {} compiled {} units: {} ({} errors, {} artifacts)",
            session.id,
            units.len(),
            state,
            errors,
            session.resolver.artifacts().len()
        );
        audit::compile_finished(session.correlation.clone(), state, errors);

        if ok {
            CompileOutcome::Ok(session.transition(state))
        } else {
            CompileOutcome::Failed(session.transition(state))
        }
    }
}

impl Session<CompiledOk> {
    /// Load `entry`, instantiate it and invoke its entry operation on the
    /// caller's thread. Plugin failures and panics end in `ExecutionFailed`;
    /// they never propagate to the host.
    pub fn execute(self, entry: &str) -> Session<Finished> {
        let max_call_depth = self.config.max_call_depth;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            run_entry(
                self.resolver.artifacts(),
                self.resolver.policy(),
                self.resolver.platform(),
                self.correlation.clone(),
                entry,
                max_call_depth,
            )
        }));
        let (output, result) = match outcome {
            Ok(outcome) => outcome,
            Err(payload) => (
                Vec::new(),
                Err(ExecutionFailure::Panicked(panic_message(payload.as_ref()))),
            ),
        };
        self.finish(output, result)
    }

    /// As [`execute`](Self::execute), but on a worker thread. If the deadline
    /// passes first the worker is abandoned, not stopped.
    pub fn execute_with_deadline(self, entry: &str, deadline: Duration) -> Session<Finished> {
        let artifacts = self.resolver.artifacts().clone();
        let policy = self.resolver.policy().clone();
        let platform = Arc::clone(self.resolver.platform());
        let correlation = self.correlation.clone();
        let max_call_depth = self.config.max_call_depth;
        let entry_name = entry.to_string();

        let (tx, rx) = crossbeam_channel::bounded(1);
        let spawned = thread::Builder::new()
            .name(format!("plugin-{}", self.id))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_entry(
                        &artifacts,
                        &policy,
                        &platform,
                        correlation,
                        &entry_name,
                        max_call_depth,
                    )
                }));
                let _ = tx.send(outcome);
            });

        if let Err(e) = spawned {
            return self.finish(
                Vec::new(),
                Err(ExecutionFailure::Fault(format!(
                    "failed to spawn plugin worker: {}",
                    e
                ))),
            );
        }

        let (output, result) = match rx.recv_timeout(deadline) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(payload)) => (
                Vec::new(),
                Err(ExecutionFailure::Panicked(panic_message(payload.as_ref()))),
            ),
            Err(_) => {
                log::warn!(
                    "Session {}: abandoning plugin worker after {:?}",
                    self.id,
                    deadline
                );
                (
                    Vec::new(),
                    Err(ExecutionFailure::DeadlineExceeded {
                        millis: deadline_millis(deadline),
                    }),
                )
            }
        };
        self.finish(output, result)
    }

    fn finish(
        mut self,
        output: Vec<String>,
        result: std::result::Result<(), ExecutionFailure>,
    ) -> Session<Finished> {
        self.output = output;
        let state = match result {
            Ok(()) => SessionState::Executed,
            Err(failure) => {
                log::warn!("Session {}: {}", self.id, failure);
                self.failure = Some(failure);
                SessionState::ExecutionFailed
            }
        };
        let details = match &self.failure {
            Some(failure) => failure.to_string(),
            None => format!("{} lines of output", self.output.len()),
        };
        debug_assert!(state.is_terminal());
        audit::execution_end(self.correlation.clone(), state, details);
        log::info!("Session {} finished: {}", self.id, state);
        self.transition(state)
    }
}

impl Session<Finished> {
    /// Lines the plugin printed
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn failure(&self) -> Option<&ExecutionFailure> {
        self.failure.as_ref()
    }

    pub fn succeeded(&self) -> bool {
        self.state() == SessionState::Executed
    }
}

/// Load, instantiate and invoke one entry. Output is kept even when the
/// plugin fails partway through.
fn run_entry(
    artifacts: &ArtifactSet,
    policy: &LibraryAccessPolicy,
    platform: &PlatformLibrary,
    correlation: CorrelationIds,
    entry: &str,
    max_call_depth: usize,
) -> (Vec<String>, std::result::Result<(), ExecutionFailure>) {
    let loader = IsolatedLoader::new(artifacts, policy, platform, correlation);

    let module = match loader.load(entry) {
        Ok(module) => module,
        Err(e) => return (Vec::new(), Err(ExecutionFailure::Load(e.to_string()))),
    };

    let mut plugin = match ScriptPlugin::instantiate(module, &loader, max_call_depth) {
        Ok(plugin) => plugin,
        Err(failure) => {
            let reason = match failure {
                PluginFailure::Instantiation(reason) => reason,
                other => other.to_string(),
            };
            let error = SandboxError::EntryPointInstantiation {
                name: entry.to_string(),
                reason,
            };
            return (Vec::new(), Err(ExecutionFailure::Instantiation(error.to_string())));
        }
    };

    log::debug!("Invoking {}", plugin.name());
    let result = plugin.execute().map_err(ExecutionFailure::from);
    (plugin.take_output(), result)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
fn deadline_millis(deadline: Duration) -> u64 {
    u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX)
}
