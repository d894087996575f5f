//! Built-in plugin compiler.
//!
//! Checks every unit of a task and lowers it to a bytecode [`Module`]. Any
//! name the unit does not declare itself is looked up through the resolver,
//! so a package the policy hides is indistinguishable from one that does not
//! exist.

use crate::core::resolver::SymbolResolver;
use crate::core::types::{
    ContractType, Diagnostic, DiagnosticCollector, Entry, EntryKind, LibrarySymbol, Location,
    Severity,
};
use crate::core::unit::PluginUnit;
use crate::runtime::value::Value;
use crate::toolchain::bytecode::{Function, Module, Op, UnaryOp, FORMAT_VERSION};
use crate::toolchain::parser::{
    Expr, ExprKind, FunctionDecl, Import, ParsedUnit, Parser, Span, Stmt,
};
use crate::toolchain::Toolchain;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const ALL_KINDS: &[EntryKind] = &[EntryKind::Source, EntryKind::Compiled, EntryKind::Native];

/// Package searched last for bare function names
const IMPLICIT_PACKAGE: &str = "lang";

/// Memoized listings for one compile task
struct Listings<'r> {
    resolver: &'r mut dyn SymbolResolver,
    cache: HashMap<(Location, String), Vec<(String, Entry)>>,
}

impl<'r> Listings<'r> {
    fn new(resolver: &'r mut dyn SymbolResolver) -> Self {
        Self {
            resolver,
            cache: HashMap::new(),
        }
    }

    /// Entry named `package.name` at `location`, with the location it was
    /// found at
    fn find(
        &mut self,
        location: &Location,
        package: &str,
        name: &str,
    ) -> Option<(Location, Entry)> {
        let key = (location.clone(), package.to_string());
        if !self.cache.contains_key(&key) {
            let kinds: &[EntryKind] = match location {
                Location::SystemModule(_) => &[EntryKind::Native],
                _ => ALL_KINDS,
            };
            let entries = self.resolver.list(location, package, kinds);
            let named = entries
                .into_iter()
                .filter_map(|entry| {
                    self.resolver
                        .infer_name(location, &entry)
                        .map(|name| (name, entry))
                })
                .collect();
            self.cache.insert(key.clone(), named);
        }

        let qualified = format!("{}.{}", package, name);
        self.cache
            .get(&key)
            .and_then(|entries| entries.iter().find(|(n, _)| *n == qualified))
            .map(|(_, entry)| (location.clone(), entry.clone()))
    }

    /// Search the user realm, then every platform module
    fn find_anywhere(&mut self, package: &str, name: &str) -> Option<(Location, Entry)> {
        if let Some(entry) = self.find(&Location::ClassPath, package, name) {
            return Some(entry);
        }
        self.find_in_modules(package, name)
    }

    fn find_in_modules(&mut self, package: &str, name: &str) -> Option<(Location, Entry)> {
        for location in self.resolver.module_locations() {
            if let Some(entry) = self.find(&location, package, name) {
                return Some(entry);
            }
        }
        None
    }
}

struct ImportBinding {
    import: Import,
    entry: Option<(Location, Entry)>,
    used: bool,
}

enum Callee {
    Own { index: usize, arity: usize },
    Native {
        location: Location,
        symbol: LibrarySymbol,
    },
    NotCallable(String),
}

/// Code buffer and lexical scopes for one function
struct FunctionBuilder {
    code: Vec<Op>,
    scopes: Vec<HashMap<String, usize>>,
    slots: usize,
}

impl FunctionBuilder {
    fn new() -> Self {
        Self {
            code: Vec::new(),
            scopes: vec![HashMap::new()],
            slots: 0,
        }
    }

    fn declare(&mut self, name: &str) -> usize {
        let slot = self.slots;
        self.slots += 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
        slot
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn emit(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    fn patch(&mut self, at: usize, target: usize) {
        match &mut self.code[at] {
            Op::Jump(t) | Op::JumpIfFalse(t) => *t = target,
            _ => {}
        }
    }
}

/// Checks and lowers one unit
struct UnitCompiler<'a, 'r> {
    unit: &'a PluginUnit,
    listings: &'a mut Listings<'r>,
    signatures: &'a HashMap<String, Vec<(String, usize)>>,
    diagnostics: &'a mut DiagnosticCollector,
    imports: Vec<ImportBinding>,
    functions: Vec<(String, usize)>,
}

impl<'a, 'r> UnitCompiler<'a, 'r> {
    fn report(&mut self, severity: Severity, span: Span, message: String) {
        self.diagnostics.report(Diagnostic {
            severity,
            message,
            line: span.line.max(1),
            column: span.col.max(1),
            unit: Some(self.unit.qualified_name().to_string()),
        });
    }

    fn error(&mut self, span: Span, message: String) {
        self.report(Severity::Error, span, message);
    }

    fn compile(mut self, parsed: &ParsedUnit) -> Option<Module> {
        self.bind_imports(&parsed.imports);

        let plugin = match &parsed.plugin {
            Some(plugin) => plugin,
            None => {
                self.error(
                    Span::default(),
                    format!("unit `{}` declares no plugin", self.unit.qualified_name()),
                );
                self.warn_unused_imports();
                return None;
            }
        };

        if plugin.name != self.unit.short_name() {
            self.error(
                plugin.span,
                format!(
                    "plugin `{}` must be named `{}` to match its unit",
                    plugin.name,
                    self.unit.short_name()
                ),
            );
        }

        let contract = self.resolve_supertype(&plugin.supertype, plugin.supertype_span);

        let mut seen: BTreeMap<&str, Span> = BTreeMap::new();
        for function in &plugin.functions {
            if seen.insert(function.name.as_str(), function.span).is_some() {
                self.error(
                    function.span,
                    format!("function `{}` is defined more than once", function.name),
                );
            }
            self.functions
                .push((function.name.clone(), function.params.len()));
        }

        match plugin
            .functions
            .iter()
            .find(|f| f.name == ContractType::ENTRY_OPERATION)
        {
            None => self.error(
                plugin.span,
                format!(
                    "plugin `{}` does not implement `{}`",
                    plugin.name,
                    ContractType::ENTRY_OPERATION
                ),
            ),
            Some(entry) if !entry.params.is_empty() => self.error(
                entry.span,
                format!("`{}` must take no parameters", ContractType::ENTRY_OPERATION),
            ),
            Some(_) => {}
        }

        let functions: Vec<Function> = plugin
            .functions
            .iter()
            .map(|function| self.compile_function(function))
            .collect();

        self.warn_unused_imports();

        contract.map(|contract| Module {
            format_version: FORMAT_VERSION,
            name: self.unit.qualified_name().to_string(),
            contract: contract.qualified_name(),
            functions,
        })
    }

    fn bind_imports(&mut self, imports: &[Import]) {
        for import in imports {
            if self.imports.iter().any(|b| b.import.name() == import.name()) {
                self.error(
                    import.span,
                    format!("`{}` is imported more than once", import.name()),
                );
                continue;
            }
            let entry = self
                .listings
                .find_anywhere(&import.package(), import.name());
            if entry.is_none() {
                self.error(
                    import.span,
                    format!("cannot find symbol `{}`", import.qualified_name()),
                );
            }
            self.imports.push(ImportBinding {
                import: import.clone(),
                entry,
                used: false,
            });
        }
    }

    fn warn_unused_imports(&mut self) {
        let unused: Vec<(Span, String)> = self
            .imports
            .iter()
            .filter(|b| b.entry.is_some() && !b.used)
            .map(|b| (b.import.span, b.import.qualified_name()))
            .collect();
        for (span, name) in unused {
            self.report(Severity::Warning, span, format!("unused import `{}`", name));
        }
    }

    /// Entry bound to `name` by an import, marking the import used
    fn imported(&mut self, name: &str) -> Option<(Location, Entry)> {
        let binding = self
            .imports
            .iter_mut()
            .find(|b| b.import.name() == name && b.entry.is_some())?;
        binding.used = true;
        binding.entry.clone()
    }

    fn resolve_supertype(&mut self, path: &[String], span: Span) -> Option<ContractType> {
        let entry = match path {
            [name] => match self.imported(name) {
                Some(entry) => Some(entry),
                None => self
                    .listings
                    .find(&Location::ClassPath, self.unit.package(), name),
            },
            [package @ .., name] => {
                self.listings
                    .find(&Location::ClassPath, &package.join("."), name)
            }
            [] => None,
        };

        match entry {
            Some((_, Entry::Contract(contract))) => Some(contract),
            Some(_) => {
                self.error(
                    span,
                    format!("`{}` is not the plugin contract", path.join(".")),
                );
                None
            }
            None => {
                self.error(span, format!("cannot find type `{}`", path.join(".")));
                None
            }
        }
    }

    fn resolve_call(&mut self, name: &str) -> Option<Callee> {
        if let Some(index) = self.functions.iter().position(|(n, _)| n == name) {
            return Some(Callee::Own {
                index,
                arity: self.functions[index].1,
            });
        }
        let entry = match self.imported(name) {
            Some(entry) => Some(entry),
            None => match self
                .listings
                .find(&Location::ClassPath, self.unit.package(), name)
            {
                Some(entry) => Some(entry),
                None => self.listings.find_in_modules(IMPLICIT_PACKAGE, name),
            },
        };
        entry.map(|(location, entry)| match entry {
            Entry::Library(symbol) => Callee::Native { location, symbol },
            Entry::Unit(unit) => Callee::NotCallable(format!("plugin `{}`", unit.qualified_name())),
            Entry::Contract(contract) => {
                Callee::NotCallable(format!("type `{}`", contract.qualified_name()))
            }
        })
    }

    /// Qualified name of the sibling unit `name` refers to
    fn resolve_unit(&mut self, name: &str, span: Span) -> Option<String> {
        let entry = match self.imported(name) {
            Some(entry) => Some(entry),
            None => self
                .listings
                .find(&Location::ClassPath, self.unit.package(), name),
        };
        match entry {
            Some((_, Entry::Unit(unit))) => Some(unit.qualified_name().to_string()),
            Some((_, Entry::Contract(contract))) => {
                self.error(
                    span,
                    format!(
                        "cannot call functions on the contract type `{}`",
                        contract.qualified_name()
                    ),
                );
                None
            }
            Some((_, Entry::Library(symbol))) => {
                self.error(
                    span,
                    format!("`{}` is a function, not a plugin", symbol.qualified_name()),
                );
                None
            }
            None => {
                self.error(span, format!("cannot find plugin `{}` in this scope", name));
                None
            }
        }
    }

    fn check_arity(&mut self, span: Span, what: &str, expected: usize, supplied: usize) {
        if expected != supplied {
            self.error(
                span,
                format!(
                    "{} takes {} argument{} but {} {} supplied",
                    what,
                    expected,
                    if expected == 1 { "" } else { "s" },
                    supplied,
                    if supplied == 1 { "was" } else { "were" }
                ),
            );
        }
    }

    fn compile_function(&mut self, function: &FunctionDecl) -> Function {
        let mut builder = FunctionBuilder::new();
        for (param, span) in &function.params {
            if builder.scopes[0].contains_key(param) {
                self.error(*span, format!("parameter `{}` is declared twice", param));
            }
            builder.declare(param);
        }

        self.compile_block(&mut builder, &function.body);
        builder.emit(Op::Const(Value::Unit));
        builder.emit(Op::Return);

        Function {
            name: function.name.clone(),
            arity: function.params.len(),
            locals: builder.slots,
            code: builder.code,
        }
    }

    fn compile_block(&mut self, builder: &mut FunctionBuilder, stmts: &[Stmt]) {
        builder.scopes.push(HashMap::new());
        for stmt in stmts {
            self.compile_stmt(builder, stmt);
        }
        builder.scopes.pop();
    }

    fn compile_stmt(&mut self, builder: &mut FunctionBuilder, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, value, .. } => {
                self.compile_expr(builder, value);
                let slot = builder.declare(name);
                builder.emit(Op::Store(slot));
            }
            Stmt::Assign { name, value, span } => {
                self.compile_expr(builder, value);
                match builder.lookup(name) {
                    Some(slot) => {
                        builder.emit(Op::Store(slot));
                    }
                    None => {
                        self.error(*span, format!("cannot find value `{}` in this scope", name));
                        builder.emit(Op::Pop);
                    }
                }
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.compile_expr(builder, cond);
                let to_else = builder.emit(Op::JumpIfFalse(0));
                self.compile_block(builder, then_body);
                let to_end = builder.emit(Op::Jump(0));
                let else_start = builder.here();
                builder.patch(to_else, else_start);
                if let Some(else_body) = else_body {
                    self.compile_block(builder, else_body);
                }
                let end = builder.here();
                builder.patch(to_end, end);
            }
            Stmt::While { cond, body } => {
                let start = builder.here();
                self.compile_expr(builder, cond);
                let exit = builder.emit(Op::JumpIfFalse(0));
                self.compile_block(builder, body);
                builder.emit(Op::Jump(start));
                let end = builder.here();
                builder.patch(exit, end);
            }
            Stmt::Return { value, .. } => {
                match value {
                    Some(value) => self.compile_expr(builder, value),
                    None => {
                        builder.emit(Op::Const(Value::Unit));
                    }
                }
                builder.emit(Op::Return);
            }
            Stmt::Expr(expr) => {
                self.compile_expr(builder, expr);
                builder.emit(Op::Pop);
            }
        }
    }

    fn compile_args(&mut self, builder: &mut FunctionBuilder, args: &[Expr]) {
        for arg in args {
            self.compile_expr(builder, arg);
        }
    }

    fn compile_expr(&mut self, builder: &mut FunctionBuilder, expr: &Expr) {
        match &expr.kind {
            ExprKind::Int(i) => {
                builder.emit(Op::Const(Value::Int(*i)));
            }
            ExprKind::Str(s) => {
                builder.emit(Op::Const(Value::Str(s.clone())));
            }
            ExprKind::Bool(b) => {
                builder.emit(Op::Const(Value::Bool(*b)));
            }
            ExprKind::Var(name) => match builder.lookup(name) {
                Some(slot) => {
                    builder.emit(Op::Load(slot));
                }
                None => {
                    self.error(
                        expr.span,
                        format!("cannot find value `{}` in this scope", name),
                    );
                    builder.emit(Op::Const(Value::Unit));
                }
            },
            ExprKind::Call { name, args } => {
                self.compile_args(builder, args);
                if builder.lookup(name).is_some() {
                    self.error(
                        expr.span,
                        format!("`{}` is a variable, not a function", name),
                    );
                    builder.emit(Op::Const(Value::Unit));
                    return;
                }
                match self.resolve_call(name) {
                    Some(Callee::Own { index, arity }) => {
                        self.check_arity(expr.span, &format!("function `{}`", name), arity, args.len());
                        builder.emit(Op::Call {
                            function: index,
                            argc: args.len(),
                        });
                    }
                    Some(Callee::Native { location, symbol }) => {
                        let qualified = symbol.qualified_name();
                        self.check_arity(
                            expr.span,
                            &format!("function `{}`", qualified),
                            symbol.arity,
                            args.len(),
                        );
                        builder.emit(Op::CallNative {
                            location,
                            symbol: qualified,
                            argc: args.len(),
                        });
                    }
                    Some(Callee::NotCallable(what)) => {
                        self.error(expr.span, format!("{} is not a function", what));
                        builder.emit(Op::Const(Value::Unit));
                    }
                    None => {
                        self.error(
                            expr.span,
                            format!("cannot find function `{}` in this scope", name),
                        );
                        builder.emit(Op::Const(Value::Unit));
                    }
                }
            }
            ExprKind::MemberCall {
                target,
                method,
                args,
            } => {
                self.compile_args(builder, args);
                let own = self.unit.qualified_name().to_string();
                let unit = match self.resolve_unit(target, expr.span) {
                    Some(unit) => unit,
                    None => {
                        builder.emit(Op::Const(Value::Unit));
                        return;
                    }
                };

                let signature = if unit == own {
                    self.functions
                        .iter()
                        .position(|(n, _)| n == method)
                        .map(|index| (Some(index), self.functions[index].1))
                } else {
                    self.signatures.get(&unit).and_then(|functions| {
                        functions
                            .iter()
                            .find(|(n, _)| n == method)
                            .map(|(_, arity)| (None, *arity))
                    })
                };

                match signature {
                    Some((own_index, arity)) => {
                        self.check_arity(
                            expr.span,
                            &format!("function `{}.{}`", target, method),
                            arity,
                            args.len(),
                        );
                        match own_index {
                            Some(index) => builder.emit(Op::Call {
                                function: index,
                                argc: args.len(),
                            }),
                            None => builder.emit(Op::CallUnit {
                                unit,
                                function: method.clone(),
                                argc: args.len(),
                            }),
                        };
                    }
                    None => {
                        self.error(
                            expr.span,
                            format!("plugin `{}` has no function `{}`", target, method),
                        );
                        builder.emit(Op::Const(Value::Unit));
                    }
                }
            }
            ExprKind::Neg(operand) => {
                self.compile_expr(builder, operand);
                builder.emit(Op::Unary(UnaryOp::Neg));
            }
            ExprKind::Not(operand) => {
                self.compile_expr(builder, operand);
                builder.emit(Op::Unary(UnaryOp::Not));
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.compile_expr(builder, lhs);
                self.compile_expr(builder, rhs);
                builder.emit(Op::Binary(*op));
            }
            ExprKind::And(lhs, rhs) => {
                self.compile_expr(builder, lhs);
                let short = builder.emit(Op::JumpIfFalse(0));
                self.compile_expr(builder, rhs);
                let to_end = builder.emit(Op::Jump(0));
                let false_branch = builder.here();
                builder.patch(short, false_branch);
                builder.emit(Op::Const(Value::Bool(false)));
                let end = builder.here();
                builder.patch(to_end, end);
            }
            ExprKind::Or(lhs, rhs) => {
                self.compile_expr(builder, lhs);
                let to_rhs = builder.emit(Op::JumpIfFalse(0));
                builder.emit(Op::Const(Value::Bool(true)));
                let to_end = builder.emit(Op::Jump(0));
                let rhs_start = builder.here();
                builder.patch(to_rhs, rhs_start);
                self.compile_expr(builder, rhs);
                let end = builder.here();
                builder.patch(to_end, end);
            }
        }
    }
}

/// The compiler shipped with the `builtin-toolchain` feature
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptCompiler;

impl ScriptCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Toolchain for ScriptCompiler {
    fn name(&self) -> &'static str {
        "scriptc"
    }

    fn compile(
        &self,
        units: &[Arc<PluginUnit>],
        resolver: &mut dyn SymbolResolver,
        diagnostics: &mut DiagnosticCollector,
    ) -> bool {
        let parsed: Vec<(Arc<PluginUnit>, ParsedUnit)> = units
            .iter()
            .map(|unit| {
                let (ast, errors) = Parser::parse(unit.source());
                for error in errors {
                    diagnostics.report(Diagnostic {
                        severity: Severity::Error,
                        message: error.message,
                        line: error.line,
                        column: error.col,
                        unit: Some(unit.qualified_name().to_string()),
                    });
                }
                (Arc::clone(unit), ast)
            })
            .collect();

        let signatures: HashMap<String, Vec<(String, usize)>> = parsed
            .iter()
            .map(|(unit, ast)| (unit.qualified_name().to_string(), ast.function_signatures()))
            .collect();

        let mut modules = Vec::new();
        {
            let mut listings = Listings::new(&mut *resolver);
            for (unit, ast) in &parsed {
                let compiler = UnitCompiler {
                    unit,
                    listings: &mut listings,
                    signatures: &signatures,
                    diagnostics: &mut *diagnostics,
                    imports: Vec::new(),
                    functions: Vec::new(),
                };
                if let Some(module) = compiler.compile(ast) {
                    modules.push((Arc::clone(unit), module));
                }
            }
        }

        if diagnostics.has_errors() {
            log::debug!(
                "Compilation produced {} errors; no output written",
                diagnostics.error_count()
            );
            return false;
        }

        for (unit, module) in modules {
            let report_failure = |diagnostics: &mut DiagnosticCollector, message: String| {
                diagnostics.report(Diagnostic {
                    severity: Severity::Error,
                    message,
                    line: 1,
                    column: 1,
                    unit: Some(unit.qualified_name().to_string()),
                });
            };

            let bytes = match module.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    report_failure(diagnostics, format!("failed to encode module: {}", e));
                    continue;
                }
            };
            let written = resolver
                .output_for(&Location::ClassOutput, unit.qualified_name(), &unit)
                .and_then(|writer| writer.write_all(&bytes).map_err(Into::into));
            if let Err(e) = written {
                report_failure(diagnostics, format!("failed to write output: {}", e));
            }
        }

        !diagnostics.has_errors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::SandboxConfig;
    use crate::config::policy::LibraryAccessPolicy;
    use crate::core::resolver::SandboxedResolver;
    use crate::observability::audit::CorrelationIds;
    use crate::platform::PlatformLibrary;

    fn compile(units: &[(&str, &str)]) -> (bool, SandboxedResolver, DiagnosticCollector) {
        let config = SandboxConfig::default();
        let policy = LibraryAccessPolicy::from_config(&config);
        let platform = Arc::new(PlatformLibrary::standard(policy.contract().clone()));
        let mut resolver =
            SandboxedResolver::new(platform, policy, CorrelationIds::new("compiler-test"));
        let units: Vec<Arc<PluginUnit>> = units
            .iter()
            .map(|(name, source)| Arc::new(PluginUnit::new(name, *source).unwrap()))
            .collect();
        for unit in &units {
            resolver.register_unit(Arc::clone(unit));
        }
        let mut diagnostics = DiagnosticCollector::new();
        let ok = ScriptCompiler::new().compile(&units, &mut resolver, &mut diagnostics);
        (ok, resolver, diagnostics)
    }

    fn errors(diagnostics: &DiagnosticCollector) -> Vec<String> {
        diagnostics
            .diagnostics()
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.message.clone())
            .collect()
    }

    #[test]
    fn test_compiles_and_writes_module() {
        let source = r#"
            import io.print;
            import math.max;
            plugin MyScript : Plugin {
                fn execute() { print(to_string(max(1, 2))); }
            }
        "#;
        let (ok, resolver, diagnostics) = compile(&[("contract.MyScript", source)]);
        assert!(ok, "{:?}", diagnostics.diagnostics());
        let artifact = resolver.artifacts().get("contract.MyScript").unwrap();
        let module = Module::decode(artifact.bytes()).unwrap();
        assert_eq!(module.contract, "contract.Plugin");
        let base = Location::SystemModule("core.base".to_string());
        assert_eq!(
            module.native_imports(),
            vec![
                (base.clone(), "io.print".to_string()),
                (base.clone(), "lang.to_string".to_string()),
                (base, "math.max".to_string()),
            ]
        );
    }

    #[test]
    fn test_native_calls_name_their_module() {
        let source = r#"
            import util.logging.info;
            plugin Logged : Plugin {
                fn execute() { info(to_string(1)); }
            }
        "#;
        let (ok, resolver, diagnostics) = compile(&[("contract.Logged", source)]);
        assert!(ok, "{:?}", diagnostics.diagnostics());
        let artifact = resolver.artifacts().get("contract.Logged").unwrap();
        let module = Module::decode(artifact.bytes()).unwrap();
        assert_eq!(
            module.native_imports(),
            vec![
                (
                    Location::SystemModule("core.base".to_string()),
                    "lang.to_string".to_string()
                ),
                (
                    Location::SystemModule("core.logging".to_string()),
                    "util.logging.info".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_hidden_package_is_not_found() {
        let source = r#"
            import fs.read_to_string;
            plugin MyScript : Plugin {
                fn execute() { read_to_string("/etc/passwd"); }
            }
        "#;
        let (ok, resolver, diagnostics) = compile(&[("contract.MyScript", source)]);
        assert!(!ok);
        assert_eq!(
            errors(&diagnostics),
            vec![
                "cannot find symbol `fs.read_to_string`".to_string(),
                "cannot find function `read_to_string` in this scope".to_string(),
            ]
        );
        assert!(resolver.artifacts().is_empty());
    }

    #[test]
    fn test_host_symbols_in_contract_package_are_hidden() {
        let source = "plugin MyScript : Plugin { fn execute() { registry(); } }";
        let (ok, _, diagnostics) = compile(&[("contract.MyScript", source)]);
        assert!(!ok);
        assert_eq!(
            errors(&diagnostics),
            vec!["cannot find function `registry` in this scope".to_string()]
        );
    }

    #[test]
    fn test_semantic_checks() {
        let source = r#"
            plugin Wrong : Plugin {
                fn execute(a) { return b; }
                fn helper() { }
                fn helper() { helper(1); }
            }
        "#;
        let (ok, _, diagnostics) = compile(&[("contract.MyScript", source)]);
        assert!(!ok);
        let errors = errors(&diagnostics);
        assert_eq!(errors.len(), 5, "{:?}", errors);
        assert!(errors[0].contains("must be named `MyScript`"));
        assert!(errors[1].contains("defined more than once"));
        assert!(errors[2].contains("must take no parameters"));
        assert!(errors[3].contains("cannot find value `b`"));
        assert!(errors[4].contains("takes 0 arguments but 1 was supplied"));
    }

    #[test]
    fn test_unused_import_is_warning_only() {
        let source = "import math.abs;\nplugin MyScript : Plugin { fn execute() { } }";
        let (ok, _, diagnostics) = compile(&[("contract.MyScript", source)]);
        assert!(ok);
        assert_eq!(diagnostics.diagnostics().len(), 1);
        assert_eq!(diagnostics.diagnostics()[0].severity, Severity::Warning);
        assert_eq!(diagnostics.diagnostics()[0].line, 1);
    }

    #[test]
    fn test_sibling_calls_and_all_or_nothing_output() {
        let main = "import io.print; plugin Main : Plugin { fn execute() { print(to_string(Helper.twice(2))); } }";
        let helper = "plugin Helper : Plugin { fn execute() { } fn twice(x) { return x * 2; } }";
        let (ok, resolver, _) = compile(&[("contract.Main", main), ("contract.Helper", helper)]);
        assert!(ok);
        assert_eq!(
            resolver.artifacts().names(),
            vec!["contract.Helper".to_string(), "contract.Main".to_string()]
        );

        let broken = "plugin Helper : Plugin { fn execute() { missing(); } fn twice(x) { return x; } }";
        let (ok, resolver, _) = compile(&[("contract.Main", main), ("contract.Helper", broken)]);
        assert!(!ok);
        assert!(resolver.artifacts().is_empty());
    }

    #[test]
    fn test_non_contract_package_cannot_see_contract() {
        let source = "plugin Evil : Plugin { fn execute() { } }";
        let (ok, _, diagnostics) = compile(&[("host.Evil", source)]);
        assert!(!ok);
        assert_eq!(
            errors(&diagnostics),
            vec!["cannot find type `Plugin`".to_string()]
        );
    }
}
