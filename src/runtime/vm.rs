//! Bytecode interpreter behind [`ScriptPlugin`].
//!
//! Frames live on an explicit stack so the call-depth limit bounds memory
//! rather than the host thread's native stack.

use crate::core::loader::{IsolatedLoader, LoadedModule};
use crate::core::types::ContractType;
use crate::platform::natives::NativeContext;
use crate::runtime::contract::{Plugin, PluginFailure};
use crate::runtime::value::Value;
use crate::toolchain::bytecode::{BinaryOp, Op, UnaryOp};
use std::rc::Rc;

struct Frame {
    module: Rc<LoadedModule>,
    function: usize,
    pc: usize,
    locals: Vec<Value>,
    stack_base: usize,
}

/// A loaded module bound to its session loader
pub struct ScriptPlugin<'l, 'a> {
    module: Rc<LoadedModule>,
    entry: usize,
    loader: &'l IsolatedLoader<'a>,
    context: NativeContext,
    max_call_depth: usize,
}

impl<'l, 'a> std::fmt::Debug for ScriptPlugin<'l, 'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptPlugin")
            .field("module", &self.module.module.name)
            .field("max_call_depth", &self.max_call_depth)
            .finish()
    }
}

impl<'l, 'a> ScriptPlugin<'l, 'a> {
    /// No-argument construction: the module must export a zero-parameter
    /// entry operation.
    pub fn instantiate(
        module: Rc<LoadedModule>,
        loader: &'l IsolatedLoader<'a>,
        max_call_depth: usize,
    ) -> Result<Self, PluginFailure> {
        let entry = module
            .module
            .function_index(ContractType::ENTRY_OPERATION)
            .ok_or_else(|| {
                PluginFailure::Instantiation(format!(
                    "{} does not export `{}`",
                    module.module.name,
                    ContractType::ENTRY_OPERATION
                ))
            })?;
        if module.module.functions[entry].arity != 0 {
            return Err(PluginFailure::Instantiation(format!(
                "{}.{} must take no arguments",
                module.module.name,
                ContractType::ENTRY_OPERATION
            )));
        }

        let context = NativeContext::new(&module.module.name);
        Ok(Self {
            module,
            entry,
            loader,
            context,
            max_call_depth: max_call_depth.max(1),
        })
    }

    /// Lines the plugin printed so far
    pub fn output(&self) -> &[String] {
        self.context.output()
    }

    pub fn take_output(&mut self) -> Vec<String> {
        self.context.take_output()
    }

    fn run(&mut self, module: Rc<LoadedModule>, function: usize) -> Result<Value, PluginFailure> {
        let mut stack: Vec<Value> = Vec::new();
        let locals = vec![Value::Unit; module.module.functions[function].locals];
        let mut frames = vec![Frame {
            module,
            function,
            pc: 0,
            locals,
            stack_base: 0,
        }];

        loop {
            let frame = frames
                .last_mut()
                .ok_or_else(|| fault("no active frame"))?;
            let module = Rc::clone(&frame.module);
            let op = module.module.functions[frame.function]
                .code
                .get(frame.pc)
                .ok_or_else(|| fault("execution ran past the end of a function"))?;
            frame.pc += 1;

            match op {
                Op::Const(value) => stack.push(value.clone()),
                Op::Load(slot) => {
                    let value = frame
                        .locals
                        .get(*slot)
                        .cloned()
                        .ok_or_else(|| fault("local slot out of range"))?;
                    stack.push(value);
                }
                Op::Store(slot) => {
                    let value = pop(&mut stack)?;
                    let target = frame
                        .locals
                        .get_mut(*slot)
                        .ok_or_else(|| fault("local slot out of range"))?;
                    *target = value;
                }
                Op::Unary(op) => {
                    let value = pop(&mut stack)?;
                    stack.push(unary(*op, value)?);
                }
                Op::Binary(op) => {
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    stack.push(binary(*op, lhs, rhs)?);
                }
                Op::Jump(target) => frame.pc = *target,
                Op::JumpIfFalse(target) => match pop(&mut stack)? {
                    Value::Bool(true) => {}
                    Value::Bool(false) => frame.pc = *target,
                    other => {
                        return Err(fault(&format!(
                            "condition must be bool, got {}",
                            other.type_name()
                        )))
                    }
                },
                Op::Call { function, argc } => {
                    let args = pop_args(&mut stack, *argc)?;
                    let callee = Rc::clone(&frame.module);
                    self.push_frame(&mut frames, &stack, callee, *function, args)?;
                }
                Op::CallNative {
                    location,
                    symbol,
                    argc,
                } => {
                    let args = pop_args(&mut stack, *argc)?;
                    let native = module
                        .native(location, symbol)
                        .ok_or_else(|| fault(&format!("symbol {} is not linked", symbol)))?;
                    let result = native(&mut self.context, &args)?;
                    stack.push(result);
                }
                Op::CallUnit {
                    unit,
                    function,
                    argc,
                } => {
                    let args = pop_args(&mut stack, *argc)?;
                    let callee = self
                        .loader
                        .load(unit)
                        .map_err(|e| PluginFailure::Fault(e.to_string()))?;
                    let index = callee.module.function_index(function).ok_or_else(|| {
                        fault(&format!("{} has no function {}", unit, function))
                    })?;
                    self.push_frame(&mut frames, &stack, callee, index, args)?;
                }
                Op::Pop => {
                    pop(&mut stack)?;
                }
                Op::Return => {
                    let value = pop(&mut stack)?;
                    let finished = frames.pop().ok_or_else(|| fault("no active frame"))?;
                    stack.truncate(finished.stack_base);
                    if frames.is_empty() {
                        return Ok(value);
                    }
                    stack.push(value);
                }
            }
        }
    }

    fn push_frame(
        &self,
        frames: &mut Vec<Frame>,
        stack: &[Value],
        module: Rc<LoadedModule>,
        function: usize,
        args: Vec<Value>,
    ) -> Result<(), PluginFailure> {
        if frames.len() >= self.max_call_depth {
            return Err(fault(&format!(
                "call depth limit of {} exceeded",
                self.max_call_depth
            )));
        }
        let target = module
            .module
            .functions
            .get(function)
            .ok_or_else(|| fault("call to unknown function"))?;
        if target.arity != args.len() {
            return Err(fault(&format!(
                "{} expects {} arguments, got {}",
                target.name,
                target.arity,
                args.len()
            )));
        }
        let mut locals = args;
        locals.resize(target.locals.max(target.arity), Value::Unit);
        frames.push(Frame {
            module,
            function,
            pc: 0,
            locals,
            stack_base: stack.len(),
        });
        Ok(())
    }
}

impl<'l, 'a> Plugin for ScriptPlugin<'l, 'a> {
    fn name(&self) -> &str {
        &self.module.module.name
    }

    fn execute(&mut self) -> Result<(), PluginFailure> {
        let module = Rc::clone(&self.module);
        self.run(module, self.entry).map(|_| ())
    }
}

fn fault(message: &str) -> PluginFailure {
    PluginFailure::Fault(message.to_string())
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, PluginFailure> {
    stack.pop().ok_or_else(|| fault("operand stack underflow"))
}

fn pop_args(stack: &mut Vec<Value>, argc: usize) -> Result<Vec<Value>, PluginFailure> {
    if stack.len() < argc {
        return Err(fault("operand stack underflow"));
    }
    Ok(stack.split_off(stack.len() - argc))
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, PluginFailure> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| fault("integer overflow")),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (op, value) => Err(fault(&format!(
            "cannot apply {:?} to {}",
            op,
            value.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, PluginFailure> {
    use BinaryOp::*;

    let overflow = || fault("integer overflow");
    match (op, lhs, rhs) {
        (Eq, l, r) => Ok(Value::Bool(l == r)),
        (Ne, l, r) => Ok(Value::Bool(l != r)),
        (Add, Value::Str(l), Value::Str(r)) => Ok(Value::Str(l + &r)),
        (Add, Value::Int(l), Value::Int(r)) => l.checked_add(r).map(Value::Int).ok_or_else(overflow),
        (Sub, Value::Int(l), Value::Int(r)) => l.checked_sub(r).map(Value::Int).ok_or_else(overflow),
        (Mul, Value::Int(l), Value::Int(r)) => l.checked_mul(r).map(Value::Int).ok_or_else(overflow),
        (Div | Rem, Value::Int(_), Value::Int(0)) => Err(fault("division by zero")),
        (Div, Value::Int(l), Value::Int(r)) => l.checked_div(r).map(Value::Int).ok_or_else(overflow),
        (Rem, Value::Int(l), Value::Int(r)) => l.checked_rem(r).map(Value::Int).ok_or_else(overflow),
        (Lt, Value::Int(l), Value::Int(r)) => Ok(Value::Bool(l < r)),
        (Le, Value::Int(l), Value::Int(r)) => Ok(Value::Bool(l <= r)),
        (Gt, Value::Int(l), Value::Int(r)) => Ok(Value::Bool(l > r)),
        (Ge, Value::Int(l), Value::Int(r)) => Ok(Value::Bool(l >= r)),
        (Lt, Value::Str(l), Value::Str(r)) => Ok(Value::Bool(l < r)),
        (Le, Value::Str(l), Value::Str(r)) => Ok(Value::Bool(l <= r)),
        (Gt, Value::Str(l), Value::Str(r)) => Ok(Value::Bool(l > r)),
        (Ge, Value::Str(l), Value::Str(r)) => Ok(Value::Bool(l >= r)),
        (op, l, r) => Err(fault(&format!(
            "cannot apply {:?} to {} and {}",
            op,
            l.type_name(),
            r.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::policy::LibraryAccessPolicy;
    use crate::core::types::Location;
    use crate::core::unit::ArtifactSet;
    use crate::observability::audit::CorrelationIds;
    use crate::platform::PlatformLibrary;
    use crate::toolchain::bytecode::{Function, Module, FORMAT_VERSION};
    use std::io::Write;

    fn artifacts(functions: Vec<Function>) -> ArtifactSet {
        let module = Module {
            format_version: FORMAT_VERSION,
            name: "contract.T".to_string(),
            contract: "contract.Plugin".to_string(),
            functions,
        };
        let mut set = ArtifactSet::new();
        set.get_or_create("contract.T")
            .write_all(&module.encode().unwrap())
            .unwrap();
        set
    }

    fn base() -> Location {
        Location::SystemModule("core.base".to_string())
    }

    fn execute(functions: Vec<Function>, depth: usize) -> (Result<(), PluginFailure>, Vec<String>) {
        let set = artifacts(functions);
        let policy = LibraryAccessPolicy::from_config(&Default::default());
        let platform = PlatformLibrary::standard(ContractType::new("contract", "Plugin"));
        let loader = IsolatedLoader::new(&set, &policy, &platform, CorrelationIds::new("vm"));
        let module = loader.load("contract.T").unwrap();
        let mut plugin = ScriptPlugin::instantiate(module, &loader, depth).unwrap();
        let result = plugin.execute();
        (result, plugin.take_output())
    }

    fn entry(code: Vec<Op>) -> Function {
        Function {
            name: "execute".to_string(),
            arity: 0,
            locals: 1,
            code,
        }
    }

    #[test]
    fn test_loop_and_print() {
        // let i = 0; while i < 3 { print(to_string(i)); i = i + 1; }
        let code = vec![
            Op::Const(Value::Int(0)),
            Op::Store(0),
            Op::Load(0),
            Op::Const(Value::Int(3)),
            Op::Binary(BinaryOp::Lt),
            Op::JumpIfFalse(17),
            Op::Load(0),
            Op::CallNative {
                location: base(),
                symbol: "lang.to_string".to_string(),
                argc: 1,
            },
            Op::CallNative {
                location: base(),
                symbol: "io.print".to_string(),
                argc: 1,
            },
            Op::Pop,
            Op::Load(0),
            Op::Const(Value::Int(1)),
            Op::Binary(BinaryOp::Add),
            Op::Store(0),
            Op::Jump(2),
            Op::Const(Value::Unit),
            Op::Return,
            Op::Const(Value::Unit),
            Op::Return,
        ];
        let (result, output) = execute(vec![entry(code)], 16);
        assert_eq!(result, Ok(()));
        assert_eq!(output, vec!["0", "1", "2"]);
    }

    #[test]
    fn test_overflow_is_fault() {
        let code = vec![
            Op::Const(Value::Int(i64::MAX)),
            Op::Const(Value::Int(1)),
            Op::Binary(BinaryOp::Add),
            Op::Return,
        ];
        let (result, _) = execute(vec![entry(code)], 16);
        assert_eq!(result, Err(PluginFailure::Fault("integer overflow".to_string())));
    }

    #[test]
    fn test_fail_is_signaled() {
        let code = vec![
            Op::Const(Value::Str("nope".to_string())),
            Op::CallNative {
                location: base(),
                symbol: "lang.fail".to_string(),
                argc: 1,
            },
            Op::Return,
        ];
        let (result, _) = execute(vec![entry(code)], 16);
        assert!(matches!(result, Err(PluginFailure::Signaled(msg)) if msg == "nope"));
    }

    #[test]
    fn test_unbounded_recursion_hits_depth_limit() {
        let code = vec![
            Op::Call {
                function: 0,
                argc: 0,
            },
            Op::Return,
        ];
        let (result, _) = execute(vec![entry(code)], 8);
        assert!(matches!(result, Err(PluginFailure::Fault(msg)) if msg.contains("call depth")));
    }

    #[test]
    fn test_missing_entry_fails_instantiation() {
        let set = artifacts(vec![Function {
            name: "helper".to_string(),
            arity: 0,
            locals: 0,
            code: vec![Op::Const(Value::Unit), Op::Return],
        }]);
        let policy = LibraryAccessPolicy::from_config(&Default::default());
        let platform = PlatformLibrary::standard(ContractType::new("contract", "Plugin"));
        let loader = IsolatedLoader::new(&set, &policy, &platform, CorrelationIds::new("vm"));
        let module = loader.load("contract.T").unwrap();
        assert!(matches!(
            ScriptPlugin::instantiate(module, &loader, 8),
            Err(PluginFailure::Instantiation(_))
        ));
    }
}
