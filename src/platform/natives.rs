//! Native function implementations behind the platform catalogue.
//!
//! Every function here is reachable from plugin code only if the loader links
//! it, which it does only for allowlisted packages.

use crate::runtime::contract::PluginFailure;
use crate::runtime::value::Value;

pub type NativeFn = fn(&mut NativeContext, &[Value]) -> Result<Value, PluginFailure>;

/// Per-execution state visible to natives.
#[derive(Debug, Default)]
pub struct NativeContext {
    plugin: String,
    output: Vec<String>,
}

impl NativeContext {
    pub fn new(plugin: &str) -> Self {
        Self {
            plugin: plugin.to_string(),
            output: Vec::new(),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Lines written through `io.print`
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}

fn int_arg(function: &str, args: &[Value], idx: usize) -> Result<i64, PluginFailure> {
    match args.get(idx) {
        Some(Value::Int(i)) => Ok(*i),
        Some(other) => Err(PluginFailure::Fault(format!(
            "{}: argument {} must be int, got {}",
            function,
            idx + 1,
            other.type_name()
        ))),
        None => Err(PluginFailure::Fault(format!(
            "{}: missing argument {}",
            function,
            idx + 1
        ))),
    }
}

fn str_arg<'a>(function: &str, args: &'a [Value], idx: usize) -> Result<&'a str, PluginFailure> {
    match args.get(idx) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(PluginFailure::Fault(format!(
            "{}: argument {} must be string, got {}",
            function,
            idx + 1,
            other.type_name()
        ))),
        None => Err(PluginFailure::Fault(format!(
            "{}: missing argument {}",
            function,
            idx + 1
        ))),
    }
}

fn first(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or(Value::Unit)
}

// lang

pub(crate) fn lang_fail(_ctx: &mut NativeContext, args: &[Value]) -> Result<Value, PluginFailure> {
    Err(PluginFailure::Signaled(first(args).to_string()))
}

pub(crate) fn lang_to_string(
    _ctx: &mut NativeContext,
    args: &[Value],
) -> Result<Value, PluginFailure> {
    Ok(Value::Str(first(args).to_string()))
}

pub(crate) fn lang_len(_ctx: &mut NativeContext, args: &[Value]) -> Result<Value, PluginFailure> {
    let s = str_arg("len", args, 0)?;
    Ok(Value::Int(s.chars().count() as i64))
}

pub(crate) fn lang_assert(
    _ctx: &mut NativeContext,
    args: &[Value],
) -> Result<Value, PluginFailure> {
    match args.first() {
        Some(Value::Bool(true)) => Ok(Value::Unit),
        Some(Value::Bool(false)) => Err(PluginFailure::Signaled(format!(
            "assertion failed: {}",
            args.get(1).cloned().unwrap_or(Value::Unit)
        ))),
        Some(other) => Err(PluginFailure::Fault(format!(
            "assert: condition must be bool, got {}",
            other.type_name()
        ))),
        None => Err(PluginFailure::Fault("assert: missing condition".to_string())),
    }
}

// util.function

pub(crate) fn function_identity(
    _ctx: &mut NativeContext,
    args: &[Value],
) -> Result<Value, PluginFailure> {
    Ok(first(args))
}

// io

pub(crate) fn io_print(ctx: &mut NativeContext, args: &[Value]) -> Result<Value, PluginFailure> {
    ctx.output.push(first(args).to_string());
    Ok(Value::Unit)
}

// math

pub(crate) fn math_abs(_ctx: &mut NativeContext, args: &[Value]) -> Result<Value, PluginFailure> {
    let v = int_arg("abs", args, 0)?;
    v.checked_abs()
        .map(Value::Int)
        .ok_or_else(|| PluginFailure::Fault("abs: integer overflow".to_string()))
}

pub(crate) fn math_max(_ctx: &mut NativeContext, args: &[Value]) -> Result<Value, PluginFailure> {
    Ok(Value::Int(int_arg("max", args, 0)?.max(int_arg("max", args, 1)?)))
}

pub(crate) fn math_min(_ctx: &mut NativeContext, args: &[Value]) -> Result<Value, PluginFailure> {
    Ok(Value::Int(int_arg("min", args, 0)?.min(int_arg("min", args, 1)?)))
}

pub(crate) fn math_pow(_ctx: &mut NativeContext, args: &[Value]) -> Result<Value, PluginFailure> {
    let base = int_arg("pow", args, 0)?;
    let exp = int_arg("pow", args, 1)?;
    let exp = u32::try_from(exp)
        .map_err(|_| PluginFailure::Fault(format!("pow: invalid exponent {}", exp)))?;
    base.checked_pow(exp)
        .map(Value::Int)
        .ok_or_else(|| PluginFailure::Fault("pow: integer overflow".to_string()))
}

// util.logging

pub(crate) fn logging_info(ctx: &mut NativeContext, args: &[Value]) -> Result<Value, PluginFailure> {
    log::info!(target: "plugin", "[{}] {}", ctx.plugin, first(args));
    Ok(Value::Unit)
}

pub(crate) fn logging_warn(ctx: &mut NativeContext, args: &[Value]) -> Result<Value, PluginFailure> {
    log::warn!(target: "plugin", "[{}] {}", ctx.plugin, first(args));
    Ok(Value::Unit)
}

pub(crate) fn logging_debug(
    ctx: &mut NativeContext,
    args: &[Value],
) -> Result<Value, PluginFailure> {
    log::debug!(target: "plugin", "[{}] {}", ctx.plugin, first(args));
    Ok(Value::Unit)
}

// Host-only packages. Present in the platform, hidden by the default policy.

pub(crate) fn fs_read_to_string(
    _ctx: &mut NativeContext,
    args: &[Value],
) -> Result<Value, PluginFailure> {
    let path = str_arg("read_to_string", args, 0)?;
    std::fs::read_to_string(path)
        .map(Value::Str)
        .map_err(|e| PluginFailure::Fault(format!("read_to_string: {}", e)))
}

pub(crate) fn process_env_var(
    _ctx: &mut NativeContext,
    args: &[Value],
) -> Result<Value, PluginFailure> {
    let name = str_arg("env_var", args, 0)?;
    Ok(Value::Str(std::env::var(name).unwrap_or_default()))
}

pub(crate) fn host_config_secret(
    _ctx: &mut NativeContext,
    _args: &[Value],
) -> Result<Value, PluginFailure> {
    Ok(Value::Str("host-secret".to_string()))
}

pub(crate) fn host_registry(
    _ctx: &mut NativeContext,
    _args: &[Value],
) -> Result<Value, PluginFailure> {
    Ok(Value::Str("host-registry".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_captures_output() {
        let mut ctx = NativeContext::new("contract.A");
        io_print(&mut ctx, &[Value::Int(7)]).unwrap();
        io_print(&mut ctx, &[Value::Str("done".to_string())]).unwrap();
        assert_eq!(ctx.output(), &["7".to_string(), "done".to_string()]);
    }

    #[test]
    fn test_fail_signals() {
        let mut ctx = NativeContext::new("contract.A");
        let err = lang_fail(&mut ctx, &[Value::Str("nope".to_string())]).unwrap_err();
        assert_eq!(err, PluginFailure::Signaled("nope".to_string()));
    }

    #[test]
    fn test_math_type_and_overflow_faults() {
        let mut ctx = NativeContext::new("contract.A");
        assert!(matches!(
            math_max(&mut ctx, &[Value::Int(1), Value::Bool(true)]),
            Err(PluginFailure::Fault(_))
        ));
        assert!(matches!(
            math_pow(&mut ctx, &[Value::Int(2), Value::Int(64)]),
            Err(PluginFailure::Fault(_))
        ));
        assert_eq!(
            math_pow(&mut ctx, &[Value::Int(2), Value::Int(10)]).unwrap(),
            Value::Int(1024)
        );
    }
}
