//! Compiled module format.
//!
//! This is what the toolchain writes into a `CompiledArtifact` and what the
//! loader materializes. Encoded as JSON; the encoding is opaque to the
//! resolver.

use crate::core::types::Location;
use crate::runtime::value::Value;
use serde::{Deserialize, Serialize};

pub const FORMAT_VERSION: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Const(Value),
    Load(usize),
    Store(usize),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Jump(usize),
    /// Pops a bool; jumps when false
    JumpIfFalse(usize),
    /// Call a function of this module
    Call { function: usize, argc: usize },
    /// Call a platform function by qualified name, at the location the
    /// compiler resolved it in
    CallNative {
        location: Location,
        symbol: String,
        argc: usize,
    },
    /// Call a function of another unit compiled in the same session
    CallUnit {
        unit: String,
        function: String,
        argc: usize,
    },
    Pop,
    Return,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub arity: usize,
    /// Slots including parameters
    pub locals: usize,
    pub code: Vec<Op>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub format_version: u32,
    pub name: String,
    pub contract: String,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    /// Every (location, native symbol) pair referenced by the module,
    /// deduplicated
    pub fn native_imports(&self) -> Vec<(Location, String)> {
        let mut symbols: Vec<(Location, String)> = self
            .functions
            .iter()
            .flat_map(|f| f.code.iter())
            .filter_map(|op| match op {
                Op::CallNative {
                    location, symbol, ..
                } => Some((location.clone(), symbol.clone())),
                _ => None,
            })
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
