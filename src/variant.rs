use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, ScriptError};

/// A value circulating on the VM stack.
///
/// Bytecode literals come in i8/i16/i32 widths but all widen to `Int` on
/// push; the narrow forms exist only on disk. Strings are immutable once
/// pushed. Tables map integer keys to values and live wherever the variant
/// is stored (a local slot, a global, another table).
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Variant {
    #[default]
    Nil,
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
    Table(HashMap<i32, Variant>),
}

impl Variant {
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    #[inline]
    pub fn is_table(&self) -> bool {
        matches!(self, Variant::Table(_))
    }

    /// Nil is false, a bool is itself, everything else counts as true.
    #[inline]
    pub fn truthy(&self) -> bool {
        match self {
            Variant::Nil => false,
            Variant::Bool(b) => *b,
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Variant::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&HashMap<i32, Variant>> {
        match self {
            Variant::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut HashMap<i32, Variant>> {
        match self {
            Variant::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Nil => "nil",
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::Float(_) => "float",
            Variant::String(_) => "string",
            Variant::Table(_) => "table",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Nil => write!(f, "nil"),
            Variant::Bool(b) => write!(f, "{}", b),
            Variant::Int(v) => write!(f, "{}", v),
            Variant::Float(v) => write!(f, "{}", v),
            Variant::String(s) => write!(f, "{:?}", s),
            Variant::Table(t) => write!(f, "table({} entries)", t.len()),
        }
    }
}

fn type_error(op: &str, a: &Variant, b: &Variant) -> ScriptError {
    ScriptError::TypeError(format!("{}: {} and {}", op, a.type_name(), b.type_name()))
}

/// `a + b`. Ints stay ints, floats stay floats, a mixed pair promotes to
/// float, and two strings concatenate.
pub(crate) fn vm_add(a: Variant, b: Variant) -> Result<Variant> {
    Ok(match (a, b) {
        (Variant::Int(a), Variant::Int(b)) => Variant::Int(a.wrapping_add(b)),
        (Variant::Float(a), Variant::Float(b)) => Variant::Float(a + b),
        (Variant::Int(a), Variant::Float(b)) => Variant::Float(a as f32 + b),
        (Variant::Float(a), Variant::Int(b)) => Variant::Float(a + b as f32),
        (Variant::String(a), Variant::String(b)) => Variant::String(a + &b),
        (a, b) => return Err(type_error("add", &a, &b)),
    })
}

pub(crate) fn vm_sub(a: Variant, b: Variant) -> Result<Variant> {
    Ok(match (a, b) {
        (Variant::Int(a), Variant::Int(b)) => Variant::Int(a.wrapping_sub(b)),
        (Variant::Float(a), Variant::Float(b)) => Variant::Float(a - b),
        (Variant::Int(a), Variant::Float(b)) => Variant::Float(a as f32 - b),
        (Variant::Float(a), Variant::Int(b)) => Variant::Float(a - b as f32),
        (a, b) => return Err(type_error("sub", &a, &b)),
    })
}

pub(crate) fn vm_mul(a: Variant, b: Variant) -> Result<Variant> {
    Ok(match (a, b) {
        (Variant::Int(a), Variant::Int(b)) => Variant::Int(a.wrapping_mul(b)),
        (Variant::Float(a), Variant::Float(b)) => Variant::Float(a * b),
        (Variant::Int(a), Variant::Float(b)) => Variant::Float(a as f32 * b),
        (Variant::Float(a), Variant::Int(b)) => Variant::Float(a * b as f32),
        (a, b) => return Err(type_error("mul", &a, &b)),
    })
}

pub(crate) fn vm_div(a: Variant, b: Variant) -> Result<Variant> {
    match &b {
        Variant::Int(0) => return Err(ScriptError::DivideByZero),
        Variant::Float(f) if *f == 0.0 => return Err(ScriptError::DivideByZero),
        _ => {}
    }
    Ok(match (a, b) {
        (Variant::Int(a), Variant::Int(b)) => Variant::Int(a.wrapping_div(b)),
        (Variant::Float(a), Variant::Float(b)) => Variant::Float(a / b),
        (Variant::Int(a), Variant::Float(b)) => Variant::Float(a as f32 / b),
        (Variant::Float(a), Variant::Int(b)) => Variant::Float(a / b as f32),
        (a, b) => return Err(type_error("div", &a, &b)),
    })
}

/// Integer remainder; `mod` is not defined for floats.
pub(crate) fn vm_mod(a: Variant, b: Variant) -> Result<Variant> {
    match (a, b) {
        (Variant::Int(_), Variant::Int(0)) => Err(ScriptError::DivideByZero),
        (Variant::Int(a), Variant::Int(b)) => Ok(Variant::Int(a.wrapping_rem(b))),
        (a, b) => Err(type_error("mod", &a, &b)),
    }
}

pub(crate) fn vm_neg(v: Variant) -> Result<Variant> {
    match v {
        Variant::Int(v) => Ok(Variant::Int(v.wrapping_neg())),
        Variant::Float(v) => Ok(Variant::Float(-v)),
        v => Err(ScriptError::TypeError(format!("neg: {}", v.type_name()))),
    }
}

/// Default comparator for the ordering opcodes. Two ints, two floats or two
/// strings compare; every other pairing is a type fault, ints and floats
/// included.
pub(crate) fn vm_cmp(a: &Variant, b: &Variant) -> Result<Ordering> {
    match (a, b) {
        (Variant::Int(a), Variant::Int(b)) => Ok(a.cmp(b)),
        (Variant::Float(a), Variant::Float(b)) => a
            .partial_cmp(b)
            .ok_or_else(|| ScriptError::TypeError("unordered float comparison".into())),
        (Variant::String(a), Variant::String(b)) => Ok(a.cmp(b)),
        (a, b) => Err(type_error("compare", a, b)),
    }
}
