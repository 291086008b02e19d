use core::fmt;

use super::basic_types::{Functor, Xn};

/// A single L0 instruction.
///
/// The `put_structure`, `set_variable` and `set_value` instructions build a query term on the heap,
/// while `get_structure`, `unify_variable` and `unify_value` match a program term against it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
    PutStructure { f: Functor, xn: Xn },
    SetVariable { xn: Xn },
    SetValue { xn: Xn },
    GetStructure { f: Functor, xn: Xn },
    UnifyVariable { xn: Xn },
    UnifyValue { xn: Xn },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PutStructure { f: functor, xn } => write!(f, "put_structure {functor} {xn}"),
            Self::SetVariable { xn } => write!(f, "set_variable {xn}"),
            Self::SetValue { xn } => write!(f, "set_value {xn}"),
            Self::GetStructure { f: functor, xn } => write!(f, "get_structure {functor} {xn}"),
            Self::UnifyVariable { xn } => write!(f, "unify_variable {xn}"),
            Self::UnifyValue { xn } => write!(f, "unify_value {xn}"),
        }
    }
}
