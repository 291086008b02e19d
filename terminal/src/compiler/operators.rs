use std::collections::HashMap;

use arcstr::ArcStr;

pub type Priority = u16;

pub const MAX_PRIORITY: Priority = 1200;
pub const ARGUMENT_PRIORITY: Priority = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorType {
    Xfx,
    Xfy,
    Yfx,
    Fy,
    Fx,
    Xf,
    Yf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Fixity {
    Prefix,
    Infix,
    Postfix,
}

impl OperatorType {
    fn fixity(self) -> Fixity {
        match self {
            Self::Fy | Self::Fx => Fixity::Prefix,
            Self::Xfx | Self::Xfy | Self::Yfx => Fixity::Infix,
            Self::Xf | Self::Yf => Fixity::Postfix,
        }
    }
}

/// The priorities of an operator and of its arguments.
///
/// An `x` argument must have a strictly lower priority than the operator, a `y` argument may have
/// an equal priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub priority: Priority,
    pub left: Priority,
    pub right: Priority,
}

impl Operator {
    fn new(operator_type: OperatorType, priority: Priority) -> Self {
        let x = priority.saturating_sub(1);
        let y = priority;

        let (left, right) = match operator_type {
            OperatorType::Xfx => (x, x),
            OperatorType::Xfy => (x, y),
            OperatorType::Yfx => (y, x),
            OperatorType::Fy => (0, y),
            OperatorType::Fx => (0, x),
            OperatorType::Xf => (x, 0),
            OperatorType::Yf => (y, 0),
        };

        Self {
            priority,
            left,
            right,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperatorTable(HashMap<(ArcStr, Fixity), Operator>);

impl OperatorTable {
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Defines an operator, replacing any operator of the same name and fixity.
    /// A priority of 0 removes the operator.
    pub fn add(&mut self, priority: Priority, operator_type: OperatorType, name: impl Into<ArcStr>) {
        let key = (name.into(), operator_type.fixity());

        if priority == 0 {
            self.0.remove(&key);
        } else {
            self.0
                .insert(key, Operator::new(operator_type, priority.min(MAX_PRIORITY)));
        }
    }

    fn lookup(&self, name: &str, fixity: Fixity) -> Option<Operator> {
        self.0.get(&(ArcStr::from(name), fixity)).copied()
    }

    pub fn prefix(&self, name: &str) -> Option<Operator> {
        self.lookup(name, Fixity::Prefix)
    }

    pub fn infix(&self, name: &str) -> Option<Operator> {
        self.lookup(name, Fixity::Infix)
    }

    pub fn postfix(&self, name: &str) -> Option<Operator> {
        self.lookup(name, Fixity::Postfix)
    }

    pub fn is_operator(&self, name: &str) -> bool {
        self.prefix(name).is_some() || self.infix(name).is_some() || self.postfix(name).is_some()
    }
}

impl Default for OperatorTable {
    fn default() -> Self {
        use OperatorType::*;

        let mut table = Self::empty();

        for (priority, operator_type, names) in [
            (1200, Xfx, &["-->", ":-"][..]),
            (1200, Fx, &[":-", "?-"][..]),
            (
                1150,
                Fx,
                &[
                    "dynamic",
                    "discontiguous",
                    "initialization",
                    "meta_predicate",
                    "module_transparent",
                    "multifile",
                    "public",
                    "thread_local",
                    "thread_initialization",
                    "volatile",
                ][..],
            ),
            (1100, Xfy, &[";", "|"][..]),
            (1050, Xfy, &["->", "*->"][..]),
            (1000, Xfy, &[","][..]),
            (990, Xfx, &[":="][..]),
            (900, Fy, &["\\+"][..]),
            (
                700,
                Xfx,
                &[
                    "<", "=", "=..", "=@=", "\\=@=", "=:=", "=<", "==", "=\\=", ">", ">=", "@<",
                    "@=<", "@>", "@>=", "\\=", "\\==", "as", "is", ">:<", ":<",
                ][..],
            ),
            (600, Xfy, &[":"][..]),
            (500, Yfx, &["+", "-", "/\\", "\\/", "xor"][..]),
            (500, Fx, &["?"][..]),
            (
                400,
                Yfx,
                &["*", "/", "//", "div", "rdiv", "<<", ">>", "mod", "rem"][..],
            ),
            (200, Xfx, &["**"][..]),
            (200, Xfy, &["^"][..]),
            (200, Fy, &["+", "-", "\\"][..]),
            (100, Yfx, &["."][..]),
            (1, Fx, &["$"][..]),
        ] {
            for &name in names {
                table.add(priority, operator_type, name);
            }
        }

        table
    }
}
