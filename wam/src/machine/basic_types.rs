use core::fmt;

use arcstr::ArcStr;

pub trait NoneRepresents: fmt::Display {
    const NONE_REPRESENTS: &'static str;
}

pub struct OptionDisplay<T: NoneRepresents>(pub Option<T>);

impl<T: NoneRepresents> fmt::Display for OptionDisplay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_ref() {
            Some(t) => fmt::Display::fmt(t, f),
            None => f.write_str(T::NONE_REPRESENTS),
        }
    }
}

/// A Register Index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Xn {
    pub xn: usize,
}

impl fmt::Display for Xn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{}", self.xn)
    }
}

/// The number of terms of a structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Arity(pub u32);

impl Arity {
    pub const ZERO: Self = Self(0);
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<usize> for Arity {
    type Error = core::num::TryFromIntError;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        u32::try_from(n).map(Self)
    }
}

/// A name together with an arity, such as `f/2`.
///
/// Two functors are equal only if both their names and their arities are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Functor {
    pub name: ArcStr,
    pub arity: Arity,
}

impl Functor {
    pub fn new(name: impl Into<ArcStr>, arity: Arity) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

impl fmt::Display for Functor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}
