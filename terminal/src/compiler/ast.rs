use std::{borrow::Borrow, fmt, hash::Hash, ops::Range};

use arcstr::ArcStr;
use num_bigint::BigInt;

/// A name together with where it was found in the source, which does not take part in comparisons
#[derive(Clone)]
pub struct Name {
    value: ArcStr,
    span: Range<usize>,
}

impl Name {
    pub fn new<S: Borrow<str>>(value: S, span: Range<usize>) -> Self {
        Self {
            value: value.borrow().into(),
            span,
        }
    }

    /// A name which doesn't come from any source
    pub fn unspanned<S: Borrow<str>>(value: S) -> Self {
        Self::new(value, 0..0)
    }

    pub fn as_string(&self) -> ArcStr {
        self.value.clone()
    }

    pub fn span(&self) -> &Range<usize> {
        &self.span
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.value.eq(&other.value)
    }
}

impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}

pub const EMPTY_LIST: ArcStr = arcstr::literal!("[]");
pub const LIST_CELL: ArcStr = arcstr::literal!(".");
pub const CURLY_BRACKETS: ArcStr = arcstr::literal!("{}");

/// An arbitrary precision decimal number, `mantissa * 10^-scale`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Number {
    mantissa: BigInt,
    scale: u32,
}

impl Number {
    /// Builds a number from its integral digits and optional fractional digits.
    ///
    /// Trailing fractional zeros are dropped, so numbers with equal values are equal.
    pub fn from_digits(integral: &str, fractional: Option<&str>) -> Option<Self> {
        let fractional = fractional.unwrap_or_default().trim_end_matches('0');
        let mantissa = format!("{integral}{fractional}").parse().ok()?;
        let scale = u32::try_from(fractional.len()).ok()?;
        Some(Self { mantissa, scale })
    }

    pub fn negate(self) -> Self {
        Self {
            mantissa: -self.mantissa,
            scale: self.scale,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return self.mantissa.fmt(f);
        }

        let sign = if self.mantissa.sign() == num_bigint::Sign::Minus {
            "-"
        } else {
            ""
        };

        let digits = self.mantissa.magnitude().to_string();
        let scale = self.scale as usize;
        let digits = format!("{digits:0>width$}", width = scale + 1);
        let (integral, fractional) = digits.split_at(digits.len() - scale);

        write!(f, "{sign}{integral}.{fractional}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Atom { name: Name },
    Number { value: Number },
    Variable { name: Name },
    Callable { name: Name, terms: TermList },
}

impl Term {
    pub fn atom<S: Borrow<str>>(name: S) -> Self {
        Self::Atom {
            name: Name::unspanned(name),
        }
    }

    pub fn variable<S: Borrow<str>>(name: S) -> Self {
        Self::Variable {
            name: Name::unspanned(name),
        }
    }

    pub fn callable<S: Borrow<str>>(name: S, terms: impl Into<TermList>) -> Self {
        Self::Callable {
            name: Name::unspanned(name),
            terms: terms.into(),
        }
    }

    pub fn list(head: Term, tail: Term) -> Self {
        Self::Callable {
            name: Name::unspanned(LIST_CELL),
            terms: TermList::from([head, tail]),
        }
    }

    /// Visits every term depth first, calling `pre` before and `post` after visiting the terms of a callable
    pub fn walk(
        &self,
        mut pre: Option<&mut dyn FnMut(&Term)>,
        mut post: Option<&mut dyn FnMut(&Term)>,
    ) {
        fn walk_term(
            term: &Term,
            pre: &mut Option<&mut dyn FnMut(&Term)>,
            post: &mut Option<&mut dyn FnMut(&Term)>,
        ) {
            if let Some(pre) = pre.as_deref_mut() {
                pre(term);
            }

            if let Term::Callable { terms, .. } = term {
                for term in terms {
                    walk_term(term, pre, post);
                }
            }

            if let Some(post) = post.as_deref_mut() {
                post(term);
            }
        }

        walk_term(self, &mut pre, &mut post)
    }

    /// The names of the variables in the term, in order of first appearance
    pub fn variables(&self) -> Vec<Name> {
        let mut variables = Vec::new();

        self.walk(
            Some(&mut |term: &Term| {
                if let Term::Variable { name } = term {
                    if !variables.contains(name) {
                        variables.push(name.clone());
                    }
                }
            }),
            None,
        );

        variables
    }
}

fn is_solo(name: &str) -> bool {
    matches!(name, "[]" | "{}" | "!" | ";" | ",")
}

pub fn is_symbol_char(c: char) -> bool {
    "+-*/\\^<>=~:.?@#&$".contains(c)
}

fn needs_quotes(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => true,
        Some(first) if first.is_lowercase() => {
            !chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        Some(_) => {
            matches!(name, "," | ".") || !(is_solo(name) || name.chars().all(is_symbol_char))
        }
    }
}

struct DisplayAtom<'a>(&'a str);

impl fmt::Display for DisplayAtom<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !needs_quotes(self.0) {
            return f.write_str(self.0);
        }

        f.write_str("'")?;
        for c in self.0.chars() {
            match c {
                '\'' => f.write_str("\\'")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\t' => f.write_str("\\t")?,
                c => write!(f, "{c}")?,
            }
        }
        f.write_str("'")
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom { name } => DisplayAtom(name.as_ref()).fmt(f),
            Self::Number { value } => value.fmt(f),
            Self::Variable { name } => name.fmt(f),
            Self::Callable { name, terms } => {
                write!(f, "{}(", DisplayAtom(name.as_ref()))?;

                let mut terms = terms.into_iter();

                if let Some(term) = terms.next() {
                    write!(f, "{term}")?;
                }

                for term in terms {
                    write!(f, ", {term}")?;
                }

                write!(f, ")")
            }
        }
    }
}

#[derive(Default, Clone, PartialEq, Eq)]
pub struct TermList(Vec<Term>);

impl fmt::Debug for TermList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::ops::Deref for TermList {
    type Target = [Term];

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl<const N: usize> From<[Term; N]> for TermList {
    fn from(terms: [Term; N]) -> Self {
        Self(terms.into())
    }
}

impl From<Vec<Term>> for TermList {
    fn from(terms: Vec<Term>) -> Self {
        Self(terms)
    }
}

impl<'a> IntoIterator for &'a TermList {
    type Item = &'a Term;
    type IntoIter = std::slice::Iter<'a, Term>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
