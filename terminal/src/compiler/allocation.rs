use std::{collections::HashMap, fmt};

use itertools::Itertools;
use wam::{Arity, Xn};

use super::{
    ast::{Name, Term, TermList},
    CompileError,
};

/// What a register holds once a term has been flattened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterEntry {
    /// A compound term. Atoms and numbers in argument position are structures of arity 0
    Structure {
        name: Name,
        arity: Arity,
        arguments: Vec<Xn>,
    },
    Variable {
        name: Name,
    },
    /// An atom or number which is the whole term, and so needs no instructions
    Constant,
}

impl RegisterEntry {
    fn structure(name: Name, terms_count: usize) -> Result<Self, CompileError> {
        let arity = Arity::try_from(terms_count).map_err(|_| CompileError::InvalidTerm {
            name: name.clone(),
            arity: terms_count,
        })?;

        Ok(Self::Structure {
            name,
            arity,
            arguments: Vec::new(),
        })
    }
}

/// The registers allocated to the subterms of a term.
///
/// Register `X0` holds the whole term. The remaining registers are handed out by a pre-order walk
/// of the term, where each compound numbers all of its arguments before any of them is visited.
/// Each variable is given a single register, however often it appears.
#[derive(Debug, Clone)]
pub struct RegisterAllocation {
    entries: Vec<RegisterEntry>,
    variables: HashMap<Name, Xn>,
}

impl RegisterAllocation {
    pub fn new(term: &Term) -> Result<Self, CompileError> {
        let mut allocation = Self {
            entries: Vec::new(),
            variables: HashMap::new(),
        };

        let root = match term {
            Term::Atom { .. } | Term::Number { .. } => allocation.push(RegisterEntry::Constant),
            Term::Variable { name } => allocation.allocate_variable(name),
            Term::Callable { name, terms } => {
                allocation.push(RegisterEntry::structure(name.clone(), terms.len())?)
            }
        };

        let mut pending_structures = vec![root];
        let mut result = Ok(());

        term.walk(
            Some(&mut |term: &Term| {
                if result.is_err() {
                    return;
                }

                if let Term::Callable { terms, .. } = term {
                    result = pending_structures
                        .pop()
                        .ok_or(CompileError::UnresolvedRegister { xn: root })
                        .and_then(|xn| allocation.allocate_arguments(xn, terms))
                        .map(|structures| {
                            pending_structures.extend(structures.into_iter().rev())
                        });
                }
            }),
            None,
        );

        result?;

        log::debug!("Allocated registers for {term}:\n{allocation}");

        Ok(allocation)
    }

    fn push(&mut self, entry: RegisterEntry) -> Xn {
        let xn = Xn {
            xn: self.entries.len(),
        };
        self.entries.push(entry);
        xn
    }

    fn allocate_variable(&mut self, name: &Name) -> Xn {
        if let Some(&xn) = self.variables.get(name) {
            return xn;
        }

        let xn = self.push(RegisterEntry::Variable { name: name.clone() });
        self.variables.insert(name.clone(), xn);
        xn
    }

    /// Allocates registers for the arguments of the structure in `xn`, returning the registers
    /// of the arguments which are themselves compound terms
    fn allocate_arguments(&mut self, xn: Xn, terms: &TermList) -> Result<Vec<Xn>, CompileError> {
        let mut arguments = Vec::with_capacity(terms.len());
        let mut structures = Vec::new();

        for term in terms {
            arguments.push(match term {
                Term::Variable { name } => self.allocate_variable(name),
                Term::Atom { name } => self.push(RegisterEntry::structure(name.clone(), 0)?),
                Term::Number { value } => {
                    self.push(RegisterEntry::structure(Name::unspanned(value.to_string()), 0)?)
                }
                Term::Callable { name, terms } => {
                    let argument = self.push(RegisterEntry::structure(name.clone(), terms.len())?);
                    structures.push(argument);
                    argument
                }
            });
        }

        match self.entries.get_mut(xn.xn) {
            Some(RegisterEntry::Structure {
                arguments: entry_arguments,
                ..
            }) => {
                *entry_arguments = arguments;
                Ok(structures)
            }
            _ => Err(CompileError::UnresolvedRegister { xn }),
        }
    }

    pub fn entries(&self) -> &[RegisterEntry] {
        &self.entries
    }

    pub fn entry(&self, xn: Xn) -> Result<&RegisterEntry, CompileError> {
        self.entries
            .get(xn.xn)
            .ok_or(CompileError::UnresolvedRegister { xn })
    }

    pub fn register_count(&self) -> usize {
        self.entries.len()
    }

    pub fn variable(&self, name: &Name) -> Result<Xn, CompileError> {
        self.variables
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnallocatedVariable { name: name.clone() })
    }
}

impl fmt::Display for RegisterAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (xn, entry) in self.entries.iter().enumerate() {
            let xn = Xn { xn };

            match entry {
                RegisterEntry::Structure {
                    name, arguments, ..
                } if arguments.is_empty() => writeln!(f, "{xn} = {name}")?,
                RegisterEntry::Structure {
                    name, arguments, ..
                } => writeln!(f, "{xn} = {name}({})", arguments.iter().join(", "))?,
                RegisterEntry::Variable { name } => writeln!(f, "{xn} = {name}")?,
                RegisterEntry::Constant => writeln!(f, "{xn} = constant")?,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(term: &Term) -> Vec<String> {
        RegisterAllocation::new(term)
            .unwrap()
            .to_string()
            .lines()
            .map(String::from)
            .collect()
    }

    fn query() -> Term {
        Term::callable(
            "p",
            [
                Term::variable("Z"),
                Term::callable("h", [Term::variable("Z"), Term::variable("W")]),
                Term::callable("f", [Term::variable("W")]),
            ],
        )
    }

    fn program() -> Term {
        Term::callable(
            "p",
            [
                Term::callable("f", [Term::variable("X")]),
                Term::callable(
                    "h",
                    [
                        Term::variable("Y"),
                        Term::callable("f", [Term::atom("a")]),
                    ],
                ),
                Term::variable("Y"),
            ],
        )
    }

    #[test]
    fn flattened_query() {
        assert_eq!(
            listing(&query()),
            [
                "X0 = p(X1, X2, X3)",
                "X1 = Z",
                "X2 = h(X1, X4)",
                "X3 = f(X4)",
                "X4 = W",
            ]
        );
    }

    #[test]
    fn flattened_program() {
        assert_eq!(
            listing(&program()),
            [
                "X0 = p(X1, X2, X3)",
                "X1 = f(X4)",
                "X2 = h(X3, X5)",
                "X3 = Y",
                "X4 = X",
                "X5 = f(X6)",
                "X6 = a",
            ]
        );
    }

    #[test]
    fn siblings_before_descendants() {
        let term = Term::callable(
            "a",
            [
                Term::callable("b", [Term::callable("c", [Term::variable("X")])]),
                Term::callable("d", [Term::variable("X")]),
            ],
        );

        assert_eq!(
            listing(&term),
            [
                "X0 = a(X1, X2)",
                "X1 = b(X3)",
                "X2 = d(X4)",
                "X3 = c(X4)",
                "X4 = X",
            ]
        );
    }

    #[test]
    fn variables_share_a_register() {
        let allocation = RegisterAllocation::new(&query()).unwrap();

        assert_eq!(allocation.variable(&Name::unspanned("Z")).unwrap(), Xn { xn: 1 });
        assert_eq!(allocation.variable(&Name::unspanned("W")).unwrap(), Xn { xn: 4 });
        assert!(allocation.variable(&Name::unspanned("Q")).is_err());
        assert_eq!(allocation.register_count(), 5);
    }

    #[test]
    fn bare_terms() {
        assert_eq!(listing(&Term::variable("X")), ["X0 = X"]);
        assert_eq!(listing(&Term::atom("a")), ["X0 = constant"]);
        assert_eq!(listing(&Term::callable("a", Vec::<Term>::new())), ["X0 = a"]);
    }

    #[test]
    fn wide_terms() {
        let terms = (0..300)
            .map(|n| Term::variable(format!("X{}", n % 150)))
            .collect::<Vec<_>>();

        let allocation = RegisterAllocation::new(&Term::callable("f", terms)).unwrap();

        assert_eq!(allocation.register_count(), 151);
        assert!(matches!(
            allocation.entry(Xn { xn: 0 }).unwrap(),
            RegisterEntry::Structure { arity: Arity(300), arguments, .. }
                if arguments.len() == 300 && arguments[299] == (Xn { xn: 150 })
        ));
    }
}
