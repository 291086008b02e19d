use std::{collections::HashMap, fmt};

use crossterm::style::Stylize;
use wam::{Address, Arity, Machine, MemoryError, ReferenceOrValue, Xn};

use crate::compiler::{Name, Term, TermList};

/// The addresses held by the registers of named variables at some point during a run
pub fn capture_variables(
    machine: &Machine,
    variables: &[(Name, Xn)],
) -> Result<Vec<(Name, Option<Address>)>, wam::Error> {
    variables
        .iter()
        .map(|(name, xn)| Ok((name.clone(), machine.register(*xn)?)))
        .collect()
}

/// Several structure cells may point at the same functor, so structures are identified by the
/// address of their first term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Identity {
    Variable(Address),
    Structure(Address),
}

impl Identity {
    fn of(value: &ReferenceOrValue) -> Self {
        match value {
            ReferenceOrValue::Reference(address) => Self::Variable(*address),
            ReferenceOrValue::Structure { terms, .. } => Self::Structure(terms.first_term),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(address) | Self::Structure(address) => write!(f, "_G{address}"),
        }
    }
}

struct Reifier<'a> {
    machine: &'a Machine,
    /// The first variable name found for each unbound variable or structure
    names: HashMap<Identity, Name>,
}

impl<'a> Reifier<'a> {
    fn name_of(&self, identity: Identity) -> Name {
        self.names
            .get(&identity)
            .cloned()
            .unwrap_or_else(|| Name::unspanned(identity.to_string()))
    }

    fn reify(&self, address: Address, parents: &mut Vec<Identity>) -> Result<Term, MemoryError> {
        let (_, value) = self.machine.lookup_memory(address)?;
        let identity = Identity::of(&value);

        match value {
            ReferenceOrValue::Reference(_) => Ok(Term::Variable {
                name: self.name_of(identity),
            }),
            ReferenceOrValue::Structure { functor, terms } => {
                if parents.contains(&identity) {
                    return Ok(Term::Variable {
                        name: self.name_of(identity),
                    });
                }

                if functor.arity == Arity::ZERO {
                    return Ok(Term::Atom {
                        name: Name::unspanned(functor.name),
                    });
                }

                parents.push(identity);

                let terms = terms
                    .addresses()
                    .map(|address| self.reify(address, parents))
                    .collect::<Result<Vec<_>, _>>()?;

                parents.pop();

                Ok(Term::Callable {
                    name: Name::unspanned(functor.name),
                    terms: TermList::from(terms),
                })
            }
        }
    }
}

/// The values bound to the named variables of a successful run
#[derive(Debug)]
pub struct Answer {
    bindings: Vec<(Name, Term)>,
}

impl Answer {
    pub fn new(
        machine: &Machine,
        variables: impl IntoIterator<Item = (Name, Option<Address>)>,
    ) -> Result<Self, MemoryError> {
        let mut unique_variables = Vec::<(Name, Option<Address>)>::new();

        // A program variable may share its name with a query variable while being distinct
        for (name, address) in variables {
            if !unique_variables.iter().any(|(seen, _)| seen == &name) {
                unique_variables.push((name, address));
            }
        }

        let mut reifier = Reifier {
            machine,
            names: HashMap::new(),
        };

        for (name, address) in unique_variables.iter() {
            if let Some(address) = address {
                let (_, value) = machine.lookup_memory(*address)?;
                reifier
                    .names
                    .entry(Identity::of(&value))
                    .or_insert_with(|| name.clone());
            }
        }

        let bindings = unique_variables
            .into_iter()
            .map(|(name, address)| {
                let term = match address {
                    Some(address) => reifier.reify(address, &mut Vec::new())?,
                    None => Term::Variable { name: name.clone() },
                };

                Ok((name, term))
            })
            .collect::<Result<_, MemoryError>>()?;

        Ok(Self { bindings })
    }

    /// The bindings which say something, skipping variables which are only bound to themselves
    fn interesting_bindings(&self) -> impl Iterator<Item = &(Name, Term)> + '_ {
        self.bindings.iter().filter(|(name, term)| match term {
            Term::Variable { name: value } => value != name,
            _ => true,
        })
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "yes".green().fmt(f)?;

        for (name, term) in self.interesting_bindings() {
            write!(f, "\n{name} = {term}")?;
        }

        Ok(())
    }
}
