use std::{collections::HashSet, fmt};

use itertools::Itertools;
use wam::{Functor, Instruction, Xn};

mod allocation;
mod ast;
mod operators;
mod parser;

use allocation::{RegisterAllocation, RegisterEntry};

pub use ast::{Name, Term, TermList};
pub use operators::OperatorTable;
pub use parser::{parse_term, ParseErrorReport, TermParser};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{name} has {arity} arguments, which is more than a structure can hold")]
    InvalidTerm { name: Name, arity: usize },
    #[error("no register holds {xn}")]
    UnresolvedRegister { xn: Xn },
    #[error("no register has been allocated for the variable {name}")]
    UnallocatedVariable { name: Name },
}

/// The instructions for one term, along with the registers holding its named variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTerm {
    instructions: Vec<Instruction>,
    variables: Vec<(Name, Xn)>,
    register_count: usize,
}

impl CompiledTerm {
    fn new(
        term: &Term,
        allocation: &RegisterAllocation,
        instructions: Vec<Instruction>,
    ) -> Result<Self, CompileError> {
        let variables = term
            .variables()
            .into_iter()
            .map(|name| {
                let xn = allocation.variable(&name)?;
                Ok((name, xn))
            })
            .collect::<Result<_, CompileError>>()?;

        for instruction in instructions.iter() {
            log::debug!("{instruction}");
        }

        Ok(Self {
            instructions,
            variables,
            register_count: allocation.register_count(),
        })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// The named variables of the term in order of first appearance, with their registers
    pub fn variables(&self) -> &[(Name, Xn)] {
        &self.variables
    }

    pub fn register_count(&self) -> usize {
        self.register_count
    }

    /// Each instruction together with its disassembly
    pub fn listing(&self) -> impl Iterator<Item = (Instruction, String)> + '_ {
        self.instructions
            .iter()
            .map(|instruction| (instruction.clone(), instruction.to_string()))
    }
}

impl fmt::Display for CompiledTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, line) in self.listing() {
            writeln!(f, "{line}")?;
        }

        Ok(())
    }
}

/// A query and a program term compiled to run on the same machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    query: CompiledTerm,
    program: CompiledTerm,
}

impl CompiledUnit {
    pub fn query(&self) -> &CompiledTerm {
        &self.query
    }

    pub fn program(&self) -> &CompiledTerm {
        &self.program
    }

    /// The query instructions followed by the program instructions
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.query
            .instructions
            .iter()
            .chain(self.program.instructions.iter())
    }

    pub fn register_count(&self) -> usize {
        self.query.register_count.max(self.program.register_count)
    }

    pub fn listing(&self) -> impl Iterator<Item = (Instruction, String)> + '_ {
        self.query.listing().chain(self.program.listing())
    }
}

impl fmt::Display for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.listing().map(|(_, line)| line).join("\n"))
    }
}

fn functor(name: &Name, arity: wam::Arity) -> Functor {
    Functor::new(name.as_string(), arity)
}

struct QueryCompiler<'a> {
    allocation: &'a RegisterAllocation,
    built: HashSet<Xn>,
    seen_variables: HashSet<Xn>,
    instructions: Vec<Instruction>,
}

impl<'a> QueryCompiler<'a> {
    /// Builds the structure in `xn` on the heap, after first building any structures among its
    /// arguments
    fn build_structure(&mut self, xn: Xn) -> Result<(), CompileError> {
        let allocation = self.allocation;

        let RegisterEntry::Structure {
            name,
            arity,
            arguments,
        } = allocation.entry(xn)?
        else {
            return Ok(());
        };

        if !self.built.insert(xn) {
            return Ok(());
        }

        for &argument in arguments {
            self.build_structure(argument)?;
        }

        self.instructions.push(Instruction::PutStructure {
            f: functor(name, *arity),
            xn,
        });

        for &argument in arguments {
            let instruction = match allocation.entry(argument)? {
                RegisterEntry::Variable { .. } if self.seen_variables.insert(argument) => {
                    Instruction::SetVariable { xn: argument }
                }
                RegisterEntry::Variable { .. } | RegisterEntry::Structure { .. } => {
                    Instruction::SetValue { xn: argument }
                }
                RegisterEntry::Constant => {
                    return Err(CompileError::UnresolvedRegister { xn: argument })
                }
            };

            self.instructions.push(instruction);
        }

        Ok(())
    }
}

/// Compiles a term into instructions which build it on the heap, with the whole term in `X0`.
///
/// Structures are built before the structures containing them.
pub fn compile_query(term: &Term) -> Result<CompiledTerm, CompileError> {
    log::debug!("Compiling query {term}");

    let allocation = RegisterAllocation::new(term)?;

    let mut compiler = QueryCompiler {
        allocation: &allocation,
        built: HashSet::new(),
        seen_variables: HashSet::new(),
        instructions: Vec::new(),
    };

    compiler.build_structure(Xn { xn: 0 })?;

    let instructions = compiler.instructions;

    CompiledTerm::new(term, &allocation, instructions)
}

/// Compiles a term into instructions which unify it with the term in `X0`.
///
/// Structures are matched in register order, the whole term first.
pub fn compile_program(term: &Term) -> Result<CompiledTerm, CompileError> {
    log::debug!("Compiling program {term}");

    let allocation = RegisterAllocation::new(term)?;

    let mut seen_variables = HashSet::new();
    let mut instructions = Vec::new();

    for (xn, entry) in allocation.entries().iter().enumerate() {
        let RegisterEntry::Structure {
            name,
            arity,
            arguments,
        } = entry
        else {
            continue;
        };

        instructions.push(Instruction::GetStructure {
            f: functor(name, *arity),
            xn: Xn { xn },
        });

        for &argument in arguments {
            instructions.push(match allocation.entry(argument)? {
                RegisterEntry::Variable { .. } if !seen_variables.insert(argument) => {
                    Instruction::UnifyValue { xn: argument }
                }
                RegisterEntry::Variable { .. } | RegisterEntry::Structure { .. } => {
                    Instruction::UnifyVariable { xn: argument }
                }
                RegisterEntry::Constant => {
                    return Err(CompileError::UnresolvedRegister { xn: argument })
                }
            });
        }
    }

    CompiledTerm::new(term, &allocation, instructions)
}

pub fn compile(query: &Term, program: &Term) -> Result<CompiledUnit, CompileError> {
    Ok(CompiledUnit {
        query: compile_query(query)?,
        program: compile_program(program)?,
    })
}
