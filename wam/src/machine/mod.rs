use core::fmt;

use crate::{log_debug, log_error, log_trace};

mod basic_types;
mod heap;
mod instructions;

pub use basic_types::{Arity, Functor, Xn};
use basic_types::{NoneRepresents, OptionDisplay};
use heap::{
    structure_iteration::{ReadWriteMode, State as StructureIterationState},
    Heap,
};
pub use heap::{
    structure_iteration::Error as StructureIterationError, Address, Cell, MemoryError,
    ReferenceOrValue, TermsSlice,
};
pub use instructions::Instruction;

#[derive(Debug, thiserror::Error)]
pub enum RegisterBlockError {
    #[error("register {index} does not exist, there are {register_count} registers")]
    IndexOutOfRange { index: Xn, register_count: usize },
    #[error("register {index} has no value")]
    NoValue { index: Xn },
}

#[derive(Debug, Clone)]
pub struct RegisterBlock(Vec<Option<Address>>);

impl RegisterBlock {
    fn new(register_count: usize) -> Self {
        Self(vec![None; register_count])
    }

    fn get(&self, index: Xn) -> Result<Option<Address>, RegisterBlockError> {
        self.0
            .get(index.xn)
            .copied()
            .ok_or(RegisterBlockError::IndexOutOfRange {
                index,
                register_count: self.0.len(),
            })
    }

    fn load(&self, index: Xn) -> Result<Address, RegisterBlockError> {
        log_trace!("Loading Register {}", index);
        self.get(index)?
            .ok_or(RegisterBlockError::NoValue { index })
    }

    fn store(&mut self, index: Xn, address: Address) -> Result<(), RegisterBlockError> {
        log_trace!("{} = {}", index, address);
        let register_count = self.0.len();
        *self
            .0
            .get_mut(index.xn)
            .ok_or(RegisterBlockError::IndexOutOfRange {
                index,
                register_count,
            })? = Some(address);
        Ok(())
    }

    fn iter(&self) -> impl Iterator<Item = (Xn, Option<Address>)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(xn, &address)| (Xn { xn }, address))
    }
}

/// A broken machine invariant, such as an instruction stream reading a register before writing it.
///
/// A failed unification is not an error, see [`Machine::has_failed`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    RegisterBlock(#[from] RegisterBlockError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    StructureIterationState(#[from] StructureIterationError),
    #[error("exceeded the limit of {max_steps} instructions")]
    StepLimitExceeded { max_steps: usize },
}

#[derive(Debug)]
pub enum ExecutionFailure {
    Failed,
    Error(Error),
}

impl From<Error> for ExecutionFailure {
    fn from(err: Error) -> Self {
        Self::Error(err)
    }
}

impl From<RegisterBlockError> for ExecutionFailure {
    fn from(err: RegisterBlockError) -> Self {
        Self::Error(Error::RegisterBlock(err))
    }
}

impl From<MemoryError> for ExecutionFailure {
    fn from(err: MemoryError) -> Self {
        Self::Error(Error::Memory(err))
    }
}

impl From<StructureIterationError> for ExecutionFailure {
    fn from(structure_iteration_error: StructureIterationError) -> Self {
        Self::Error(Error::StructureIterationState(structure_iteration_error))
    }
}

/// Resource limits of a [`Machine`]. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineConfig {
    /// The maximum number of heap cells
    pub heap_capacity: Option<usize>,
    /// The maximum number of instructions executed over the lifetime of the machine
    pub max_steps: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

impl NoneRepresents for Cell {
    const NONE_REPRESENTS: &'static str = "_";
}

pub struct Machine {
    status: Status,
    structure_iteration_state: StructureIterationState,
    registers: RegisterBlock,
    memory: Heap,
    steps: usize,
    max_steps: Option<usize>,
}

impl Machine {
    pub fn new(register_count: usize, config: MachineConfig) -> Self {
        Self {
            status: Status::Running,
            structure_iteration_state: StructureIterationState::new(),
            registers: RegisterBlock::new(register_count),
            memory: Heap::new(config.heap_capacity),
            steps: 0,
            max_steps: config.max_steps,
        }
    }

    /// True once a run has completed or a unification has failed
    pub fn is_finished(&self) -> bool {
        !matches!(self.status, Status::Running)
    }

    pub fn has_failed(&self) -> bool {
        matches!(self.status, Status::Failed)
    }

    /// Executes `instructions` in order, continuing from the current machine state.
    ///
    /// A failed unification stops execution and marks the machine as failed, after which further
    /// runs do nothing. An [`Error`] leaves the machine unfinished.
    pub fn run(&mut self, instructions: &[Instruction]) -> Result<(), Error> {
        if let Status::Failed = self.status {
            log_debug!("Machine has already failed");
            return Ok(());
        }

        self.status = Status::Running;

        for instruction in instructions {
            if let Some(max_steps) = self.max_steps {
                if self.steps >= max_steps {
                    log_error!("Exceeded limit of {} instructions", max_steps);
                    return Err(Error::StepLimitExceeded { max_steps });
                }
            }

            self.steps += 1;

            log_debug!("Instruction #{} : {}", self.steps, instruction);

            match self.execute_instruction(instruction) {
                Ok(()) => (),
                Err(ExecutionFailure::Failed) => {
                    log_debug!("FAIL!");
                    self.status = Status::Failed;
                    return Ok(());
                }
                Err(ExecutionFailure::Error(err)) => {
                    log_error!("Error while executing {}: {}", instruction, err);
                    return Err(err);
                }
            }
        }

        self.structure_iteration_state.verify_not_active()?;

        self.status = Status::Succeeded;

        Ok(())
    }

    fn execute_instruction(&mut self, instruction: &Instruction) -> Result<(), ExecutionFailure> {
        match instruction {
            Instruction::PutStructure { f, xn } => {
                log_trace!("Writing structure {}", f);
                let address = self.new_structure(f)?;
                self.registers.store(*xn, address)?;
                Ok(())
            }
            Instruction::SetVariable { xn } => {
                let address = self
                    .structure_iteration_state
                    .write_next(&mut self.memory, Heap::new_variable)?;
                self.registers.store(*xn, address)?;
                Ok(())
            }
            Instruction::SetValue { xn } => {
                let address = self.registers.load(*xn)?;
                self.structure_iteration_state
                    .write_next(&mut self.memory, |heap| heap.push_copy(address))?;
                Ok(())
            }
            Instruction::GetStructure { f, xn } => {
                let (_, value) = self.get_register_value(*xn)?;
                match value {
                    ReferenceOrValue::Reference(variable_address) => {
                        log_trace!("Writing structure {}", f);

                        let value_address = self.new_structure(f)?;

                        Ok(self.memory.bind(variable_address, value_address)?)
                    }
                    ReferenceOrValue::Structure { functor, terms } => {
                        if functor == *f {
                            log_trace!("Reading structure {}", f);

                            Ok(self.structure_iteration_state.start_reading(terms)?)
                        } else {
                            log_trace!("Expected {}, found {}", f, functor);
                            self.backtrack()
                        }
                    }
                }
            }
            Instruction::UnifyVariable { xn } => self.unify_variable(*xn),
            Instruction::UnifyValue { xn } => self.unify_value(*xn),
        }
    }

    fn get_register_value(&self, index: Xn) -> Result<(Address, ReferenceOrValue), ExecutionFailure> {
        Ok(self.memory.get_value(self.registers.load(index)?)?)
    }

    fn new_structure(&mut self, f: &Functor) -> Result<Address, ExecutionFailure> {
        self.structure_iteration_state.verify_not_active()?;
        let address = self.memory.new_structure(f.clone())?;
        self.structure_iteration_state
            .start_writing(self.memory.structure_terms(address)?)?;

        Ok(address)
    }

    fn unify_variable(&mut self, xn: Xn) -> Result<(), ExecutionFailure> {
        match self.structure_iteration_state.read_write_mode()? {
            ReadWriteMode::Read => {
                let term_address = self.structure_iteration_state.read_next()?;

                self.registers.store(xn, term_address)?;
                Ok(())
            }
            ReadWriteMode::Write => {
                let address = self
                    .structure_iteration_state
                    .write_next(&mut self.memory, Heap::new_variable)?;
                self.registers.store(xn, address)?;
                Ok(())
            }
        }
    }

    fn unify_value(&mut self, xn: Xn) -> Result<(), ExecutionFailure> {
        match self.structure_iteration_state.read_write_mode()? {
            ReadWriteMode::Read => {
                let term_address = self.structure_iteration_state.read_next()?;

                let register_address = self.registers.load(xn)?;

                self.unify(register_address, term_address)
            }
            ReadWriteMode::Write => {
                let address = self.registers.load(xn)?;
                self.structure_iteration_state
                    .write_next(&mut self.memory, |heap| heap.push_copy(address))?;
                Ok(())
            }
        }
    }

    fn unify(&mut self, a1: Address, a2: Address) -> Result<(), ExecutionFailure> {
        match self.memory.unify(a1, a2) {
            Ok(()) => Ok(()),
            Err(heap::UnificationError::UnificationFailure) => self.backtrack(),
            Err(heap::UnificationError::MemoryError(inner)) => Err(inner.into()),
        }
    }

    fn backtrack(&mut self) -> Result<(), ExecutionFailure> {
        self.structure_iteration_state.reset();
        Err(ExecutionFailure::Failed)
    }

    /// The address held by a register, if it has been written
    pub fn register(&self, xn: Xn) -> Result<Option<Address>, Error> {
        Ok(self.registers.get(xn)?)
    }

    pub fn lookup_memory(&self, address: Address) -> Result<(Address, ReferenceOrValue), MemoryError> {
        self.memory.get_value(address)
    }

    pub fn heap_top(&self) -> Address {
        self.memory.top()
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "H: {}", self.memory.top())?;
        writeln!(f, "Structure: {}", self.structure_iteration_state)?;
        writeln!(f, "Registers:")?;
        for (xn, address) in self.registers.iter() {
            let cell = address.and_then(|address| self.memory.load(address).ok().cloned());
            writeln!(f, "{} = {}", xn, OptionDisplay(cell))?;
        }
        writeln!(f, "Heap:")?;
        fmt::Display::fmt(&self.memory, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xn(xn: usize) -> Xn {
        Xn { xn }
    }

    fn f(name: &str, arity: u32) -> Functor {
        Functor::new(name, Arity(arity))
    }

    fn put_structure(name: &str, arity: u32, register: usize) -> Instruction {
        Instruction::PutStructure {
            f: f(name, arity),
            xn: xn(register),
        }
    }

    fn get_structure(name: &str, arity: u32, register: usize) -> Instruction {
        Instruction::GetStructure {
            f: f(name, arity),
            xn: xn(register),
        }
    }

    fn set_variable(register: usize) -> Instruction {
        Instruction::SetVariable { xn: xn(register) }
    }

    fn set_value(register: usize) -> Instruction {
        Instruction::SetValue { xn: xn(register) }
    }

    fn unify_variable(register: usize) -> Instruction {
        Instruction::UnifyVariable { xn: xn(register) }
    }

    fn unify_value(register: usize) -> Instruction {
        Instruction::UnifyValue { xn: xn(register) }
    }

    /// p(Z, h(Z, W), f(W))
    fn query() -> Vec<Instruction> {
        vec![
            put_structure("h", 2, 2),
            set_variable(1),
            set_variable(4),
            put_structure("f", 1, 3),
            set_value(4),
            put_structure("p", 3, 0),
            set_value(1),
            set_value(2),
            set_value(3),
        ]
    }

    /// p(f(X), h(Y, f(a)), Y)
    fn program() -> Vec<Instruction> {
        vec![
            get_structure("p", 3, 0),
            unify_variable(1),
            unify_variable(2),
            unify_variable(3),
            get_structure("f", 1, 1),
            unify_variable(4),
            get_structure("h", 2, 2),
            unify_value(3),
            unify_variable(5),
            get_structure("f", 1, 5),
            unify_variable(6),
            get_structure("a", 0, 6),
        ]
    }

    fn functor_at(machine: &Machine, address: Address) -> Functor {
        match machine.lookup_memory(address).unwrap() {
            (_, ReferenceOrValue::Structure { functor, .. }) => functor,
            (_, ReferenceOrValue::Reference(address)) => panic!("{address} is unbound"),
        }
    }

    #[test]
    fn query_builds_heap() {
        let mut machine = Machine::new(5, MachineConfig::default());
        machine.run(&query()).unwrap();

        assert!(machine.is_finished());
        assert!(!machine.has_failed());
        assert_eq!(
            machine.memory.to_string(),
            "0 STR 1\n1 h/2\n2 REF 2\n3 REF 3\n4 STR 5\n5 f/1\n6 REF 3\n7 STR 8\n8 p/3\n9 REF 2\n10 STR 1\n11 STR 5\n"
        );
        assert_eq!(
            machine.register(xn(0)).unwrap().map(Address::into_usize),
            Some(7)
        );
    }

    #[test]
    fn query_and_program_unify() {
        let mut machine = Machine::new(7, MachineConfig::default());
        machine.run(&query()).unwrap();

        let z = machine.register(xn(1)).unwrap().unwrap();
        let w = machine.register(xn(4)).unwrap().unwrap();

        machine.run(&program()).unwrap();

        assert!(machine.is_finished());
        assert!(!machine.has_failed());

        assert_eq!(functor_at(&machine, w), f("f", 1));
        assert_eq!(functor_at(&machine, z), f("f", 1));

        let (_, w_value) = machine.lookup_memory(w).unwrap();
        let ReferenceOrValue::Structure { terms, .. } = w_value else {
            panic!("W is unbound");
        };
        let a = terms.addresses().next().unwrap();
        assert_eq!(functor_at(&machine, a), f("a", 0));
    }

    #[test]
    fn arity_mismatch_fails() {
        let mut machine = Machine::new(7, MachineConfig::default());

        // p(Z, h(Z, W))
        machine
            .run(&[
                put_structure("h", 2, 2),
                set_variable(1),
                set_variable(3),
                put_structure("p", 2, 0),
                set_value(1),
                set_value(2),
            ])
            .unwrap();

        machine.run(&program()).unwrap();

        assert!(machine.is_finished());
        assert!(machine.has_failed());

        let heap_top = machine.heap_top();
        machine.run(&query()).unwrap();
        assert_eq!(machine.heap_top(), heap_top);
    }

    #[test]
    fn mismatched_atoms_fail() {
        let mut machine = Machine::new(1, MachineConfig::default());
        machine
            .run(&[put_structure("a", 0, 0), get_structure("b", 0, 0)])
            .unwrap();

        assert!(machine.has_failed());

        let mut machine = Machine::new(1, MachineConfig::default());
        machine
            .run(&[put_structure("a", 0, 0), get_structure("a", 0, 0)])
            .unwrap();

        assert!(machine.is_finished());
        assert!(!machine.has_failed());
    }

    #[test]
    fn unresolved_register() {
        let mut machine = Machine::new(2, MachineConfig::default());

        let result = machine.run(&[put_structure("g", 1, 0), set_value(1)]);

        assert!(matches!(
            result,
            Err(Error::RegisterBlock(RegisterBlockError::NoValue { .. }))
        ));
        assert!(!machine.is_finished());
    }

    #[test]
    fn register_out_of_range() {
        let mut machine = Machine::new(1, MachineConfig::default());

        assert!(matches!(
            machine.run(&[put_structure("a", 0, 3)]),
            Err(Error::RegisterBlock(
                RegisterBlockError::IndexOutOfRange { .. }
            ))
        ));
    }

    #[test]
    fn incomplete_structure() {
        let mut machine = Machine::new(2, MachineConfig::default());

        assert!(matches!(
            machine.run(&[put_structure("g", 2, 0), set_variable(1)]),
            Err(Error::StructureIterationState(
                StructureIterationError::CurrentlyActive
            ))
        ));

        let mut machine = Machine::new(2, MachineConfig::default());

        assert!(matches!(
            machine.run(&[unify_variable(1)]),
            Err(Error::StructureIterationState(
                StructureIterationError::NotActive
            ))
        ));
    }

    #[test]
    fn heap_capacity_exceeded() {
        let mut machine = Machine::new(
            7,
            MachineConfig {
                heap_capacity: Some(8),
                max_steps: None,
            },
        );

        assert!(matches!(
            machine.run(&query()),
            Err(Error::Memory(MemoryError::HeapOverflow { capacity: 8 }))
        ));
    }

    #[test]
    fn step_limit_exceeded() {
        let mut machine = Machine::new(
            7,
            MachineConfig {
                heap_capacity: None,
                max_steps: Some(10),
            },
        );

        machine.run(&query()).unwrap();

        assert!(matches!(
            machine.run(&program()),
            Err(Error::StepLimitExceeded { max_steps: 10 })
        ));
        assert!(!machine.is_finished());
    }

    #[test]
    fn dump() {
        let mut machine = Machine::new(2, MachineConfig::default());
        machine
            .run(&[put_structure("g", 1, 0), set_variable(1)])
            .unwrap();

        assert_eq!(
            machine.to_string(),
            "Status: succeeded\nH: 3\nStructure: no active structure\nRegisters:\nX0 = STR 1\nX1 = REF 2\nHeap:\n0 STR 1\n1 g/1\n2 REF 2\n"
        );
    }
}
