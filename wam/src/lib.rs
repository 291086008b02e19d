//! An abstract machine for L0, the unification fragment of the Warren Abstract Machine.
//!
//! A [`Machine`] executes [`Instruction`]s against a heap of tagged [`Cell`]s. A query is built
//! on the heap with `put_structure`, `set_variable` and `set_value`, and a program term is then
//! matched against it with `get_structure`, `unify_variable` and `unify_value`.

#[cfg(feature = "logging")]
pub use log;

mod logging;
mod machine;

pub use machine::{
    Address, Arity, Cell, Error, Functor, Instruction, Machine, MachineConfig, MemoryError,
    ReferenceOrValue, RegisterBlockError, StructureIterationError, TermsSlice, Xn,
};
