use core::fmt;

use super::{Address, Arity, Heap, MemoryError, TermsSlice};
use crate::log_trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadWriteMode {
    Read,
    Write,
}

impl fmt::Display for ReadWriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

#[derive(Debug, Clone)]
struct InnerState {
    read_write_mode: ReadWriteMode,
    terms: TermsSlice,
    index: Arity,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no structure is being read or written")]
    NotActive,
    #[error("a structure is already being read or written")]
    CurrentlyActive,
    #[error("all {terms_count} terms of the structure have been visited")]
    NoMoreTerms { terms_count: Arity },
    #[error("term {index} was written at {found} rather than {expected}")]
    TermOutOfPlace {
        index: Arity,
        expected: Address,
        found: Address,
    },
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Tracks the structure currently being read or written, i.e. the mode and the S register.
///
/// The state becomes inactive again as soon as the last term of the structure has been visited.
#[derive(Debug, Clone, Default)]
pub struct State(Option<InnerState>);

impl State {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn verify_not_active(&self) -> Result<()> {
        if self.0.is_none() {
            Ok(())
        } else {
            Err(Error::CurrentlyActive)
        }
    }

    pub fn read_write_mode(&self) -> Result<ReadWriteMode> {
        Ok(self.0.as_ref().ok_or(Error::NotActive)?.read_write_mode)
    }

    /// The address of the next term to be visited
    pub fn next_term(&self) -> Option<Address> {
        self.0
            .as_ref()
            .map(|inner_state| inner_state.terms.first_term + inner_state.index)
    }

    pub fn reset(&mut self) {
        self.0 = None;
    }

    fn start(&mut self, read_write_mode: ReadWriteMode, terms: TermsSlice) -> Result<()> {
        self.verify_not_active()?;

        if terms.terms_count == Arity::ZERO {
            log_trace!("Structure has no terms");
            return Ok(());
        }

        self.0 = Some(InnerState {
            read_write_mode,
            terms,
            index: Arity::ZERO,
        });

        Ok(())
    }

    pub fn start_reading(&mut self, terms: TermsSlice) -> Result<()> {
        self.start(ReadWriteMode::Read, terms)
    }

    pub fn start_writing(&mut self, terms: TermsSlice) -> Result<()> {
        self.start(ReadWriteMode::Write, terms)
    }

    fn check_done(&mut self, index: Arity, terms_count: Arity) {
        if index == terms_count {
            log_trace!("Finished iterating over structure");
            self.0 = None;
        }
    }

    fn with_next<T>(&mut self, action: impl FnOnce(Arity, Address) -> Result<T>) -> Result<T> {
        let inner_state = self.0.as_mut().ok_or(Error::NotActive)?;

        let TermsSlice {
            first_term,
            terms_count,
        } = inner_state.terms;

        if inner_state.index == terms_count {
            return Err(Error::NoMoreTerms { terms_count });
        }

        let index = inner_state.index;
        let term_address = first_term + index;

        let result = action(index, term_address)?;

        let index = Arity(index.0 + 1);
        inner_state.index = index;

        self.check_done(index, terms_count);

        Ok(result)
    }

    pub fn read_next(&mut self) -> Result<Address> {
        self.with_next(|index, address| {
            log_trace!("Reading term {} at {}", index, address);
            Ok(address)
        })
    }

    /// Writes the next term with `write`, which must push exactly one cell onto the heap
    pub fn write_next(
        &mut self,
        heap: &mut Heap,
        write: impl FnOnce(&mut Heap) -> core::result::Result<Address, MemoryError>,
    ) -> Result<Address> {
        self.with_next(|index, expected| {
            let found = write(heap)?;
            log_trace!("Wrote term {} at {}", index, found);
            if found == expected {
                Ok(found)
            } else {
                Err(Error::TermOutOfPlace {
                    index,
                    expected,
                    found,
                })
            }
        })
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(inner_state) => write!(
                f,
                "{} mode, S = {}",
                inner_state.read_write_mode,
                inner_state.terms.first_term + inner_state.index
            ),
            None => f.write_str("no active structure"),
        }
    }
}
