use core::fmt;

use crate::log_trace;

use super::basic_types::{Arity, Functor, NoneRepresents};

pub mod structure_iteration;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(usize);

impl Address {
    pub fn into_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl NoneRepresents for Address {
    const NONE_REPRESENTS: &'static str = "_";
}

impl core::ops::Add<Arity> for Address {
    type Output = Self;

    fn add(self, Arity(n): Arity) -> Self {
        Self(self.0 + n as usize)
    }
}

/// A tagged heap cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// A reference to another cell. A reference to itself is an unbound variable
    Reference(Address),
    /// A structure, pointing at its functor cell
    Structure(Address),
    /// The functor of a structure, immediately followed by its terms
    Functor(Functor),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference(address) => write!(f, "REF {address}"),
            Self::Structure(address) => write!(f, "STR {address}"),
            Self::Functor(functor) => fmt::Display::fmt(functor, f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermsSlice {
    pub first_term: Address,
    pub terms_count: Arity,
}

impl TermsSlice {
    pub fn addresses(self) -> impl DoubleEndedIterator<Item = Address> + ExactSizeIterator {
        (0..self.terms_count.0).map(move |index| self.first_term + Arity(index))
    }
}

/// A dereferenced term
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceOrValue {
    Reference(Address),
    Structure { functor: Functor, terms: TermsSlice },
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("heap overflow: all {capacity} cells are in use")]
    HeapOverflow { capacity: usize },
    #[error("address {address} is beyond the top of the heap at {heap_top}")]
    AddressOutOfRange { address: Address, heap_top: Address },
    #[error("the cell at {address} is a functor, not a term")]
    NotATerm { address: Address },
    #[error("the cell at {address} is not a structure")]
    NotAStructure { address: Address },
    #[error("cannot bind {a1} to {a2}: neither is an unbound variable")]
    NoFreeVariable { a1: Address, a2: Address },
}

#[derive(Debug)]
pub enum UnificationError {
    UnificationFailure,
    MemoryError(MemoryError),
}

impl From<MemoryError> for UnificationError {
    fn from(inner: MemoryError) -> Self {
        Self::MemoryError(inner)
    }
}

/// A contiguous store of tagged cells, addressed by index.
///
/// Cells are only ever appended, so an address stays valid for the lifetime of the heap.
/// If a capacity is given, pushing past it is a [`MemoryError::HeapOverflow`].
#[derive(Debug, Clone)]
pub struct Heap {
    cells: Vec<Cell>,
    capacity: Option<usize>,
}

impl Heap {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            cells: Vec::new(),
            capacity,
        }
    }

    /// The address of the next cell to be pushed, i.e. the H register
    pub fn top(&self) -> Address {
        Address(self.cells.len())
    }

    pub fn cells(&self) -> impl Iterator<Item = (Address, &Cell)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(|(index, cell)| (Address(index), cell))
    }

    fn reserve(&self, count: usize) -> Result<(), MemoryError> {
        match self.capacity {
            Some(capacity) if self.cells.len() + count > capacity => {
                Err(MemoryError::HeapOverflow { capacity })
            }
            _ => Ok(()),
        }
    }

    fn push(&mut self, cell: Cell) -> Result<Address, MemoryError> {
        self.reserve(1)?;
        let address = self.top();
        log_trace!("{} <= {}", address, cell);
        self.cells.push(cell);
        Ok(address)
    }

    pub fn load(&self, address: Address) -> Result<&Cell, MemoryError> {
        self.cells
            .get(address.0)
            .ok_or(MemoryError::AddressOutOfRange {
                address,
                heap_top: self.top(),
            })
    }

    fn store(&mut self, address: Address, cell: Cell) -> Result<(), MemoryError> {
        let heap_top = self.top();
        let slot = self
            .cells
            .get_mut(address.0)
            .ok_or(MemoryError::AddressOutOfRange { address, heap_top })?;
        log_trace!("{} <= {}", address, cell);
        *slot = cell;
        Ok(())
    }

    /// Pushes an unbound variable
    pub fn new_variable(&mut self) -> Result<Address, MemoryError> {
        let address = self.top();
        self.push(Cell::Reference(address))
    }

    /// Pushes a structure cell and its functor cell, returning the address of the structure cell.
    /// The terms of the structure are pushed afterwards.
    pub fn new_structure(&mut self, f: Functor) -> Result<Address, MemoryError> {
        self.reserve(2)?;
        let address = self.top();
        self.push(Cell::Structure(address + Arity(1)))?;
        self.push(Cell::Functor(f))?;
        Ok(address)
    }

    /// Pushes a copy of the cell at `address`
    pub fn push_copy(&mut self, address: Address) -> Result<Address, MemoryError> {
        let cell = self.load(address)?.clone();
        self.push(cell)
    }

    /// Follows bound references until reaching an unbound variable or a structure
    pub fn deref(&self, mut address: Address) -> Result<Address, MemoryError> {
        loop {
            match self.load(address)? {
                Cell::Reference(reference) if *reference != address => address = *reference,
                Cell::Reference(_) | Cell::Structure(_) => return Ok(address),
                Cell::Functor(_) => return Err(MemoryError::NotATerm { address }),
            }
        }
    }

    pub fn structure_terms(&self, address: Address) -> Result<TermsSlice, MemoryError> {
        match self.get_value(address)? {
            (_, ReferenceOrValue::Structure { terms, .. }) => Ok(terms),
            (address, ReferenceOrValue::Reference(_)) => {
                Err(MemoryError::NotAStructure { address })
            }
        }
    }

    /// Dereferences `address`, returning the address of the term found and the term itself
    pub fn get_value(&self, address: Address) -> Result<(Address, ReferenceOrValue), MemoryError> {
        log_trace!("Looking up memory at {}", address);
        let address = self.deref(address)?;

        let value = match self.load(address)? {
            Cell::Reference(reference) => ReferenceOrValue::Reference(*reference),
            Cell::Structure(functor_address) => match self.load(*functor_address)? {
                Cell::Functor(functor) => ReferenceOrValue::Structure {
                    functor: functor.clone(),
                    terms: TermsSlice {
                        first_term: *functor_address + Arity(1),
                        terms_count: functor.arity,
                    },
                },
                Cell::Reference(_) | Cell::Structure(_) => {
                    return Err(MemoryError::NotAStructure { address })
                }
            },
            Cell::Functor(_) => return Err(MemoryError::NotATerm { address }),
        };

        Ok((address, value))
    }

    fn is_free_variable(&self, address: Address) -> Result<bool, MemoryError> {
        Ok(matches!(self.load(address)?, Cell::Reference(reference) if *reference == address))
    }

    /// Binds two dereferenced terms, at least one of which must be an unbound variable.
    ///
    /// If both are unbound, the newer variable is bound to the older one,
    /// so reference chains always point towards the bottom of the heap.
    pub fn bind(&mut self, a1: Address, a2: Address) -> Result<(), MemoryError> {
        let (variable, value) = match (self.is_free_variable(a1)?, self.is_free_variable(a2)?) {
            (true, true) => (a1.max(a2), a1.min(a2)),
            (true, false) => (a1, a2),
            (false, true) => (a2, a1),
            (false, false) => return Err(MemoryError::NoFreeVariable { a1, a2 }),
        };

        log_trace!("Binding {} to {}", variable, value);

        self.store(variable, Cell::Reference(value))
    }

    /// Unifies the terms at `a1` and `a2`, binding variables as needed.
    ///
    /// There is no occurs check: unifying a variable with a structure containing it
    /// succeeds and produces a cyclic term.
    pub fn unify(&mut self, a1: Address, a2: Address) -> Result<(), UnificationError> {
        log_trace!("Unifying {} and {}", a1, a2);

        let mut pdl = vec![(a1, a2)];

        while let Some((a1, a2)) = pdl.pop() {
            let (a1, v1) = self.get_value(a1)?;
            let (a2, v2) = self.get_value(a2)?;

            if a1 == a2 {
                continue;
            }

            log_trace!("Resolved to {:?} @ {} and {:?} @ {}", v1, a1, v2, a2);

            match (v1, v2) {
                (ReferenceOrValue::Reference(_), _) | (_, ReferenceOrValue::Reference(_)) => {
                    self.bind(a1, a2)?;
                }
                (
                    ReferenceOrValue::Structure {
                        functor: f1,
                        terms: t1,
                    },
                    ReferenceOrValue::Structure {
                        functor: f2,
                        terms: t2,
                    },
                ) => {
                    if f1 != f2 {
                        log_trace!("{} does not match {}", f1, f2);
                        return Err(UnificationError::UnificationFailure);
                    }

                    if t1 != t2 {
                        pdl.extend(t1.addresses().zip(t2.addresses()).rev());
                    }
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (address, cell) in self.cells() {
            writeln!(f, "{address} {cell}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(name: &str, arity: u32) -> Functor {
        Functor::new(arcstr::ArcStr::from(name), Arity(arity))
    }

    fn structure(heap: &mut Heap, functor: Functor, terms: &[Address]) -> Address {
        let address = heap.new_structure(functor).unwrap();
        for &term in terms {
            heap.push_copy(term).unwrap();
        }
        address
    }

    #[test]
    fn new_structure_layout() {
        let mut heap = Heap::new(None);
        let x = heap.new_variable().unwrap();
        let s = structure(&mut heap, f("g", 1), &[x]);

        assert_eq!(heap.load(s).unwrap(), &Cell::Structure(Address(2)));
        assert_eq!(heap.load(Address(2)).unwrap(), &Cell::Functor(f("g", 1)));
        assert_eq!(heap.load(Address(3)).unwrap(), &Cell::Reference(x));
        assert_eq!(heap.top(), Address(4));
        assert_eq!(heap.to_string(), "0 REF 0\n1 STR 2\n2 g/1\n3 REF 0\n");
    }

    #[test]
    fn deref_follows_chains() {
        let mut heap = Heap::new(None);
        let x = heap.new_variable().unwrap();
        let y = heap.new_variable().unwrap();
        let z = heap.new_variable().unwrap();

        heap.bind(z, y).unwrap();
        heap.bind(y, x).unwrap();

        assert_eq!(heap.deref(z).unwrap(), x);
        assert_eq!(heap.deref(x).unwrap(), x);
    }

    #[test]
    fn bind_newer_variable_to_older() {
        let mut heap = Heap::new(None);
        let x = heap.new_variable().unwrap();
        let y = heap.new_variable().unwrap();

        heap.bind(x, y).unwrap();

        assert_eq!(heap.load(y).unwrap(), &Cell::Reference(x));
        assert_eq!(heap.load(x).unwrap(), &Cell::Reference(x));
    }

    #[test]
    fn bind_variable_to_structure() {
        let mut heap = Heap::new(None);
        let s = structure(&mut heap, f("a", 0), &[]);
        let x = heap.new_variable().unwrap();

        heap.bind(s, x).unwrap();

        assert_eq!(heap.load(x).unwrap(), &Cell::Reference(s));
        assert!(matches!(
            heap.bind(s, s),
            Err(MemoryError::NoFreeVariable { .. })
        ));
    }

    #[test]
    fn unify_structures() {
        let mut heap = Heap::new(None);
        let x = heap.new_variable().unwrap();
        let a = structure(&mut heap, f("a", 0), &[]);
        let s1 = structure(&mut heap, f("g", 2), &[x, a]);
        let y = heap.new_variable().unwrap();
        let s2 = structure(&mut heap, f("g", 2), &[a, y]);

        heap.unify(s1, s2).unwrap();

        let (_, x_value) = heap.get_value(x).unwrap();
        let (_, y_value) = heap.get_value(y).unwrap();

        assert!(matches!(x_value, ReferenceOrValue::Structure { functor, .. } if functor == f("a", 0)));
        assert!(matches!(y_value, ReferenceOrValue::Structure { functor, .. } if functor == f("a", 0)));
    }

    #[test]
    fn unify_mismatched_functors() {
        let mut heap = Heap::new(None);
        let x = heap.new_variable().unwrap();
        let s1 = structure(&mut heap, f("g", 1), &[x]);
        let s2 = structure(&mut heap, f("g", 2), &[x, x]);
        let s3 = structure(&mut heap, f("h", 1), &[x]);

        assert!(matches!(
            heap.unify(s1, s2),
            Err(UnificationError::UnificationFailure)
        ));
        assert!(matches!(
            heap.unify(s1, s3),
            Err(UnificationError::UnificationFailure)
        ));
    }

    #[test]
    fn unify_without_occurs_check() {
        let mut heap = Heap::new(None);
        let x = heap.new_variable().unwrap();
        let s = structure(&mut heap, f("g", 1), &[x]);

        heap.unify(x, s).unwrap();

        let (address, _) = heap.get_value(x).unwrap();
        assert_eq!(address, s);
        assert_eq!(heap.structure_terms(x).unwrap().first_term, Address(3));
    }

    fn random_term(
        heap: &mut Heap,
        rng: &mut impl rand::Rng,
        variables: &[Address],
        depth: usize,
    ) -> Address {
        if depth == 0 || rng.gen_bool(0.3) {
            return if !variables.is_empty() && rng.gen_bool(0.5) {
                variables[rng.gen_range(0..variables.len())]
            } else {
                structure(heap, f("a", 0), &[])
            };
        }

        let arity = rng.gen_range(1..=2);
        let name = if rng.gen_bool(0.5) { "f" } else { "g" };

        let terms = (0..arity)
            .map(|_| random_term(heap, rng, variables, depth - 1))
            .collect::<Vec<_>>();

        structure(heap, f(name, arity), &terms)
    }

    #[test]
    fn unification_is_symmetric() {
        let mut rng = rand::thread_rng();

        for _ in 0..500 {
            let mut heap = Heap::new(None);
            let variables = (0..3)
                .map(|_| heap.new_variable().unwrap())
                .collect::<Vec<_>>();

            // A ground right hand side means no cyclic terms can be built
            let t1 = random_term(&mut heap, &mut rng, &variables, 3);
            let t2 = random_term(&mut heap, &mut rng, &[], 3);

            let mut reversed = heap.clone();

            let forwards = heap.unify(t1, t2);
            let backwards = reversed.unify(t2, t1);

            assert_eq!(forwards.is_ok(), backwards.is_ok());

            if forwards.is_ok() {
                let heap_top = heap.top();
                heap.unify(t1, t2).unwrap();
                assert_eq!(heap.top(), heap_top);
            } else {
                assert!(matches!(forwards, Err(UnificationError::UnificationFailure)));
            }
        }
    }

    #[test]
    fn heap_overflow() {
        let mut heap = Heap::new(Some(3));
        heap.new_variable().unwrap();

        assert!(matches!(
            heap.new_structure(f("g", 1)),
            Ok(Address(1))
        ));
        assert!(matches!(
            heap.new_variable(),
            Err(MemoryError::HeapOverflow { capacity: 3 })
        ));
        assert!(matches!(
            heap.new_structure(f("a", 0)),
            Err(MemoryError::HeapOverflow { capacity: 3 })
        ));
        assert_eq!(heap.top(), Address(3));
    }

    #[test]
    fn load_out_of_range() {
        let heap = Heap::new(None);

        assert!(matches!(
            heap.load(Address(0)),
            Err(MemoryError::AddressOutOfRange { .. })
        ));
    }
}
