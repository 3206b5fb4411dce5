use crate::index::{IndexElement, IndexUniverse};
use crate::{PlanResult, PlanningError};
use roaring::RoaringBitmap;
use rustc_hash::FxHasher;
use std::borrow::{Borrow, Cow};
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A subset of an [IndexUniverse], represented as a bitset over the universe's positions.
///
/// Set algebra between two subsets of the same universe only touches the bitsets. Operands from
/// different universes are supported by looking up every element, which is considerably slower.
///
/// Mutating operations fail with [PlanningError::ElementNotInUniverse] if they would have to set
/// a bit for an element that is not part of the universe. They never silently drop elements.
///
/// Equality and hashing are defined by the contained elements, not by the representation.
#[derive(Clone)]
pub struct IndexSubset<T> {
    universe: Arc<IndexUniverse<T>>,
    bits: RoaringBitmap,
}

impl<T: IndexElement> IndexSubset<T> {
    /// Creates an empty subset of `universe`.
    pub fn empty(universe: &Arc<IndexUniverse<T>>) -> Self {
        Self {
            universe: Arc::clone(universe),
            bits: RoaringBitmap::new(),
        }
    }

    /// Creates a subset that contains every element of `universe`.
    #[allow(clippy::cast_possible_truncation, reason = "Universe positions are u32")]
    pub fn full(universe: &Arc<IndexUniverse<T>>) -> Self {
        let mut bits = RoaringBitmap::new();
        bits.insert_range(0..universe.len() as u32);
        Self {
            universe: Arc::clone(universe),
            bits,
        }
    }

    /// Creates a subset from `elements`.
    ///
    /// # Errors
    ///
    /// Fails if one of the elements is not part of `universe`.
    pub fn from_elements<E: Borrow<T>>(
        universe: &Arc<IndexUniverse<T>>,
        elements: impl IntoIterator<Item = E>,
    ) -> PlanResult<Self> {
        let mut result = Self::empty(universe);
        for element in elements {
            result.insert(element.borrow())?;
        }
        Ok(result)
    }

    /// Creates the subset of `universe` that contains every element of `elements` that is part of
    /// the universe. Elements outside of the universe are ignored.
    pub fn matching<E: Borrow<T>>(
        universe: &Arc<IndexUniverse<T>>,
        elements: impl IntoIterator<Item = E>,
    ) -> Self {
        let bits = elements
            .into_iter()
            .filter_map(|e| universe.position(e.borrow()))
            .collect();
        Self {
            universe: Arc::clone(universe),
            bits,
        }
    }

    /// Creates the subset of `universe` that contains the elements of `other` that are part of
    /// `universe`.
    ///
    /// If `other` already shares the universe, this is a plain copy of its bits.
    pub fn matching_subset(universe: &Arc<IndexUniverse<T>>, other: &IndexSubset<T>) -> Self {
        if Arc::ptr_eq(universe, &other.universe) {
            return other.clone();
        }
        Self::matching(universe, other.iter())
    }

    /// Creates a subset from raw positions of `universe`.
    ///
    /// # Errors
    ///
    /// Fails if a position lies outside of the universe.
    pub fn from_bits(universe: &Arc<IndexUniverse<T>>, bits: RoaringBitmap) -> PlanResult<Self> {
        if let Some(max) = bits.max() {
            if universe.get(max).is_none() {
                return Err(PlanningError::ElementNotInUniverse {
                    element: format!("position {max}"),
                });
            }
        }
        Ok(Self {
            universe: Arc::clone(universe),
            bits,
        })
    }

    /// Returns the universe of this subset.
    pub fn universe(&self) -> &Arc<IndexUniverse<T>> {
        &self.universe
    }

    /// Returns the raw bitset.
    pub fn bits(&self) -> &RoaringBitmap {
        &self.bits
    }

    /// Returns whether `self` and `other` share the same universe.
    pub fn shares_universe(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.universe, &other.universe)
    }

    /// Returns the number of elements.
    #[allow(clippy::cast_possible_truncation, reason = "Bounded by the universe size")]
    pub fn len(&self) -> usize {
        self.bits.len() as usize
    }

    /// Returns whether the subset has no elements.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Returns whether `element` is part of this subset.
    pub fn contains(&self, element: &T) -> bool {
        self.universe
            .position(element)
            .is_some_and(|p| self.bits.contains(p))
    }

    /// Returns whether the element at `position` is part of this subset.
    pub fn contains_position(&self, position: u32) -> bool {
        self.bits.contains(position)
    }

    /// Inserts `element`. Returns whether the element was newly inserted.
    ///
    /// # Errors
    ///
    /// Fails if `element` is not part of the universe.
    pub fn insert(&mut self, element: &T) -> PlanResult<bool> {
        let position = self
            .universe
            .position(element)
            .ok_or_else(|| PlanningError::not_in_universe(element))?;
        Ok(self.bits.insert(position))
    }

    /// Removes `element`. Returns whether the element was part of the subset.
    pub fn remove(&mut self, element: &T) -> bool {
        self.universe
            .position(element)
            .is_some_and(|p| self.bits.remove(p))
    }

    /// Removes all elements.
    pub fn clear(&mut self) {
        self.bits.clear();
    }

    /// Adds all elements of `other` to `self`.
    pub fn union_with(&mut self, other: &Self) -> PlanResult<()> {
        let other = self.translate(other)?;
        self.bits |= &*other;
        Ok(())
    }

    /// Retains only elements that are also part of `other`.
    pub fn intersect_with(&mut self, other: &Self) -> PlanResult<()> {
        let other = self.translate(other)?;
        self.bits &= &*other;
        Ok(())
    }

    /// Removes all elements of `other` from `self`.
    pub fn subtract(&mut self, other: &Self) -> PlanResult<()> {
        let other = self.translate(other)?;
        self.bits -= &*other;
        Ok(())
    }

    /// Retains the elements that are either in `self` or in `other`, but not in both.
    pub fn symmetric_difference_with(&mut self, other: &Self) -> PlanResult<()> {
        let other = self.translate(other)?;
        self.bits ^= &*other;
        Ok(())
    }

    /// Returns the union of `self` and `other`.
    pub fn union(&self, other: &Self) -> PlanResult<Self> {
        let mut result = self.clone();
        result.union_with(other)?;
        Ok(result)
    }

    /// Returns the intersection of `self` and `other`.
    pub fn intersection(&self, other: &Self) -> PlanResult<Self> {
        let mut result = self.clone();
        result.intersect_with(other)?;
        Ok(result)
    }

    /// Returns the elements of `self` that are not part of `other`.
    pub fn difference(&self, other: &Self) -> PlanResult<Self> {
        let mut result = self.clone();
        result.subtract(other)?;
        Ok(result)
    }

    /// Returns whether every element of `self` is part of `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        if self.shares_universe(other) {
            return self.bits.is_subset(&other.bits);
        }
        self.iter().all(|e| other.contains(e))
    }

    /// Returns whether `self` and `other` have no element in common.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        if self.shares_universe(other) {
            return self.bits.is_disjoint(&other.bits);
        }
        !self.iter().any(|e| other.contains(e))
    }

    /// Iterates over the elements in position order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.bits.iter().filter_map(|p| self.universe.get(p))
    }

    /// Iterates over the positions of the elements.
    pub fn positions(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter()
    }

    /// Moves this subset onto `universe`, typically a universe obtained from
    /// [IndexUniverse::widen].
    ///
    /// # Errors
    ///
    /// Fails if one of the elements is not part of `universe`.
    pub fn rebase(&self, universe: &Arc<IndexUniverse<T>>) -> PlanResult<Self> {
        if Arc::ptr_eq(universe, &self.universe) {
            return Ok(self.clone());
        }
        Self::from_elements(universe, self.iter())
    }

    /// Returns the bits of `other` in terms of `self`'s universe.
    fn translate<'other>(&self, other: &'other Self) -> PlanResult<Cow<'other, RoaringBitmap>> {
        if self.shares_universe(other) {
            return Ok(Cow::Borrowed(&other.bits));
        }

        let bits = other
            .iter()
            .map(|e| {
                self.universe
                    .position(e)
                    .ok_or_else(|| PlanningError::not_in_universe(e))
            })
            .collect::<PlanResult<RoaringBitmap>>()?;
        Ok(Cow::Owned(bits))
    }
}

impl<T: IndexElement> PartialEq for IndexSubset<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.shares_universe(other) {
            return self.bits == other.bits;
        }
        self.len() == other.len() && self.is_subset(other)
    }
}

impl<T: IndexElement> Eq for IndexSubset<T> {}

impl<T: IndexElement> Hash for IndexSubset<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Order-independent so that equal subsets of different universes hash equally.
        let combined = self.iter().fold(0_u64, |acc, element| {
            let mut hasher = FxHasher::default();
            element.hash(&mut hasher);
            acc.wrapping_add(hasher.finish())
        });
        state.write_usize(self.len());
        state.write_u64(combined);
    }
}

impl<T: IndexElement> Debug for IndexSubset<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: IndexElement> Display for IndexSubset<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, element) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{element}")?;
        }
        write!(f, "}}")
    }
}
