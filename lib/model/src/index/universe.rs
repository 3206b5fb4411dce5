use rustc_hash::FxHashMap;
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;
use std::sync::Arc;

/// Requirements for elements stored in an [IndexUniverse].
pub trait IndexElement: Clone + Eq + Hash + Display + Debug + Send + Sync + 'static {}

impl<T> IndexElement for T where T: Clone + Eq + Hash + Display + Debug + Send + Sync + 'static {}

/// An ordered, duplicate-free collection of elements with stable positions.
///
/// A universe is shared (via [Arc]) by every query and plan node of a single decomposition. It
/// never grows in place: once subsets reference a universe, adding elements would silently change
/// the meaning of their bits. Use [IndexUniverse::widen] together with
/// [IndexSubset::rebase](crate::IndexSubset::rebase) if a universe must grow.
///
/// Two universes are considered the same universe iff they are the same allocation.
pub struct IndexUniverse<T> {
    /// The elements in position order.
    elements: Vec<T>,
    /// Maps an element to its position.
    positions: FxHashMap<T, u32>,
}

impl<T: IndexElement> IndexUniverse<T> {
    /// Creates a new universe from `elements`.
    ///
    /// Positions are assigned in iteration order. Duplicates are skipped, the first occurrence
    /// determines the position.
    pub fn new(elements: impl IntoIterator<Item = T>) -> Arc<Self> {
        let mut universe = Self {
            elements: Vec::new(),
            positions: FxHashMap::default(),
        };
        universe.extend(elements);
        Arc::new(universe)
    }

    /// Creates an empty universe.
    pub fn empty() -> Arc<Self> {
        Self::new([])
    }

    #[allow(clippy::expect_used, reason = "Very unrealistic / impossible")]
    fn extend(&mut self, elements: impl IntoIterator<Item = T>) {
        for element in elements {
            if self.positions.contains_key(&element) {
                continue;
            }
            let position = u32::try_from(self.elements.len())
                .expect("Unrealistically large universe (> u32)");
            self.positions.insert(element.clone(), position);
            self.elements.push(element);
        }
    }

    /// Returns a universe that contains all elements of `self` at their current positions,
    /// followed by the elements of `extra` that are not yet part of `self`.
    ///
    /// If `extra` adds nothing, `self` is returned. Otherwise, the result is a *different*
    /// universe and existing subsets must be rebased explicitly.
    pub fn widen(self: &Arc<Self>, extra: impl IntoIterator<Item = T>) -> Arc<Self> {
        let missing = extra
            .into_iter()
            .filter(|e| !self.contains(e))
            .collect::<Vec<_>>();
        if missing.is_empty() {
            return Arc::clone(self);
        }

        let mut universe = Self {
            elements: self.elements.clone(),
            positions: self.positions.clone(),
        };
        universe.extend(missing);
        Arc::new(universe)
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns whether the universe has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns the position of `element`, if it is part of the universe.
    pub fn position(&self, element: &T) -> Option<u32> {
        self.positions.get(element).copied()
    }

    /// Returns whether `element` is part of the universe.
    pub fn contains(&self, element: &T) -> bool {
        self.positions.contains_key(element)
    }

    /// Returns the element at `position`.
    pub fn get(&self, position: u32) -> Option<&T> {
        self.elements.get(position as usize)
    }

    /// Iterates over the elements in position order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.elements.iter()
    }
}

impl<T: Debug> Debug for IndexUniverse<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.elements.iter()).finish()
    }
}

impl<'universe, T: IndexElement> IntoIterator for &'universe IndexUniverse<T> {
    type Item = &'universe T;
    type IntoIter = std::slice::Iter<'universe, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
