//! Layout permutations
//!
//! Layout conversion (channel-first ↔ channel-last) is a fixed permutation of
//! the axis list. Shape-like attributes are permuted by the forward
//! permutation; dimension-index attributes are remapped through the inverse.
//! Applying the wrong one is the classic latent defect in layout passes, so
//! both directions are spelled out here and exercised by tests.

use smallvec::SmallVec;

use super::shape::Shape;

/// A permutation of `{0..rank-1}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Perm(SmallVec<[usize; 4]>);

impl Perm {
    /// Build from an axis order, validating it is a permutation of `0..len`
    pub fn new(order: &[usize]) -> Option<Perm> {
        let mut seen = vec![false; order.len()];
        for &axis in order {
            if axis >= order.len() || seen[axis] {
                return None;
            }
            seen[axis] = true;
        }
        Some(Perm(order.iter().copied().collect()))
    }

    /// Identity permutation of the given rank
    pub fn identity(rank: usize) -> Perm {
        Perm((0..rank).collect())
    }

    /// Channel-last → channel-first axis order for the given rank
    /// (`[0, 3, 1, 2]` at rank 4)
    pub fn channel_last_to_first(rank: usize) -> Perm {
        if rank < 3 {
            return Perm::identity(rank);
        }
        let mut order: SmallVec<[usize; 4]> = SmallVec::with_capacity(rank);
        order.push(0);
        order.push(rank - 1);
        order.extend(1..rank - 1);
        Perm(order)
    }

    /// Channel-first → channel-last axis order for the given rank
    /// (`[0, 2, 3, 1]` at rank 4)
    pub fn channel_first_to_last(rank: usize) -> Perm {
        Perm::channel_last_to_first(rank).inverse()
    }

    /// Rank this permutation applies to
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// The axis order as a slice
    pub fn order(&self) -> &[usize] {
        &self.0
    }

    /// The inverse permutation: `inverse()[self[i]] == i`
    pub fn inverse(&self) -> Perm {
        let mut inv: SmallVec<[usize; 4]> = SmallVec::from_elem(0, self.0.len());
        for (i, &p) in self.0.iter().enumerate() {
            inv[p] = i;
        }
        Perm(inv)
    }

    /// Permute a shape-like list: `out[i] = values[self[i]]`
    ///
    /// For shape-like attributes (and shapes themselves) the forward
    /// permutation applies directly to the list.
    pub fn apply<T: Copy>(&self, values: &[T]) -> Option<Vec<T>> {
        if values.len() != self.0.len() {
            return None;
        }
        Some(self.0.iter().map(|&i| values[i]).collect())
    }

    /// Permute a shape
    pub fn apply_shape(&self, shape: &Shape) -> Option<Shape> {
        if shape.rank() != self.0.len() {
            return None;
        }
        Some(Shape(self.0.iter().map(|&i| shape.0[i]).collect()))
    }

    /// Remap a dimension index through this permutation's inverse
    ///
    /// For dimension-index attributes (an `axis`, a channel dim) the inverse
    /// applies: axis `a` of the old layout lives at `inverse()[a]` in the new
    /// one. Callers holding the forward permutation should call
    /// `perm.inverse().remap_axis(a)`.
    pub fn remap_axis(&self, axis: usize) -> Option<usize> {
        self.0.get(axis).copied()
    }
}
