// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeSet;

use crate::error::{invalid, InvalidDimIndicesKind, IpfError};

/// Declares, for each margin or factor in a system, which axes of the
/// full-rank array it ranges over, and in what order.
///
/// `idx = [S_1, ..., S_J]` where each `S_j` is a non-empty sequence of
/// 1-based axis labels. Every axis `1..=rank()` must be covered by at
/// least one group (completeness); within a group axes are unique; and no
/// two groups may declare the same *set* of axes, though individual axes
/// may be shared between groups of differing composition.
///
/// A `DimIndices` is immutable once built and is cheap to clone: it owns
/// only a short list of small vectors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DimIndices {
    groups: Vec<Vec<usize>>,
    rank: usize,
}

/// Converts a bare axis label or a sequence of axis labels into one group
/// of a [`DimIndices`] specification.
///
/// Implemented for `usize` (a singleton group) and for anything that
/// converts into `Vec<usize>`, so callers can write `3` or `[1, 3]`
/// interchangeably when building a `DimIndices`.
pub trait IntoAxisGroup {
    fn into_axis_group(self) -> Vec<usize>;
}

impl IntoAxisGroup for usize {
    fn into_axis_group(self) -> Vec<usize> {
        vec![self]
    }
}

impl IntoAxisGroup for Vec<usize> {
    fn into_axis_group(self) -> Vec<usize> {
        self
    }
}

impl IntoAxisGroup for &[usize] {
    fn into_axis_group(self) -> Vec<usize> {
        self.to_vec()
    }
}

impl<const N: usize> IntoAxisGroup for [usize; N] {
    fn into_axis_group(self) -> Vec<usize> {
        self.to_vec()
    }
}

impl DimIndices {
    /// Builds and validates a `DimIndices` from a sequence of axis groups.
    ///
    /// Each element is either a bare axis label (promoted to a length-1
    /// group) or a sequence of labels. Fails with [`IpfError`] naming the
    /// missing axes or the offending group on any violation of the
    /// completeness, per-group-uniqueness, or between-group-uniqueness
    /// invariants.
    pub fn build<G: IntoAxisGroup>(raw: impl IntoIterator<Item = G>) -> Result<Self, IpfError> {
        let groups: Vec<Vec<usize>> = raw.into_iter().map(IntoAxisGroup::into_axis_group).collect();

        if groups.is_empty() {
            return Err(invalid(InvalidDimIndicesKind::Empty));
        }

        for (j, group) in groups.iter().enumerate() {
            let mut seen = BTreeSet::new();
            for &axis in group {
                if !seen.insert(axis) {
                    return Err(invalid(InvalidDimIndicesKind::DuplicateAxisInGroup { group: j, axis }));
                }
            }
        }

        for i in 0..groups.len() {
            let set_i: BTreeSet<usize> = groups[i].iter().copied().collect();
            for j in (i + 1)..groups.len() {
                let set_j: BTreeSet<usize> = groups[j].iter().copied().collect();
                if set_i == set_j {
                    return Err(invalid(InvalidDimIndicesKind::DuplicateGroupSet { first: i, second: j }));
                }
            }
        }

        let rank = groups.iter().flatten().copied().max().unwrap_or(0);
        let covered: BTreeSet<usize> = groups.iter().flatten().copied().collect();
        let missing: Vec<usize> = (1..=rank).filter(|a| !covered.contains(a)).collect();
        if !missing.is_empty() {
            return Err(invalid(InvalidDimIndicesKind::MissingAxes(missing)));
        }

        Ok(DimIndices { groups, rank })
    }

    /// Builds a `DimIndices` assuming non-overlapping axes assigned in
    /// traversal order: the first array's axes become `1..=r_1`, the
    /// second's become `r_1+1..=r_1+r_2`, and so on. Used when the caller
    /// supplies no explicit grouping.
    pub fn default_for(ranks: &[usize]) -> Self {
        let mut groups = Vec::with_capacity(ranks.len());
        let mut next_axis = 1;
        for &r in ranks {
            let group: Vec<usize> = (next_axis..next_axis + r).collect();
            next_axis += r;
            groups.push(group);
        }
        let rank = next_axis - 1;
        DimIndices { groups, rank }
    }

    /// The rank `D` of the system: the highest axis label appearing in any group.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The number of margins/factors `J`.
    pub fn count(&self) -> usize {
        self.groups.len()
    }

    /// The declared axis labels of group `j`, in the order the caller supplied them.
    pub fn group(&self, j: usize) -> &[usize] {
        &self.groups[j]
    }

    /// The axes in `1..=rank()` not covered by group `j`, in ascending order.
    pub fn complement(&self, j: usize) -> Vec<usize> {
        let in_group: BTreeSet<usize> = self.groups[j].iter().copied().collect();
        (1..=self.rank).filter(|a| !in_group.contains(a)).collect()
    }

    /// Every singleton `[d]` for `d` in `1..=rank()`, together with every
    /// non-empty pairwise intersection of two distinct groups, deduplicated.
    /// Axes within each returned subset are in ascending order.
    ///
    /// Used by overlap-consistency checking and consistency-forcing averaging.
    pub fn shared_subsets(&self) -> Vec<Vec<usize>> {
        let mut subsets: Vec<BTreeSet<usize>> = (1..=self.rank).map(|d| BTreeSet::from([d])).collect();

        for i in 0..self.groups.len() {
            let set_i: BTreeSet<usize> = self.groups[i].iter().copied().collect();
            for j in (i + 1)..self.groups.len() {
                let set_j: BTreeSet<usize> = self.groups[j].iter().copied().collect();
                let intersection: BTreeSet<usize> = set_i.intersection(&set_j).copied().collect();
                if !intersection.is_empty() {
                    subsets.push(intersection);
                }
            }
        }

        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for subset in subsets {
            let key: Vec<usize> = subset.iter().copied().collect();
            if seen.insert(key.clone()) {
                out.push(key);
            }
        }
        out
    }

    /// True iff `group(j)`'s axis labels are already in ascending order.
    pub(crate) fn is_sorted(&self, j: usize) -> bool {
        self.groups[j].windows(2).all(|w| w[0] < w[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_promotes_singletons() {
        let di = DimIndices::build([1usize, 2usize]).unwrap();
        assert_eq!(di.rank(), 2);
        assert_eq!(di.count(), 2);
        assert_eq!(di.group(0), &[1]);
        assert_eq!(di.group(1), &[2]);
    }

    #[test]
    fn build_accepts_mixed_singleton_and_groups() {
        let di = DimIndices::build(vec![vec![1, 3], vec![2, 3]]).unwrap();
        assert_eq!(di.rank(), 3);
        assert_eq!(di.count(), 2);
    }

    #[test]
    fn build_rejects_missing_axis() {
        let err = DimIndices::build(vec![vec![1], vec![3]]).unwrap_err();
        match err.kind() {
            crate::error::ErrorKind::InvalidDimIndices(crate::error::InvalidDimIndicesKind::MissingAxes(axes)) => {
                assert_eq!(axes, &vec![2]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn build_rejects_duplicate_axis_within_group() {
        let err = DimIndices::build(vec![vec![1, 1]]).unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::ErrorKind::InvalidDimIndices(crate::error::InvalidDimIndicesKind::DuplicateAxisInGroup { .. })
        ));
    }

    #[test]
    fn build_rejects_duplicate_group_set_regardless_of_order() {
        let err = DimIndices::build(vec![vec![1, 2], vec![2, 1]]).unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::ErrorKind::InvalidDimIndices(crate::error::InvalidDimIndicesKind::DuplicateGroupSet { .. })
        ));
    }

    #[test]
    fn build_allows_overlap_with_differing_composition() {
        let di = DimIndices::build(vec![vec![1, 3], vec![2, 3]]).unwrap();
        // singletons [1], [2], [3] plus the pairwise intersection {3}, deduplicated against
        // the singleton [3] already present.
        assert_eq!(di.shared_subsets().len(), 3);
    }

    #[test]
    fn default_for_assigns_consecutive_axes() {
        let di = DimIndices::default_for(&[2, 1, 3]);
        assert_eq!(di.group(0), &[1, 2]);
        assert_eq!(di.group(1), &[3]);
        assert_eq!(di.group(2), &[4, 5, 6]);
        assert_eq!(di.rank(), 6);
    }

    #[test]
    fn complement_is_sorted_and_excludes_group() {
        let di = DimIndices::build(vec![vec![1, 3], vec![2, 3]]).unwrap();
        assert_eq!(di.complement(0), vec![2]);
        assert_eq!(di.complement(1), vec![1]);
    }

    #[test]
    fn shared_subsets_includes_all_singletons_and_pairwise_intersections() {
        let di = DimIndices::build(vec![vec![1], vec![2], vec![3]]).unwrap();
        let mut subsets = di.shared_subsets();
        subsets.sort();
        assert_eq!(subsets, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn is_sorted_detects_unordered_group() {
        let di = DimIndices::build(vec![vec![1], vec![3, 2]]).unwrap();
        assert!(di.is_sorted(0));
        assert!(!di.is_sorted(1));
    }
}
