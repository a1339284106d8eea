// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Permute- and broadcast-alignment between a margin/factor's declared axis
//! order and the seed's full `D`-rank axis order.
//!
//! A margin or factor array is stored, in the public API, with shape
//! `(size_of_axis(S_j[1]), ..., size_of_axis(S_j[|S_j|]))` in *declared*
//! order — the order the caller wrote `S_j` in, which need not be sorted.
//! Internally the IPF engine needs every such array reshaped to the full
//! rank `D`, with the declared axes in their true positions and length-1
//! placeholders elsewhere, so ordinary elementwise `ndarray` operations
//! broadcast it against the seed automatically. This module is the bridge
//! between those two representations.

use std::collections::BTreeSet;

use ndarray::{ArrayD, Axis, NdFloat};

/// Returns the permutation `perm` such that `labels[perm[0]] <= labels[perm[1]] <= ...`,
/// i.e. `perm[k]` is the position in `labels` of the `k`-th smallest label.
///
/// Feeding this directly to `ArrayBase::permuted_axes` turns an array whose
/// axes are in `labels`' declared order into one whose axes are in ascending
/// order.
pub(crate) fn sort_permutation(labels: &[usize]) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..labels.len()).collect();
    perm.sort_unstable_by_key(|&i| labels[i]);
    perm
}

/// The inverse of a permutation: `inverse[perm[k]] == k` for all `k`.
pub(crate) fn invert_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0usize; perm.len()];
    for (k, &p) in perm.iter().enumerate() {
        inverse[p] = k;
    }
    inverse
}

/// True iff `labels` is already strictly ascending.
pub(crate) fn is_sorted(labels: &[usize]) -> bool {
    labels.windows(2).all(|w| w[0] < w[1])
}

/// Permutes `arr`'s axes from declared order (matching `declared_labels`
/// positionally) into ascending label order.
pub(crate) fn permute_to_sorted<F: Clone>(arr: ArrayD<F>, declared_labels: &[usize]) -> ArrayD<F> {
    if is_sorted(declared_labels) {
        return arr;
    }
    arr.permuted_axes(sort_permutation(declared_labels))
}

/// Permutes `arr`'s axes from ascending label order back into the order
/// `declared_labels` was originally given in.
pub(crate) fn permute_to_declared<F: Clone>(arr: ArrayD<F>, declared_labels: &[usize]) -> ArrayD<F> {
    if is_sorted(declared_labels) {
        return arr;
    }
    let inverse = invert_permutation(&sort_permutation(declared_labels));
    arr.permuted_axes(inverse)
}

/// Sums `x` (a full `D`-rank array) over every axis *not* in `group`,
/// returning an array of rank `group.len()` whose axes are in ascending
/// label order.
pub(crate) fn sum_complement<F: NdFloat>(x: &ArrayD<F>, group: &[usize], full_rank: usize) -> ArrayD<F> {
    let in_group: BTreeSet<usize> = group.iter().copied().collect();
    let mut complement: Vec<usize> = (1..=full_rank).filter(|d| !in_group.contains(d)).collect();
    complement.sort_unstable_by(|a, b| b.cmp(a)); // descending: keeps later indices valid
    let mut result = x.clone();
    for d in complement {
        result = result.sum_axis(Axis(d - 1));
    }
    result
}

/// Inserts length-1 placeholder axes into `arr` (axes in ascending label
/// order, labels drawn from `present_sorted`) so that its axes span all of
/// `universe_sorted`, a superset of `present_sorted`, in ascending order.
fn insert_missing<F>(mut arr: ArrayD<F>, present_sorted: &[usize], universe_sorted: &[usize]) -> ArrayD<F> {
    let mut next = 0;
    for (pos, &d) in universe_sorted.iter().enumerate() {
        if next < present_sorted.len() && present_sorted[next] == d {
            next += 1;
        } else {
            arr = arr.insert_axis(Axis(pos));
        }
    }
    arr
}

/// The inverse of [`insert_missing`]: removes the length-1 axes belonging to
/// `universe_sorted \ present_sorted`, leaving an array whose axes span
/// exactly `present_sorted` in ascending order.
///
/// Panics if a removed axis does not have extent 1; callers must only use
/// this on arrays produced by [`insert_missing`] or an equivalent alignment
/// step.
fn remove_missing<F>(mut arr: ArrayD<F>, present_sorted: &[usize], universe_sorted: &[usize]) -> ArrayD<F> {
    let keep: BTreeSet<usize> = present_sorted.iter().copied().collect();
    let mut to_remove: Vec<usize> = universe_sorted
        .iter()
        .enumerate()
        .filter(|(_, d)| !keep.contains(d))
        .map(|(pos, _)| pos)
        .collect();
    to_remove.sort_unstable_by(|a, b| b.cmp(a)); // descending: keeps earlier indices valid
    for pos in to_remove {
        arr = arr.remove_axis(Axis(pos));
    }
    arr
}

/// Inserts length-1 placeholder axes into `arr` (currently rank
/// `sorted_labels.len()`, axes in ascending order) so that it reaches rank
/// `full_rank`, with its real axes landing at their true 1-based positions.
pub(crate) fn reinsert_as_placeholders<F>(arr: ArrayD<F>, sorted_labels: &[usize], full_rank: usize) -> ArrayD<F> {
    let universe: Vec<usize> = (1..=full_rank).collect();
    insert_missing(arr, sorted_labels, &universe)
}

/// Removes the length-1 placeholder axes from `arr` (rank `full_rank`) that
/// do not belong to `sorted_labels`, returning an array of rank
/// `sorted_labels.len()` with axes in ascending order.
pub(crate) fn remove_placeholders<F>(arr: ArrayD<F>, sorted_labels: &[usize], full_rank: usize) -> ArrayD<F> {
    let universe: Vec<usize> = (1..=full_rank).collect();
    remove_missing(arr, sorted_labels, &universe)
}

/// Expands `subset_arr` (rank `subset_sorted.len()`, axes ascending,
/// `subset_sorted` a subset of `group_declared`'s labels) up to
/// `group_declared`'s own rank and declared axis order, with placeholder
/// axes of extent 1 for the labels in `group_declared` but not in the
/// subset. Used when broadcasting a shared-subset reduction back against a
/// single margin's declared-shape array.
pub(crate) fn expand_subset_to_group<F: Clone>(
    subset_arr: ArrayD<F>, subset_sorted: &[usize], group_declared: &[usize],
) -> ArrayD<F> {
    let mut group_sorted = group_declared.to_vec();
    group_sorted.sort_unstable();
    let expanded_sorted = insert_missing(subset_arr, subset_sorted, &group_sorted);
    permute_to_declared(expanded_sorted, group_declared)
}

/// Sums `arr` (rank `group_declared.len()`, axes in `group_declared`'s
/// declared order) over `group_declared \ subset`, returning an array of
/// rank `subset.len()` with axes in ascending order. `subset` must be a
/// subset of `group_declared`'s labels.
pub(crate) fn reduce_tagged_to_subset<F: NdFloat>(
    arr: &ArrayD<F>, group_declared: &[usize], subset: &[usize],
) -> ArrayD<F> {
    let sorted_arr = permute_to_sorted(arr.clone(), group_declared);
    let mut group_sorted = group_declared.to_vec();
    group_sorted.sort_unstable();
    let keep: BTreeSet<usize> = subset.iter().copied().collect();
    let mut to_remove: Vec<usize> = group_sorted
        .iter()
        .enumerate()
        .filter(|(_, d)| !keep.contains(d))
        .map(|(pos, _)| pos)
        .collect();
    to_remove.sort_unstable_by(|a, b| b.cmp(a));
    let mut result = sorted_arr;
    for pos in to_remove {
        result = result.sum_axis(Axis(pos));
    }
    result
}

/// Converts a declared-order margin/factor array into the fully-aligned
/// `D`-rank broadcast form: extent `n_d` along every `d` in `group`, `1`
/// elsewhere.
pub(crate) fn to_aligned<F: Clone>(declared: &ArrayD<F>, group: &[usize], full_rank: usize) -> ArrayD<F> {
    let sorted = permute_to_sorted(declared.clone(), group);
    let mut sorted_labels = group.to_vec();
    sorted_labels.sort_unstable();
    reinsert_as_placeholders(sorted, &sorted_labels, full_rank)
}

/// The inverse of [`to_aligned`]: squeezes the placeholder axes back out
/// and restores the caller's declared axis order.
pub(crate) fn from_aligned<F: Clone>(aligned: ArrayD<F>, group: &[usize], full_rank: usize) -> ArrayD<F> {
    let mut sorted_labels = group.to_vec();
    sorted_labels.sort_unstable();
    let sorted = remove_placeholders(aligned, &sorted_labels, full_rank);
    permute_to_declared(sorted, group)
}

/// Sums `x` (a full-rank array) over the complement of `group` and
/// re-expands the result to the fully-aligned `D`-rank broadcast form, in
/// one step. This is the per-iteration margin reduction used by the
/// fitting engine.
pub(crate) fn reduce_aligned<F: NdFloat>(x: &ArrayD<F>, group: &[usize], full_rank: usize) -> ArrayD<F> {
    let reduced = sum_complement(x, group, full_rank);
    let mut sorted_labels = group.to_vec();
    sorted_labels.sort_unstable();
    reinsert_as_placeholders(reduced, &sorted_labels, full_rank)
}

/// Sums `x` (a full-rank array) over the complement of `group`, returning
/// the result in `group`'s *declared* axis order. This is what
/// `ArrayMargins::from_array` uses: the public margin array shape must
/// match the caller's declared order, not the sorted internal order.
pub(crate) fn reduce_to_declared<F: NdFloat>(x: &ArrayD<F>, group: &[usize], full_rank: usize) -> ArrayD<F> {
    let reduced_sorted = sum_complement(x, group, full_rank);
    permute_to_declared(reduced_sorted, group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array};

    #[test]
    fn sort_permutation_orders_by_value() {
        assert_eq!(sort_permutation(&[3, 1, 2]), vec![1, 2, 0]);
        assert_eq!(sort_permutation(&[1, 2, 3]), vec![0, 1, 2]);
    }

    #[test]
    fn invert_permutation_round_trips() {
        let perm = sort_permutation(&[3, 1, 2]);
        let inv = invert_permutation(&perm);
        for (k, &p) in perm.iter().enumerate() {
            assert_eq!(inv[p], k);
        }
    }

    #[test]
    fn to_aligned_then_from_aligned_round_trips_unsorted_group() {
        let declared = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).into_dyn(); // shape (3, 2)
        // declared axes correspond to labels [3, 2] (axis 3 before axis 2), full rank 3
        let aligned = to_aligned(&declared, &[3, 2], 3);
        assert_eq!(aligned.shape(), &[1, 2, 3]); // axis1 placeholder, axis2 extent 2, axis3 extent 3
        let back = from_aligned(aligned, &[3, 2], 3);
        assert_eq!(back, declared);
    }

    #[test]
    fn reduce_aligned_matches_manual_sum() {
        let x = Array::from_shape_fn((2, 3, 4), |(i, j, k)| (i + 2 * j + 3 * k) as f64).into_dyn();
        let aligned = reduce_aligned(&x, &[1, 3], 3);
        assert_eq!(aligned.shape(), &[2, 1, 4]);
        let manual = x.sum_axis(Axis(1)); // sum over axis 2 (label 2, 0-based index 1)
        let manual = manual.insert_axis(Axis(1));
        assert_eq!(aligned, manual);
    }

    #[test]
    fn reduce_tagged_to_subset_sums_non_shared_axes() {
        // margin over group [2, 1] (declared order), shared subset is axis [1]
        let arr = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into_dyn(); // axis0 = label2 (size2), axis1 = label1 (size3)
        let reduced = reduce_tagged_to_subset(&arr, &[2, 1], &[1]);
        assert_eq!(reduced.shape(), &[3]);
        assert_eq!(reduced, arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into_dyn().sum_axis(Axis(0)));
    }

    #[test]
    fn expand_subset_to_group_round_trips_with_reduce() {
        let group_declared = [2usize, 1usize];
        let subset = [1usize];
        let subset_arr = Array::from_vec(vec![10.0, 20.0, 30.0]).into_dyn();
        let expanded = expand_subset_to_group(subset_arr.clone(), &subset, &group_declared);
        assert_eq!(expanded.shape(), &[1, 3]); // axis0=label2 placeholder, axis1=label1
        assert_eq!(expanded.index_axis(Axis(0), 0), subset_arr);
    }

    #[test]
    fn reduce_to_declared_respects_unsorted_group_order() {
        let x = Array::from_shape_fn((2, 3, 4), |(i, j, k)| (i + 2 * j + 3 * k) as f64).into_dyn();
        // group [3, 1]: declared order wants axis 3 first, then axis 1
        let declared_order = reduce_to_declared(&x, &[3, 1], 3);
        assert_eq!(declared_order.shape(), &[4, 2]);
        let sorted_order = x.sum_axis(Axis(1)); // shape (2, 4), axes [1, 3]
        for i in 0..2 {
            for k in 0..4 {
                assert_eq!(declared_order[ndarray::IxDyn(&[k, i])], sorted_order[ndarray::IxDyn(&[i, k])]);
            }
        }
    }
}
