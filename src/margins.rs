// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use approx::AbsDiffEq;
use ndarray::{ArrayD, NdFloat};
use num_traits::FromPrimitive;

use crate::align;
use crate::dim_indices::DimIndices;
use crate::error::{shape_mismatch, IpfError};

/// A bundle of marginal-sum arrays, one per margin declared by a
/// [`DimIndices`], each shaped `(size_of_axis(S_j[1]), ..., size_of_axis(S_j[|S_j|]))`
/// in the declared axis order.
///
/// `ArrayMargins` owns its arrays and its `DimIndices`; constructing one
/// never retains a reference to the caller's data.
#[derive(Clone, Debug)]
pub struct ArrayMargins<F> {
    arrays: Vec<ArrayD<F>>,
    indices: DimIndices,
    size: Vec<usize>,
}

impl<F: NdFloat + FromPrimitive> ArrayMargins<F> {
    /// Builds an `ArrayMargins` from one array per margin and a
    /// [`DimIndices`] declaring which axes each covers.
    ///
    /// Fails if any array's rank disagrees with its group's size, or if two
    /// arrays disagree on the extent of an axis they share.
    pub fn from_arrays(arrays: Vec<ArrayD<F>>, indices: DimIndices) -> Result<Self, IpfError> {
        if arrays.len() != indices.count() {
            return Err(shape_mismatch(
                "ArrayMargins::from_arrays (number of margins)",
                &[indices.count()],
                &[arrays.len()],
            ));
        }

        let rank = indices.rank();
        let mut size: Vec<Option<usize>> = vec![None; rank];

        for (j, array) in arrays.iter().enumerate() {
            let group = indices.group(j);
            if array.ndim() != group.len() {
                return Err(shape_mismatch(
                    format!("margin {j}"),
                    group,
                    array.shape(),
                ));
            }
            for (pos, &axis) in group.iter().enumerate() {
                let extent = array.shape()[pos];
                match size[axis - 1] {
                    None => size[axis - 1] = Some(extent),
                    Some(existing) if existing == extent => {}
                    Some(existing) => {
                        return Err(shape_mismatch(
                            format!("margin {j}, axis {axis}"),
                            &[existing],
                            &[extent],
                        ))
                    }
                }
            }
        }

        let size: Vec<usize> = size
            .into_iter()
            .enumerate()
            .map(|(d, extent)| extent.unwrap_or_else(|| unreachable!("axis {} covered by no margin", d + 1)))
            .collect();

        Ok(ArrayMargins { arrays, indices, size })
    }

    /// Shortcut for [`ArrayMargins::from_arrays`] using the default,
    /// non-overlapping [`DimIndices`] ([`DimIndices::default_for`]).
    pub fn from_arrays_default(arrays: Vec<ArrayD<F>>) -> Result<Self, IpfError> {
        let ranks: Vec<usize> = arrays.iter().map(|a| a.ndim()).collect();
        let indices = DimIndices::default_for(&ranks);
        Self::from_arrays(arrays, indices)
    }

    /// Computes each margin by summing `x` over the complement of its
    /// declared axes, permuting the result to match the declared (possibly
    /// unsorted) axis order.
    pub fn from_array(x: &ArrayD<F>, indices: DimIndices) -> Result<Self, IpfError> {
        let rank = indices.rank();
        if x.ndim() != rank {
            return Err(shape_mismatch("ArrayMargins::from_array (seed rank)", &[rank], &[x.ndim()]));
        }

        let arrays: Vec<ArrayD<F>> = (0..indices.count())
            .map(|j| align::reduce_to_declared(x, indices.group(j), rank))
            .collect();

        Ok(ArrayMargins {
            arrays,
            indices,
            size: x.shape().to_vec(),
        })
    }

    /// The declared [`DimIndices`] this bundle is tagged with.
    pub fn indices(&self) -> &DimIndices {
        &self.indices
    }

    /// The global shape `(n_1, ..., n_D)` derived from the margins.
    pub fn size(&self) -> &[usize] {
        &self.size
    }

    /// The `j`-th margin array, in declared axis order.
    pub fn array(&self, j: usize) -> &ArrayD<F> {
        &self.arrays[j]
    }

    /// A new `ArrayMargins` where every margin is divided by its own sum,
    /// so each now sums to 1.
    pub fn to_proportions(&self) -> Self {
        let arrays = self
            .arrays
            .iter()
            .map(|a| {
                let total = a.sum();
                a.mapv(|v| v / total)
            })
            .collect();
        ArrayMargins {
            arrays,
            indices: self.indices.clone(),
            size: self.size.clone(),
        }
    }

    /// Averages every shared-subset reduction across its participating
    /// margins and rescales each margin's complement-of-the-subset slice so
    /// the new reduction equals that mean. Idempotent on already-consistent
    /// input.
    pub fn make_overlap_consistent(&self) -> Self {
        let mut arrays = self.arrays.clone();
        for subset in self.indices.shared_subsets() {
            let reductions = self.subset_reductions(&subset);
            if reductions.len() < 2 {
                continue;
            }
            let mut mean = reductions[0].1.clone();
            for (_, r) in &reductions[1..] {
                mean = mean + r;
            }
            let count = F::from_usize(reductions.len()).expect("margin count fits in F");
            mean.mapv_inplace(|v| v / count);

            for (j, reduction) in &reductions {
                let ratio = &mean / reduction; // 0/0 -> NaN; propagated below
                let ratio = ratio.mapv(|v| if v.is_nan() { F::one() } else { v });
                let group = self.indices.group(*j);
                let aligned_ratio = align::expand_subset_to_group(ratio, &subset, group);
                arrays[*j] = &arrays[*j] * &aligned_ratio;
            }
        }
        ArrayMargins {
            arrays,
            indices: self.indices.clone(),
            size: self.size.clone(),
        }
    }

    /// For every margin whose declared group contains `subset`, the
    /// reduction of that margin onto `subset` (ascending axis order),
    /// paired with the margin's index.
    fn subset_reductions(&self, subset: &[usize]) -> Vec<(usize, ArrayD<F>)> {
        let subset_set: std::collections::BTreeSet<usize> = subset.iter().copied().collect();
        (0..self.indices.count())
            .filter(|&j| {
                let group: std::collections::BTreeSet<usize> = self.indices.group(j).iter().copied().collect();
                subset_set.is_subset(&group)
            })
            .map(|j| (j, align::reduce_tagged_to_subset(&self.arrays[j], self.indices.group(j), subset)))
            .collect()
    }
}

/// Tolerance-based consistency checks, split into their own `impl` block
/// since they need `F: approx::AbsDiffEq` on top of the baseline `NdFloat +
/// FromPrimitive` bound the rest of `ArrayMargins` gets by with.
impl<F: NdFloat + FromPrimitive + AbsDiffEq<Epsilon = F>> ArrayMargins<F> {
    /// True iff every margin's total sum agrees with every other's, within `tol`.
    pub fn scalar_consistent(&self, tol: F) -> bool {
        let sums: Vec<F> = self.arrays.iter().map(|a| a.sum()).collect();
        let max = sums.iter().cloned().fold(F::neg_infinity(), F::max);
        let min = sums.iter().cloned().fold(F::infinity(), F::min);
        max.abs_diff_eq(&min, tol)
    }

    /// For every shared axis subset ([`DimIndices::shared_subsets`]),
    /// checks that every margin covering that subset reduces to the same
    /// values on it, within `tol`. Logs one warning per offending subset
    /// and returns whether all subsets were consistent.
    pub fn overlap_consistent(&self, tol: F) -> bool {
        let mut all_consistent = true;
        for subset in self.indices.shared_subsets() {
            if let Some(margins) = self.subset_disagreement(&subset, tol) {
                log::warn!("margins {margins:?} disagree on shared axes {subset:?} (tol {tol:?})");
                all_consistent = false;
            }
        }
        all_consistent
    }

    /// The axis labels of the first shared subset ([`DimIndices::shared_subsets`],
    /// in order) on which some pair of covering margins disagree by more
    /// than `tol`, or `None` if every subset is consistent.
    pub(crate) fn first_inconsistent_subset(&self, tol: F) -> Option<Vec<usize>> {
        self.indices
            .shared_subsets()
            .into_iter()
            .find(|subset| self.subset_disagreement(subset, tol).is_some())
    }

    /// If some pair of margins covering `subset` disagree by more than
    /// `tol`, the indices of the margins considered; `None` if fewer than
    /// two margins cover `subset` or all agree.
    fn subset_disagreement(&self, subset: &[usize], tol: F) -> Option<Vec<usize>> {
        let reductions = self.subset_reductions(subset);
        if reductions.len() < 2 {
            return None;
        }
        let reference = &reductions[0].1;
        let disagrees = reductions[1..].iter().any(|(_, other)| !reference.abs_diff_eq(other, tol));
        if disagrees {
            Some(reductions.iter().map(|(j, _)| *j).collect())
        } else {
            None
        }
    }
}
