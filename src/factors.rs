// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use ndarray::{ArrayD, NdFloat};
use num_traits::NumCast;

use crate::align;
use crate::dim_indices::DimIndices;
use crate::error::{shape_mismatch, ErrorKind, IpfError};

/// A bundle of multiplicative factor arrays, one per margin declared by a
/// [`DimIndices`], shaped like an [`ArrayMargins`](crate::ArrayMargins)
/// with the same groups.
///
/// `af[j]` is a factor over the axes `S_j`. The materialized array is
/// `M[i] = prod_j af[j][i_Sj]`, where `i_Sj` is the sub-tuple of `i` picked
/// out by `S_j` (permuted to `af[j]`'s declared order when `S_j` isn't
/// sorted).
#[derive(Clone, Debug)]
pub struct ArrayFactors<F> {
    arrays: Vec<ArrayD<F>>,
    indices: DimIndices,
}

impl<F: NdFloat> ArrayFactors<F> {
    /// Builds an `ArrayFactors` from one array per margin and a
    /// [`DimIndices`] declaring which axes each covers. Uses the same
    /// shape-consistency policy as [`ArrayMargins::from_arrays`](crate::ArrayMargins::from_arrays).
    pub fn from_arrays(arrays: Vec<ArrayD<F>>, indices: DimIndices) -> Result<Self, IpfError> {
        if arrays.len() != indices.count() {
            return Err(shape_mismatch(
                "ArrayFactors::from_arrays (number of factors)",
                &[indices.count()],
                &[arrays.len()],
            ));
        }

        let rank = indices.rank();
        let mut size: Vec<Option<usize>> = vec![None; rank];
        for (j, array) in arrays.iter().enumerate() {
            let group = indices.group(j);
            if array.ndim() != group.len() {
                return Err(shape_mismatch(format!("factor {j}"), group, array.shape()));
            }
            for (pos, &axis) in group.iter().enumerate() {
                let extent = array.shape()[pos];
                match size[axis - 1] {
                    None => size[axis - 1] = Some(extent),
                    Some(existing) if existing == extent => {}
                    Some(existing) => {
                        return Err(shape_mismatch(format!("factor {j}, axis {axis}"), &[existing], &[extent]))
                    }
                }
            }
        }

        Ok(ArrayFactors { arrays, indices })
    }

    pub(crate) fn from_aligned(aligned: Vec<ArrayD<F>>, indices: DimIndices) -> Self {
        let rank = indices.rank();
        let arrays = aligned
            .into_iter()
            .enumerate()
            .map(|(j, a)| align::from_aligned(a, indices.group(j), rank))
            .collect();
        ArrayFactors { arrays, indices }
    }

    /// The declared [`DimIndices`] this bundle is tagged with.
    pub fn indices(&self) -> &DimIndices {
        &self.indices
    }

    /// The `j`-th factor array, in declared axis order.
    pub fn array(&self, j: usize) -> &ArrayD<F> {
        &self.arrays[j]
    }

    /// Allocates `M = ones(size)` and multiplies every factor into it,
    /// aligned to the seed's full rank, returning the materialized array.
    pub fn materialize(&self) -> ArrayD<F> {
        let rank = self.indices.rank();
        let size = self.full_shape();
        let mut m = ArrayD::ones(size);
        for j in 0..self.indices.count() {
            let aligned = align::to_aligned(&self.arrays[j], self.indices.group(j), rank);
            m = &m * &aligned;
        }
        m
    }

    /// Multiplies every factor into `x`, in place, aligned to `x`'s rank.
    pub fn apply_in_place(&self, x: &mut ArrayD<F>) {
        let rank = self.indices.rank();
        for j in 0..self.indices.count() {
            let aligned = align::to_aligned(&self.arrays[j], self.indices.group(j), rank);
            *x *= &aligned;
        }
    }

    /// Multiplies every factor into `x` (a seed of a possibly different,
    /// `Copy + NumCast` element type), in place, succeeding only if every
    /// resulting product round-trips losslessly back through `S`.
    ///
    /// This is the crate's lax element-type contract: a float factor set
    /// applied to an integer seed performs the multiplication in place only
    /// when the integer type can represent all results exactly — a cast
    /// that merely truncates a fractional result (e.g. `1.5 -> 1`) is
    /// rejected, not silently accepted.
    pub fn apply_in_place_widening<S>(&self, x: &mut ArrayD<S>) -> Result<(), IpfError>
    where
        S: Copy + NumCast,
    {
        let mut product: ArrayD<F> = x.mapv(|v| F::from(v).expect("seed element representable as the factor's float type"));
        self.apply_in_place(&mut product);

        let narrowed: Vec<S> = product
            .iter()
            .enumerate()
            .map(|(element, &v)| {
                let candidate = S::from(v).ok_or_else(|| IpfError::new(ErrorKind::NonRepresentable { element }))?;
                let round_tripped = F::from(candidate).ok_or_else(|| IpfError::new(ErrorKind::NonRepresentable { element }))?;
                if round_tripped == v {
                    Ok(candidate)
                } else {
                    Err(IpfError::new(ErrorKind::NonRepresentable { element }))
                }
            })
            .collect::<Result<_, _>>()?;

        for (dst, src) in x.iter_mut().zip(narrowed) {
            *dst = src;
        }
        Ok(())
    }

    fn full_shape(&self) -> Vec<usize> {
        let rank = self.indices.rank();
        let mut size = vec![0usize; rank];
        for j in 0..self.indices.count() {
            for (pos, &axis) in self.indices.group(j).iter().enumerate() {
                size[axis - 1] = self.arrays[j].shape()[pos];
            }
        }
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn materialize_is_outer_product_of_1d_factors() {
        let row = arr1(&[2.0, 3.0]).into_dyn();
        let col = arr1(&[10.0, 100.0, 1000.0]).into_dyn();
        let di = DimIndices::build([1usize, 2usize]).unwrap();
        let factors = ArrayFactors::from_arrays(vec![row, col], di).unwrap();
        let m = factors.materialize();
        assert_eq!(m, arr2(&[[20.0, 200.0, 2000.0], [30.0, 300.0, 3000.0]]).into_dyn());
    }

    #[test]
    fn apply_in_place_matches_materialize_times_seed() {
        let row = arr1(&[2.0, 3.0]).into_dyn();
        let col = arr1(&[1.0, 1.0, 1.0]).into_dyn();
        let di = DimIndices::build([1usize, 2usize]).unwrap();
        let factors = ArrayFactors::from_arrays(vec![row, col], di).unwrap();

        let seed = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into_dyn();
        let mut applied = seed.clone();
        factors.apply_in_place(&mut applied);

        let materialized = factors.materialize();
        assert_eq!(applied, &materialized * &seed);
    }

    #[test]
    fn apply_in_place_widening_succeeds_on_exact_integer_results() {
        let row = arr1(&[2.0, 3.0]).into_dyn();
        let col = arr1(&[1.0, 1.0]).into_dyn();
        let di = DimIndices::build([1usize, 2usize]).unwrap();
        let factors = ArrayFactors::from_arrays(vec![row, col], di).unwrap();

        let mut seed: ArrayD<i64> = arr2(&[[1i64, 2], [3, 4]]).into_dyn();
        factors.apply_in_place_widening(&mut seed).unwrap();
        assert_eq!(seed, arr2(&[[2i64, 4], [9, 12]]).into_dyn());
    }

    #[test]
    fn apply_in_place_widening_rejects_non_representable_results() {
        let row = arr1(&[0.5]).into_dyn();
        let di = DimIndices::build([1usize]).unwrap();
        let factors = ArrayFactors::from_arrays(vec![row], di).unwrap();

        let mut seed: ArrayD<i64> = arr1(&[3i64]).into_dyn();
        assert!(factors.apply_in_place_widening(&mut seed).is_err());
    }
}
