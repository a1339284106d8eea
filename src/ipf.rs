// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use approx::AbsDiffEq;
use ndarray::{Array1, ArrayD, NdFloat};
use num_traits::{FromPrimitive, NumCast};

use crate::align;
use crate::error::{shape_mismatch, ErrorKind, IpfError};
use crate::factors::ArrayFactors;
use crate::margins::ArrayMargins;

/// Tuning knobs for [`ipf`] and its convenience wrappers.
///
/// The floating-point precision itself is not a field here: it is the
/// engine's generic parameter `F`, fixed by the caller at the call site
/// (`ipf::<f32>(...)` vs. `ipf::<f64>(...)`).
#[derive(Clone, Copy, Debug)]
pub struct IpfOptions<F> {
    /// Maximum number of fixed-point sweeps over all margins.
    pub max_iter: usize,
    /// Convergence threshold on the largest elementwise factor change
    /// between sweeps. Clamped up to at least `F::epsilon()`.
    pub tol: F,
    /// When margins disagree on a shared axis subset, average them instead
    /// of failing with [`ErrorKind::InconsistentOverlap`].
    pub force_consistency: bool,
}

impl<F: NdFloat> Default for IpfOptions<F> {
    fn default() -> Self {
        IpfOptions {
            max_iter: 1000,
            tol: NumCast::from(1e-10_f64).unwrap_or_else(F::epsilon),
            force_consistency: false,
        }
    }
}

/// Runs multidimensional iterative proportional fitting: adjusts `x` by a
/// set of per-margin multiplicative factors until its marginal sums (over
/// the axis subsets declared by `margins.indices()`) match `margins`,
/// subject to the rank-1 tensor product constraint over each margin's axes.
///
/// `x` must have rank `margins.indices().rank()` and shape `margins.size()`.
/// Non-scalar-consistent or non-overlap-consistent margins are normalized
/// (see module docs on [`ArrayMargins`]) rather than rejected outright,
/// except that overlap inconsistency is a hard error unless
/// `options.force_consistency` is set.
pub fn ipf<F: NdFloat + FromPrimitive + AbsDiffEq<Epsilon = F>>(
    x: ArrayD<F>, margins: ArrayMargins<F>, options: IpfOptions<F>,
) -> Result<ArrayFactors<F>, IpfError> {
    let rank = margins.indices().rank();
    if x.ndim() != rank {
        return Err(shape_mismatch("ipf (seed rank)", &[rank], &[x.ndim()]));
    }
    if x.shape() != margins.size() {
        return Err(shape_mismatch("ipf (seed shape)", margins.size(), x.shape()));
    }

    let tol = if options.tol > F::epsilon() { options.tol } else { F::epsilon() };

    let mut x = x;
    let mut margins = margins;
    if !margins.scalar_consistent(tol) {
        let total = x.sum();
        x.mapv_inplace(|v| v / total);
        margins = margins.to_proportions();
        log::info!("ipf: margin totals disagreed, normalized seed and targets to proportions");
    }

    if !margins.overlap_consistent(tol) {
        if options.force_consistency {
            log::warn!("ipf: margins disagreed on a shared axis subset, forcing consistency by averaging");
            margins = margins.make_overlap_consistent();
        } else {
            let subset = margins.first_inconsistent_subset(tol).unwrap_or_default();
            return Err(IpfError::new(ErrorKind::InconsistentOverlap { subset }));
        }
    }

    let indices = margins.indices().clone();
    let count = indices.count();

    let targets: Vec<ArrayD<F>> = (0..count).map(|j| align::to_aligned(margins.array(j), indices.group(j), rank)).collect();

    let m0: Vec<ArrayD<F>> = (0..count).map(|j| align::reduce_aligned(&x, indices.group(j), rank)).collect();

    for j in 0..count {
        if is_degenerate(&targets[j], &m0[j]) {
            return Err(IpfError::new(ErrorKind::DegenerateSeed { margin: j }));
        }
    }

    let mut factors: Vec<ArrayD<F>> = (0..count).map(|j| divide_or_zero(&targets[j], &m0[j])).collect();

    let mut converged = false;
    let mut last_crit = F::zero();
    let mut last_iter = 0usize;

    for iter in 1..=options.max_iter {
        let prev = factors.clone();

        for j in 0..count {
            let mut p = x.clone();
            for (k, f_k) in factors.iter().enumerate() {
                if k != j {
                    p = &p * f_k;
                }
            }
            let m_j = align::reduce_aligned(&p, indices.group(j), rank);
            factors[j] = divide_or_zero(&targets[j], &m_j);
        }

        let crit = factors
            .iter()
            .zip(prev.iter())
            .map(|(f, p)| (f - p).mapv(F::abs).fold(F::zero(), |m, &v| if v > m { v } else { m }))
            .fold(F::zero(), |m, v| if v > m { v } else { m });

        last_crit = crit;
        last_iter = iter;
        if crit < tol {
            converged = true;
            break;
        }
    }

    if converged {
        log::info!("ipf converged in {last_iter} iterations");
    } else {
        log::warn!("ipf did not converge after {} iterations, crit={last_crit:?}", options.max_iter);
    }

    Ok(ArrayFactors::from_aligned(factors, indices))
}

/// `ipf` wrapped to accept margins as a flat list of 1-D targets, one per
/// axis, rather than a pre-built [`ArrayMargins`].
pub fn ipf_from_vectors<F: NdFloat + FromPrimitive + AbsDiffEq<Epsilon = F>>(
    x: ArrayD<F>, vectors: Vec<Array1<F>>, options: IpfOptions<F>,
) -> Result<ArrayFactors<F>, IpfError> {
    let arrays: Vec<ArrayD<F>> = vectors.into_iter().map(Array1::into_dyn).collect();
    let margins = ArrayMargins::from_arrays_default(arrays)?;
    ipf(x, margins, options)
}

/// `ipf` wrapped to default the seed to an all-ones array of `margins`'
/// inferred shape.
pub fn ipf_from_margins<F: NdFloat + FromPrimitive + AbsDiffEq<Epsilon = F>>(margins: ArrayMargins<F>, options: IpfOptions<F>) -> Result<ArrayFactors<F>, IpfError> {
    let x = ArrayD::ones(margins.size());
    ipf(x, margins, options)
}

/// Composition of [`ipf_from_vectors`] and [`ipf_from_margins`]: a flat list
/// of 1-D targets with an inferred all-ones seed.
pub fn ipf_uniform_from_vectors<F: NdFloat + FromPrimitive + AbsDiffEq<Epsilon = F>>(
    vectors: Vec<Array1<F>>, options: IpfOptions<F>,
) -> Result<ArrayFactors<F>, IpfError> {
    let arrays: Vec<ArrayD<F>> = vectors.into_iter().map(Array1::into_dyn).collect();
    let margins = ArrayMargins::from_arrays_default(arrays)?;
    ipf_from_margins(margins, options)
}

/// `true` iff some position has `denom` zero but `numerator` not: the
/// factor at that slice is undefined rather than merely non-contributing.
/// `numerator` and `denom` must share the same shape (both are aligned to
/// the same margin's broadcast form).
fn is_degenerate<F: NdFloat>(numerator: &ArrayD<F>, denom: &ArrayD<F>) -> bool {
    numerator.iter().zip(denom.iter()).any(|(&n, &d)| d.is_zero() && !n.is_zero())
}

/// Elementwise `numerator / denom`, with `0 / 0` mapped to `0` (a
/// non-contributing slice) instead of `NaN`. `numerator` and `denom` must
/// share the same shape.
fn divide_or_zero<F: NdFloat>(numerator: &ArrayD<F>, denom: &ArrayD<F>) -> ArrayD<F> {
    let values: Vec<F> = numerator
        .iter()
        .zip(denom.iter())
        .map(|(&n, &d)| if d.is_zero() { F::zero() } else { n / d })
        .collect();
    ArrayD::from_shape_vec(numerator.raw_dim(), values).expect("same length as numerator's shape")
}
