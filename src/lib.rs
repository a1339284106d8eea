// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Multidimensional iterative proportional fitting (IPF), also known as
//! RAS, raking, or matrix scaling.
//!
//! Given a non-negative seed array of arbitrary rank and a collection of
//! target marginal sums over (possibly overlapping) subsets of its axes,
//! this crate computes a set of multiplicative [`ArrayFactors`] whose outer
//! product, aligned on the declared axes, scales the seed elementwise so
//! that its marginals match the targets — under the constraint that the
//! ratio between scaled and original array is of rank-1 tensor product form
//! over each declared margin's axes.
//!
//! The moving parts:
//!
//! - [`DimIndices`] declares which axes of the full-rank array each margin
//!   or factor covers, and in what order.
//! - [`ArrayMargins`] bundles one marginal-sum array per [`DimIndices`]
//!   group, with consistency checks and consistency-forcing.
//! - [`ArrayFactors`] bundles one multiplicative factor array per group, and
//!   knows how to materialize or apply itself.
//! - [`ipf`] runs the fixed-point iteration that produces [`ArrayFactors`]
//!   from a seed and a target [`ArrayMargins`].
//!
//! ```
//! use ipf::{ipf_from_vectors, IpfOptions};
//! use ndarray::arr2;
//!
//! let x = arr2(&[[40.0, 30.0], [20.0, 10.0]]).into_dyn();
//! let rows = ndarray::arr1(&[50.0, 50.0]);
//! let cols = ndarray::arr1(&[60.0, 40.0]);
//!
//! let factors = ipf_from_vectors(x.clone(), vec![rows, cols], IpfOptions::default()).unwrap();
//! let z = factors.materialize() * &x;
//! assert!(z.sum() > 0.0);
//! ```

mod align;
mod dim_indices;
mod error;
mod factors;
mod ipf;
mod margins;

pub use dim_indices::{DimIndices, IntoAxisGroup};
pub use error::{ErrorKind, InvalidDimIndicesKind, IpfError};
pub use factors::ArrayFactors;
pub use ipf::{ipf, ipf_from_margins, ipf_from_vectors, ipf_uniform_from_vectors, IpfOptions};
pub use margins::ArrayMargins;

pub use ndarray::{Array1, ArrayD, NdFloat};
