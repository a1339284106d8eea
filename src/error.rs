// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::error::Error;
use std::fmt;

/// An error produced while building or fitting the multidimensional IPF
/// data model.
///
/// The error carries a [`ErrorKind`] plus enough context to name the
/// offending margin, axis, or subset, so a caller can identify precisely
/// what went wrong without re-deriving it from the inputs.
#[derive(Clone, Debug)]
pub struct IpfError {
    kind: ErrorKind,
}

impl IpfError {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        IpfError { kind }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

/// Error categories, matching the taxonomy every fatal or non-fatal
/// condition in the fitting engine falls into.
///
/// This enumeration is not exhaustive: additional context-bearing variants
/// may be added without a breaking change.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub enum ErrorKind {
    /// `X`'s rank/shape disagrees with the declared [`DimIndices`](crate::DimIndices)
    /// or with a margin/factor array's declared extent.
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// `DimIndices::build` was given a malformed group specification.
    InvalidDimIndices(InvalidDimIndicesKind),
    /// Two margins disagree on a shared axis subset and `force_consistency`
    /// was not requested.
    InconsistentOverlap { subset: Vec<usize> },
    /// A seed marginal is zero where the aligned target is non-zero: the
    /// factor at that slice is undefined.
    DegenerateSeed { margin: usize },
    /// Applying a factor set to a narrower-typed seed produced a value the
    /// seed's element type cannot represent exactly. `element` is the
    /// offending position in the seed's row-major iteration order.
    NonRepresentable { element: usize },
}

/// The specific way a [`DimIndices`](crate::DimIndices) specification was invalid.
#[derive(Clone, Debug)]
pub enum InvalidDimIndicesKind {
    /// No groups were supplied, so the rank of the system is undefined.
    Empty,
    /// These 1-based axis labels never appear in any group.
    MissingAxes(Vec<usize>),
    /// The same axis label appears twice within one group.
    DuplicateAxisInGroup { group: usize, axis: usize },
    /// Two groups declare the exact same set of axis labels.
    DuplicateGroupSet { first: usize, second: usize },
}

impl fmt::Display for IpfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::ShapeMismatch { context, expected, actual } => write!(
                f,
                "shape mismatch in {context}: expected shape {expected:?}, got {actual:?}"
            ),
            ErrorKind::InvalidDimIndices(detail) => write!(f, "invalid dim indices: {detail}"),
            ErrorKind::InconsistentOverlap { subset } => write!(
                f,
                "margins disagree on shared axes {subset:?} (pass force_consistency to average them)"
            ),
            ErrorKind::DegenerateSeed { margin } => write!(
                f,
                "margin {margin} has a zero seed marginal where the target is non-zero"
            ),
            ErrorKind::NonRepresentable { element } => write!(
                f,
                "element {element} of the fitted array cannot be represented exactly in the seed's element type"
            ),
        }
    }
}

impl fmt::Display for InvalidDimIndicesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidDimIndicesKind::Empty => write!(f, "no axis groups were supplied"),
            InvalidDimIndicesKind::MissingAxes(axes) => {
                write!(f, "axes {axes:?} are not covered by any group")
            }
            InvalidDimIndicesKind::DuplicateAxisInGroup { group, axis } => write!(
                f,
                "group {group} repeats axis {axis}"
            ),
            InvalidDimIndicesKind::DuplicateGroupSet { first, second } => write!(
                f,
                "groups {first} and {second} declare the same set of axes"
            ),
        }
    }
}

impl Error for IpfError {}

pub(crate) fn shape_mismatch(context: impl Into<String>, expected: &[usize], actual: &[usize]) -> IpfError {
    IpfError::new(ErrorKind::ShapeMismatch {
        context: context.into(),
        expected: expected.to_vec(),
        actual: actual.to_vec(),
    })
}

pub(crate) fn invalid(detail: InvalidDimIndicesKind) -> IpfError {
    IpfError::new(ErrorKind::InvalidDimIndices(detail))
}
