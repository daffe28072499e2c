//! Errors reported when constructing or querying samples.
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Errors raised by sample combinators and index queries.
///
/// All of these are reported synchronously at the call site that violated the contract.
/// Failures that only surface while executing an evaluation graph are reported as
/// [`eyre::Report`] by the evaluation entry points instead.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SampleError {
    /// Two samples were added whose spaces are not identical.
    SpaceMismatch { left: Vec<String>, right: Vec<String> },
    /// Samples with at least one common space were multiplied or zipped.
    OverlappingSpaces { space: String },
    /// Samples with different point counts were zipped.
    PointCountMismatch { expected: usize, actual: usize },
    /// An element index outside of `[0, len)`.
    IndexOutOfRange { index: usize, len: usize },
    /// An operation that requires at least one input received none.
    EmptySelection,
    /// An interpolation mode other than `none` or `nearest`.
    InvalidInterpolation(String),
    /// A point mask whose length differs from the number of points.
    MaskLengthMismatch { expected: usize, actual: usize },
    /// A transform sequence whose length differs from the number of elements.
    TransformLengthMismatch { expected: usize, actual: usize },
    /// A custom point index whose length differs from the number of points.
    IndexLengthMismatch { expected: usize, actual: usize },
    /// Operands of incompatible shape.
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },
    /// A function depends on a space that no enclosing sample provides.
    MissingSpace(String),
    /// The variant cannot triangulate the requested element.
    TriangulationUnavailable { variant: &'static str },
    /// The variant does not support the requested operation.
    NotImplemented {
        operation: &'static str,
        variant: &'static str,
    },
}

impl SampleError {
    /// Whether this is an index error, as opposed to a value error.
    pub fn is_index_error(&self) -> bool {
        matches!(self, Self::IndexOutOfRange { .. })
    }
}

impl Display for SampleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpaceMismatch { left, right } => {
                write!(f, "Cannot add samples with different spaces: {left:?} and {right:?}")
            }
            Self::OverlappingSpaces { space } => write!(f, "Space {space:?} is shared by more than one sample"),
            Self::PointCountMismatch { expected, actual } => {
                write!(f, "Points do not match: expected {expected} points, got {actual}")
            }
            Self::IndexOutOfRange { index, len } => {
                write!(f, "Index {index} out of range for {len} elements")
            }
            Self::EmptySelection => write!(f, "At least one entry is required"),
            Self::InvalidInterpolation(name) => write!(
                f,
                "Invalid interpolation {name:?}; valid values are \"none\" and \"nearest\""
            ),
            Self::MaskLengthMismatch { expected, actual } => {
                write!(f, "Mask has length {actual}, but the sample has {expected} points")
            }
            Self::TransformLengthMismatch { expected, actual } => write!(
                f,
                "Transform sequence has length {actual}, but the points sequence has {expected} elements"
            ),
            Self::IndexLengthMismatch { expected, actual } => {
                write!(f, "Point index has length {actual}, but the sample has {expected} points")
            }
            Self::ShapeMismatch { left, right } => {
                write!(f, "Incompatible shapes {left:?} and {right:?}")
            }
            Self::MissingSpace(space) => write!(f, "No sample provides coordinates for space {space:?}"),
            Self::TriangulationUnavailable { variant } => {
                write!(f, "Element triangulation is not available for {variant} samples")
            }
            Self::NotImplemented { operation, variant } => {
                write!(f, "`{operation}` is not implemented for {variant} samples")
            }
        }
    }
}

impl Error for SampleError {}
