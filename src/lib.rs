//! Point samples over collections of elements, and lazy integration and evaluation of array
//! functions on them.
//!
//! A [`Sample`] is a set of points grouped by element, where every element is identified by a
//! chain of affine transforms into a named coordinate space. Samples combine by concatenation
//! ([`Sample::add`]), tensor products ([`Sample::multiply`]), merging of samples that share
//! their points ([`Sample::zip`]) and selection ([`Sample::take_elements`], [`Sample::subset`]).
//!
//! Integrals and point evaluations of a [`Function`] are lowered into an
//! [evaluation graph](evaluable), which a pluggable [`Evaluator`] executes into sparse results.
pub mod error;
pub mod evaluable;
pub mod function;
pub mod points;
pub mod procedural;
pub mod sample;
pub mod sparse;
pub mod transforms;
pub mod util;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
pub extern crate ndarray;

pub use error::SampleError;
pub use evaluable::{Arguments, Evaluator, Interpolation, Interpreter};
pub use function::Function;
pub use sample::{eval_integrals, Sample};
pub use sparse::{Assembled, SparseTensor};
