//! A small symbolic function algebra evaluated on samples.
//!
//! A [`Function`] has a static shape and is turned into an evaluation graph node by
//! [`Function::lower`], given the per-element context of the sample(s) it is evaluated on.
//! A function lowered with [`LowerArgs`] whose points shape is `P` yields a node of shape
//! `(*P, *function.shape())`.
use crate::error::SampleError;
use crate::evaluable::{ArrayNode, IndexNode, Interpolation};
use crate::sample::Sample;
use crate::transforms::Transforms;
use ndarray::{ArrayD, IxDyn};
use std::sync::Arc;

mod args;

pub use args::LowerArgs;

#[derive(Debug)]
enum FunctionKind {
    Constant(Arc<ArrayD<f64>>),
    Zeros,
    Argument(String),
    Geometry(String),
    Jacobian(String),
    Add(Function, Function),
    Multiply(Function, Function),
    Outer(Function, Function),
    Dot(Function, Arc<ArrayD<f64>>),
    Concatenate(Vec<Function>),
    RavelPoints(Function),
    Integral { sample: Sample, integrand: Function },
    ConcatenatePoints { sample: Sample, func: Function },
    ReorderPoints { func: Function, indices: IndexNode },
    Basis { sample: Sample, interpolation: Interpolation },
}

/// An array-valued function of the coordinates of one or more spaces.
///
/// Functions are immutable and cheap to clone.
#[derive(Debug, Clone)]
pub struct Function {
    shape: Vec<usize>,
    kind: Arc<FunctionKind>,
}

impl Function {
    fn new(shape: Vec<usize>, kind: FunctionKind) -> Self {
        Self {
            shape,
            kind: Arc::new(kind),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn constant(array: ArrayD<f64>) -> Self {
        Self::new(array.shape().to_vec(), FunctionKind::Constant(Arc::new(array)))
    }

    pub fn scalar(value: f64) -> Self {
        Self::constant(ArrayD::from_elem(IxDyn(&[]), value))
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(shape.to_vec(), FunctionKind::Zeros)
    }

    /// A named array that is supplied at evaluation time.
    pub fn argument(name: impl Into<String>, shape: &[usize]) -> Self {
        Self::new(shape.to_vec(), FunctionKind::Argument(name.into()))
    }

    /// The root coordinates of `space`, which has dimension `ndims`.
    pub fn geometry(space: impl Into<String>, ndims: usize) -> Self {
        Self::new(vec![ndims], FunctionKind::Geometry(space.into()))
    }

    /// The volume scaling from the local coordinates of `space` to its root coordinates.
    pub fn jacobian(space: impl Into<String>) -> Self {
        Self::new(vec![], FunctionKind::Jacobian(space.into()))
    }

    fn broadcast_shape(&self, other: &Function) -> Result<Vec<usize>, SampleError> {
        if self.shape == other.shape || other.shape.is_empty() {
            Ok(self.shape.clone())
        } else if self.shape.is_empty() {
            Ok(other.shape.clone())
        } else {
            Err(SampleError::ShapeMismatch {
                left: self.shape.clone(),
                right: other.shape.clone(),
            })
        }
    }

    /// Entry-wise sum. Both shapes must be equal, or one of the operands a scalar.
    pub fn add(&self, other: &Function) -> Result<Self, SampleError> {
        let shape = self.broadcast_shape(other)?;
        Ok(Self::new(shape, FunctionKind::Add(self.clone(), other.clone())))
    }

    /// Entry-wise product. Both shapes must be equal, or one of the operands a scalar.
    pub fn multiply(&self, other: &Function) -> Result<Self, SampleError> {
        let shape = self.broadcast_shape(other)?;
        Ok(Self::new(shape, FunctionKind::Multiply(self.clone(), other.clone())))
    }

    /// The outer product, of shape `(*self.shape(), *other.shape())`.
    pub fn outer(&self, other: &Function) -> Self {
        let shape = self.shape.iter().chain(&other.shape).copied().collect();
        Self::new(shape, FunctionKind::Outer(self.clone(), other.clone()))
    }

    /// Contracts the last axis of `self` with the first axis of `array`.
    pub fn dot(&self, array: ArrayD<f64>) -> Result<Self, SampleError> {
        match (self.shape.split_last(), array.shape().split_first()) {
            (Some((n, front)), Some((m, rest))) if n == m => {
                let shape = front.iter().chain(rest).copied().collect();
                Ok(Self::new(shape, FunctionKind::Dot(self.clone(), Arc::new(array))))
            }
            _ => Err(SampleError::ShapeMismatch {
                left: self.shape.clone(),
                right: array.shape().to_vec(),
            }),
        }
    }

    /// Concatenation along the first axis.
    pub fn concatenate(functions: Vec<Function>) -> Result<Self, SampleError> {
        let first = functions.first().ok_or(SampleError::EmptySelection)?;
        let (_, rest) = first
            .shape
            .split_first()
            .ok_or_else(|| SampleError::ShapeMismatch {
                left: vec![],
                right: vec![0],
            })?;
        let mut length = 0;
        for function in &functions {
            match function.shape.split_first() {
                Some((n, r)) if r == rest => length += n,
                _ => {
                    return Err(SampleError::ShapeMismatch {
                        left: first.shape.clone(),
                        right: function.shape.clone(),
                    })
                }
            }
        }
        let shape = std::iter::once(length).chain(rest.iter().copied()).collect();
        Ok(Self::new(shape, FunctionKind::Concatenate(functions)))
    }

    /// Merges the first two axes in row-major order.
    pub fn ravel_points(&self) -> Result<Self, SampleError> {
        match self.shape.as_slice() {
            [n1, n2, rest @ ..] => {
                let shape = std::iter::once(n1 * n2).chain(rest.iter().copied()).collect();
                Ok(Self::new(shape, FunctionKind::RavelPoints(self.clone())))
            }
            _ => Err(SampleError::ShapeMismatch {
                left: self.shape.clone(),
                right: vec![0, 0],
            }),
        }
    }

    /// The raveled outer product of two vectors: entry `i * other.len() + j` is
    /// `self[i] * other[j]`.
    pub fn kron(&self, other: &Function) -> Result<Self, SampleError> {
        if self.ndim() != 1 || other.ndim() != 1 {
            return Err(SampleError::ShapeMismatch {
                left: self.shape.clone(),
                right: other.shape.clone(),
            });
        }
        self.outer(other).ravel_points()
    }

    pub(crate) fn integral(sample: Sample, integrand: Function) -> Self {
        Self::new(integrand.shape.clone(), FunctionKind::Integral { sample, integrand })
    }

    pub(crate) fn concatenate_points(sample: Sample, func: Function) -> Self {
        let shape = std::iter::once(sample.npoints())
            .chain(func.shape.iter().copied())
            .collect();
        Self::new(shape, FunctionKind::ConcatenatePoints { sample, func })
    }

    pub(crate) fn reorder_points(func: Function, indices: IndexNode) -> Self {
        Self::new(func.shape.clone(), FunctionKind::ReorderPoints { func, indices })
    }

    pub(crate) fn basis(sample: Sample, interpolation: Interpolation) -> Self {
        Self::new(vec![sample.npoints()], FunctionKind::Basis { sample, interpolation })
    }

    fn shape_nodes(&self) -> impl Iterator<Item = IndexNode> + '_ {
        self.shape.iter().map(|&n| IndexNode::scalar(n))
    }

    /// Lowers the function to a graph node of shape `(*args.points_shape, *self.shape())`.
    pub fn lower(&self, args: &LowerArgs) -> Result<ArrayNode, SampleError> {
        use FunctionKind::*;
        let npoints_axes = args.points_shape.len();
        match self.kind.as_ref() {
            Constant(array) => Ok(prepend_points(ArrayNode::Constant(array.clone()), args)),
            Zeros => Ok(ArrayNode::Zeros(
                args.points_shape.iter().cloned().chain(self.shape_nodes()).collect(),
            )),
            Argument(name) => {
                let argument = ArrayNode::Argument {
                    name: name.clone(),
                    shape: self.shape.clone(),
                };
                Ok(prepend_points(argument, args))
            }
            Geometry(space) => {
                let (transforms, ielem) = lookup_chains(args, space)?;
                if transforms.todims() != self.shape[0] {
                    return Err(SampleError::ShapeMismatch {
                        left: self.shape.clone(),
                        right: vec![transforms.todims()],
                    });
                }
                let coords = args
                    .coordinates
                    .get(space)
                    .ok_or_else(|| SampleError::MissingSpace(space.clone()))?;
                Ok(ArrayNode::ApplyChain {
                    transforms: transforms.clone(),
                    ielem: Box::new(ielem.clone()),
                    coords: Box::new(coords.clone()),
                })
            }
            Jacobian(space) => {
                let (transforms, ielem) = lookup_chains(args, space)?;
                let jacobian = ArrayNode::ChainJacobian {
                    transforms: transforms.clone(),
                    ielem: Box::new(ielem.clone()),
                };
                Ok(prepend_points(jacobian, args))
            }
            Add(a, b) => {
                let (a, b) = (a.lower_broadcast(&self.shape, args)?, b.lower_broadcast(&self.shape, args)?);
                Ok(a.add(b))
            }
            Multiply(a, b) => {
                let (a, b) = (a.lower_broadcast(&self.shape, args)?, b.lower_broadcast(&self.shape, args)?);
                Ok(a.multiply(b))
            }
            Outer(a, b) => {
                let a_lowered = b
                    .shape
                    .iter()
                    .enumerate()
                    .fold(a.lower(args)?, |node, (k, &n)| {
                        node.insert_axis(npoints_axes + a.ndim() + k, IndexNode::scalar(n))
                    });
                let b_lowered = a
                    .shape
                    .iter()
                    .enumerate()
                    .fold(b.lower(args)?, |node, (k, &n)| {
                        node.insert_axis(npoints_axes + k, IndexNode::scalar(n))
                    });
                Ok(a_lowered.multiply(b_lowered))
            }
            Dot(f, matrix) => Ok(ArrayNode::Dot {
                array: Box::new(f.lower(args)?),
                matrix: matrix.clone(),
            }),
            Concatenate(functions) => {
                let arrays = functions
                    .iter()
                    .map(|f| f.lower(args))
                    .collect::<Result<_, _>>()?;
                Ok(ArrayNode::Concatenate {
                    arrays,
                    axis: npoints_axes,
                })
            }
            RavelPoints(f) => Ok(ArrayNode::Ravel {
                array: Box::new(f.lower(args)?),
                axis: npoints_axes,
            }),
            Integral { sample, integrand } => {
                let index = sample.loop_index();
                let ielem = index.node();
                let weights = sample.get_evaluable_weights(ielem.clone())?;
                let inner = args.clone().merge(sample.get_lower_args(ielem)?)?;
                let integrand = integrand.lower(&inner)?;
                let element_integral = ArrayNode::weighted_sum(weights, integrand, npoints_axes);
                let shape = args.points_shape.iter().cloned().chain(self.shape_nodes()).collect();
                Ok(ArrayNode::loop_sum(element_integral, index, shape))
            }
            ConcatenatePoints { sample, func } => {
                let index = sample.loop_index();
                let inner = args.clone().merge(sample.get_lower_args(index.node())?)?;
                let func_lowered = func.lower(&inner)?;
                let shape = args
                    .points_shape
                    .iter()
                    .cloned()
                    .chain(func.shape_nodes())
                    .collect();
                Ok(ArrayNode::loop_concatenate(func_lowered, index, npoints_axes, shape))
            }
            ReorderPoints { func, indices } => {
                let length = IndexNode::scalar(self.shape[0]);
                Ok(func.lower(args)?.inflate(indices.clone(), length, npoints_axes))
            }
            Basis { sample, interpolation } => sample.lower_basis(*interpolation, args),
        }
    }

    /// Lowers the function and broadcasts a scalar function to `shape`.
    fn lower_broadcast(&self, shape: &[usize], args: &LowerArgs) -> Result<ArrayNode, SampleError> {
        let lowered = self.lower(args)?;
        if self.shape.as_slice() == shape {
            return Ok(lowered);
        }
        let npoints_axes = args.points_shape.len();
        Ok(shape
            .iter()
            .enumerate()
            .fold(lowered, |node, (k, &n)| node.insert_axis(npoints_axes + k, IndexNode::scalar(n))))
    }
}

fn prepend_points(node: ArrayNode, args: &LowerArgs) -> ArrayNode {
    args.points_shape
        .iter()
        .enumerate()
        .fold(node, |node, (k, n)| node.insert_axis(k, n.clone()))
}

fn lookup_chains<'a>(args: &'a LowerArgs, space: &str) -> Result<(&'a Transforms, &'a IndexNode), SampleError> {
    let (transforms, ielem) = args
        .transform_chains
        .get(space)
        .ok_or_else(|| SampleError::MissingSpace(space.to_string()))?;
    let first = transforms
        .first()
        .ok_or_else(|| SampleError::MissingSpace(space.to_string()))?;
    Ok((first, ielem))
}
