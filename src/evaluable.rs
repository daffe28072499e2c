//! A lazy evaluation graph for array-valued computations over samples.
//!
//! Nodes are plain, immutable descriptions of a computation. Nothing is computed when a node
//! is constructed: an [`Evaluator`] executes a whole batch of nodes in a single pass. Element
//! loops are expressed in the graph itself through a [`LoopIndex`], so that per-element work is
//! never driven from the host side.
//!
//! Two node types exist: [`IndexNode`] evaluates to an integer array of rank zero or one and is
//! used for index arithmetic, while [`ArrayNode`] evaluates to a floating point array of
//! arbitrary rank.
use crate::error::SampleError;
use crate::points::PointsSequence;
use crate::sparse::SparseTensor;
use crate::transforms::Transforms;
use ndarray::{ArrayD, IxDyn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops;
use std::str::FromStr;
use std::sync::Arc;

mod interpreter;

pub use interpreter::Interpreter;

/// A symbolic loop variable ranging over `0 .. length`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoopIndex {
    name: Arc<str>,
    length: usize,
}

impl LoopIndex {
    pub fn new(name: impl Into<Arc<str>>, length: usize) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// The loop variable as an index node.
    pub fn node(&self) -> IndexNode {
        IndexNode::Loop(self.clone())
    }
}

/// An integer-valued node of rank zero or one.
#[derive(Debug, Clone)]
pub enum IndexNode {
    Constant(Arc<ArrayD<usize>>),
    Loop(LoopIndex),
    /// `0 .. n` for a scalar `n`.
    Range(Box<IndexNode>),
    /// Gathers entries of a one-dimensional array; the result has the shape of `indices`.
    Take {
        array: Box<IndexNode>,
        indices: Box<IndexNode>,
    },
    Add(Box<IndexNode>, Box<IndexNode>),
    Mul(Box<IndexNode>, Box<IndexNode>),
    Div(Box<IndexNode>, Box<IndexNode>),
    Rem(Box<IndexNode>, Box<IndexNode>),
    /// The length of `array` along `axis`.
    Length { array: Box<ArrayNode>, axis: usize },
    /// The number of entries of an index array.
    Size(Box<IndexNode>),
    /// Concatenation of the one-dimensional `body` over all values of `index`.
    LoopConcatenate { body: Box<IndexNode>, index: LoopIndex },
    /// The element of `target` that contains element `ielem` of `source`.
    TransformIndex {
        target: Transforms,
        source: Transforms,
        ielem: Box<IndexNode>,
    },
}

impl IndexNode {
    pub fn scalar(value: usize) -> Self {
        Self::Constant(Arc::new(ArrayD::from_elem(IxDyn(&[]), value)))
    }

    pub fn array(values: Vec<usize>) -> Self {
        let n = values.len();
        Self::Constant(Arc::new(
            ArrayD::from_shape_vec(IxDyn(&[n]), values).expect("Internal error: Shape matches length"),
        ))
    }

    pub fn range(length: IndexNode) -> Self {
        Self::Range(Box::new(length))
    }

    /// Entries of `self` (one-dimensional) at `indices`.
    pub fn take(self, indices: IndexNode) -> Self {
        Self::Take {
            array: Box::new(self),
            indices: Box::new(indices),
        }
    }

    /// Quotient and remainder with respect to `divisor`.
    pub fn divmod(self, divisor: usize) -> (Self, Self) {
        (self.clone() / Self::scalar(divisor), self % Self::scalar(divisor))
    }

    pub fn length(array: ArrayNode, axis: usize) -> Self {
        Self::Length {
            array: Box::new(array),
            axis,
        }
    }

    pub fn size(self) -> Self {
        Self::Size(Box::new(self))
    }

    pub fn loop_concatenate(body: IndexNode, index: LoopIndex) -> Self {
        Self::LoopConcatenate {
            body: Box::new(body),
            index,
        }
    }
}

macro_rules! impl_index_node_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl ops::$trait for IndexNode {
            type Output = IndexNode;

            fn $method(self, rhs: IndexNode) -> IndexNode {
                IndexNode::$variant(Box::new(self), Box::new(rhs))
            }
        }
    };
}

impl_index_node_op!(Add, add, Add);
impl_index_node_op!(Mul, mul, Mul);
impl_index_node_op!(Div, div, Div);
impl_index_node_op!(Rem, rem, Rem);

/// Interpolation scheme used to map query points onto sampled points.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Every query point must coincide with a sampled point.
    #[default]
    None,
    /// Every query point is mapped onto its nearest sampled point.
    ///
    /// If several sampled points are equally near, each of them receives an equal share of the
    /// weight, rather than a single one of them being picked.
    Nearest,
}

impl FromStr for Interpolation {
    type Err = SampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "nearest" => Ok(Self::Nearest),
            other => Err(SampleError::InvalidInterpolation(other.to_string())),
        }
    }
}

impl Display for Interpolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Nearest => write!(f, "nearest"),
        }
    }
}

/// A floating point node of arbitrary rank.
#[derive(Debug, Clone)]
pub enum ArrayNode {
    Constant(Arc<ArrayD<f64>>),
    /// A named array supplied at evaluation time.
    Argument { name: String, shape: Vec<usize> },
    Zeros(Vec<IndexNode>),
    /// Local coordinates (`npoints x ndims`) of an element.
    ElementCoords { points: PointsSequence, ielem: Box<IndexNode> },
    /// Integration weights (`npoints`) of an element.
    ElementWeights { points: PointsSequence, ielem: Box<IndexNode> },
    /// Repeats `array` `length` times along a new axis at position `axis`.
    InsertAxis {
        array: Box<ArrayNode>,
        axis: usize,
        length: Box<IndexNode>,
    },
    /// Gathers along `axis`.
    Take {
        array: Box<ArrayNode>,
        indices: Box<IndexNode>,
        axis: usize,
    },
    /// Scatters along `axis` into an axis of length `length`, adding duplicates.
    Inflate {
        array: Box<ArrayNode>,
        indices: Box<IndexNode>,
        length: Box<IndexNode>,
        axis: usize,
    },
    Add(Box<ArrayNode>, Box<ArrayNode>),
    Multiply(Box<ArrayNode>, Box<ArrayNode>),
    /// Contracts `axis` of `array` with the one-dimensional `weights`.
    WeightedSum {
        weights: Box<ArrayNode>,
        array: Box<ArrayNode>,
        axis: usize,
    },
    /// Contracts the last axis of `array` with the first axis of `matrix`.
    Dot { array: Box<ArrayNode>, matrix: Arc<ArrayD<f64>> },
    /// Merges `axis` and `axis + 1` in row-major order.
    Ravel { array: Box<ArrayNode>, axis: usize },
    Concatenate { arrays: Vec<ArrayNode>, axis: usize },
    /// Sum of `body` over all values of `index`. `shape` is the shape of the result, which is
    /// needed when the loop is empty.
    LoopSum {
        body: Box<ArrayNode>,
        index: LoopIndex,
        shape: Vec<IndexNode>,
    },
    /// Concatenation of `body` along `axis` over all values of `index`. `shape` is the shape of
    /// the body with the concatenation axis omitted.
    LoopConcatenate {
        body: Box<ArrayNode>,
        index: LoopIndex,
        axis: usize,
        shape: Vec<IndexNode>,
    },
    /// Maps local coordinates (last axis) of element `ielem` to root coordinates.
    ApplyChain {
        transforms: Transforms,
        ielem: Box<IndexNode>,
        coords: Box<ArrayNode>,
    },
    /// The volume scaling of the chain of element `ielem`, as a scalar.
    ChainJacobian { transforms: Transforms, ielem: Box<IndexNode> },
    /// Maps local coordinates of element `ielem` of `source` into the local coordinates of the
    /// containing element of `target`.
    RelativeCoords {
        target: Transforms,
        source: Transforms,
        ielem: Box<IndexNode>,
        coords: Box<ArrayNode>,
    },
    /// Matches query coordinates `(.., ndims)` against expected coordinates `(m, ndims)`,
    /// producing weights `(.., m)`.
    Sampled {
        coords: Box<ArrayNode>,
        expect: Box<ArrayNode>,
        interpolation: Interpolation,
    },
}

impl ArrayNode {
    pub fn constant(array: ArrayD<f64>) -> Self {
        Self::Constant(Arc::new(array))
    }

    pub fn insert_axis(self, axis: usize, length: IndexNode) -> Self {
        Self::InsertAxis {
            array: Box::new(self),
            axis,
            length: Box::new(length),
        }
    }

    pub fn take(self, indices: IndexNode, axis: usize) -> Self {
        Self::Take {
            array: Box::new(self),
            indices: Box::new(indices),
            axis,
        }
    }

    pub fn inflate(self, indices: IndexNode, length: IndexNode, axis: usize) -> Self {
        Self::Inflate {
            array: Box::new(self),
            indices: Box::new(indices),
            length: Box::new(length),
            axis,
        }
    }

    pub fn add(self, other: ArrayNode) -> Self {
        Self::Add(Box::new(self), Box::new(other))
    }

    pub fn multiply(self, other: ArrayNode) -> Self {
        Self::Multiply(Box::new(self), Box::new(other))
    }

    pub fn weighted_sum(weights: ArrayNode, array: ArrayNode, axis: usize) -> Self {
        Self::WeightedSum {
            weights: Box::new(weights),
            array: Box::new(array),
            axis,
        }
    }

    pub fn loop_sum(body: ArrayNode, index: LoopIndex, shape: Vec<IndexNode>) -> Self {
        Self::LoopSum {
            body: Box::new(body),
            index,
            shape,
        }
    }

    pub fn loop_concatenate(body: ArrayNode, index: LoopIndex, axis: usize, shape: Vec<IndexNode>) -> Self {
        Self::LoopConcatenate {
            body: Box::new(body),
            index,
            axis,
            shape,
        }
    }
}

/// A named argument value: an array, or a nested set of arguments.
#[derive(Debug, Clone)]
pub enum Argument {
    Array(ArrayD<f64>),
    Nested(Arguments),
}

/// Named arrays supplied at evaluation time.
///
/// For compatibility, the arguments may also be nested one level deep under the single key
/// `"arguments"`; see [`Arguments::normalized`].
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    entries: FxHashMap<String, Argument>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `inner` under the key `"arguments"`.
    pub fn nested(inner: Arguments) -> Self {
        let mut arguments = Self::new();
        arguments
            .entries
            .insert("arguments".to_string(), Argument::Nested(inner));
        arguments
    }

    pub fn with(mut self, name: impl Into<String>, array: ArrayD<f64>) -> Self {
        self.insert(name, array);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, array: ArrayD<f64>) {
        self.entries.insert(name.into(), Argument::Array(array));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.entries.get(name)
    }

    /// The flat form of the arguments.
    ///
    /// If the arguments consist of the single key `"arguments"` holding nested arguments, those
    /// are returned. Otherwise the arguments are returned unchanged.
    pub fn normalized(&self) -> Cow<'_, Arguments> {
        match self.entries.get("arguments") {
            Some(Argument::Nested(inner)) if self.entries.len() == 1 => Cow::Borrowed(inner),
            _ => Cow::Borrowed(self),
        }
    }
}

impl<S: Into<String>> FromIterator<(S, ArrayD<f64>)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (S, ArrayD<f64>)>>(iter: I) -> Self {
        let mut arguments = Self::new();
        for (name, array) in iter {
            arguments.insert(name, array);
        }
        arguments
    }
}

/// Executes batches of graph nodes.
pub trait Evaluator {
    /// Evaluates all `nodes` in one pass, producing one sparse tensor per node.
    fn eval_sparse(&self, nodes: &[ArrayNode], arguments: &Arguments) -> eyre::Result<Vec<SparseTensor>>;
}

/// Evaluates `nodes` with the default [`Interpreter`].
pub fn eval_sparse(nodes: &[ArrayNode], arguments: &Arguments) -> eyre::Result<Vec<SparseTensor>> {
    Interpreter::default().eval_sparse(nodes, arguments)
}
