use crate::evaluable::{Argument as ArgumentValue, ArrayNode, Arguments, Evaluator, IndexNode, Interpolation, LoopIndex};
use crate::sparse::SparseTensor;
use crate::transforms::{apply_chain, chain_jacobian, TransformChain, Transforms};
use eyre::{eyre, WrapErr};
use log::warn;
use nalgebra::DMatrix;
use ndarray::{concatenate, Array1, ArrayD, ArrayView, Axis, IxDyn, Zip};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::Arc;

type Env = FxHashMap<Arc<str>, usize>;

/// A straightforward recursive evaluator for graph nodes.
///
/// Nodes are evaluated to dense arrays, which are converted to sparse tensors at the very end.
/// Loops are executed by binding the loop index in an environment and evaluating the loop body
/// once per iteration. With [`Interpreter::parallel`], loop iterations are distributed over the
/// rayon thread pool.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Interpreter {
    parallel: bool,
}

impl Interpreter {
    /// An interpreter that executes loop iterations in parallel.
    pub fn parallel() -> Self {
        Self { parallel: true }
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Evaluates a single node to a dense array.
    pub fn eval_dense(&self, node: &ArrayNode, arguments: &Arguments) -> eyre::Result<ArrayD<f64>> {
        let arguments = arguments.normalized();
        self.eval_array(node, &arguments, &Env::default())
    }

    fn eval_index(&self, node: &IndexNode, arguments: &Arguments, env: &Env) -> eyre::Result<ArrayD<usize>> {
        use IndexNode::*;
        match node {
            Constant(array) => Ok((**array).clone()),
            Loop(index) => {
                let value = env
                    .get(index.name())
                    .copied()
                    .ok_or_else(|| eyre!("loop index {:?} is used outside of its loop", index.name()))?;
                Ok(ArrayD::from_elem(IxDyn(&[]), value))
            }
            Range(length) => {
                let n = self.eval_scalar(length, arguments, env)?;
                Ok(Array1::from_iter(0..n).into_dyn())
            }
            Take { array, indices } => {
                let array = self.eval_index(array, arguments, env)?;
                if array.ndim() != 1 {
                    return Err(eyre!("index take requires a one-dimensional array, got shape {:?}", array.shape()));
                }
                let indices = self.eval_index(indices, arguments, env)?;
                let len = array.len();
                if let Some(&i) = indices.iter().find(|&&i| i >= len) {
                    return Err(eyre!("index {} out of range for array of length {}", i, len));
                }
                Ok(indices.mapv(|i| array[IxDyn(&[i])]))
            }
            Add(a, b) => self.eval_index_binary(a, b, arguments, env, |x, y| Ok(x + y)),
            Mul(a, b) => self.eval_index_binary(a, b, arguments, env, |x, y| Ok(x * y)),
            Div(a, b) => self.eval_index_binary(a, b, arguments, env, |x, y| {
                x.checked_div(y).ok_or_else(|| eyre!("integer division by zero"))
            }),
            Rem(a, b) => self.eval_index_binary(a, b, arguments, env, |x, y| {
                x.checked_rem(y).ok_or_else(|| eyre!("integer division by zero"))
            }),
            Length { array, axis } => {
                let array = self.eval_array(array, arguments, env)?;
                let length = array
                    .shape()
                    .get(*axis)
                    .copied()
                    .ok_or_else(|| eyre!("axis {} out of range for shape {:?}", axis, array.shape()))?;
                Ok(ArrayD::from_elem(IxDyn(&[]), length))
            }
            Size(array) => {
                let array = self.eval_index(array, arguments, env)?;
                Ok(ArrayD::from_elem(IxDyn(&[]), array.len()))
            }
            LoopConcatenate { body, index } => {
                let parts = self.eval_loop(index, env, |env| {
                    let part = self.eval_index(body, arguments, env)?;
                    match part.ndim() {
                        0 | 1 => Ok(part.iter().copied().collect::<Vec<_>>()),
                        _ => Err(eyre!("loop concatenation of indices requires rank 0 or 1, got {:?}", part.shape())),
                    }
                })?;
                Ok(Array1::from(parts.concat()).into_dyn())
            }
            TransformIndex { target, source, ielem } => {
                let (index, _) = self.locate(target, source, ielem, arguments, env)?;
                Ok(ArrayD::from_elem(IxDyn(&[]), index))
            }
        }
    }

    fn eval_scalar(&self, node: &IndexNode, arguments: &Arguments, env: &Env) -> eyre::Result<usize> {
        let value = self.eval_index(node, arguments, env)?;
        if value.ndim() != 0 {
            return Err(eyre!("expected a scalar index, got shape {:?}", value.shape()));
        }
        Ok(value[IxDyn(&[])])
    }

    fn eval_index_vector(&self, node: &IndexNode, arguments: &Arguments, env: &Env) -> eyre::Result<Vec<usize>> {
        let value = self.eval_index(node, arguments, env)?;
        if value.ndim() != 1 {
            return Err(eyre!("expected a one-dimensional index array, got shape {:?}", value.shape()));
        }
        Ok(value.iter().copied().collect())
    }

    fn eval_index_binary(
        &self,
        a: &IndexNode,
        b: &IndexNode,
        arguments: &Arguments,
        env: &Env,
        op: impl Fn(usize, usize) -> eyre::Result<usize>,
    ) -> eyre::Result<ArrayD<usize>> {
        let a = self.eval_index(a, arguments, env)?;
        let b = self.eval_index(b, arguments, env)?;
        let values = broadcast_binary(&a, &b)?
            .into_iter()
            .map(|(x, y)| op(x, y))
            .collect::<eyre::Result<Vec<_>>>()?;
        let shape = if a.ndim() == 0 { b.shape() } else { a.shape() };
        Ok(ArrayD::from_shape_vec(IxDyn(shape), values)?)
    }

    fn eval_loop<T: Send>(
        &self,
        index: &LoopIndex,
        env: &Env,
        body: impl Fn(&Env) -> eyre::Result<T> + Sync,
    ) -> eyre::Result<Vec<T>> {
        let name: Arc<str> = Arc::from(index.name());
        let iteration = |i: usize| {
            let mut env = env.clone();
            env.insert(name.clone(), i);
            body(&env)
        };
        if self.parallel {
            (0..index.length()).into_par_iter().map(iteration).collect()
        } else {
            (0..index.length()).map(iteration).collect()
        }
    }

    fn element_chain<'t>(
        &self,
        transforms: &'t Transforms,
        ielem: &IndexNode,
        arguments: &Arguments,
        env: &Env,
    ) -> eyre::Result<&'t TransformChain> {
        let ielem = self.eval_scalar(ielem, arguments, env)?;
        transforms
            .get(ielem)
            .ok_or_else(|| eyre!("element {} out of range for {} transform chains", ielem, transforms.len()))
    }

    /// The element of `target` containing element `ielem` of `source`, and the chain of the
    /// source element.
    fn locate<'t>(
        &self,
        target: &Transforms,
        source: &'t Transforms,
        ielem: &IndexNode,
        arguments: &Arguments,
        env: &Env,
    ) -> eyre::Result<(usize, (&'t TransformChain, usize))> {
        let chain = self.element_chain(source, ielem, arguments, env)?;
        let (index, prefix) = target
            .index_with_tail(chain)
            .ok_or_else(|| eyre!("element is not contained in any element of the target transforms"))?;
        Ok((index, (chain, prefix)))
    }

    fn eval_array(&self, node: &ArrayNode, arguments: &Arguments, env: &Env) -> eyre::Result<ArrayD<f64>> {
        use ArrayNode::*;
        match node {
            Constant(array) => Ok((**array).clone()),
            Argument { name, shape } => match arguments.get(name) {
                Some(ArgumentValue::Array(array)) if array.shape() == shape.as_slice() => Ok(array.clone()),
                Some(ArgumentValue::Array(array)) => Err(eyre!(
                    "argument {:?} has shape {:?}, expected {:?}",
                    name,
                    array.shape(),
                    shape
                )),
                Some(ArgumentValue::Nested(_)) => Err(eyre!("argument {:?} is not an array", name)),
                None => Err(eyre!("missing argument {:?}", name)),
            },
            Zeros(shape) => {
                let shape = self.eval_shape(shape, arguments, env)?;
                Ok(ArrayD::zeros(IxDyn(&shape)))
            }
            ElementCoords { points, ielem } => {
                let ielem = self.eval_scalar(ielem, arguments, env)?;
                let coords = points.get(ielem)?.coords();
                matrix_to_array(coords, &[coords.nrows()])
            }
            ElementWeights { points, ielem } => {
                let ielem = self.eval_scalar(ielem, arguments, env)?;
                let weights = points
                    .get(ielem)?
                    .weights()
                    .ok_or_else(|| eyre!("points of element {} have no integration weights", ielem))?;
                Ok(Array1::from_iter(weights.iter().copied()).into_dyn())
            }
            InsertAxis { array, axis, length } => {
                let array = self.eval_array(array, arguments, env)?;
                let length = self.eval_scalar(length, arguments, env)?;
                if *axis > array.ndim() {
                    return Err(eyre!("cannot insert axis {} into array of rank {}", axis, array.ndim()));
                }
                let array = array.insert_axis(Axis(*axis));
                let mut shape = array.shape().to_vec();
                shape[*axis] = length;
                let broadcast = array
                    .broadcast(IxDyn(&shape))
                    .ok_or_else(|| eyre!("cannot broadcast to shape {:?}", shape))?;
                Ok(broadcast.to_owned())
            }
            Take { array, indices, axis } => {
                let array = self.eval_array(array, arguments, env)?;
                let indices = self.eval_index_vector(indices, arguments, env)?;
                let len = axis_length(&array, *axis)?;
                if let Some(&i) = indices.iter().find(|&&i| i >= len) {
                    return Err(eyre!("index {} out of range for axis of length {}", i, len));
                }
                Ok(array.select(Axis(*axis), &indices))
            }
            Inflate {
                array,
                indices,
                length,
                axis,
            } => {
                let array = self.eval_array(array, arguments, env)?;
                let indices = self.eval_index_vector(indices, arguments, env)?;
                let length = self.eval_scalar(length, arguments, env)?;
                let len = axis_length(&array, *axis)?;
                if indices.len() != len {
                    return Err(eyre!("{} scatter indices for an axis of length {}", indices.len(), len));
                }
                let mut shape = array.shape().to_vec();
                shape[*axis] = length;
                let mut result = ArrayD::zeros(IxDyn(&shape));
                for (k, &i) in indices.iter().enumerate() {
                    if i >= length {
                        return Err(eyre!("scatter index {} out of range for length {}", i, length));
                    }
                    let mut target = result.index_axis_mut(Axis(*axis), i);
                    target += &array.index_axis(Axis(*axis), k);
                }
                Ok(result)
            }
            Add(a, b) => self.eval_array_binary(a, b, arguments, env, |x, y| x + y),
            Multiply(a, b) => self.eval_array_binary(a, b, arguments, env, |x, y| x * y),
            WeightedSum { weights, array, axis } => {
                let weights = self.eval_array(weights, arguments, env)?;
                let array = self.eval_array(array, arguments, env)?;
                let len = axis_length(&array, *axis)?;
                if weights.ndim() != 1 || weights.len() != len {
                    return Err(eyre!(
                        "weights of shape {:?} do not match axis {} of shape {:?}",
                        weights.shape(),
                        axis,
                        array.shape()
                    ));
                }
                let mut shape = array.shape().to_vec();
                shape.remove(*axis);
                let mut result = ArrayD::zeros(IxDyn(&shape));
                for (k, &w) in weights.iter().enumerate() {
                    result.scaled_add(w, &array.index_axis(Axis(*axis), k));
                }
                Ok(result)
            }
            Dot { array, matrix } => {
                let array = self.eval_array(array, arguments, env)?;
                let n = array
                    .shape()
                    .last()
                    .copied()
                    .ok_or_else(|| eyre!("cannot contract a scalar"))?;
                if matrix.shape().first() != Some(&n) {
                    return Err(eyre!("cannot contract shape {:?} with {:?}", array.shape(), matrix.shape()));
                }
                let front = &array.shape()[..array.ndim() - 1];
                let rest = &matrix.shape()[1..];
                let (p, q) = (front.iter().product::<usize>(), rest.iter().product::<usize>());
                let lhs = array.as_standard_layout().into_owned().into_shape((p, n))?;
                let rhs = matrix.as_standard_layout().into_owned().into_shape((n, q))?;
                let shape: Vec<usize> = front.iter().chain(rest).copied().collect();
                Ok(lhs.dot(&rhs).into_shape(IxDyn(&shape))?)
            }
            Ravel { array, axis } => {
                let array = self.eval_array(array, arguments, env)?;
                if axis + 1 >= array.ndim() {
                    return Err(eyre!("cannot ravel axis {} of array with shape {:?}", axis, array.shape()));
                }
                let mut shape = array.shape().to_vec();
                let inner = shape.remove(axis + 1);
                shape[*axis] *= inner;
                Ok(array.as_standard_layout().into_owned().into_shape(IxDyn(&shape))?)
            }
            Concatenate { arrays, axis } => {
                let arrays = arrays
                    .iter()
                    .map(|array| self.eval_array(array, arguments, env))
                    .collect::<eyre::Result<Vec<_>>>()?;
                concatenate_arrays(&arrays, *axis, None)
            }
            LoopSum { body, index, shape } => {
                let shape = self.eval_shape(shape, arguments, env)?;
                let parts = self.eval_loop(index, env, |env| self.eval_array(body, arguments, env))?;
                let mut result = ArrayD::zeros(IxDyn(&shape));
                for part in parts {
                    if part.shape() != shape.as_slice() {
                        return Err(eyre!("loop body has shape {:?}, expected {:?}", part.shape(), shape));
                    }
                    result += &part;
                }
                Ok(result)
            }
            LoopConcatenate {
                body,
                index,
                axis,
                shape,
            } => {
                let mut empty_shape = self.eval_shape(shape, arguments, env)?;
                if *axis > empty_shape.len() {
                    return Err(eyre!("concatenation axis {} out of range", axis));
                }
                empty_shape.insert(*axis, 0);
                let parts = self.eval_loop(index, env, |env| self.eval_array(body, arguments, env))?;
                concatenate_arrays(&parts, *axis, Some(&empty_shape))
            }
            ApplyChain {
                transforms,
                ielem,
                coords,
            } => {
                let chain = self.element_chain(transforms, ielem, arguments, env)?;
                let coords = self.eval_array(coords, arguments, env)?;
                let (front, coords) = array_to_matrix(&coords)?;
                matrix_to_array(&apply_chain(chain, &coords), &front)
            }
            ChainJacobian { transforms, ielem } => {
                let chain = self.element_chain(transforms, ielem, arguments, env)?;
                Ok(ArrayD::from_elem(IxDyn(&[]), chain_jacobian(chain, transforms.todims())))
            }
            RelativeCoords {
                target,
                source,
                ielem,
                coords,
            } => {
                let (_, (chain, prefix)) = self.locate(target, source, ielem, arguments, env)?;
                let coords = self.eval_array(coords, arguments, env)?;
                let (front, coords) = array_to_matrix(&coords)?;
                matrix_to_array(&apply_chain(&chain[prefix..], &coords), &front)
            }
            Sampled {
                coords,
                expect,
                interpolation,
            } => {
                let coords = self.eval_array(coords, arguments, env)?;
                let expect = self.eval_array(expect, arguments, env)?;
                let (front, coords) = array_to_matrix(&coords)?;
                let (_, expect) = array_to_matrix(&expect)?;
                matrix_to_array(&sample_weights(&coords, &expect, *interpolation)?, &front)
            }
        }
    }

    fn eval_shape(&self, shape: &[IndexNode], arguments: &Arguments, env: &Env) -> eyre::Result<Vec<usize>> {
        shape
            .iter()
            .map(|n| self.eval_scalar(n, arguments, env))
            .collect()
    }

    fn eval_array_binary(
        &self,
        a: &ArrayNode,
        b: &ArrayNode,
        arguments: &Arguments,
        env: &Env,
        op: impl Fn(f64, f64) -> f64,
    ) -> eyre::Result<ArrayD<f64>> {
        let a = self.eval_array(a, arguments, env)?;
        let b = self.eval_array(b, arguments, env)?;
        let values: Vec<f64> = broadcast_binary(&a, &b)?
            .into_iter()
            .map(|(x, y)| op(x, y))
            .collect();
        let shape = if a.ndim() == 0 { b.shape() } else { a.shape() };
        Ok(ArrayD::from_shape_vec(IxDyn(shape), values)?)
    }
}

impl Evaluator for Interpreter {
    fn eval_sparse(&self, nodes: &[ArrayNode], arguments: &Arguments) -> eyre::Result<Vec<SparseTensor>> {
        let arguments = arguments.normalized();
        let env = Env::default();
        nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let dense = self
                    .eval_array(node, &arguments, &env)
                    .wrap_err_with(|| format!("failed to evaluate node {}", i))?;
                Ok(SparseTensor::from_dense(&dense))
            })
            .collect()
    }
}

/// Pairs of entries of `a` and `b` in row-major order, where either may be a scalar.
fn broadcast_binary<T: Copy>(a: &ArrayD<T>, b: &ArrayD<T>) -> eyre::Result<Vec<(T, T)>> {
    if a.ndim() == 0 {
        let x = a[IxDyn(&[])];
        Ok(b.iter().map(|&y| (x, y)).collect())
    } else if b.ndim() == 0 {
        let y = b[IxDyn(&[])];
        Ok(a.iter().map(|&x| (x, y)).collect())
    } else if a.shape() == b.shape() {
        let mut pairs = Vec::with_capacity(a.len());
        Zip::from(a).and(b).for_each(|&x, &y| pairs.push((x, y)));
        Ok(pairs)
    } else {
        Err(eyre!("incompatible shapes {:?} and {:?}", a.shape(), b.shape()))
    }
}

fn axis_length<T>(array: &ArrayD<T>, axis: usize) -> eyre::Result<usize> {
    array
        .shape()
        .get(axis)
        .copied()
        .ok_or_else(|| eyre!("axis {} out of range for shape {:?}", axis, array.shape()))
}

fn concatenate_arrays(arrays: &[ArrayD<f64>], axis: usize, empty_shape: Option<&[usize]>) -> eyre::Result<ArrayD<f64>> {
    if arrays.is_empty() {
        let shape = empty_shape.ok_or_else(|| eyre!("cannot concatenate zero arrays"))?;
        return Ok(ArrayD::zeros(IxDyn(shape)));
    }
    let views: Vec<ArrayView<f64, IxDyn>> = arrays.iter().map(|a| a.view()).collect();
    concatenate(Axis(axis), &views).wrap_err("incompatible shapes in concatenation")
}

/// Flattens all but the last axis, returning the leading shape and a `rows x ndims` matrix.
fn array_to_matrix(array: &ArrayD<f64>) -> eyre::Result<(Vec<usize>, DMatrix<f64>)> {
    let (&ncols, front) = array
        .shape()
        .split_last()
        .ok_or_else(|| eyre!("coordinates must have at least one axis"))?;
    let nrows = front.iter().product();
    let entries: Vec<f64> = array.iter().copied().collect();
    Ok((front.to_vec(), DMatrix::from_row_slice(nrows, ncols, &entries)))
}

/// Inverse of [`array_to_matrix`]: the rows of `matrix` laid out with leading shape `front`.
fn matrix_to_array(matrix: &DMatrix<f64>, front: &[usize]) -> eyre::Result<ArrayD<f64>> {
    let mut shape = front.to_vec();
    shape.push(matrix.ncols());
    let row_major = matrix.transpose();
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), row_major.as_slice().to_vec())?)
}

/// For every row of `coords`, the weights of the rows of `expect` it is matched with.
fn sample_weights(coords: &DMatrix<f64>, expect: &DMatrix<f64>, interpolation: Interpolation) -> eyre::Result<DMatrix<f64>> {
    if coords.ncols() != expect.ncols() {
        return Err(eyre!(
            "query points have dimension {}, sampled points {}",
            coords.ncols(),
            expect.ncols()
        ));
    }
    let mut weights = DMatrix::zeros(coords.nrows(), expect.nrows());
    for (i, query) in coords.row_iter().enumerate() {
        let distances: Vec<f64> = expect
            .row_iter()
            .map(|row| (&row - &query).norm_squared())
            .collect();
        match interpolation {
            Interpolation::None => {
                let j = distances
                    .iter()
                    .position(|&d| d == 0.0)
                    .ok_or_else(|| eyre!("point {:?} does not coincide with any sampled point", row_entries(&query)))?;
                weights[(i, j)] = 1.0;
            }
            Interpolation::Nearest => {
                let nearest = distances.iter().copied().fold(f64::INFINITY, f64::min);
                let matches: Vec<usize> = (0..distances.len())
                    .filter(|&j| distances[j] == nearest)
                    .collect();
                if matches.len() > 1 {
                    warn!(
                        "point {:?} is equally close to {} sampled points",
                        row_entries(&query),
                        matches.len()
                    );
                }
                for &j in &matches {
                    weights[(i, j)] = 1.0 / matches.len() as f64;
                }
            }
        }
    }
    Ok(weights)
}

fn row_entries<'a>(row: impl IntoIterator<Item = &'a f64>) -> Vec<f64> {
    row.into_iter().copied().collect()
}
