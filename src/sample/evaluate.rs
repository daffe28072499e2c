//! Integration and evaluation of functions on samples.
use crate::error::SampleError;
use crate::evaluable::{ArrayNode, Arguments, Evaluator, IndexNode, Interpolation, Interpreter};
use crate::function::{Function, LowerArgs};
use crate::sample::{Sample, SampleKind};
use crate::sparse::{Assembled, SparseTensor};
use eyre::WrapErr;
use log::debug;
use ndarray::ArrayD;

/// Lowers functions that do not depend on any points axes.
fn lower_all(funcs: &[Function]) -> Result<Vec<ArrayNode>, SampleError> {
    let args = LowerArgs::default();
    funcs.iter().map(|f| f.lower(&args)).collect()
}

fn assemble_all(tensors: Vec<SparseTensor>) -> eyre::Result<Vec<Assembled>> {
    debug!("Assembling {} results", tensors.len());
    tensors
        .iter()
        .map(|tensor| tensor.assemble().map_err(eyre::Report::from))
        .collect()
}

/// Evaluates several deferred integrals in one pass, see [`Sample::integral`].
///
/// Results are converted as by [`Sample::integrate`].
pub fn eval_integrals(integrals: &[Function], arguments: &Arguments) -> eyre::Result<Vec<Assembled>> {
    eval_integrals_with(&Interpreter::default(), integrals, arguments)
}

pub fn eval_integrals_with(
    evaluator: &dyn Evaluator,
    integrals: &[Function],
    arguments: &Arguments,
) -> eyre::Result<Vec<Assembled>> {
    let nodes = lower_all(integrals)?;
    debug!("Evaluating {} integrals", nodes.len());
    assemble_all(evaluator.eval_sparse(&nodes, arguments)?)
}

impl Sample {
    /// A deferred integral of `func` over this sample.
    ///
    /// The integral is a function with the shape of `func`, which is evaluated only once it is
    /// passed to [`eval_integrals`] or used inside another function.
    pub fn integral(&self, func: &Function) -> Function {
        match &self.data.kind {
            SampleKind::Empty => Function::zeros(func.shape()),
            SampleKind::Sum(s1, s2) => s1
                .integral(func)
                .add(&s2.integral(func))
                .expect("Internal error: Integrals of the same function have equal shapes"),
            SampleKind::Product(s1, s2) => s1.integral(&s2.integral(func)),
            _ => Function::integral(self.clone(), func.clone()),
        }
    }

    /// The values of `func` at all points, as a function with a leading points axis.
    ///
    /// Entry `i` along the leading axis holds the value at global point `i`.
    pub fn apply(&self, func: &Function) -> Result<Function, SampleError> {
        match &self.data.kind {
            SampleKind::Empty => {
                let shape: Vec<usize> = std::iter::once(0).chain(func.shape().iter().copied()).collect();
                Ok(Function::zeros(&shape))
            }
            SampleKind::Leaf(_) => Ok(Function::concatenate_points(self.clone(), func.clone())),
            SampleKind::Sum(s1, s2) => Function::concatenate(vec![s1.apply(func)?, s2.apply(func)?]),
            SampleKind::Product(s1, s2) => s1.apply(&s2.apply(func)?)?.ravel_points(),
            _ => {
                let index = self.loop_index();
                let element_indices = self.get_evaluable_indices(index.node())?;
                let indices = IndexNode::loop_concatenate(element_indices, index);
                Ok(Function::reorder_points(
                    Function::concatenate_points(self.clone(), func.clone()),
                    indices,
                ))
            }
        }
    }

    /// A function of shape `(npoints,)` that maps coordinates onto the points of this sample.
    ///
    /// Evaluated at point `i` of this sample, the basis is the unit vector `e_i`. At other
    /// coordinates, the behavior depends on `interpolation`: [`Interpolation::None`] fails
    /// evaluation, and [`Interpolation::Nearest`] selects the nearest point(s) within the
    /// containing element.
    pub fn basis(&self, interpolation: Interpolation) -> Result<Function, SampleError> {
        match &self.data.kind {
            SampleKind::Leaf(_) | SampleKind::Reindexed { .. } => Ok(Function::basis(self.clone(), interpolation)),
            SampleKind::Empty => Ok(Function::zeros(&[0])),
            SampleKind::Product(s1, s2) => s1.basis(interpolation)?.kron(&s2.basis(interpolation)?),
            _ => Err(SampleError::NotImplemented {
                operation: "basis",
                variant: self.variant_name(),
            }),
        }
    }

    /// Lowers the basis of a transform-backed sample.
    pub(crate) fn lower_basis(&self, interpolation: Interpolation, args: &LowerArgs) -> Result<ArrayNode, SampleError> {
        let leaf = self.leaf().ok_or(SampleError::NotImplemented {
            operation: "basis",
            variant: self.variant_name(),
        })?;
        let (chains, tip) = args
            .transform_chains
            .get(&leaf.space)
            .ok_or_else(|| SampleError::MissingSpace(leaf.space.clone()))?;
        let coords = args
            .coordinates
            .get(&leaf.space)
            .ok_or_else(|| SampleError::MissingSpace(leaf.space.clone()))?;
        let source = chains
            .first()
            .ok_or_else(|| SampleError::MissingSpace(leaf.space.clone()))?;
        let target = &leaf.transforms[0];

        let index = IndexNode::TransformIndex {
            target: target.clone(),
            source: source.clone(),
            ielem: Box::new(tip.clone()),
        };
        let relative_coords = ArrayNode::RelativeCoords {
            target: target.clone(),
            source: source.clone(),
            ielem: Box::new(tip.clone()),
            coords: Box::new(coords.clone()),
        };
        let sampled = ArrayNode::Sampled {
            coords: Box::new(relative_coords),
            expect: Box::new(leaf.points.get_evaluable_coords(index.clone())),
            interpolation,
        };
        let indices = self.get_evaluable_indices(index)?;
        Ok(sampled.inflate(indices, IndexNode::scalar(self.npoints()), args.points_shape.len()))
    }

    /// A function that interpolates `array`, holding one entry (or sub-array) per point.
    ///
    /// Evaluating the result on this sample with [`Interpolation::None`] reproduces `array`.
    pub fn asfunction(&self, array: ArrayD<f64>, interpolation: Interpolation) -> Result<Function, SampleError> {
        self.basis(interpolation)?.dot(array)
    }

    /// Integrates all `funcs` in a single pass.
    ///
    /// Scalar and vector integrals are returned as dense arrays, matrices in CSR form, and
    /// integrals of higher rank as deduplicated and pruned sparse tensors.
    pub fn integrate(&self, funcs: &[Function], arguments: &Arguments) -> eyre::Result<Vec<Assembled>> {
        self.integrate_with(&Interpreter::default(), funcs, arguments)
    }

    pub fn integrate_with(
        &self,
        evaluator: &dyn Evaluator,
        funcs: &[Function],
        arguments: &Arguments,
    ) -> eyre::Result<Vec<Assembled>> {
        let tensors = self.integrate_sparse_with(evaluator, funcs, arguments)?;
        assemble_all(tensors).wrap_err_with(|| format!("Failed to assemble integrals over {}", self))
    }

    /// Integrates all `funcs` in a single pass, without converting the results.
    pub fn integrate_sparse(&self, funcs: &[Function], arguments: &Arguments) -> eyre::Result<Vec<SparseTensor>> {
        self.integrate_sparse_with(&Interpreter::default(), funcs, arguments)
    }

    pub fn integrate_sparse_with(
        &self,
        evaluator: &dyn Evaluator,
        funcs: &[Function],
        arguments: &Arguments,
    ) -> eyre::Result<Vec<SparseTensor>> {
        let integrals: Vec<Function> = funcs.iter().map(|f| self.integral(f)).collect();
        let nodes = lower_all(&integrals)?;
        debug!("Integrating {} functions over {}", nodes.len(), self);
        evaluator.eval_sparse(&nodes, arguments)
    }

    /// Evaluates all `funcs` at every point, in a single pass.
    ///
    /// Every result has a leading axis of length `npoints`, ordered by global point index.
    pub fn eval(&self, funcs: &[Function], arguments: &Arguments) -> eyre::Result<Vec<ArrayD<f64>>> {
        self.eval_with(&Interpreter::default(), funcs, arguments)
    }

    pub fn eval_with(
        &self,
        evaluator: &dyn Evaluator,
        funcs: &[Function],
        arguments: &Arguments,
    ) -> eyre::Result<Vec<ArrayD<f64>>> {
        let tensors = self.eval_sparse_with(evaluator, funcs, arguments)?;
        debug!("Assembling {} results", tensors.len());
        Ok(tensors.iter().map(SparseTensor::to_dense).collect())
    }

    /// As [`Sample::eval`], without converting the results to dense arrays.
    pub fn eval_sparse(&self, funcs: &[Function], arguments: &Arguments) -> eyre::Result<Vec<SparseTensor>> {
        self.eval_sparse_with(&Interpreter::default(), funcs, arguments)
    }

    pub fn eval_sparse_with(
        &self,
        evaluator: &dyn Evaluator,
        funcs: &[Function],
        arguments: &Arguments,
    ) -> eyre::Result<Vec<SparseTensor>> {
        let applied = funcs
            .iter()
            .map(|f| self.apply(f))
            .collect::<Result<Vec<_>, _>>()?;
        let nodes = lower_all(&applied)?;
        debug!("Evaluating {} functions on {}", nodes.len(), self);
        evaluator.eval_sparse(&nodes, arguments)
    }
}
