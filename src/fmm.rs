/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the evaluation engine: options, errors, the acceptance predicate, and the
// composition of tree construction, evaluator passes, and result permutation.
//
// Created on: 20 Feb 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use std::fmt::{self, Debug};
use std::sync::Arc;

use faer::MatRef;
use serde::{Deserialize, Serialize};

use crate::context::BoxContext;
use crate::interaction::ImmediateEvaluator;
use crate::lazy::LazyEvaluator;
use crate::morton::BoundingBox;
use crate::sweep::{downward_pass, upward_pass};
use crate::traits::Kernel;
use crate::tree::{BoxRef, Octree};

/// Errors that can occur when constructing or running an evaluation.
#[derive(Debug)]
pub enum FmmError {
    /// An input point lies outside the configured bounding box.
    PointOutsideBounds { point_index: usize },

    /// The number of charges does not match the number of source points.
    ChargeCountMismatch {
        num_points: usize,
        num_charges: usize,
    },

    /// No multipole acceptance predicate was supplied.
    MissingAcceptanceCriterion,
}

impl fmt::Display for FmmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FmmError::PointOutsideBounds { point_index } => write!(
                f,
                "Evaluation failed: point at row {} lies outside the tree bounding box",
                point_index
            ),
            FmmError::ChargeCountMismatch {
                num_points,
                num_charges,
            } => write!(
                f,
                "Evaluation failed: {} charges supplied for {} source points",
                num_charges, num_points
            ),
            FmmError::MissingAcceptanceCriterion => write!(
                f,
                "Evaluation failed: no multipole acceptance predicate was supplied"
            ),
        }
    }
}

impl std::error::Error for FmmError {}

/// Far-field strategy of an evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluatorKind {
    /// Full scheme translating multipoles into local expansions (M2L).
    Fmm,

    /// Treecode scheme evaluating multipoles directly at targets (M2P).
    Treecode,
}

/// Scheduling strategy of an evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraversalKind {
    /// Apply far-field operators while the dual-tree descent runs, framed by
    /// explicit upward and downward sweeps.
    Immediate,

    /// Record the descent into phase lists first, then execute the canonical
    /// operator sequence.
    Lazy,
}

/// Parameters controlling an evaluation.
///
/// ### Default Values
/// - `evaluator`: [`EvaluatorKind::Fmm`]
/// - `traversal`: [`TraversalKind::Lazy`]
/// - `ncrit`: `1`
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct FmmParams {
    /// Far-field strategy.
    pub evaluator: EvaluatorKind,

    /// Scheduling strategy.
    pub traversal: TraversalKind,

    /// Maximum number of bodies per leaf box.
    pub ncrit: usize,
}

impl Default for FmmParams {
    fn default() -> Self {
        Self {
            evaluator: EvaluatorKind::Fmm,
            traversal: TraversalKind::Lazy,
            ncrit: 1,
        }
    }
}

type MacFn = dyn Fn(BoxRef<'_>, BoxRef<'_>) -> bool + Send + Sync;

/// Multipole acceptance criterion: decides whether a source box and a target
/// box are well separated enough for an expansion to stand in for their
/// pairwise interaction.
#[derive(Clone)]
pub struct MacPredicate {
    accept: Arc<MacFn>,
}

impl MacPredicate {
    /// Wraps an arbitrary predicate over a source box and a target box.
    pub fn new<F>(accept: F) -> Self
    where
        F: Fn(BoxRef<'_>, BoxRef<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            accept: Arc::new(accept),
        }
    }

    /// Opening-angle criterion: accept when the centre distance exceeds
    /// `theta` times the sum of the two side lengths.
    pub fn opening_angle(theta: f64) -> Self {
        Self::new(move |source: BoxRef<'_>, target: BoxRef<'_>| {
            let a = source.center();
            let b = target.center();
            let dx = b[0] - a[0];
            let dy = b[1] - a[1];
            let dz = b[2] - a[2];
            let distance = (dx * dx + dy * dy + dz * dz).sqrt();
            distance > theta * (source.side_length() + target.side_length())
        })
    }

    /// Accepts every pair. Collapses the descent at the first classification.
    pub fn always() -> Self {
        Self::new(|_: BoxRef<'_>, _: BoxRef<'_>| true)
    }

    /// Rejects every pair, forcing the evaluation down to pure P2P.
    pub fn never() -> Self {
        Self::new(|_: BoxRef<'_>, _: BoxRef<'_>| false)
    }

    /// Applies the predicate.
    pub fn accept(&self, source: BoxRef<'_>, target: BoxRef<'_>) -> bool {
        (self.accept)(source, target)
    }
}

impl Debug for MacPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MacPredicate")
    }
}

/// A hierarchical N-body evaluation engine.
///
/// The engine owns the Morton-sorted octree over the source points (and over
/// distinct target points when supplied), the kernel, and the evaluation
/// options. Construction validates the inputs and builds the trees once;
/// [`FmmEngine::evaluate`] may then be called repeatedly with different
/// charge sets against the same immutable trees.
pub struct FmmEngine<K: Kernel> {
    source_tree: Octree,
    target_tree: Option<Octree>,
    kernel: K,
    params: FmmParams,
    mac: MacPredicate,
}

impl<K: Kernel> FmmEngine<K> {
    /// Builds an engine over the given points.
    ///
    /// # Arguments
    /// * `source_points`: `(N, 3)` source locations inside `bounds`.
    /// * `target_points`: optional distinct `(M, 3)` target locations inside
    ///   the same `bounds`; when `None`, results are evaluated back at the
    ///   source points (the standard self-interaction configuration).
    /// * `bounds`: the bounding box shared by both trees.
    /// * `kernel`: the kernel operator set.
    /// * `params`: evaluation options.
    /// * `mac`: the multipole acceptance predicate; required.
    pub fn new(
        source_points: MatRef<f64>,
        target_points: Option<MatRef<f64>>,
        bounds: BoundingBox,
        kernel: K,
        params: FmmParams,
        mac: Option<MacPredicate>,
    ) -> Result<Self, FmmError> {
        let mac = mac.ok_or(FmmError::MissingAcceptanceCriterion)?;
        let source_tree = Octree::build(source_points, bounds, params.ncrit)?;
        let target_tree = match target_points {
            Some(points) => Some(Octree::build(points, bounds, params.ncrit)?),
            None => None,
        };
        Ok(Self {
            source_tree,
            target_tree,
            kernel,
            params,
            mac,
        })
    }

    /// The tree over the source points.
    pub fn source_tree(&self) -> &Octree {
        &self.source_tree
    }

    /// The tree over the target points; the source tree when targets were
    /// not supplied separately.
    pub fn target_tree(&self) -> &Octree {
        self.target_tree.as_ref().unwrap_or(&self.source_tree)
    }

    /// The evaluation options.
    pub fn params(&self) -> &FmmParams {
        &self.params
    }

    /// Evaluates the kernel sum for one charge set.
    ///
    /// `charges` is one value per source point in original input order; the
    /// returned results hold one value per target point, also in original
    /// input order. The Morton permutation is applied and inverted
    /// internally.
    pub fn evaluate(&self, charges: &[K::Charge]) -> Result<Vec<K::Result>, FmmError> {
        if charges.len() != self.source_tree.size() {
            return Err(FmmError::ChargeCountMismatch {
                num_points: self.source_tree.size(),
                num_charges: charges.len(),
            });
        }

        let sorted_charges: Vec<K::Charge> = self
            .source_tree
            .permutation()
            .iter()
            .map(|&i| charges[i as usize].clone())
            .collect();

        let target_tree = self.target_tree();
        let mut ctx = BoxContext::new(
            &self.source_tree,
            target_tree,
            &self.kernel,
            &self.mac,
            sorted_charges,
        );

        match self.params.traversal {
            TraversalKind::Lazy => {
                let plan = LazyEvaluator::plan(&mut ctx, self.params.evaluator);
                plan.execute(&mut ctx);
            }
            TraversalKind::Immediate => {
                upward_pass(&mut ctx);
                ImmediateEvaluator::new(self.params.evaluator).execute(&mut ctx);
                if self.params.evaluator == EvaluatorKind::Fmm {
                    downward_pass(&mut ctx);
                }
            }
        }

        let sorted_results = ctx.into_results();
        let mut results = vec![K::Result::default(); target_tree.size()];
        for (i, value) in sorted_results.into_iter().enumerate() {
            results[target_tree.permutation()[i] as usize] = value;
        }
        Ok(results)
    }
}
