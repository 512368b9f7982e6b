/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the public API for the hierarchical N-body evaluation crate.
//
// Created on: 20 Feb 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Hierarchical N-body evaluation core
//!
//! This crate computes approximations of all-pairs kernel sums
//! `r[j] = Σ_i K(t_j, s_i) · c_i` in sub-quadratic time. Space is
//! partitioned by a Morton-sorted octree; a dual-tree traversal classifies
//! every box pair as near field (direct P2P), far field (expansion based),
//! or to-be-refined, and two interchangeable evaluator strategies drive the
//! canonical multipole operator sequence
//! `P2M → M2M → M2L/M2P → L2L → L2P → P2P`.
//!
//! The analytic content of the operators stays entirely on the caller's
//! side: any value implementing [`Kernel`] plugs in, and the evaluators only
//! schedule its operators.
//!
//! # Features:
//! - Octree arena over 30-bit Morton codes with value-handle navigation
//! - Queue-driven dual-tree descent with a configurable multipole
//!   acceptance criterion
//! - Immediate evaluation (operators applied during the descent) or lazy
//!   evaluation (phase lists planned first, then executed in order)
//! - Full FMM (multipole and local expansions) and treecode (multipole
//!   only) far-field strategies
//! - Distinct source and target point sets over a shared bounding box
//!
//! # Example: Monopole Potential Summation
//!
//! ```
//! use faer::{Mat, MatRef};
//! use ferreus_fmm::{
//!     BoundingBox, EvaluatorKind, FmmEngine, FmmParams, Kernel, MacPredicate, TraversalKind,
//! };
//! use rand::rngs::StdRng;
//! use rand::{Rng, SeedableRng};
//!
//! // A gravitational-style kernel K(t, s) = 1 / |t - s| approximated by
//! // monopoles: each box gathers its total charge, local expansions carry
//! // the far-field potential evaluated at the box centre.
//! struct MonopoleKernel;
//!
//! #[derive(Clone, Copy, Default)]
//! struct PointMass {
//!     charge: f64,
//! }
//!
//! #[derive(Clone, Copy, Default)]
//! struct FarField {
//!     potential: f64,
//! }
//!
//! fn norm(v: [f64; 3]) -> f64 {
//!     (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
//! }
//!
//! impl Kernel for MonopoleKernel {
//!     type Charge = f64;
//!     type Result = f64;
//!     type Multipole = PointMass;
//!     type Local = FarField;
//!
//!     fn init_multipole(&self, _side_length: f64) -> PointMass {
//!         PointMass::default()
//!     }
//!
//!     fn init_local(&self, _side_length: f64) -> FarField {
//!         FarField::default()
//!     }
//!
//!     fn p2m(
//!         &self,
//!         _points: MatRef<f64>,
//!         charges: &[f64],
//!         _center: [f64; 3],
//!         multipole: &mut PointMass,
//!     ) {
//!         multipole.charge += charges.iter().sum::<f64>();
//!     }
//!
//!     fn m2m(&self, source: &PointMass, _translation: [f64; 3], target: &mut PointMass) {
//!         target.charge += source.charge;
//!     }
//!
//!     fn m2l(&self, source: &PointMass, translation: [f64; 3], target: &mut FarField) {
//!         target.potential += source.charge / norm(translation);
//!     }
//!
//!     fn m2p(
//!         &self,
//!         source: &PointMass,
//!         source_center: [f64; 3],
//!         targets: MatRef<f64>,
//!         results: &mut [f64],
//!     ) {
//!         for (i, result) in results.iter_mut().enumerate() {
//!             let d = [
//!                 *targets.get(i, 0) - source_center[0],
//!                 *targets.get(i, 1) - source_center[1],
//!                 *targets.get(i, 2) - source_center[2],
//!             ];
//!             *result += source.charge / norm(d);
//!         }
//!     }
//!
//!     fn l2l(&self, source: &FarField, _translation: [f64; 3], target: &mut FarField) {
//!         target.potential += source.potential;
//!     }
//!
//!     fn l2p(
//!         &self,
//!         local: &FarField,
//!         _center: [f64; 3],
//!         _targets: MatRef<f64>,
//!         results: &mut [f64],
//!     ) {
//!         for result in results {
//!             *result += local.potential;
//!         }
//!     }
//!
//!     fn p2p(
//!         &self,
//!         sources: MatRef<f64>,
//!         charges: &[f64],
//!         targets: MatRef<f64>,
//!         results: &mut [f64],
//!     ) {
//!         for (i, result) in results.iter_mut().enumerate() {
//!             for (j, &charge) in charges.iter().enumerate() {
//!                 let d = [
//!                     *targets.get(i, 0) - *sources.get(j, 0),
//!                     *targets.get(i, 1) - *sources.get(j, 1),
//!                     *targets.get(i, 2) - *sources.get(j, 2),
//!                 ];
//!                 let distance = norm(d);
//!                 if distance > 0.0 {
//!                     *result += charge / distance;
//!                 }
//!             }
//!         }
//!     }
//! }
//!
//! // Random sources with unit-scale charges in the unit cube.
//! let mut rng = StdRng::seed_from_u64(42);
//! let num_points = 200;
//! let points = Mat::from_fn(num_points, 3, |_, _| rng.random_range(0.0..1.0));
//! let charges: Vec<f64> = (0..num_points).map(|_| rng.random_range(0.5..1.5)).collect();
//!
//! let bounds = BoundingBox::new([0.0; 3], [1.0; 3]);
//! let params = FmmParams {
//!     evaluator: EvaluatorKind::Fmm,
//!     traversal: TraversalKind::Lazy,
//!     ncrit: 8,
//! };
//!
//! let engine = FmmEngine::new(
//!     points.as_ref(),
//!     None,
//!     bounds,
//!     MonopoleKernel,
//!     params,
//!     Some(MacPredicate::opening_angle(2.0)),
//! )
//! .unwrap();
//!
//! // Results come back in the original input order, one per target point.
//! let potentials = engine.evaluate(&charges).unwrap();
//! assert_eq!(potentials.len(), num_points);
//! ```
//!
//! # References
//!
//! 1. Barnes, J., & Hut, P. (1986).
//!    *A hierarchical O(N log N) force-calculation algorithm.*
//!    *Nature*, **324**, 446–449.
//!
//! 2. Greengard, L., & Rokhlin, V. (1987).
//!    *A fast algorithm for particle simulations.*
//!    *Journal of Computational Physics*, **73**(2), 325–348.
//!
//! 3. Cheng, H., Greengard, L., & Rokhlin, V. (1999).
//!    *A fast adaptive multipole algorithm in three dimensions.*
//!    *Journal of Computational Physics*, **155**(2), 468–498.

mod context;
mod fmm;
mod interaction;
mod lazy;
mod morton;
mod sweep;
mod traits;
mod tree;

#[cfg(test)]
mod test_kernel;

#[doc(inline)]
pub use {
    context::BoxContext,
    fmm::{EvaluatorKind, FmmEngine, FmmError, FmmParams, MacPredicate, TraversalKind},
    interaction::ImmediateEvaluator,
    lazy::LazyEvaluator,
    morton::{BoundingBox, MortonCoder, MAX_DEPTH},
    sweep::{downward_pass, upward_pass},
    traits::Kernel,
    tree::{BodyIter, BodyRef, BoxIter, BoxRef, Octree},
};
