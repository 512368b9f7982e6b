/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the kernel operator trait required of far-field expansion kernels.
//
// Created on: 20 Feb 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::MatRef;

/// The operator set a kernel must provide for hierarchical evaluation.
///
/// A kernel is a plain value; the evaluators never inspect the expansion
/// representations, they only schedule the operators. All operators are
/// additive onto their output buffers, with [`Kernel::init_multipole`] and
/// [`Kernel::init_local`] establishing the zero element.
///
/// Point arguments are `(N, 3)` row views of the tree's Morton-ordered point
/// storage; charge and result slices are aligned with those rows. Translation
/// vectors are always `target_center - source_center`.
pub trait Kernel {
    /// Per-source charge type.
    type Charge: Clone;

    /// Per-target result type.
    type Result: Clone + Default;

    /// Multipole expansion of a source box.
    type Multipole;

    /// Local expansion of a target box.
    type Local;

    /// Allocates the zero multipole expansion for a box of the given side length.
    fn init_multipole(&self, side_length: f64) -> Self::Multipole;

    /// Allocates the zero local expansion for a box of the given side length.
    fn init_local(&self, side_length: f64) -> Self::Local;

    /// Accumulates leaf charges into the multipole expansion centred at `center`.
    fn p2m(
        &self,
        points: MatRef<f64>,
        charges: &[Self::Charge],
        center: [f64; 3],
        multipole: &mut Self::Multipole,
    );

    /// Shifts a child multipole into its parent expansion.
    fn m2m(&self, source: &Self::Multipole, translation: [f64; 3], target: &mut Self::Multipole);

    /// Translates a source multipole into a target local expansion.
    fn m2l(&self, source: &Self::Multipole, translation: [f64; 3], target: &mut Self::Local);

    /// Evaluates a source multipole directly at target points, adding into results.
    fn m2p(
        &self,
        source: &Self::Multipole,
        source_center: [f64; 3],
        targets: MatRef<f64>,
        results: &mut [Self::Result],
    );

    /// Translates a parent local expansion into a child local expansion.
    fn l2l(&self, source: &Self::Local, translation: [f64; 3], target: &mut Self::Local);

    /// Evaluates a local expansion at the leaf's target points, adding into results.
    fn l2p(
        &self,
        local: &Self::Local,
        center: [f64; 3],
        targets: MatRef<f64>,
        results: &mut [Self::Result],
    );

    /// Direct one-sided pairwise sum: source charges into target results.
    fn p2p(
        &self,
        sources: MatRef<f64>,
        charges: &[Self::Charge],
        targets: MatRef<f64>,
        results: &mut [Self::Result],
    );
}
