/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines shared test kernels and the direct reference summation used by the unit tests.
//
// Created on: 20 Feb 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::MatRef;

use crate::traits::Kernel;

/// Kernel with `K(t, s) = 1`: every target accumulates the total source
/// charge. A monopole represents this kernel exactly at every translation,
/// so FMM, treecode, and direct summation agree to the last bit, which makes
/// the kernel ideal for schedule-correctness assertions.
pub(crate) struct CountingKernel;

impl Kernel for CountingKernel {
    type Charge = f64;
    type Result = f64;
    type Multipole = f64;
    type Local = f64;

    fn init_multipole(&self, _side_length: f64) -> f64 {
        0.0
    }

    fn init_local(&self, _side_length: f64) -> f64 {
        0.0
    }

    fn p2m(&self, _points: MatRef<f64>, charges: &[f64], _center: [f64; 3], multipole: &mut f64) {
        *multipole += charges.iter().sum::<f64>();
    }

    fn m2m(&self, source: &f64, _translation: [f64; 3], target: &mut f64) {
        *target += source;
    }

    fn m2l(&self, source: &f64, _translation: [f64; 3], target: &mut f64) {
        *target += source;
    }

    fn m2p(&self, source: &f64, _source_center: [f64; 3], _targets: MatRef<f64>, results: &mut [f64]) {
        for result in results {
            *result += source;
        }
    }

    fn l2l(&self, source: &f64, _translation: [f64; 3], target: &mut f64) {
        *target += source;
    }

    fn l2p(&self, local: &f64, _center: [f64; 3], _targets: MatRef<f64>, results: &mut [f64]) {
        for result in results {
            *result += local;
        }
    }

    fn p2p(&self, _sources: MatRef<f64>, charges: &[f64], _targets: MatRef<f64>, results: &mut [f64]) {
        let total: f64 = charges.iter().sum();
        for result in results {
            *result += total;
        }
    }
}

/// Inverse-distance kernel `K(t, s) = 1 / |t - s|` with monopole expansions
/// about the box centre. Far-field accuracy degrades with the opening angle,
/// so comparisons against the direct sum use tolerances; a never-accepting
/// predicate reduces the evaluation to exact pairwise sums.
pub(crate) struct InverseDistanceKernel;

/// A monopole: total charge gathered at the owning box's centre.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Monopole {
    charge: f64,
}

/// Constant local approximation: far-field potential at the box centre.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ConstantLocal {
    potential: f64,
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

impl Kernel for InverseDistanceKernel {
    type Charge = f64;
    type Result = f64;
    type Multipole = Monopole;
    type Local = ConstantLocal;

    fn init_multipole(&self, _side_length: f64) -> Monopole {
        Monopole::default()
    }

    fn init_local(&self, _side_length: f64) -> ConstantLocal {
        ConstantLocal::default()
    }

    fn p2m(
        &self,
        _points: MatRef<f64>,
        charges: &[f64],
        _center: [f64; 3],
        multipole: &mut Monopole,
    ) {
        multipole.charge += charges.iter().sum::<f64>();
    }

    fn m2m(&self, source: &Monopole, _translation: [f64; 3], target: &mut Monopole) {
        target.charge += source.charge;
    }

    fn m2l(&self, source: &Monopole, translation: [f64; 3], target: &mut ConstantLocal) {
        target.potential += source.charge / norm(translation);
    }

    fn m2p(
        &self,
        source: &Monopole,
        source_center: [f64; 3],
        targets: MatRef<f64>,
        results: &mut [f64],
    ) {
        for (i, result) in results.iter_mut().enumerate() {
            let d = [
                *targets.get(i, 0) - source_center[0],
                *targets.get(i, 1) - source_center[1],
                *targets.get(i, 2) - source_center[2],
            ];
            *result += source.charge / norm(d);
        }
    }

    fn l2l(&self, source: &ConstantLocal, _translation: [f64; 3], target: &mut ConstantLocal) {
        target.potential += source.potential;
    }

    fn l2p(
        &self,
        local: &ConstantLocal,
        _center: [f64; 3],
        _targets: MatRef<f64>,
        results: &mut [f64],
    ) {
        for result in results {
            *result += local.potential;
        }
    }

    fn p2p(&self, sources: MatRef<f64>, charges: &[f64], targets: MatRef<f64>, results: &mut [f64]) {
        for (i, result) in results.iter_mut().enumerate() {
            for (j, &charge) in charges.iter().enumerate() {
                let d = [
                    *targets.get(i, 0) - *sources.get(j, 0),
                    *targets.get(i, 1) - *sources.get(j, 1),
                    *targets.get(i, 2) - *sources.get(j, 2),
                ];
                let distance = norm(d);
                if distance > 0.0 {
                    *result += charge / distance;
                }
            }
        }
    }
}

/// Direct O(N·M) inverse-distance reference sum, skipping coincident pairs
/// exactly as the kernel's P2P does.
pub(crate) fn direct_inverse_distance(
    sources: MatRef<f64>,
    charges: &[f64],
    targets: MatRef<f64>,
) -> Vec<f64> {
    let mut results = vec![0.0; targets.nrows()];
    for (i, result) in results.iter_mut().enumerate() {
        for j in 0..sources.nrows() {
            let dx = *targets.get(i, 0) - *sources.get(j, 0);
            let dy = *targets.get(i, 1) - *sources.get(j, 1);
            let dz = *targets.get(i, 2) - *sources.get(j, 2);
            let distance = (dx * dx + dy * dy + dz * dz).sqrt();
            if distance > 0.0 {
                *result += charges[j] / distance;
            }
        }
    }
    results
}
