/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the upward (P2M, M2M) and downward (L2L, L2P) passes over the box arenas.
//
// Created on: 20 Feb 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::context::BoxContext;
use crate::traits::Kernel;

/// Populates the multipole expansion of every source-tree box.
///
/// The arena stores children strictly after their parent, so a single
/// reverse-order scan is a valid bottom-up schedule: leaves get P2M and
/// internal boxes aggregate their already-complete children through M2M.
pub fn upward_pass<K: Kernel>(ctx: &mut BoxContext<'_, K>) {
    for k in (0..ctx.source_tree().num_boxes()).rev() {
        let id = k as u32;
        ctx.init_multipole(id);
        let bx = ctx.source_box(id);
        if bx.is_leaf() {
            ctx.apply_p2m(id);
        } else {
            for child in bx.children() {
                ctx.apply_m2m(child.index() as u32, id);
            }
        }
    }
}

/// Drains accumulated local expansions down the target tree.
///
/// A forward scan visits parents before children (the arena is
/// level-ordered): every box holding a local expansion either translates it
/// into each child (initialising absent child locals first) or, at a leaf,
/// evaluates it at the leaf's target points.
pub fn downward_pass<K: Kernel>(ctx: &mut BoxContext<'_, K>) {
    for k in 0..ctx.target_tree().num_boxes() {
        let id = k as u32;
        if !ctx.has_local(id) {
            continue;
        }
        let bx = ctx.target_box(id);
        if bx.is_leaf() {
            ctx.apply_l2p(id);
        } else {
            for child in bx.children() {
                let child_id = child.index() as u32;
                if !ctx.has_local(child_id) {
                    ctx.init_local(child_id);
                }
                ctx.apply_l2l(id, child_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BoxContext;
    use crate::fmm::MacPredicate;
    use crate::morton::BoundingBox;
    use crate::test_kernel::CountingKernel;
    use crate::tree::Octree;
    use faer::Mat;

    #[test]
    fn upward_pass_aggregates_all_charges_at_the_root() {
        let points = Mat::from_fn(20, 3, |i, j| ((i * 7 + j * 3) % 19) as f64 / 19.0);
        let bounds = BoundingBox::new([0.0; 3], [1.0; 3]);
        let tree = Octree::build(points.as_ref(), bounds, 2).unwrap();

        let kernel = CountingKernel;
        let mac = MacPredicate::never();
        let charges: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let sorted: Vec<f64> = tree
            .permutation()
            .iter()
            .map(|&i| charges[i as usize])
            .collect();
        let mut ctx = BoxContext::new(&tree, &tree, &kernel, &mac, sorted);
        upward_pass(&mut ctx);

        let expected: f64 = charges.iter().sum();
        assert!((ctx.multipole(0) - expected).abs() < 1e-12);
        for bx in tree.boxes() {
            assert!(ctx.has_multipole(bx.index() as u32));
        }
    }

    #[test]
    fn downward_pass_delivers_root_local_to_every_target() {
        let points = Mat::from_fn(16, 3, |i, j| ((i * 5 + j) % 13) as f64 / 13.0);
        let bounds = BoundingBox::new([0.0; 3], [1.0; 3]);
        let tree = Octree::build(points.as_ref(), bounds, 2).unwrap();

        let kernel = CountingKernel;
        let mac = MacPredicate::never();
        let mut ctx = BoxContext::new(&tree, &tree, &kernel, &mac, vec![3.5 / 16.0; 16]);
        // Seed the root local through the ordinary operator chain; the
        // counting kernel carries the charge total unchanged through L2L, so
        // every target receives exactly that value.
        upward_pass(&mut ctx);
        ctx.init_local(0);
        ctx.apply_m2l(0, 0);
        downward_pass(&mut ctx);
        for value in ctx.into_results() {
            assert!((value - 3.5).abs() < 1e-12);
        }
    }
}
