/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the list-building evaluator: traversal planning, dependency closure, and
// phase-ordered execution of the multipole operator schedule.
//
// Created on: 20 Feb 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use std::collections::VecDeque;

use crate::context::BoxContext;
use crate::fmm::EvaluatorKind;
use crate::traits::Kernel;

/// Dual-tree evaluator that records work into phase lists before running any
/// kernel operator.
///
/// [`LazyEvaluator::plan`] performs the same descent as the immediate
/// evaluator but classifies pairs into flat lists of box ids, then resolves
/// the dependency closure of the recorded far-field work: every source box of
/// a long-range pair gets its multipole chain (P2M at leaves, M2M edges
/// depth-first, so list order is a valid bottom-up schedule), and under FMM
/// every target box propagates its local expansion down to the leaves (L2L
/// edges parent-first, L2P at leaves).
///
/// [`LazyEvaluator::execute`] then applies the canonical phase order
/// P2M, M2M, M2L/M2P, L2L, L2P, P2P. Expansion allocation (INITM/INITL)
/// happens once per box at planning time; per-box bit-vectors keep every
/// M2M and L2L edge, every P2M, and every L2P unique, so re-running a plan
/// never over-counts the additive operators.
pub struct LazyEvaluator {
    kind: EvaluatorKind,
    p2p_list: Vec<(u32, u32)>,
    p2m_list: Vec<u32>,
    m2m_list: Vec<(u32, u32)>,
    lr_list: Vec<(u32, u32)>,
    l2l_list: Vec<(u32, u32)>,
    l2p_list: Vec<u32>,
    l_roots: Vec<u32>,
    initialized_m: Vec<bool>,
    initialized_l: Vec<bool>,
    l2p_emitted: Vec<bool>,
    local_propagated: Vec<bool>,
    in_l_roots: Vec<bool>,
}

impl LazyEvaluator {
    /// Plans the traversal over the context's trees, issuing INITM/INITL into
    /// the context and recording every operator application into phase lists.
    pub fn plan<K: Kernel>(ctx: &mut BoxContext<'_, K>, kind: EvaluatorKind) -> Self {
        let num_source_boxes = ctx.source_tree().num_boxes();
        let num_target_boxes = ctx.target_tree().num_boxes();
        let mut evaluator = Self {
            kind,
            p2p_list: Vec::new(),
            p2m_list: Vec::new(),
            m2m_list: Vec::new(),
            lr_list: Vec::new(),
            l2l_list: Vec::new(),
            l2p_list: Vec::new(),
            l_roots: Vec::new(),
            initialized_m: vec![false; num_source_boxes],
            initialized_l: vec![false; num_target_boxes],
            l2p_emitted: vec![false; num_target_boxes],
            local_propagated: vec![false; num_target_boxes],
            in_l_roots: vec![false; num_target_boxes],
        };
        evaluator.traverse(ctx);
        evaluator.resolve_long_range(ctx);
        evaluator.propagate_locals(ctx);
        evaluator
    }

    /// Applies the recorded operators in the fixed phase order.
    pub fn execute<K: Kernel>(&self, ctx: &mut BoxContext<'_, K>) {
        for &b in &self.p2m_list {
            ctx.apply_p2m(b);
        }
        for &(child, parent) in &self.m2m_list {
            ctx.apply_m2m(child, parent);
        }
        for &(source, target) in &self.lr_list {
            match self.kind {
                EvaluatorKind::Fmm => ctx.apply_m2l(source, target),
                EvaluatorKind::Treecode => ctx.apply_m2p(source, target),
            }
        }
        for &(parent, child) in &self.l2l_list {
            ctx.apply_l2l(parent, child);
        }
        for &b in &self.l2p_list {
            ctx.apply_l2p(b);
        }
        for &(source, target) in &self.p2p_list {
            ctx.apply_p2p(source, target);
        }
    }

    /// Queue-driven dual-tree descent classifying pairs into lists.
    fn traverse<K: Kernel>(&mut self, ctx: &mut BoxContext<'_, K>) {
        let mut queue: VecDeque<(u32, u32)> = VecDeque::new();
        queue.push_back((0, 0));

        while let Some((b1, b2)) = queue.pop_front() {
            let source = ctx.source_box(b1);
            let target = ctx.target_box(b2);

            if source.is_leaf() {
                if target.is_leaf() {
                    self.p2p_list.push((b1, b2));
                } else {
                    for child in target.children() {
                        self.interact(ctx, b1, child.index() as u32, &mut queue);
                    }
                }
            } else if target.is_leaf()
                || source.side_length() >= target.side_length()
            {
                for child in source.children() {
                    self.interact(ctx, child.index() as u32, b2, &mut queue);
                }
            } else {
                for child in target.children() {
                    self.interact(ctx, b1, child.index() as u32, &mut queue);
                }
            }
        }
    }

    fn interact<K: Kernel>(
        &mut self,
        ctx: &BoxContext<'_, K>,
        b1: u32,
        b2: u32,
        queue: &mut VecDeque<(u32, u32)>,
    ) {
        if ctx.accept_multipole(b1, b2) {
            self.lr_list.push((b1, b2));
            if self.kind == EvaluatorKind::Fmm && !self.in_l_roots[b2 as usize] {
                self.in_l_roots[b2 as usize] = true;
                self.l_roots.push(b2);
            }
        } else {
            queue.push_back((b1, b2));
        }
    }

    /// Resolves the multipole closure of the long-range list and, under FMM,
    /// initialises the local expansion of every long-range target.
    fn resolve_long_range<K: Kernel>(&mut self, ctx: &mut BoxContext<'_, K>) {
        for i in 0..self.lr_list.len() {
            let (b1, b2) = self.lr_list[i];
            self.resolve_multipole(ctx, b1);
            if self.kind == EvaluatorKind::Fmm && !self.initialized_l[b2 as usize] {
                ctx.init_local(b2);
                self.initialized_l[b2 as usize] = true;
            }
        }
    }

    /// Recursively schedules everything needed for `M[b]` to exist: INITM,
    /// P2M at leaves, and one M2M edge per child, children first.
    fn resolve_multipole<K: Kernel>(&mut self, ctx: &mut BoxContext<'_, K>, b: u32) {
        if self.initialized_m[b as usize] {
            return;
        }
        ctx.init_multipole(b);
        let bx = ctx.source_box(b);
        if bx.is_leaf() {
            self.p2m_list.push(b);
        } else {
            for child in bx.children() {
                let child_id = child.index() as u32;
                self.resolve_multipole(ctx, child_id);
                self.m2m_list.push((child_id, b));
            }
        }
        self.initialized_m[b as usize] = true;
    }

    /// Walks every local-expansion root downwards, recording L2L edges and
    /// leaf L2P calls. Roots are taken ancestors-first (the arena is
    /// level-ordered) and each box propagates at most once, so every
    /// parent/child edge is recorded exactly once and the recorded order is
    /// top-down.
    fn propagate_locals<K: Kernel>(&mut self, ctx: &mut BoxContext<'_, K>) {
        if self.kind != EvaluatorKind::Fmm {
            return;
        }
        let mut roots = std::mem::take(&mut self.l_roots);
        roots.sort_unstable();
        for &b in &roots {
            self.propagate_local(ctx, b);
        }
        self.l_roots = roots;
    }

    fn propagate_local<K: Kernel>(&mut self, ctx: &mut BoxContext<'_, K>, b: u32) {
        if self.local_propagated[b as usize] {
            return;
        }
        self.local_propagated[b as usize] = true;

        let bx = ctx.target_box(b);
        if bx.is_leaf() {
            if !self.l2p_emitted[b as usize] {
                self.l2p_list.push(b);
                self.l2p_emitted[b as usize] = true;
            }
        } else {
            for child in bx.children() {
                let child_id = child.index() as u32;
                if !self.initialized_l[child_id as usize] {
                    ctx.init_local(child_id);
                    self.initialized_l[child_id as usize] = true;
                }
                self.l2l_list.push((b, child_id));
                self.propagate_local(ctx, child_id);
            }
        }
    }

    /// Recorded one-sided P2P pairs as `(source box, target box)`.
    pub fn p2p_pairs(&self) -> &[(u32, u32)] {
        &self.p2p_list
    }

    /// Recorded P2M boxes.
    pub fn p2m_boxes(&self) -> &[u32] {
        &self.p2m_list
    }

    /// Recorded M2M edges as `(child, parent)` in bottom-up order.
    pub fn m2m_pairs(&self) -> &[(u32, u32)] {
        &self.m2m_list
    }

    /// Recorded long-range pairs as `(source box, target box)`.
    pub fn long_range_pairs(&self) -> &[(u32, u32)] {
        &self.lr_list
    }

    /// Recorded L2L edges as `(parent, child)` in top-down order.
    pub fn l2l_pairs(&self) -> &[(u32, u32)] {
        &self.l2l_list
    }

    /// Recorded L2P boxes.
    pub fn l2p_boxes(&self) -> &[u32] {
        &self.l2p_list
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
    use std::collections::HashSet;

    fn unit_bounds() -> BoundingBox {
        BoundingBox::new([0.0; 3], [1.0; 3])
    }

    fn corner_points() -> Mat<f64> {
        Mat::from_fn(8, 3, |i, j| if (i >> j) & 1 == 1 { 0.9 } else { 0.1 })
    }

    /// Accepts exactly the pairs whose Morton code ranges are disjoint, so
    /// every pair of distinct same-tree boxes is accepted and every
    /// self-overlapping pair keeps refining.
    fn disjoint_mac() -> MacPredicate {
        MacPredicate::new(|a: crate::tree::BoxRef<'_>, b: crate::tree::BoxRef<'_>| {
            a.morton_upper_bound() < b.morton_lower_bound()
                || b.morton_upper_bound() < a.morton_lower_bound()
        })
    }

    fn scatter_points() -> Mat<f64> {
        Mat::from_fn(64, 3, |i, j| {
            // Deterministic scatter with structure at several scales.
            let v = ((i * 37 + j * 11 + 7) % 101) as f64 / 101.0;
            0.05 + 0.9 * v
        })
    }

    fn leaf_ids(tree: &Octree) -> HashSet<u32> {
        tree.boxes()
            .filter(|b| b.is_leaf())
            .map(|b| b.index() as u32)
            .collect()
    }

    #[test]
    fn fmm_plan_covers_every_leaf_once() {
        let points = corner_points();
        let tree = Octree::build(points.as_ref(), unit_bounds(), 1).unwrap();
        let kernel = CountingKernel;
        let mac = disjoint_mac();
        let mut ctx = BoxContext::new(&tree, &tree, &kernel, &mac, vec![1.0; 8]);
        let plan = LazyEvaluator::plan(&mut ctx, EvaluatorKind::Fmm);

        let leaves = leaf_ids(&tree);
        let p2m: HashSet<u32> = plan.p2m_boxes().iter().copied().collect();
        assert_eq!(p2m, leaves);
        assert_eq!(plan.p2m_boxes().len(), leaves.len());

        let l2p: HashSet<u32> = plan.l2p_boxes().iter().copied().collect();
        assert_eq!(l2p, leaves);
        assert_eq!(plan.l2p_boxes().len(), leaves.len());

        // Under a MAC that accepts all disjoint pairs, only self pairs fall
        // through to direct evaluation.
        for &(s, t) in plan.p2p_pairs() {
            assert_eq!(s, t);
        }
        let p2p_targets: HashSet<u32> = plan.p2p_pairs().iter().map(|&(_, t)| t).collect();
        assert_eq!(p2p_targets, leaves);
    }

    #[test]
    fn treecode_plan_has_no_local_work() {
        let points = corner_points();
        let tree = Octree::build(points.as_ref(), unit_bounds(), 1).unwrap();
        let kernel = CountingKernel;
        let mac = disjoint_mac();
        let mut ctx = BoxContext::new(&tree, &tree, &kernel, &mac, vec![1.0; 8]);
        let plan = LazyEvaluator::plan(&mut ctx, EvaluatorKind::Treecode);

        let leaves = leaf_ids(&tree);
        let p2m: HashSet<u32> = plan.p2m_boxes().iter().copied().collect();
        assert_eq!(p2m, leaves);
        assert!(plan.l2p_boxes().is_empty());
        assert!(plan.l2l_pairs().is_empty());
        assert!(!plan.long_range_pairs().is_empty());
    }

    #[test]
    fn lists_contain_no_duplicates() {
        let points = scatter_points();
        let tree = Octree::build(points.as_ref(), unit_bounds(), 2).unwrap();
        let kernel = CountingKernel;
        let mac = MacPredicate::opening_angle(0.5);
        let mut ctx = BoxContext::new(&tree, &tree, &kernel, &mac, vec![1.0; 64]);
        let plan = LazyEvaluator::plan(&mut ctx, EvaluatorKind::Fmm);

        let m2m: HashSet<(u32, u32)> = plan.m2m_pairs().iter().copied().collect();
        assert_eq!(m2m.len(), plan.m2m_pairs().len());
        let l2l: HashSet<(u32, u32)> = plan.l2l_pairs().iter().copied().collect();
        assert_eq!(l2l.len(), plan.l2l_pairs().len());
        let l2p: HashSet<u32> = plan.l2p_boxes().iter().copied().collect();
        assert_eq!(l2p.len(), plan.l2p_boxes().len());
        let p2m: HashSet<u32> = plan.p2m_boxes().iter().copied().collect();
        assert_eq!(p2m.len(), plan.p2m_boxes().len());
    }

    #[test]
    fn m2m_order_is_bottom_up_and_l2l_order_is_top_down() {
        let points = scatter_points();
        let tree = Octree::build(points.as_ref(), unit_bounds(), 2).unwrap();
        let kernel = CountingKernel;
        let mac = MacPredicate::opening_angle(0.5);
        let mut ctx = BoxContext::new(&tree, &tree, &kernel, &mac, vec![1.0; 64]);
        let plan = LazyEvaluator::plan(&mut ctx, EvaluatorKind::Fmm);
        assert!(!plan.m2m_pairs().is_empty());
        assert!(!plan.l2l_pairs().is_empty());

        // M[child] must be complete before it feeds a parent: a P2M or all
        // of the child's own M2M edges appear earlier in the schedule.
        let mut m_ready: HashSet<u32> = plan.p2m_boxes().iter().copied().collect();
        for &(child, parent) in plan.m2m_pairs() {
            assert!(m_ready.contains(&child));
            m_ready.insert(parent);
        }

        // L[parent] must exist as a propagation source before its children
        // receive it: a parent is either a long-range target or was itself
        // filled by an earlier L2L edge.
        let lr_targets: HashSet<u32> =
            plan.long_range_pairs().iter().map(|&(_, t)| t).collect();
        let mut l_ready = lr_targets;
        for &(parent, child) in plan.l2l_pairs() {
            assert!(l_ready.contains(&parent));
            l_ready.insert(child);
        }
    }

    #[test]
    fn planning_is_deterministic() {
        let points = corner_points();
        let tree = Octree::build(points.as_ref(), unit_bounds(), 1).unwrap();
        let kernel = CountingKernel;
        let mac = MacPredicate::opening_angle(1.0);

        let mut ctx_a = BoxContext::new(&tree, &tree, &kernel, &mac, vec![1.0; 8]);
        let plan_a = LazyEvaluator::plan(&mut ctx_a, EvaluatorKind::Fmm);
        let mut ctx_b = BoxContext::new(&tree, &tree, &kernel, &mac, vec![1.0; 8]);
        let plan_b = LazyEvaluator::plan(&mut ctx_b, EvaluatorKind::Fmm);

        assert_eq!(plan_a.p2p_pairs(), plan_b.p2p_pairs());
        assert_eq!(plan_a.p2m_boxes(), plan_b.p2m_boxes());
        assert_eq!(plan_a.m2m_pairs(), plan_b.m2m_pairs());
        assert_eq!(plan_a.long_range_pairs(), plan_b.long_range_pairs());
        assert_eq!(plan_a.l2l_pairs(), plan_b.l2l_pairs());
        assert_eq!(plan_a.l2p_boxes(), plan_b.l2p_boxes());
    }

    #[test]
    fn diagonal_pair_is_pairwise_p2p_or_symmetric_long_range() {
        let points = Mat::from_fn(2, 3, |i, _| if i == 0 { 0.1 } else { 0.9 });
        let tree = Octree::build(points.as_ref(), unit_bounds(), 1).unwrap();
        // Root plus one leaf per occupied octant.
        assert_eq!(tree.num_boxes(), 3);
        let kernel = CountingKernel;

        let never = MacPredicate::never();
        let mut ctx = BoxContext::new(&tree, &tree, &kernel, &never, vec![1.0, 1.0]);
        let plan = LazyEvaluator::plan(&mut ctx, EvaluatorKind::Fmm);
        assert_eq!(plan.p2p_pairs(), [(1, 1), (1, 2), (2, 1), (2, 2)]);
        assert!(plan.long_range_pairs().is_empty());

        let mac = disjoint_mac();
        let mut ctx = BoxContext::new(&tree, &tree, &kernel, &mac, vec![1.0, 1.0]);
        let plan = LazyEvaluator::plan(&mut ctx, EvaluatorKind::Fmm);
        assert_eq!(plan.long_range_pairs(), [(1, 2), (2, 1)]);
        assert_eq!(plan.p2p_pairs(), [(1, 1), (2, 2)]);
    }

    #[test]
    fn always_accepting_mac_short_circuits_at_the_first_split() {
        let points = corner_points();
        let tree = Octree::build(points.as_ref(), unit_bounds(), 1).unwrap();
        let kernel = CountingKernel;
        let mac = MacPredicate::always();
        let mut ctx = BoxContext::new(&tree, &tree, &kernel, &mac, vec![1.0; 8]);
        let plan = LazyEvaluator::plan(&mut ctx, EvaluatorKind::Fmm);

        // The seed pair is split once (tie splits the source side) and every
        // child pair is accepted outright.
        let expected: Vec<(u32, u32)> = tree
            .root()
            .children()
            .map(|c| (c.index() as u32, 0))
            .collect();
        assert_eq!(plan.long_range_pairs(), expected.as_slice());
        assert!(plan.p2p_pairs().is_empty());
    }
}
