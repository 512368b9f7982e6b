/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides the per-evaluation box context: expansion tables, leaf spans, and operator glue.
//
// Created on: 20 Feb 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::MatRef;

use crate::fmm::MacPredicate;
use crate::tree::{BoxRef, Octree};
use crate::traits::Kernel;

/// Dense expansion storage indexed by box id.
///
/// A slot is occupied once the corresponding INIT call has been issued; the
/// arena outlives the table, so entries are plain values with no interior
/// pointers.
struct ExpansionTable<T> {
    slots: Vec<Option<T>>,
}

impl<T> ExpansionTable<T> {
    fn new(num_boxes: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(num_boxes).collect(),
        }
    }

    fn is_set(&self, index: usize) -> bool {
        self.slots[index].is_some()
    }

    fn set(&mut self, index: usize, value: T) {
        self.slots[index] = Some(value);
    }

    fn get(&self, index: usize) -> &T {
        self.slots[index]
            .as_ref()
            .expect("expansion read before initialisation")
    }

    fn get_mut(&mut self, index: usize) -> &mut T {
        self.slots[index]
            .as_mut()
            .expect("expansion written before initialisation")
    }

    /// Mutable access to two distinct slots; `low` must index below `high`.
    fn pair_mut(&mut self, low: usize, high: usize) -> (&mut T, &mut T) {
        debug_assert!(low < high);
        let (head, tail) = self.slots.split_at_mut(high);
        (
            head[low]
                .as_mut()
                .expect("expansion written before initialisation"),
            tail[0]
                .as_mut()
                .expect("expansion written before initialisation"),
        )
    }
}

/// Mutable collaborator shared by the evaluators of one run.
///
/// The context borrows the immutable source and target trees (possibly the
/// same tree for self-interaction), holds the kernel and the multipole
/// acceptance predicate, and owns all evaluation scratch: tree-ordered
/// charges and results plus the multipole and local expansion tables.
/// Dropping the context reclaims every piece of evaluation scratch.
pub struct BoxContext<'a, K: Kernel> {
    source_tree: &'a Octree,
    target_tree: &'a Octree,
    kernel: &'a K,
    mac: &'a MacPredicate,
    charges: Vec<K::Charge>,
    results: Vec<K::Result>,
    multipoles: ExpansionTable<K::Multipole>,
    locals: ExpansionTable<K::Local>,
}

impl<'a, K: Kernel> BoxContext<'a, K> {
    /// Creates a context for one evaluation run.
    ///
    /// `charges` must already be in the source tree's Morton order, one per
    /// source body. Results start at the zero value and are kept in the
    /// target tree's Morton order until collected.
    pub fn new(
        source_tree: &'a Octree,
        target_tree: &'a Octree,
        kernel: &'a K,
        mac: &'a MacPredicate,
        charges: Vec<K::Charge>,
    ) -> Self {
        debug_assert_eq!(charges.len(), source_tree.size());
        Self {
            source_tree,
            target_tree,
            kernel,
            mac,
            charges,
            results: vec![K::Result::default(); target_tree.size()],
            multipoles: ExpansionTable::new(source_tree.num_boxes()),
            locals: ExpansionTable::new(target_tree.num_boxes()),
        }
    }

    /// The tree holding the source points and charges.
    pub fn source_tree(&self) -> &'a Octree {
        self.source_tree
    }

    /// The tree holding the target points and results.
    pub fn target_tree(&self) -> &'a Octree {
        self.target_tree
    }

    /// The kernel driving the operators.
    pub fn kernel(&self) -> &'a K {
        self.kernel
    }

    /// Handle to a source-tree box.
    pub fn source_box(&self, id: u32) -> BoxRef<'a> {
        self.source_tree.box_at(id as usize)
    }

    /// Handle to a target-tree box.
    pub fn target_box(&self, id: u32) -> BoxRef<'a> {
        self.target_tree.box_at(id as usize)
    }

    /// The configured multipole acceptance predicate, applied to a
    /// source-tree box and a target-tree box.
    pub fn accept_multipole(&self, source: u32, target: u32) -> bool {
        self.mac
            .accept(self.source_box(source), self.target_box(target))
    }

    /// Source points covered by a source-tree box.
    pub fn source_points(&self, id: u32) -> MatRef<'a, f64> {
        self.source_tree.point_rows(self.source_box(id).body_range())
    }

    /// Target points covered by a target-tree box.
    pub fn target_points(&self, id: u32) -> MatRef<'a, f64> {
        self.target_tree.point_rows(self.target_box(id).body_range())
    }

    /// Charges of the bodies covered by a source-tree box.
    pub fn charges(&self, id: u32) -> &[K::Charge] {
        &self.charges[self.source_box(id).body_range()]
    }

    /// Results of the bodies covered by a target-tree box.
    pub fn results_mut(&mut self, id: u32) -> &mut [K::Result] {
        let range = self.target_box(id).body_range();
        &mut self.results[range]
    }

    /// Whether the multipole expansion of a source-tree box exists.
    pub fn has_multipole(&self, id: u32) -> bool {
        self.multipoles.is_set(id as usize)
    }

    /// Whether the local expansion of a target-tree box exists.
    pub fn has_local(&self, id: u32) -> bool {
        self.locals.is_set(id as usize)
    }

    /// Multipole expansion of a source-tree box.
    pub fn multipole(&self, id: u32) -> &K::Multipole {
        self.multipoles.get(id as usize)
    }

    /// Local expansion of a target-tree box.
    pub fn local(&self, id: u32) -> &K::Local {
        self.locals.get(id as usize)
    }

    /// Issues INITM: allocates the zero multipole expansion for a box.
    pub fn init_multipole(&mut self, id: u32) {
        let side = self.source_box(id).side_length();
        self.multipoles
            .set(id as usize, self.kernel.init_multipole(side));
    }

    /// Issues INITL: allocates the zero local expansion for a box.
    pub fn init_local(&mut self, id: u32) {
        let side = self.target_box(id).side_length();
        self.locals.set(id as usize, self.kernel.init_local(side));
    }

    /// P2M: leaf charges into the box's multipole expansion.
    pub fn apply_p2m(&mut self, id: u32) {
        let bx = self.source_box(id);
        debug_assert!(bx.is_leaf());
        let range = bx.body_range();
        let points = self.source_tree.point_rows(range.clone());
        let center = bx.center();
        let multipole = self.multipoles.get_mut(id as usize);
        self.kernel
            .p2m(points, &self.charges[range], center, multipole);
    }

    /// M2M: shifts a child multipole into its parent.
    pub fn apply_m2m(&mut self, child: u32, parent: u32) {
        debug_assert!(parent < child);
        let translation = translation(
            self.source_box(child).center(),
            self.source_box(parent).center(),
        );
        let (parent_m, child_m) = self.multipoles.pair_mut(parent as usize, child as usize);
        self.kernel.m2m(child_m, translation, parent_m);
    }

    /// M2L: translates a source multipole into a target local expansion.
    pub fn apply_m2l(&mut self, source: u32, target: u32) {
        let translation = translation(
            self.source_box(source).center(),
            self.target_box(target).center(),
        );
        let multipole = self.multipoles.get(source as usize);
        let local = self.locals.get_mut(target as usize);
        self.kernel.m2l(multipole, translation, local);
    }

    /// M2P: evaluates a source multipole directly at a target box's points.
    pub fn apply_m2p(&mut self, source: u32, target: u32) {
        let center = self.source_box(source).center();
        let range = self.target_box(target).body_range();
        let targets = self.target_tree.point_rows(range.clone());
        let multipole = self.multipoles.get(source as usize);
        self.kernel
            .m2p(multipole, center, targets, &mut self.results[range]);
    }

    /// L2L: translates a parent local expansion into a child's.
    pub fn apply_l2l(&mut self, parent: u32, child: u32) {
        debug_assert!(parent < child);
        let translation = translation(
            self.target_box(parent).center(),
            self.target_box(child).center(),
        );
        let (parent_l, child_l) = self.locals.pair_mut(parent as usize, child as usize);
        self.kernel.l2l(parent_l, translation, child_l);
    }

    /// L2P: evaluates a leaf's local expansion at its target points.
    pub fn apply_l2p(&mut self, id: u32) {
        let bx = self.target_box(id);
        debug_assert!(bx.is_leaf());
        let range = bx.body_range();
        let targets = self.target_tree.point_rows(range.clone());
        let center = bx.center();
        let local = self.locals.get(id as usize);
        self.kernel
            .l2p(local, center, targets, &mut self.results[range]);
    }

    /// P2P: one-sided direct sum, source-box charges into target-box results.
    pub fn apply_p2p(&mut self, source: u32, target: u32) {
        let source_range = self.source_box(source).body_range();
        let target_range = self.target_box(target).body_range();
        let sources = self.source_tree.point_rows(source_range.clone());
        let targets = self.target_tree.point_rows(target_range.clone());
        self.kernel.p2p(
            sources,
            &self.charges[source_range],
            targets,
            &mut self.results[target_range],
        );
    }

    /// Consumes the context, returning results in target-tree Morton order.
    pub fn into_results(self) -> Vec<K::Result> {
        self.results
    }
}

/// Translation vector between expansion centres, target relative to source.
fn translation(source_center: [f64; 3], target_center: [f64; 3]) -> [f64; 3] {
    [
        target_center[0] - source_center[0],
        target_center[1] - source_center[1],
        target_center[2] - source_center[2],
    ]
}
