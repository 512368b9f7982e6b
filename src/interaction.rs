/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the queue-driven dual-tree evaluator that applies far-field operators in place.
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

/// Dual-tree evaluator that performs far-field work during the traversal.
///
/// The descent walks a FIFO of `(source box, target box)` pairs seeded with
/// the two roots. A popped pair is split (the target side when the source
/// side is a leaf or strictly smaller, the source side otherwise) and each
/// resulting pair is classified at once: accepted pairs get M2L (FMM) or M2P
/// (treecode), leaf-leaf pairs get a one-sided P2P, and everything else is
/// re-enqueued. The queue bounds the descent depth; no recursion is used.
///
/// Multipole expansions must exist before execution (see
/// [`upward_pass`](crate::sweep::upward_pass)); under FMM the local
/// expansions it produces are drained afterwards by
/// [`downward_pass`](crate::sweep::downward_pass).
#[derive(Debug, Clone, Copy)]
pub struct ImmediateEvaluator {
    kind: EvaluatorKind,
}

impl ImmediateEvaluator {
    /// Creates an evaluator of the given kind.
    pub fn new(kind: EvaluatorKind) -> Self {
        Self { kind }
    }

    /// Runs the dual-tree descent over the context's trees.
    pub fn execute<K: Kernel>(&self, ctx: &mut BoxContext<'_, K>) {
        let source_root = ctx.source_tree().root();
        let target_root = ctx.target_tree().root();

        // A pair of leaf roots never enters the queue below.
        if source_root.is_leaf() && target_root.is_leaf() {
            ctx.apply_p2p(0, 0);
            return;
        }

        let mut queue: VecDeque<(u32, u32)> = VecDeque::new();
        queue.push_back((0, 0));

        while let Some((b1, b2)) = queue.pop_front() {
            let source = ctx.source_box(b1);
            let target = ctx.target_box(b2);

            if target.is_leaf()
                || (!source.is_leaf() && source.side_length() >= target.side_length())
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

    /// Classifies one pair: far-field operator, P2P, or refine.
    fn interact<K: Kernel>(
        &self,
        ctx: &mut BoxContext<'_, K>,
        b1: u32,
        b2: u32,
        queue: &mut VecDeque<(u32, u32)>,
    ) {
        if ctx.accept_multipole(b1, b2) {
            match self.kind {
                EvaluatorKind::Fmm => {
                    if !ctx.has_local(b2) {
                        ctx.init_local(b2);
                    }
                    ctx.apply_m2l(b1, b2);
                }
                EvaluatorKind::Treecode => ctx.apply_m2p(b1, b2),
            }
        } else if ctx.source_box(b1).is_leaf() && ctx.target_box(b2).is_leaf() {
            ctx.apply_p2p(b1, b2);
        } else {
            queue.push_back((b1, b2));
        }
    }
}
