/////////////////////////////////////////////////////////////////////////////////////////////
//
// Constructs the Morton-sorted octree arena and exposes box and body navigation handles.
//
// Created on: 20 Feb 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use std::ops::Range;

use faer::{Mat, MatRef};
use rayon::prelude::*;

use crate::fmm::FmmError;
use crate::morton::{BoundingBox, MortonCoder, MAX_DEPTH};

/// High bit of a box key marking the box as a leaf.
const LEAF_BIT: u32 = 1 << 31;

/// Mask selecting the 30 Morton code bits of a fully shifted key.
const CODE_MASK: u32 = (1 << 30) - 1;

/// A box record in the arena.
///
/// `key` is the Morton prefix of the box with the leaf flag in bit 31 and
/// the leading set bit of the remainder acting as a sentinel marking the
/// highest ternary digit, so the root key is `1` and a child key is
/// `(parent_key << 3) | octant`. `child_begin..child_end` indexes bodies
/// for leaves and boxes for internal boxes.
#[derive(Debug, Clone, Copy)]
struct BoxData {
    key: u32,
    parent: u32,
    child_begin: u32,
    child_end: u32,
}

impl BoxData {
    fn new(key: u32, parent: u32, child_begin: u32, child_end: u32) -> Self {
        Self {
            key,
            parent,
            child_begin,
            child_end,
        }
    }

    fn num_children(&self) -> u32 {
        self.child_end - self.child_begin
    }

    fn level(&self) -> u32 {
        let key = self.key & !LEAF_BIT;
        (31 - key.leading_zeros()) / 3
    }

    /// Smallest Morton code any body in this box can have.
    fn mc_lower_bound(&self) -> u32 {
        let key = self.key & !LEAF_BIT;
        let shift = 3 * (MAX_DEPTH - self.level());
        (key << shift) & CODE_MASK
    }

    /// Largest Morton code any body in this box can have.
    fn mc_upper_bound(&self) -> u32 {
        let shift = 3 * (MAX_DEPTH - self.level());
        self.mc_lower_bound() | (((1u64 << shift) - 1) as u32)
    }

    fn set_leaf(&mut self) {
        self.key |= LEAF_BIT;
    }

    fn is_leaf(&self) -> bool {
        self.key & LEAF_BIT != 0
    }
}

/// An octree over Morton-sorted points.
///
/// The tree stores the points in Morton order together with the sorted code
/// array, the permutation back to input order, and a contiguous arena of box
/// records built top-down by octant subdivision. All storage is immutable
/// after construction; evaluators navigate it through [`BoxRef`] and
/// [`BodyRef`] handles.
#[derive(Debug)]
pub struct Octree {
    coder: MortonCoder,
    points: Mat<f64>,
    codes: Vec<u32>,
    permute: Vec<u32>,
    boxes: Vec<BoxData>,
    root_side: f64,
    ncrit: usize,
}

impl Octree {
    /// Builds an octree over `points`, subdividing until no leaf holds more
    /// than `ncrit` bodies or the deepest Morton level is reached.
    ///
    /// Points are `(N, 3)` rows. Every point must lie inside `bounds`;
    /// a point outside it is a precondition failure.
    pub fn build(
        points: MatRef<f64>,
        bounds: BoundingBox,
        ncrit: usize,
    ) -> Result<Self, FmmError> {
        assert_eq!(points.ncols(), 3, "Points must have three columns");
        let coder = MortonCoder::new(bounds);
        let ncrit = ncrit.max(1);
        let n = points.nrows();

        let coded: Vec<Result<u32, FmmError>> = points
            .par_row_iter()
            .enumerate()
            .map(|(idx, point)| {
                if !coder.bounding_box().contains(point) {
                    return Err(FmmError::PointOutsideBounds { point_index: idx });
                }
                Ok(coder.code(point))
            })
            .collect();

        let mut code_idx = Vec::with_capacity(n);
        for (idx, result) in coded.into_iter().enumerate() {
            code_idx.push((result?, idx as u32));
        }
        // Sorting (code, input index) pairs keeps equal codes in input order.
        code_idx.sort_unstable();

        let codes: Vec<u32> = code_idx.iter().map(|&(code, _)| code).collect();
        let permute: Vec<u32> = code_idx.iter().map(|&(_, idx)| idx).collect();
        let sorted_points = Mat::from_fn(n, 3, |i, j| *points.get(permute[i] as usize, j));

        let extent = bounds.extent();
        let root_side = extent[0].max(extent[1]).max(extent[2]);

        let mut boxes = vec![BoxData::new(1, 0, 0, n as u32)];
        let mut k = 0;
        while k < boxes.len() {
            let data = boxes[k];
            if data.num_children() as usize <= ncrit || data.level() == MAX_DEPTH {
                boxes[k].set_leaf();
            } else {
                let key_parent = data.key;
                let lo = data.child_begin as usize;
                let hi = data.child_end as usize;

                // Body offsets become box offsets once this box splits.
                boxes[k].child_begin = boxes.len() as u32;
                boxes[k].child_end = boxes.len() as u32;

                for octant in 0..8u32 {
                    let child = BoxData::new((key_parent << 3) | octant, k as u32, 0, 0);
                    let begin =
                        lo + codes[lo..hi].partition_point(|&code| code < child.mc_lower_bound());
                    let end =
                        lo + codes[lo..hi].partition_point(|&code| code <= child.mc_upper_bound());
                    if end > begin {
                        boxes[k].child_end += 1;
                        boxes.push(BoxData::new(
                            child.key,
                            child.parent,
                            begin as u32,
                            end as u32,
                        ));
                    }
                }
            }
            k += 1;
        }

        Ok(Self {
            coder,
            points: sorted_points,
            codes,
            permute,
            boxes,
            root_side,
            ncrit,
        })
    }

    /// Number of bodies in the tree.
    pub fn size(&self) -> usize {
        self.points.nrows()
    }

    /// Number of boxes in the arena.
    pub fn num_boxes(&self) -> usize {
        self.boxes.len()
    }

    /// The leaf capacity the tree was built with.
    pub fn ncrit(&self) -> usize {
        self.ncrit
    }

    /// The bounding box the tree covers.
    pub fn bounding_box(&self) -> &BoundingBox {
        self.coder.bounding_box()
    }

    /// Handle to the root box.
    pub fn root(&self) -> BoxRef<'_> {
        self.box_at(0)
    }

    /// Handle to the box at arena index `index`.
    pub fn box_at(&self, index: usize) -> BoxRef<'_> {
        debug_assert!(index < self.boxes.len());
        BoxRef {
            index: index as u32,
            tree: self,
        }
    }

    /// Handle to the body at Morton-sorted position `index`.
    pub fn body_at(&self, index: usize) -> BodyRef<'_> {
        debug_assert!(index < self.size());
        BodyRef {
            index: index as u32,
            tree: self,
        }
    }

    /// Iterator over all boxes in arena order.
    pub fn boxes(&self) -> BoxIter<'_> {
        BoxIter {
            range: 0..self.boxes.len() as u32,
            tree: self,
        }
    }

    /// Iterator over all bodies in Morton order.
    pub fn bodies(&self) -> BodyIter<'_> {
        BodyIter {
            range: 0..self.size() as u32,
            tree: self,
        }
    }

    /// The permutation applied by the Morton sort: `permutation()[i]` is the
    /// input index of the body at sorted position `i`.
    pub fn permutation(&self) -> &[u32] {
        &self.permute
    }

    /// The sorted Morton code array, one code per body.
    pub fn codes(&self) -> &[u32] {
        &self.codes
    }

    /// The points in Morton order.
    pub fn points(&self) -> MatRef<f64> {
        self.points.as_ref()
    }

    /// View of the rows of the sorted point array covering `range`.
    pub fn point_rows(&self, range: Range<usize>) -> MatRef<f64> {
        self.points.as_ref().subrows(range.start, range.len())
    }
}

/// A value handle to a box in the arena.
#[derive(Clone, Copy)]
pub struct BoxRef<'t> {
    index: u32,
    tree: &'t Octree,
}

impl<'t> BoxRef<'t> {
    fn data(&self) -> &'t BoxData {
        &self.tree.boxes[self.index as usize]
    }

    /// Arena index of this box.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// The box key: Morton prefix with sentinel and leaf flag.
    pub fn key(&self) -> u32 {
        self.data().key
    }

    /// Refinement level of the box; the root is level 0.
    pub fn level(&self) -> u32 {
        self.data().level()
    }

    /// Whether the box is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.data().is_leaf()
    }

    /// Number of child boxes (internal) or bodies (leaf).
    pub fn num_children(&self) -> usize {
        self.data().num_children() as usize
    }

    /// Handle to the parent box. The root is its own parent.
    pub fn parent(&self) -> BoxRef<'t> {
        BoxRef {
            index: self.data().parent,
            tree: self.tree,
        }
    }

    /// Iterator over the child boxes of an internal box.
    pub fn children(&self) -> BoxIter<'t> {
        debug_assert!(!self.is_leaf());
        BoxIter {
            range: self.data().child_begin..self.data().child_end,
            tree: self.tree,
        }
    }

    /// Iterator over the bodies contained in a leaf box.
    pub fn bodies(&self) -> BodyIter<'t> {
        debug_assert!(self.is_leaf());
        BodyIter {
            range: self.data().child_begin..self.data().child_end,
            tree: self.tree,
        }
    }

    /// Half-open range of Morton-sorted body indices covered by this box.
    ///
    /// For leaves this is the stored range; for internal boxes it is
    /// recovered from the first and last descendants.
    pub fn body_range(&self) -> Range<usize> {
        let mut first = *self;
        while !first.is_leaf() {
            first.index = first.data().child_begin;
        }
        let mut last = *self;
        while !last.is_leaf() {
            last.index = last.data().child_end - 1;
        }
        first.data().child_begin as usize..last.data().child_end as usize
    }

    /// Number of bodies covered by this box.
    pub fn num_bodies(&self) -> usize {
        self.body_range().len()
    }

    /// Smallest Morton code any body in this box can have.
    pub fn morton_lower_bound(&self) -> u32 {
        self.data().mc_lower_bound()
    }

    /// Largest Morton code any body in this box can have.
    pub fn morton_upper_bound(&self) -> u32 {
        self.data().mc_upper_bound()
    }

    /// Centre of the box.
    pub fn center(&self) -> [f64; 3] {
        let cell = self.tree.coder.cell(self.data().mc_lower_bound());
        let scale = 0.5 * (1u32 << (MAX_DEPTH - self.level())) as f64;
        let min = cell.min();
        let extent = cell.extent();
        [
            min[0] + extent[0] * scale,
            min[1] + extent[1] * scale,
            min[2] + extent[2] * scale,
        ]
    }

    /// Side length of the box: the largest root extent halved per level.
    pub fn side_length(&self) -> f64 {
        self.tree.root_side / (1u32 << self.level()) as f64
    }
}

impl std::fmt::Debug for BoxRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxRef")
            .field("index", &self.index)
            .field("key", &self.key())
            .field("level", &self.level())
            .field("is_leaf", &self.is_leaf())
            .finish()
    }
}

impl PartialEq for BoxRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.index == other.index
    }
}

impl Eq for BoxRef<'_> {}

/// A value handle to a body in the Morton-sorted point array.
#[derive(Clone, Copy)]
pub struct BodyRef<'t> {
    index: u32,
    tree: &'t Octree,
}

impl<'t> BodyRef<'t> {
    /// Morton-sorted position of this body.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Position of this body in the original input sequence.
    pub fn original_index(&self) -> usize {
        self.tree.permute[self.index as usize] as usize
    }

    /// Coordinates of the body.
    pub fn point(&self) -> faer::RowRef<'t, f64> {
        self.tree.points.as_ref().row(self.index as usize)
    }

    /// Morton code of the body.
    pub fn morton_code(&self) -> u32 {
        self.tree.codes[self.index as usize]
    }
}

impl std::fmt::Debug for BodyRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyRef")
            .field("index", &self.index)
            .field("morton_code", &self.morton_code())
            .finish()
    }
}

/// Forward iterator over a contiguous range of boxes.
pub struct BoxIter<'t> {
    range: Range<u32>,
    tree: &'t Octree,
}

impl<'t> Iterator for BoxIter<'t> {
    type Item = BoxRef<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        self.range.next().map(|index| BoxRef {
            index,
            tree: self.tree,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

impl ExactSizeIterator for BoxIter<'_> {}

/// Forward iterator over a contiguous range of bodies.
pub struct BodyIter<'t> {
    range: Range<u32>,
    tree: &'t Octree,
}

impl<'t> Iterator for BodyIter<'t> {
    type Item = BodyRef<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        self.range.next().map(|index| BodyRef {
            index,
            tree: self.tree,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

impl ExactSizeIterator for BodyIter<'_> {}
