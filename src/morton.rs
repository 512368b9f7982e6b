/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements Morton (Z-order) encoding of 3D points and cell geometry queries.
//
// Created on: 20 Feb 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::RowRef;

/// Number of Morton refinement levels per axis. Codes carry
/// `3 * MAX_DEPTH = 30` significant bits.
pub const MAX_DEPTH: u32 = 10;

/// Number of cells along each axis at the deepest level.
const AXIS_CELLS: u32 = 1 << MAX_DEPTH;

/// An axis-aligned box in 3D space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min: [f64; 3],
    max: [f64; 3],
}

impl BoundingBox {
    /// Creates a bounding box from its minimum and maximum corners.
    ///
    /// # Panics
    /// Panics if `min > max` in any component.
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        for d in 0..3 {
            assert!(
                min[d] <= max[d],
                "Invalid bounding box: min {:?} exceeds max {:?} in component {}",
                min,
                max,
                d
            );
        }
        Self { min, max }
    }

    /// The minimum corner of the box.
    pub fn min(&self) -> [f64; 3] {
        self.min
    }

    /// The maximum corner of the box.
    pub fn max(&self) -> [f64; 3] {
        self.max
    }

    /// The per-axis extents of the box.
    pub fn extent(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    /// Tests whether a point lies inside the box (boundaries included).
    pub fn contains(&self, point: RowRef<f64>) -> bool {
        point
            .iter()
            .enumerate()
            .all(|(d, &value)| self.min[d] <= value && value <= self.max[d])
    }
}

/// Maps points inside a bounding box to 30-bit Morton codes and maps codes
/// back to the deepest-level cell extents.
///
/// The coder is stateless after construction: the same point always yields
/// the same code, and codes impose the Z-order space-filling-curve ordering
/// on the quantised coordinates.
#[derive(Debug, Clone)]
pub struct MortonCoder {
    bounds: BoundingBox,
    cell_extent: [f64; 3],
}

impl MortonCoder {
    /// Creates a coder covering the given bounding box.
    pub fn new(bounds: BoundingBox) -> Self {
        let extent = bounds.extent();
        let cells = AXIS_CELLS as f64;
        Self {
            bounds,
            cell_extent: [extent[0] / cells, extent[1] / cells, extent[2] / cells],
        }
    }

    /// The bounding box this coder covers.
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Morton code of a point inside the bounding box.
    ///
    /// Each coordinate is quantised to `floor((p - lo) / (hi - lo) * 2^10)`,
    /// clamped to `[0, 1023]`, and the three integer coordinates are
    /// bit-interleaved with x in the lowest bit of each triple.
    pub fn code(&self, point: RowRef<f64>) -> u32 {
        debug_assert!(self.bounds.contains(point));
        let mut quantised = [0u32; 3];
        for (d, &value) in point.iter().enumerate() {
            quantised[d] = self.quantise(value, d);
        }
        encode(quantised)
    }

    /// The axis-aligned cell at the deepest level identified by a code.
    pub fn cell(&self, code: u32) -> BoundingBox {
        let anchor = decode(code);
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for d in 0..3 {
            min[d] = self.bounds.min[d] + anchor[d] as f64 * self.cell_extent[d];
            max[d] = min[d] + self.cell_extent[d];
        }
        BoundingBox { min, max }
    }

    fn quantise(&self, value: f64, axis: usize) -> u32 {
        let extent = self.bounds.max[axis] - self.bounds.min[axis];
        if extent <= 0.0 {
            return 0;
        }
        let scaled = (value - self.bounds.min[axis]) / extent * AXIS_CELLS as f64;
        (scaled.floor() as i64).clamp(0, AXIS_CELLS as i64 - 1) as u32
    }
}

/// Spreads the low 10 bits of `x` into every third bit of the result.
fn spread_bits(x: u32) -> u32 {
    let mut x = x & 0x0000_03ff;
    x = (x | (x << 16)) & 0xff00_00ff;
    x = (x | (x << 8)) & 0x0300_f00f;
    x = (x | (x << 4)) & 0x030c_30c3;
    x = (x | (x << 2)) & 0x0924_9249;
    x
}

/// Compacts every third bit of `x` back into the low 10 bits.
fn compact_bits(x: u32) -> u32 {
    let mut x = x & 0x0924_9249;
    x = (x | (x >> 2)) & 0x030c_30c3;
    x = (x | (x >> 4)) & 0x0300_f00f;
    x = (x | (x >> 8)) & 0xff00_00ff;
    x = (x | (x >> 16)) & 0x0000_03ff;
    x
}

/// Interleaves three 10-bit coordinates into a 30-bit Morton code.
pub(crate) fn encode(anchor: [u32; 3]) -> u32 {
    spread_bits(anchor[0]) | (spread_bits(anchor[1]) << 1) | (spread_bits(anchor[2]) << 2)
}

/// Recovers the three 10-bit coordinates from a 30-bit Morton code.
pub(crate) fn decode(code: u32) -> [u32; 3] {
    [
        compact_bits(code),
        compact_bits(code >> 1),
        compact_bits(code >> 2),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn interleave_round_trip() {
        for x in [0u32, 1, 2, 37, 511, 777, 1023] {
            for y in [0u32, 5, 100, 1023] {
                for z in [0u32, 3, 512, 1023] {
                    assert_eq!(decode(encode([x, y, z])), [x, y, z]);
                }
            }
        }
    }

    #[test]
    fn octant_digits() {
        assert_eq!(encode([0, 0, 0]), 0);
        assert_eq!(encode([1, 0, 0]), 1);
        assert_eq!(encode([0, 1, 0]), 2);
        assert_eq!(encode([0, 0, 1]), 4);
        assert_eq!(encode([1, 1, 1]), 7);
    }

    #[test]
    fn cell_contains_coded_point() {
        let coder = MortonCoder::new(BoundingBox::new([-1.0, 0.0, 2.0], [3.0, 8.0, 2.5]));
        let points = mat![
            [-1.0, 0.0, 2.0],
            [3.0, 8.0, 2.5],
            [0.25, 4.5, 2.125],
            [2.999, 7.999, 2.499],
        ];
        for i in 0..points.nrows() {
            let p = points.row(i);
            let cell = coder.cell(coder.code(p));
            for (d, &value) in p.iter().enumerate() {
                // Boundary points land in the clamped last cell.
                assert!(cell.min()[d] <= value + 1e-12);
                assert!(value <= cell.max()[d] + 1e-12);
            }
        }
    }

    #[test]
    fn codes_increase_along_each_axis() {
        let coder = MortonCoder::new(BoundingBox::new([0.0; 3], [1.0; 3]));
        for axis in 0..3 {
            let mut previous = 0u32;
            for step in 1..100 {
                let mut p = [0.01; 3];
                p[axis] = step as f64 / 100.0;
                let code = coder.code(mat![[p[0], p[1], p[2]]].row(0));
                assert!(code >= previous);
                previous = code;
            }
        }
    }

    #[test]
    fn flat_box_quantises_to_zero() {
        let coder = MortonCoder::new(BoundingBox::new([0.0, 0.0, 1.0], [1.0, 1.0, 1.0]));
        let code = coder.code(mat![[0.5, 0.5, 1.0]].row(0));
        assert_eq!(decode(code)[2], 0);
    }
}
