use crate::common::HEADER_SCAN_WINDOW;

pub const DEFAULT_PROGRESS_STEPS: u32 = 100;

/// What to do with a property whose type name is not part of the PLY vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTypePolicy {
    /// Fail the load with `SplatError::UnknownPropertyType`.
    #[default]
    Reject,
    /// Assume a 4-byte field and never read it.
    AssumeFourBytes,
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub scan_window: usize,
    pub unknown_types: UnknownTypePolicy,
    /// Number of progress notifications emitted while decoding; 0 disables them.
    pub progress_steps: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            scan_window: HEADER_SCAN_WINDOW,
            unknown_types: UnknownTypePolicy::default(),
            progress_steps: DEFAULT_PROGRESS_STEPS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    pub const EMPTY: BoundingBox = BoundingBox {
        min: [f32::INFINITY; 3],
        max: [f32::NEG_INFINITY; 3],
    };

    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn expand(&mut self, p: [f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }

    /// Closed-interval containment on every axis.
    #[inline]
    pub fn contains(&self, p: [f32; 3]) -> bool {
        (0..3).all(|axis| p[axis] >= self.min[axis] && p[axis] <= self.max[axis])
    }

    pub fn center(&self) -> [f32; 3] {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }

    pub fn extent(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// Per-point anisotropic covariance parameters. Scales and rotations only
/// ever exist together.
#[derive(Debug, Clone)]
pub struct SplatAttributes {
    scales: Vec<f32>,
    rotations: Vec<f32>,
}

impl SplatAttributes {
    pub(crate) fn new(scales: Vec<f32>, rotations: Vec<f32>) -> Self {
        debug_assert_eq!(scales.len() / 3, rotations.len() / 4);
        Self { scales, rotations }
    }

    /// Linear (already exponentiated) scales, 3 per point.
    pub fn scales(&self) -> &[f32] {
        &self.scales
    }

    /// Unit quaternions stored as `(x, y, z, w)`, 4 per point.
    pub fn rotations(&self) -> &[f32] {
        &self.rotations
    }

    #[inline]
    pub fn scale(&self, i: usize) -> [f32; 3] {
        [self.scales[i * 3], self.scales[i * 3 + 1], self.scales[i * 3 + 2]]
    }

    #[inline]
    pub fn rotation(&self, i: usize) -> [f32; 4] {
        [
            self.rotations[i * 4],
            self.rotations[i * 4 + 1],
            self.rotations[i * 4 + 2],
            self.rotations[i * 4 + 3],
        ]
    }
}

/// An immutable decoded point set.
#[derive(Debug, Clone)]
pub struct Dataset {
    point_count: u32,
    positions: Vec<f32>,
    colors: Vec<f32>,
    elevations: Vec<f32>,
    opacities: Option<Vec<f32>>,
    splats: Option<SplatAttributes>,
    bounds: BoundingBox,
}

impl Dataset {
    pub(crate) fn from_parts(
        positions: Vec<f32>,
        colors: Vec<f32>,
        elevations: Vec<f32>,
        opacities: Option<Vec<f32>>,
        splats: Option<SplatAttributes>,
    ) -> Self {
        let mut bounds = BoundingBox::EMPTY;
        positions
            .chunks_exact(3)
            .for_each(|p| bounds.expand([p[0], p[1], p[2]]));
        Self {
            point_count: (positions.len() / 3) as u32,
            positions,
            colors,
            elevations,
            opacities,
            splats,
            bounds,
        }
    }

    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    pub fn len(&self) -> usize {
        self.point_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn elevations(&self) -> &[f32] {
        &self.elevations
    }

    pub fn opacities(&self) -> Option<&[f32]> {
        self.opacities.as_deref()
    }

    pub fn splats(&self) -> Option<&SplatAttributes> {
        self.splats.as_ref()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounds
    }

    #[inline]
    pub fn position(&self, i: usize) -> [f32; 3] {
        [
            self.positions[i * 3],
            self.positions[i * 3 + 1],
            self.positions[i * 3 + 2],
        ]
    }

    #[inline]
    pub fn color(&self, i: usize) -> [f32; 3] {
        [self.colors[i * 3], self.colors[i * 3 + 1], self.colors[i * 3 + 2]]
    }

    #[inline]
    pub fn elevation(&self, i: usize) -> f32 {
        self.elevations[i]
    }

    /// Per-point opacity, 1.0 when the file carried none.
    #[inline]
    pub fn opacity(&self, i: usize) -> f32 {
        self.opacities.as_ref().map_or(1.0, |o| o[i])
    }
}
