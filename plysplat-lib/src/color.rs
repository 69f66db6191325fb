use crate::structures::{Dataset, SplatAttributes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Decoded per-point color as round points.
    #[default]
    Original,
    /// Elevation mapped through the Viridis gradient.
    Colormap,
    /// Anisotropic Gaussian footprints.
    Splat,
}

impl TryFrom<u8> for RenderMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RenderMode::Original),
            1 => Ok(RenderMode::Colormap),
            2 => Ok(RenderMode::Splat),
            other => Err(other),
        }
    }
}

impl From<RenderMode> for u8 {
    fn from(mode: RenderMode) -> Self {
        match mode {
            RenderMode::Original => 0,
            RenderMode::Colormap => 1,
            RenderMode::Splat => 2,
        }
    }
}

/// A render mode bound to a dataset. The splat variant can only be built
/// when the dataset carries scales and rotations.
#[derive(Debug, Clone, Copy)]
pub enum ResolvedMode<'a> {
    Original,
    Colormap,
    Splat(&'a SplatAttributes),
}

impl RenderMode {
    /// Splat rendering on a dataset without splat attributes falls back to `Original`.
    pub fn resolve(self, dataset: &Dataset) -> ResolvedMode<'_> {
        match (self, dataset.splats()) {
            (RenderMode::Original, _) => ResolvedMode::Original,
            (RenderMode::Colormap, _) => ResolvedMode::Colormap,
            (RenderMode::Splat, Some(splats)) => ResolvedMode::Splat(splats),
            (RenderMode::Splat, None) => ResolvedMode::Original,
        }
    }
}

impl ResolvedMode<'_> {
    pub fn kind(&self) -> RenderMode {
        match self {
            ResolvedMode::Original => RenderMode::Original,
            ResolvedMode::Colormap => RenderMode::Colormap,
            ResolvedMode::Splat(_) => RenderMode::Splat,
        }
    }

    /// Color of point `i` for this mode.
    #[inline]
    pub fn color(&self, dataset: &Dataset, i: usize) -> [f32; 3] {
        match self {
            ResolvedMode::Original | ResolvedMode::Splat(_) => dataset.color(i),
            ResolvedMode::Colormap => viridis(dataset.elevation(i)),
        }
    }
}

#[inline]
fn cubic(c: [f32; 4], t: f32) -> f32 {
    c[0] + t * (c[1] + t * (c[2] + t * c[3]))
}

// Least-squares cubic fits of the Viridis lookup table, one per channel.
const VIRIDIS_R: [f32; 4] = [0.2871, -0.0153, -1.7866, 2.5519];
const VIRIDIS_G: [f32; 4] = [0.0114, 1.2686, -0.1951, -0.1726];
const VIRIDIS_B: [f32; 4] = [0.3272, 1.4890, -2.5059, 0.7961];

/// Polynomial approximation of the Viridis gradient for `t` in [0, 1].
pub fn viridis(t: f32) -> [f32; 3] {
    let t = t.clamp(0.0, 1.0);
    [
        cubic(VIRIDIS_R, t).clamp(0.0, 1.0),
        cubic(VIRIDIS_G, t).clamp(0.0, 1.0),
        cubic(VIRIDIS_B, t).clamp(0.0, 1.0),
    ]
}
