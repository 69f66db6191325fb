use crate::camera::{Camera, ObjectTransform};
use crate::color::{RenderMode, ResolvedMode};
use crate::projection::Projector;
use crate::raster::{Framebuffer, Kernel, Sprite};
use crate::structures::{BoundingBox, Dataset};
use glam::{Quat, Vec3};
use rayon::prelude::*;

/// Axis-aligned crop region in object space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropBox {
    pub bounds: BoundingBox,
    pub enabled: bool,
}

impl CropBox {
    pub fn disabled() -> Self {
        Self {
            bounds: BoundingBox::new([f32::NEG_INFINITY; 3], [f32::INFINITY; 3]),
            enabled: false,
        }
    }

    /// Whether cropping suppresses a point at object-space `p`. Boundary values are inside.
    #[inline]
    pub fn discards(&self, p: [f32; 3]) -> bool {
        self.enabled && !self.bounds.contains(p)
    }
}

impl Default for CropBox {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Appearance and placement parameters supplied each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    /// World-space diameter of a simple point.
    pub point_size: f32,
    pub opacity: f32,
    pub splat_scale: f32,
    pub crop: CropBox,
    pub mode: RenderMode,
    pub transform: ObjectTransform,
    pub background: [f32; 3],
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            point_size: 0.02,
            opacity: 1.0,
            splat_scale: 1.0,
            crop: CropBox::default(),
            mode: RenderMode::default(),
            transform: ObjectTransform::default(),
            background: [0.0; 3],
        }
    }
}

/// Everything one frame needs, derived from the current parameters, camera and dataset.
#[derive(Debug, Clone, Copy)]
pub struct RenderState<'a> {
    dataset: &'a Dataset,
    mode: ResolvedMode<'a>,
    projector: Projector,
    point_size: f32,
    opacity: f32,
    crop: CropBox,
    background: [f32; 3],
}

impl<'a> RenderState<'a> {
    pub fn new(dataset: &'a Dataset, params: &RenderParams, camera: &Camera) -> Self {
        Self {
            dataset,
            mode: params.mode.resolve(dataset),
            projector: Projector::new(camera, &params.transform, params.splat_scale),
            point_size: params.point_size,
            opacity: params.opacity.clamp(0.0, 1.0),
            crop: params.crop,
            background: params.background,
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode.kind()
    }

    /// Screen-space sprite for point `i`, `None` when it contributes nothing this frame.
    pub fn sprite(&self, i: usize) -> Option<Sprite> {
        let p = self.dataset.position(i);
        if self.crop.discards(p) {
            return None;
        }
        let position = Vec3::from_array(p);
        let color = self.mode.color(self.dataset, i);

        match self.mode {
            ResolvedMode::Splat(splats) => {
                let [x, y, z, w] = splats.rotation(i);
                let footprint = self.projector.project_splat(
                    position,
                    Vec3::from_array(splats.scale(i)),
                    Quat::from_xyzw(x, y, z, w),
                )?;
                Some(Sprite {
                    center: footprint.center,
                    radius: footprint.radius,
                    depth: footprint.depth,
                    color,
                    opacity: self.opacity * self.dataset.opacity(i),
                    kernel: Kernel::Gaussian {
                        conic: footprint.conic,
                        scale: footprint.kernel_scale,
                    },
                })
            }
            ResolvedMode::Original | ResolvedMode::Colormap => {
                let (center, depth) = self.projector.project_point(position)?;
                let (_, fy) = self.projector.focal();
                Some(Sprite {
                    center,
                    radius: (0.5 * self.point_size * fy / depth).max(0.5),
                    depth,
                    color,
                    opacity: self.opacity,
                    kernel: Kernel::Radial,
                })
            }
        }
    }
}

/// Draws one frame. Sprites are computed in parallel and blended in dataset order.
pub fn render(state: &RenderState<'_>, fb: &mut Framebuffer) {
    fb.clear(state.background);
    if fb.width() == 0 || fb.height() == 0 {
        return;
    }
    let sprites: Vec<Option<Sprite>> = (0..state.dataset.len())
        .into_par_iter()
        .map(|i| state.sprite(i))
        .collect();
    sprites
        .iter()
        .flatten()
        .for_each(|sprite| sprite.rasterize(fb));
}
