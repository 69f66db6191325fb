use crate::common::{clamp_u8, MAHALANOBIS_CUTOFF};
use crate::projection::Conic;
use glam::Vec2;

/// Premultiplied linear RGBA target.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 4]; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Fills the target with an opaque background.
    pub fn clear(&mut self, background: [f32; 3]) {
        let [r, g, b] = background;
        self.pixels.fill([r, g, b, 1.0]);
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Straight-alpha "over" onto the premultiplied destination.
    #[inline]
    pub fn blend(&mut self, x: u32, y: u32, color: [f32; 3], alpha: f32) {
        let dst = &mut self.pixels[y as usize * self.width as usize + x as usize];
        let keep = 1.0 - alpha;
        dst[0] = color[0] * alpha + dst[0] * keep;
        dst[1] = color[1] * alpha + dst[1] * keep;
        dst[2] = color[2] * alpha + dst[2] * keep;
        dst[3] = alpha + dst[3] * keep;
    }

    /// Un-premultiplied 8-bit RGBA rows, top row first.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|&[r, g, b, a]| {
                let inv = if a > 0.0 { 255.0 / a } else { 0.0 };
                [
                    clamp_u8(r * inv),
                    clamp_u8(g * inv),
                    clamp_u8(b * inv),
                    clamp_u8(a * 255.0),
                ]
            })
            .collect()
    }
}

/// How a fragment's alpha falls off across the footprint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    /// Anisotropic Gaussian with the given inverse covariance; offsets are divided by `scale`.
    Gaussian { conic: Conic, scale: f32 },
    /// Isotropic falloff over a disk of the footprint radius.
    Radial,
}

/// A point ready to be rasterized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sprite {
    pub center: Vec2,
    pub radius: f32,
    pub depth: f32,
    pub color: [f32; 3],
    pub opacity: f32,
    pub kernel: Kernel,
}

/// Gaussian fragment alpha, `None` beyond the 2-sigma cutoff.
#[inline]
pub fn gaussian_alpha(conic: &Conic, offset: Vec2, opacity: f32) -> Option<f32> {
    let d = conic.mahalanobis(offset);
    if d > MAHALANOBIS_CUTOFF {
        return None;
    }
    Some(opacity * (-0.5 * d).exp())
}

/// Round-point fragment alpha for normalized radial distance `r`, `None` outside the disk.
#[inline]
pub fn radial_alpha(r2: f32, opacity: f32) -> Option<f32> {
    if r2 > 1.0 {
        return None;
    }
    Some(opacity * (-4.0 * r2).exp())
}

impl Sprite {
    #[inline]
    fn alpha_at(&self, offset: Vec2) -> Option<f32> {
        match self.kernel {
            Kernel::Gaussian { conic, scale } => gaussian_alpha(&conic, offset / scale, self.opacity),
            Kernel::Radial => radial_alpha(offset.length_squared() / (self.radius * self.radius), self.opacity),
        }
    }

    /// Blends every covered pixel of the footprint square into `fb`.
    pub fn rasterize(&self, fb: &mut Framebuffer) {
        if !(self.radius > 0.0) || self.opacity <= 0.0 || !self.center.is_finite() {
            return;
        }
        let w = fb.width() as f32;
        let h = fb.height() as f32;
        let x0 = (self.center.x - self.radius).floor().max(0.0);
        let y0 = (self.center.y - self.radius).floor().max(0.0);
        let x1 = (self.center.x + self.radius).ceil().min(w);
        let y1 = (self.center.y + self.radius).ceil().min(h);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        for y in y0 as u32..y1 as u32 {
            for x in x0 as u32..x1 as u32 {
                let offset = Vec2::new(x as f32 + 0.5, y as f32 + 0.5) - self.center;
                if let Some(alpha) = self.alpha_at(offset) {
                    fb.blend(x, y, self.color, alpha.min(1.0));
                }
            }
        }
    }
}
