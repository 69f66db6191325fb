//! Per-frame projection of points and 3D Gaussians into screen space.
//!
//! Screen space is in pixels with the origin at the top-left corner, `u` to the
//! right and `v` downwards. The 3D covariance of a splat is pushed through the
//! model-view rotation and a first-order linearization of the perspective
//! divide at the splat center (EWA splatting), giving a 2x2 covariance whose
//! inverse drives the fragment kernel.

use crate::camera::{Camera, ObjectTransform};
use crate::common::{EIGEN_EPSILON, FOOTPRINT_SIGMA};
use glam::{Mat3, Mat4, Quat, Vec2, Vec3};

/// Off-screen splats have their Jacobian evaluated at most this far outside the frustum.
const FRUSTUM_CLAMP: f32 = 1.3;

/// Inverse of a symmetric 2x2 covariance, stored as `(xx, xy, yy)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conic {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl Conic {
    /// Squared Mahalanobis distance `vᵗ·Σ⁻¹·v`.
    #[inline]
    pub fn mahalanobis(&self, v: Vec2) -> f32 {
        self.a * v.x * v.x + 2.0 * self.b * v.x * v.y + self.c * v.y * v.y
    }
}

/// Transient per-frame screen-space state of one visible splat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub center: Vec2,
    /// Half side of the covered pixel square.
    pub radius: f32,
    pub conic: Conic,
    /// Distance along the viewing axis.
    pub depth: f32,
    /// Pixel offsets are divided by this before evaluating the conic.
    pub kernel_scale: f32,
}

/// `R·S·Sᵗ·Rᵗ` for a unit quaternion `R` and per-axis scale `S`.
pub fn covariance_3d(scale: Vec3, rotation: Quat) -> Mat3 {
    let m = Mat3::from_quat(rotation) * Mat3::from_diagonal(scale);
    m * m.transpose()
}

/// Clamps a view-space slope to `[-limit, limit]`; a limit that is not a finite,
/// non-negative number leaves the slope untouched.
#[inline]
fn clamp_ratio(ratio: f32, limit: f32) -> f32 {
    if limit.is_finite() && limit >= 0.0 {
        ratio.clamp(-limit, limit)
    } else {
        ratio
    }
}

/// Camera and object placement baked for one frame.
#[derive(Debug, Clone, Copy)]
pub struct Projector {
    model_view: Mat4,
    linear: Mat3,
    fx: f32,
    fy: f32,
    cx: f32,
    cy: f32,
    tan_half_x: f32,
    tan_half_y: f32,
    near: f32,
    splat_scale: f32,
}

impl Projector {
    pub fn new(camera: &Camera, transform: &ObjectTransform, splat_scale: f32) -> Self {
        let model_view = camera.view * transform.matrix();
        let (fx, fy) = camera.focal();
        let (cx, cy) = camera.principal_point();
        let tan_half_y = (0.5 * camera.fov_y).tan();
        Self {
            model_view,
            linear: Mat3::from_mat4(model_view),
            fx,
            fy,
            cx,
            cy,
            tan_half_x: tan_half_y * camera.aspect(),
            tan_half_y,
            near: camera.near,
            splat_scale,
        }
    }

    pub fn focal(&self) -> (f32, f32) {
        (self.fx, self.fy)
    }

    /// Object space to camera space.
    #[inline]
    pub fn to_camera(&self, p: Vec3) -> Vec3 {
        self.model_view.transform_point3(p)
    }

    /// Pixel position and depth of an object-space point, `None` at or behind the near plane.
    #[inline]
    pub fn project_point(&self, p: Vec3) -> Option<(Vec2, f32)> {
        let t = self.to_camera(p);
        self.pixel(t)
    }

    #[inline]
    fn pixel(&self, t: Vec3) -> Option<(Vec2, f32)> {
        let depth = -t.z;
        if !(depth > self.near) {
            return None;
        }
        let u = self.cx + self.fx * t.x / depth;
        let v = self.cy - self.fy * t.y / depth;
        Some((Vec2::new(u, v), depth))
    }

    /// Screen-space covariance `(Σ00, Σ01, Σ11)` of an object-space covariance
    /// centered at camera-space point `t`.
    pub fn screen_covariance(&self, t: Vec3, cov: Mat3) -> (f32, f32, f32) {
        let depth = -t.z;
        let x = clamp_ratio(t.x / depth, FRUSTUM_CLAMP * self.tan_half_x) * depth;
        let y = clamp_ratio(t.y / depth, FRUSTUM_CLAMP * self.tan_half_y) * depth;

        let inv_z = 1.0 / depth;
        let inv_z2 = inv_z * inv_z;
        // Columns of the Jacobian of (u, v) with respect to camera-space (x, y, z).
        let jacobian = Mat3::from_cols(
            Vec3::new(self.fx * inv_z, 0.0, 0.0),
            Vec3::new(0.0, -self.fy * inv_z, 0.0),
            Vec3::new(self.fx * x * inv_z2, -self.fy * y * inv_z2, 0.0),
        );
        let t_mat = jacobian * self.linear;
        let sigma = t_mat * cov * t_mat.transpose();
        (sigma.x_axis.x, sigma.y_axis.x, sigma.y_axis.y)
    }

    /// Projects one Gaussian. Returns `None` when it is behind the camera or its
    /// screen-space covariance is not positive definite.
    pub fn project_splat(&self, position: Vec3, scale: Vec3, rotation: Quat) -> Option<Footprint> {
        let t = self.to_camera(position);
        let (center, depth) = self.pixel(t)?;

        let cov = covariance_3d(scale, rotation);
        let (a, b, c) = self.screen_covariance(t, cov);

        let det = a * c - b * b;
        if !(det > 0.0) {
            return None;
        }

        let mid = 0.5 * (a + c);
        let spread = (mid * mid - det).max(EIGEN_EPSILON).sqrt();
        let lambda = (mid + spread).max(mid - spread);
        let radius = FOOTPRINT_SIGMA * lambda.sqrt() * self.splat_scale;

        let inv_det = 1.0 / det;
        Some(Footprint {
            center,
            radius,
            conic: Conic {
                a: c * inv_det,
                b: -b * inv_det,
                c: a * inv_det,
            },
            depth,
            kernel_scale: self.splat_scale,
        })
    }
}
