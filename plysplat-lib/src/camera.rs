use glam::{Mat3, Mat4, Quat, Vec3};

pub const DEFAULT_NEAR: f32 = 0.01;

/// Placement of the point set in the world: uniform scale, then rotation, then translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Default for ObjectTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

impl ObjectTransform {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), self.rotation, self.translation)
    }

    pub fn apply(&self, p: Vec3) -> Vec3 {
        self.translation + self.rotation * (p * self.scale)
    }
}

/// A pinhole camera looking down its local -Z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World to camera transform.
    pub view: Mat4,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub width: u32,
    pub height: u32,
    pub near: f32,
}

impl Camera {
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, fov_y: f32, width: u32, height: u32) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, up),
            fov_y,
            width,
            height,
            near: DEFAULT_NEAR,
        }
    }

    /// Orbit camera aimed at a sphere so that it fills the vertical field of view.
    /// `yaw` and `pitch` are in radians; `distance_scale` pushes the camera further out.
    #[allow(clippy::too_many_arguments)]
    pub fn framing(
        center: Vec3,
        radius: f32,
        yaw: f32,
        pitch: f32,
        distance_scale: f32,
        fov_y: f32,
        width: u32,
        height: u32,
    ) -> Self {
        let radius = radius.max(1e-3);
        let distance = radius / (0.5 * fov_y).sin() * distance_scale;
        let pitch = pitch.clamp(-1.55, 1.55);
        let dir = Vec3::new(pitch.cos() * yaw.sin(), pitch.sin(), pitch.cos() * yaw.cos());
        let mut camera = Self::look_at(center + dir * distance, center, Vec3::Y, fov_y, width, height);
        camera.near = (distance * 1e-4).max(f32::EPSILON);
        camera
    }

    /// Same camera on a differently sized viewport.
    pub fn resized(self, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..self
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Focal lengths in pixels, derived from the vertical field of view and the viewport.
    pub fn focal(&self) -> (f32, f32) {
        let tan_half_y = (0.5 * self.fov_y).tan();
        let tan_half_x = tan_half_y * self.aspect();
        let fx = self.width as f32 / (2.0 * tan_half_x);
        let fy = self.height as f32 / (2.0 * tan_half_y);
        (fx, fy)
    }

    pub fn principal_point(&self) -> (f32, f32) {
        (0.5 * self.width as f32, 0.5 * self.height as f32)
    }

    /// Rotational part of the view transform.
    pub fn rotation(&self) -> Mat3 {
        Mat3::from_mat4(self.view)
    }
}
