use half::f16;

/// Header bytes scanned for the `end_header` marker.
pub const HEADER_SCAN_WINDOW: usize = 10 * 1024;

/// Elevation ranges narrower than this are treated as flat.
pub const ELEVATION_EPSILON: f32 = 1e-6;

/// Footprint radius in standard deviations.
pub const FOOTPRINT_SIGMA: f32 = 3.0;

/// Squared Mahalanobis distance beyond which a splat fragment is dropped (2 sigma).
pub const MAHALANOBIS_CUTOFF: f32 = 4.0;

/// Lower bound on the eigenvalue discriminant.
pub const EIGEN_EPSILON: f32 = 0.1;

/// Quaternions with a smaller norm are replaced by the identity.
pub const QUAT_NORM_EPSILON: f32 = 1e-8;

/// First four bytes of a Zstandard frame.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[inline]
pub(crate) fn clamp_u8(x: f32) -> u8 {
    x.round().clamp(0.0, 255.0) as u8
}

#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
pub(crate) fn half_to_float(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// Normalizes a quaternion, returning `None` when its norm is too small to divide by.
#[inline]
pub(crate) fn normalize_quat(q: (f32, f32, f32, f32)) -> Option<(f32, f32, f32, f32)> {
    let norm = (q.0 * q.0 + q.1 * q.1 + q.2 * q.2 + q.3 * q.3).sqrt();
    if !(norm > QUAT_NORM_EPSILON) {
        return None;
    }
    Some((q.0 / norm, q.1 / norm, q.2 / norm, q.3 / norm))
}

#[inline]
pub(crate) fn is_zstd_frame(data: &[u8]) -> bool {
    data.starts_with(&ZSTD_MAGIC)
}
