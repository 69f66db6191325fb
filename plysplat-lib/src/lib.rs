pub mod camera;
pub mod color;
pub mod common;
pub mod decode;
pub mod error;
pub mod header;
pub mod projection;
pub mod raster;
pub mod render;
pub mod scene;
pub mod scheme;
pub mod structures;

pub use camera::{Camera, ObjectTransform};
pub use color::{viridis, RenderMode, ResolvedMode};
pub use error::{Result, SplatError};
pub use raster::Framebuffer;
pub use render::{render, CropBox, RenderParams, RenderState};
pub use scene::Scene;
pub use structures::{BoundingBox, Dataset, ParseOptions, SplatAttributes, UnknownTypePolicy};

use common::is_zstd_frame;
use decode::decode_points;
use header::parse_header;
use log::{debug, info};
use scheme::PropertyScheme;
use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;
use zstd::stream::decode_all;

#[inline(never)]
fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    decode_all(Cursor::new(data))
        .map_err(|e| SplatError::Decompress(format!("Decompression failed: {}", e)))
}

/// Returns the PLY bytes, inflating them first when `raw_data` is a zstd frame.
pub fn decompress_if_needed(raw_data: &[u8]) -> Result<Cow<'_, [u8]>> {
    if is_zstd_frame(raw_data) {
        let inflated = decompress_zstd(raw_data)?;
        debug!(
            "Inflated zstd input from {} to {} bytes",
            raw_data.len(),
            inflated.len()
        );
        Ok(Cow::Owned(inflated))
    } else {
        Ok(Cow::Borrowed(raw_data))
    }
}

/// Header, scheme and point decoding over uncompressed PLY bytes.
pub(crate) fn decode_ply(
    ply: &[u8],
    options: &ParseOptions,
    progress: &mut dyn FnMut(f32),
) -> Result<Dataset> {
    let header = parse_header(ply, options)?;
    let scheme = PropertyScheme::from_header(&header)?;
    decode_points(ply, &header, &scheme, options.progress_steps, progress)
}

/// Decodes a binary little-endian PLY (optionally zstd-compressed) with default options.
pub fn parse_splat(raw_data: &[u8]) -> Result<Dataset> {
    parse_splat_with(raw_data, &ParseOptions::default(), |_| {})
}

/// Like [`parse_splat`], reporting decode progress as a fraction in [0, 1].
pub fn parse_splat_with(
    raw_data: &[u8],
    options: &ParseOptions,
    mut progress: impl FnMut(f32),
) -> Result<Dataset> {
    let ply = decompress_if_needed(raw_data)?;
    decode_ply(&ply, options, &mut progress)
}

/// Reads and decodes a file synchronously.
pub fn load_file(path: impl AsRef<Path>, options: &ParseOptions) -> Result<Dataset> {
    let path = path.as_ref();
    let start = Instant::now();
    let raw_data = std::fs::read(path)?;
    let dataset = parse_splat_with(&raw_data, options, |_| {})?;
    info!(
        "Loaded {} points from '{}' in {} ms",
        dataset.point_count(),
        path.display(),
        start.elapsed().as_millis()
    );
    Ok(dataset)
}

cfg_if::cfg_if! {
if #[cfg(feature = "async")] {
    pub mod loader;
    pub use loader::{spawn_load, LoadEvent, LoadHandle, LoadStage, Loader};
}
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    struct Splat {
        position: [f32; 3],
        dc: [f32; 3],
        opacity: f32,
        log_scale: [f32; 3],
        // File order: w, x, y, z.
        rot: [f32; 4],
    }

    fn splat_ply(splats: &[Splat]) -> Vec<u8> {
        let mut raw = format!(
            "ply\nformat binary_little_endian 1.0\ncomment synthetic\nelement vertex {}\n",
            splats.len()
        );
        for name in [
            "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "opacity", "scale_0", "scale_1",
            "scale_2", "rot_0", "rot_1", "rot_2", "rot_3",
        ] {
            raw.push_str(&format!("property float {}\n", name));
        }
        raw.push_str("end_header\n");
        let mut raw = raw.into_bytes();
        for s in splats {
            let values = s
                .position
                .iter()
                .chain(&s.dc)
                .chain(std::iter::once(&s.opacity))
                .chain(&s.log_scale)
                .chain(&s.rot);
            for v in values {
                raw.extend_from_slice(&v.to_le_bytes());
            }
        }
        raw
    }

    fn unit_splat(y: f32) -> Splat {
        Splat {
            position: [0.0, y, 0.0],
            dc: [0.0; 3],
            opacity: 0.0,
            log_scale: [0.0; 3],
            rot: [1.0, 0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn parses_splat_file() {
        let dataset = parse_splat(&splat_ply(&[unit_splat(-1.0), unit_splat(1.0)]))
            .expect("parse_splat failed");
        assert_eq!(dataset.point_count(), 2);
        assert_eq!(dataset.elevations(), &[0.0, 1.0]);
        assert_eq!(dataset.color(0), [0.5, 0.5, 0.5]);
        assert_eq!(dataset.opacity(1), 0.5);
        let splats = dataset.splats().expect("splat attributes");
        assert_eq!(splats.scale(0), [1.0, 1.0, 1.0]);
        assert_eq!(splats.rotation(1), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(dataset.bounding_box().min, [0.0, -1.0, 0.0]);
    }

    #[test]
    fn zstd_input_is_detected() {
        let raw = splat_ply(&[unit_splat(2.0), unit_splat(4.0), unit_splat(6.0)]);
        let compressed = zstd::stream::encode_all(Cursor::new(&raw), 3).expect("encode_all failed");
        assert!(is_zstd_frame(&compressed));

        let plain = parse_splat(&raw).unwrap();
        let inflated = parse_splat(&compressed).unwrap();
        assert_eq!(plain.positions(), inflated.positions());
        assert_eq!(inflated.elevations(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn corrupt_zstd_input_fails() {
        let mut raw = common::ZSTD_MAGIC.to_vec();
        raw.extend_from_slice(&[0xFF; 16]);
        assert!(matches!(parse_splat(&raw), Err(SplatError::Decompress(_))));
    }

    #[test]
    fn file_rotation_order_is_w_first() {
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let splat = Splat {
            log_scale: [2.0f32.ln(), 0.0, 0.0],
            rot: [half, 0.0, 0.0, half],
            ..unit_splat(0.0)
        };
        let dataset = parse_splat(&splat_ply(&[splat])).unwrap();
        let [x, y, z, w] = dataset.splats().unwrap().rotation(0);
        let cov = projection::covariance_3d(
            Vec3::from_array(dataset.splats().unwrap().scale(0)),
            Quat::from_xyzw(x, y, z, w),
        );
        // A quarter turn about z moves the long axis from x onto y.
        assert!((cov.y_axis.y - 4.0).abs() < 1e-4, "{:?}", cov);
        assert!((cov.x_axis.x - 1.0).abs() < 1e-4, "{:?}", cov);
    }

    #[test]
    fn progress_reaches_completion() {
        let raw = splat_ply(&(0..10).map(|i| unit_splat(i as f32)).collect::<Vec<_>>());
        let options = ParseOptions {
            progress_steps: 5,
            ..ParseOptions::default()
        };
        let mut seen = Vec::new();
        parse_splat_with(&raw, &options, |f| seen.push(f)).unwrap();
        assert_eq!(seen.last(), Some(&1.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
    }

    #[test]
    fn load_file_reports_missing_file() {
        let err = load_file("/nonexistent/plysplat/input.ply", &ParseOptions::default())
            .unwrap_err();
        assert!(matches!(err, SplatError::ReadFailure(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn render_decoded_splats() {
        let dataset = parse_splat(&splat_ply(&[Splat {
            dc: [10.0, -10.0, -10.0],
            opacity: 10.0,
            log_scale: [0.2f32.ln(); 3],
            ..unit_splat(0.0)
        }]))
        .unwrap();
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, 1.0, 32, 32);
        let params = RenderParams {
            mode: RenderMode::Splat,
            ..RenderParams::default()
        };
        let state = RenderState::new(&dataset, &params, &camera);
        let mut fb = Framebuffer::new(32, 32);
        render(&state, &mut fb);
        let rgba = fb.to_rgba8();
        let center = ((16 * 32 + 16) * 4) as usize;
        assert!(rgba[center] > 200, "{:?}", &rgba[center..center + 4]);
        assert!(rgba[center + 1] < 10);
        assert_eq!(&rgba[..4], &[0, 0, 0, 255]);
    }
}
