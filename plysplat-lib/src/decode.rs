use crate::common::{half_to_float, normalize_quat, sigmoid, ELEVATION_EPSILON};
use crate::error::{Result, SplatError};
use crate::header::{Header, PropertyType};
use crate::scheme::{ColorScheme, Field, PropertyScheme};
use crate::structures::{Dataset, SplatAttributes};
use log::{debug, warn};
use zerocopy::byteorder::little_endian::{F32, F64, I16, I32, U16, U32};
use zerocopy::FromBytes;

#[inline(always)]
fn read_le<T: FromBytes>(bytes: &[u8], offset: usize) -> Result<T> {
    T::read_from_bytes(bytes).map_err(|_| {
        SplatError::MalformedHeader(format!("Byte conversion error at record offset {}", offset))
    })
}

/// Reads one scalar of any supported type, widened to `f32`.
#[inline(always)]
fn read_scalar(record: &[u8], field: Field) -> Result<f32> {
    let bytes = record
        .get(field.offset..field.offset + field.ty.size())
        .ok_or_else(|| {
            SplatError::MalformedHeader(format!("Field at offset {} exceeds record", field.offset))
        })?;
    let value = match field.ty {
        PropertyType::Int8 => bytes[0] as i8 as f32,
        PropertyType::UInt8 => bytes[0] as f32,
        PropertyType::Int16 => read_le::<I16>(bytes, field.offset)?.get() as f32,
        PropertyType::UInt16 => read_le::<U16>(bytes, field.offset)?.get() as f32,
        PropertyType::Int32 => read_le::<I32>(bytes, field.offset)?.get() as f32,
        PropertyType::UInt32 => read_le::<U32>(bytes, field.offset)?.get() as f32,
        PropertyType::Float16 => half_to_float(read_le::<U16>(bytes, field.offset)?.get()),
        PropertyType::Float32 | PropertyType::Unknown4Byte => {
            read_le::<F32>(bytes, field.offset)?.get()
        }
        PropertyType::Float64 => read_le::<F64>(bytes, field.offset)?.get() as f32,
    };
    Ok(value)
}

/// Maps a classic color channel into [0, 1] according to its storage type.
#[inline]
fn normalize_channel(value: f32, ty: PropertyType) -> f32 {
    match ty {
        PropertyType::UInt8 => value / 255.0,
        PropertyType::UInt16 => value / 65535.0,
        PropertyType::Int8 => value.max(0.0) / 127.0,
        PropertyType::Int16 => value.max(0.0) / 32767.0,
        PropertyType::Int32 => value.max(0.0) / i32::MAX as f32,
        PropertyType::UInt32 => value / u32::MAX as f32,
        _ => value.clamp(0.0, 1.0),
    }
}

/// Rewrites raw vertical coordinates in place as [0, 1] colormap inputs.
/// A flat range maps every point to 0.5.
pub fn normalize_elevations(elevations: &mut [f32], min_y: f32, max_y: f32) {
    let range = max_y - min_y;
    if range > ELEVATION_EPSILON {
        let inv = 1.0 / range;
        elevations.iter_mut().for_each(|e| *e = (*e - min_y) * inv);
    } else {
        elevations.iter_mut().for_each(|e| *e = 0.5);
    }
}

/// Emits `fraction` every `every` records.
struct ProgressTicker<'p> {
    every: usize,
    total: usize,
    sink: &'p mut dyn FnMut(f32),
}

impl ProgressTicker<'_> {
    #[inline]
    fn tick(&mut self, done: usize) {
        if self.every != 0 && done % self.every == 0 && done != self.total {
            (self.sink)(done as f32 / self.total as f32);
        }
    }

    fn finish(&mut self) {
        if self.every != 0 {
            (self.sink)(1.0);
        }
    }
}

#[inline(never)]
pub fn decode_points(
    raw_data: &[u8],
    header: &Header,
    scheme: &PropertyScheme,
    progress_steps: u32,
    progress: &mut dyn FnMut(f32),
) -> Result<Dataset> {
    let num_points = header.point_count as usize;
    let stride = header.stride;
    let expected_bytes = header
        .payload_len()
        .ok_or_else(|| SplatError::MalformedHeader("Overflow in byte calculation".to_string()))?;

    let available = raw_data.len().saturating_sub(header.payload_offset);
    if available < expected_bytes {
        return Err(SplatError::TruncatedPayload {
            needed: expected_bytes,
            available,
        });
    }
    let data = &raw_data[header.payload_offset..header.payload_offset + expected_bytes];

    let mut positions = Vec::with_capacity(num_points * 3);
    let mut colors = Vec::with_capacity(num_points * 3);
    let mut elevations = Vec::with_capacity(num_points);
    let mut opacities = scheme.opacity.map(|_| Vec::with_capacity(num_points));
    let mut scales = Vec::new();
    let mut rotations = Vec::new();
    if scheme.has_splat() {
        scales.reserve(num_points * 3);
        rotations.reserve(num_points * 4);
    }

    let mut min_y = f32::INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    let mut degenerate_quats = 0usize;

    let mut ticker = ProgressTicker {
        every: match progress_steps {
            0 => 0,
            steps => num_points.div_ceil(steps as usize).max(1),
        },
        total: num_points,
        sink: progress,
    };

    if stride == 0 {
        return Err(SplatError::MalformedHeader("Vertex stride is zero".to_string()));
    }

    for (i, record) in data.chunks_exact(stride).enumerate() {
        let [fx, fy, fz] = scheme.position;
        let x = read_scalar(record, fx)?;
        let y = read_scalar(record, fy)?;
        let z = read_scalar(record, fz)?;
        positions.extend_from_slice(&[x, y, z]);
        elevations.push(y);
        min_y = min_y.min(y);
        max_y = max_y.max(y);

        match scheme.color {
            ColorScheme::SphericalHarmonics(dc) => {
                for f in dc {
                    colors.push(sigmoid(read_scalar(record, f)?));
                }
            }
            ColorScheme::Classic(rgb) => {
                for f in rgb {
                    colors.push(normalize_channel(read_scalar(record, f)?, f.ty));
                }
            }
        }

        if let (Some(field), Some(out)) = (scheme.opacity, opacities.as_mut()) {
            out.push(sigmoid(read_scalar(record, field)?));
        }

        if let Some(splat) = scheme.splat {
            for f in splat.scale {
                scales.push(read_scalar(record, f)?.exp());
            }
            let [rw, rx, ry, rz] = splat.rotation;
            let q = (
                read_scalar(record, rx)?,
                read_scalar(record, ry)?,
                read_scalar(record, rz)?,
                read_scalar(record, rw)?,
            );
            let (x, y, z, w) = normalize_quat(q).unwrap_or_else(|| {
                degenerate_quats += 1;
                (0.0, 0.0, 0.0, 1.0)
            });
            rotations.extend_from_slice(&[x, y, z, w]);
        }

        ticker.tick(i + 1);
    }
    ticker.finish();

    if degenerate_quats > 0 {
        warn!(
            "{} splats had a near-zero rotation quaternion; using identity",
            degenerate_quats
        );
    }

    normalize_elevations(&mut elevations, min_y, max_y);

    let splats = scheme
        .splat
        .map(|_| SplatAttributes::new(scales, rotations));
    debug!(
        "decoded {} points (splat attributes: {}, per-point opacity: {})",
        num_points,
        splats.is_some(),
        opacities.is_some()
    );
    Ok(Dataset::from_parts(
        positions, colors, elevations, opacities, splats,
    ))
}
