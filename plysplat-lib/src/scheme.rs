use crate::error::{Result, SplatError};
use crate::header::{Header, PropertyType};
use foldhash::HashMap;
use foldhash::HashMapExt;

/// Location of one scalar inside a vertex record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub ty: PropertyType,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorScheme {
    /// `red`, `green`, `blue` integer channels.
    Classic([Field; 3]),
    /// `f_dc_0..2` spherical-harmonics DC coefficients.
    SphericalHarmonics([Field; 3]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplatFields {
    pub scale: [Field; 3],
    /// `rot_0..3` in file order (`w, x, y, z`).
    pub rotation: [Field; 4],
}

/// Which feature sets a header carries, resolved to record offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyScheme {
    pub position: [Field; 3],
    pub color: ColorScheme,
    pub opacity: Option<Field>,
    pub splat: Option<SplatFields>,
}

fn lookup<const N: usize>(
    fields: &HashMap<&str, Field>,
    names: [&str; N],
) -> Option<[Field; N]> {
    let mut out = [Field {
        ty: PropertyType::Float32,
        offset: 0,
    }; N];
    for (slot, name) in out.iter_mut().zip(names) {
        *slot = *fields.get(name)?;
    }
    Some(out)
}

impl PropertyScheme {
    pub fn from_header(header: &Header) -> Result<Self> {
        let mut fields: HashMap<&str, Field> = HashMap::with_capacity(header.properties.len());
        for p in &header.properties {
            // Unknown-width fields are never interpreted.
            if p.ty == PropertyType::Unknown4Byte {
                continue;
            }
            fields.insert(
                p.name.as_str(),
                Field {
                    ty: p.ty,
                    offset: p.byte_offset as usize,
                },
            );
        }

        let position = lookup(&fields, ["x", "y", "z"]).ok_or(SplatError::MissingPosition)?;

        let sh = lookup(&fields, ["f_dc_0", "f_dc_1", "f_dc_2"]);
        let classic = lookup(&fields, ["red", "green", "blue"]);
        let color = match (sh, classic) {
            (Some(sh), _) => ColorScheme::SphericalHarmonics(sh),
            (None, Some(rgb)) => ColorScheme::Classic(rgb),
            (None, None) => {
                return Err(SplatError::MissingColor {
                    found: header.property_names(),
                })
            }
        };

        let splat = match (
            lookup(&fields, ["scale_0", "scale_1", "scale_2"]),
            lookup(&fields, ["rot_0", "rot_1", "rot_2", "rot_3"]),
        ) {
            (Some(scale), Some(rotation)) => Some(SplatFields { scale, rotation }),
            _ => None,
        };

        Ok(Self {
            position,
            color,
            opacity: fields.get("opacity").copied(),
            splat,
        })
    }

    pub fn has_splat(&self) -> bool {
        self.splat.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::parse_header;
    use crate::structures::ParseOptions;

    fn header_for(props: &[&str]) -> Header {
        let mut text = String::from("ply\nformat binary_little_endian 1.0\nelement vertex 1\n");
        for p in props {
            text.push_str(p);
            text.push('\n');
        }
        text.push_str("end_header\n");
        parse_header(text.as_bytes(), &ParseOptions::default()).unwrap()
    }

    #[test]
    fn classic_color_without_splats() {
        let header = header_for(&[
            "property float x",
            "property float y",
            "property float z",
            "property uchar red",
            "property uchar green",
            "property uchar blue",
        ]);
        let scheme = PropertyScheme::from_header(&header).unwrap();
        assert!(matches!(scheme.color, ColorScheme::Classic(_)));
        assert!(!scheme.has_splat());
        assert!(scheme.opacity.is_none());
    }

    #[test]
    fn partial_splat_fields_are_ignored() {
        let header = header_for(&[
            "property float x",
            "property float y",
            "property float z",
            "property float f_dc_0",
            "property float f_dc_1",
            "property float f_dc_2",
            "property float scale_0",
            "property float scale_1",
            "property float scale_2",
            "property float rot_0",
            "property float rot_1",
        ]);
        let scheme = PropertyScheme::from_header(&header).unwrap();
        assert!(matches!(scheme.color, ColorScheme::SphericalHarmonics(_)));
        assert!(!scheme.has_splat());
    }

    #[test]
    fn missing_position() {
        let header = header_for(&[
            "property float x",
            "property float z",
            "property uchar red",
            "property uchar green",
            "property uchar blue",
        ]);
        assert!(matches!(
            PropertyScheme::from_header(&header),
            Err(SplatError::MissingPosition)
        ));
    }

    #[test]
    fn missing_color_enumerates_found() {
        let header = header_for(&[
            "property float x",
            "property float y",
            "property float z",
            "property uchar red",
            "property float intensity",
        ]);
        match PropertyScheme::from_header(&header) {
            Err(SplatError::MissingColor { found }) => {
                assert_eq!(found, vec!["x", "y", "z", "red", "intensity"]);
            }
            other => panic!("expected MissingColor, got {:?}", other),
        }
    }
}
