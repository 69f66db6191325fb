use crate::error::{Result, SplatError};
use crate::structures::{ParseOptions, UnknownTypePolicy};
use log::debug;
use memchr::memmem;

const END_HEADER: &[u8] = b"end_header";
const VERTEX_ELEMENT: &str = "vertex";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float16,
    Float32,
    Float64,
    /// Unrecognized type name accepted under [`UnknownTypePolicy::AssumeFourBytes`].
    Unknown4Byte,
}

impl PropertyType {
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "char" | "int8" => PropertyType::Int8,
            "uchar" | "uint8" => PropertyType::UInt8,
            "short" | "int16" => PropertyType::Int16,
            "ushort" | "uint16" => PropertyType::UInt16,
            "int" | "int32" => PropertyType::Int32,
            "uint" | "uint32" => PropertyType::UInt32,
            "half" | "float16" => PropertyType::Float16,
            "float" | "float32" => PropertyType::Float32,
            "double" | "float64" => PropertyType::Float64,
            _ => return None,
        };
        Some(ty)
    }

    /// Width of one value in bytes.
    pub const fn size(self) -> usize {
        match self {
            PropertyType::Int8 | PropertyType::UInt8 => 1,
            PropertyType::Int16 | PropertyType::UInt16 | PropertyType::Float16 => 2,
            PropertyType::Int32
            | PropertyType::UInt32
            | PropertyType::Float32
            | PropertyType::Unknown4Byte => 4,
            PropertyType::Float64 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: PropertyType,
    pub byte_offset: u32,
}

/// Layout of the vertex records that follow the textual header.
#[derive(Debug, Clone)]
pub struct Header {
    pub point_count: u32,
    pub properties: Vec<PropertyDescriptor>,
    pub stride: usize,
    /// Absolute byte offset of the first vertex record.
    pub payload_offset: usize,
}

impl Header {
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.name.clone()).collect()
    }

    /// Number of payload bytes the vertex element occupies.
    pub fn payload_len(&self) -> Option<usize> {
        (self.point_count as usize).checked_mul(self.stride)
    }
}

struct Element {
    name: String,
    count: usize,
    stride: usize,
    has_list: bool,
}

#[inline]
fn next_line<'b>(buffer: &'b [u8], offset: &mut usize) -> Option<&'b [u8]> {
    if *offset >= buffer.len() {
        return None;
    }
    let start = *offset;

    let line = match memchr::memchr(b'\n', &buffer[*offset..]) {
        Some(pos) => {
            *offset = start + pos + 1;
            &buffer[start..start + pos]
        }
        None => {
            *offset = buffer.len();
            &buffer[start..]
        }
    };
    Some(line.strip_suffix(b"\r").unwrap_or(line))
}

/// Finds the `end_header` line inside the scan window and returns
/// `(marker_start, payload_offset)`.
fn locate_terminator(raw: &[u8], window: usize) -> Result<(usize, usize)> {
    let scanned = &raw[..raw.len().min(window)];
    let marker = memmem::find_iter(scanned, END_HEADER)
        .find(|&pos| {
            let line_start = pos == 0 || scanned[pos - 1] == b'\n';
            let line_end = matches!(raw.get(pos + END_HEADER.len()), None | Some(b'\r' | b'\n'));
            line_start && line_end
        })
        .ok_or(SplatError::HeaderTooLargeOrMissing)?;

    let mut payload = marker + END_HEADER.len();
    if raw.get(payload) == Some(&b'\r') {
        payload += 1;
    }
    if raw.get(payload) == Some(&b'\n') {
        payload += 1;
    }
    Ok((marker, payload))
}

fn resolve_type(name: &str, policy: UnknownTypePolicy) -> Result<PropertyType> {
    match (PropertyType::from_name(name), policy) {
        (Some(ty), _) => Ok(ty),
        (None, UnknownTypePolicy::AssumeFourBytes) => Ok(PropertyType::Unknown4Byte),
        (None, UnknownTypePolicy::Reject) => Err(SplatError::UnknownPropertyType(name.to_string())),
    }
}

#[inline(never)]
pub fn parse_header(raw: &[u8], options: &ParseOptions) -> Result<Header> {
    let (marker, payload_start) = locate_terminator(raw, options.scan_window)?;
    let text = &raw[..marker];
    let mut offset = 0;

    let magic = next_line(text, &mut offset)
        .ok_or_else(|| SplatError::MalformedHeader("No 'ply' line".to_string()))?;
    if magic != b"ply" {
        return Err(SplatError::MalformedHeader(
            "Not a .ply file (missing 'ply' header)".to_string(),
        ));
    }

    let mut encoding: Option<String> = None;
    let mut elements: Vec<Element> = Vec::new();
    let mut vertex_properties: Vec<PropertyDescriptor> = Vec::new();

    while let Some(raw_line) = next_line(text, &mut offset) {
        let line = std::str::from_utf8(raw_line)
            .map_err(|e| SplatError::MalformedHeader(format!("UTF-8 error: {}", e)))?;
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();

        match tokens.as_slice() {
            [] => continue,
            ["comment", ..] | ["obj_info", ..] => continue,
            ["format", format, ..] => {
                if *format != "binary_little_endian" {
                    return Err(SplatError::UnsupportedEncoding(format.to_string()));
                }
                encoding = Some(format.to_string());
            }
            ["element", name, count] => {
                let count = count.parse::<u32>().map_err(|e| {
                    SplatError::MalformedHeader(format!("Bad count for element '{}': {}", name, e))
                })?;
                elements.push(Element {
                    name: name.to_string(),
                    count: count as usize,
                    stride: 0,
                    has_list: false,
                });
            }
            ["property", "list", ..] => {
                let element = elements.last_mut().ok_or_else(|| {
                    SplatError::MalformedHeader("Property declared before any element".to_string())
                })?;
                if element.name == VERTEX_ELEMENT {
                    return Err(SplatError::MalformedHeader(
                        "List properties are not supported in the vertex element".to_string(),
                    ));
                }
                element.has_list = true;
            }
            ["property", ty, name] => {
                let element = elements.last_mut().ok_or_else(|| {
                    SplatError::MalformedHeader("Property declared before any element".to_string())
                })?;
                let ty = resolve_type(ty, options.unknown_types)?;
                if element.name == VERTEX_ELEMENT {
                    vertex_properties.push(PropertyDescriptor {
                        name: name.to_string(),
                        ty,
                        byte_offset: element.stride as u32,
                    });
                }
                element.stride += ty.size();
            }
            _ => {
                return Err(SplatError::MalformedHeader(format!(
                    "Unsupported header line: {:?}",
                    line
                )));
            }
        }
    }

    if encoding.is_none() {
        return Err(SplatError::UnsupportedEncoding("<missing>".to_string()));
    }

    let vertex_idx = elements
        .iter()
        .position(|e| e.name == VERTEX_ELEMENT)
        .ok_or(SplatError::NoVertices)?;
    let vertex = &elements[vertex_idx];
    if vertex.count == 0 {
        return Err(SplatError::NoVertices);
    }

    // Fixed-size elements stored ahead of the vertices are skipped wholesale.
    let mut skip = 0usize;
    for element in &elements[..vertex_idx] {
        if element.has_list {
            return Err(SplatError::MalformedHeader(format!(
                "Cannot skip variable-size element '{}' before vertex data",
                element.name
            )));
        }
        skip = element
            .count
            .checked_mul(element.stride)
            .and_then(|n| n.checked_add(skip))
            .ok_or_else(|| SplatError::MalformedHeader("Overflow in element size".to_string()))?;
    }

    let header = Header {
        point_count: vertex.count as u32,
        stride: vertex.stride,
        properties: vertex_properties,
        payload_offset: payload_start + skip,
    };
    debug!(
        "ply header: {} vertices, {} properties, stride {} bytes, payload at {}",
        header.point_count,
        header.properties.len(),
        header.stride,
        header.payload_offset
    );
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(lines: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        for line in lines {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
        out
    }

    #[test]
    fn computes_offsets_and_stride() {
        let raw = header_bytes(&[
            "ply",
            "format binary_little_endian 1.0",
            "comment exported by a scanner",
            "element vertex 3",
            "property float x",
            "property float y",
            "property float z",
            "property uchar red",
            "property uchar green",
            "property uchar blue",
            "property double time",
            "end_header",
        ]);
        let header = parse_header(&raw, &ParseOptions::default()).unwrap();
        assert_eq!(header.point_count, 3);
        assert_eq!(header.stride, 23);
        assert_eq!(header.payload_offset, raw.len());
        let offsets: Vec<u32> = header.properties.iter().map(|p| p.byte_offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 12, 13, 14, 15]);
        assert_eq!(header.property("time").unwrap().ty, PropertyType::Float64);
        assert_eq!(header.property("red").unwrap().ty, PropertyType::UInt8);
    }

    #[test]
    fn missing_terminator_fails() {
        let raw = header_bytes(&[
            "ply",
            "format binary_little_endian 1.0",
            "element vertex 1",
            "property float x",
        ]);
        assert!(matches!(
            parse_header(&raw, &ParseOptions::default()),
            Err(SplatError::HeaderTooLargeOrMissing)
        ));
    }

    #[test]
    fn terminator_must_be_whole_line() {
        let mut raw = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\n\
property float x\nproperty float y\nproperty float z\nend_headerX\n"
            .to_vec();
        raw.extend_from_slice(&[0u8; 12]);
        assert!(matches!(
            parse_header(&raw, &ParseOptions::default()),
            Err(SplatError::HeaderTooLargeOrMissing)
        ));

        // A bare marker at the very end of the buffer still terminates the header.
        let bare = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty float x\nend_header";
        let header = parse_header(bare, &ParseOptions::default()).unwrap();
        assert_eq!(header.payload_offset, bare.len());
    }

    #[test]
    fn terminator_outside_window_fails() {
        let mut lines = vec!["ply", "format binary_little_endian 1.0", "element vertex 1"];
        let filler = format!("comment {}", "z".repeat(200));
        for _ in 0..60 {
            lines.push(&filler);
        }
        lines.push("property float x");
        lines.push("end_header");
        let raw = header_bytes(&lines);
        assert!(raw.len() > crate::common::HEADER_SCAN_WINDOW);
        assert!(matches!(
            parse_header(&raw, &ParseOptions::default()),
            Err(SplatError::HeaderTooLargeOrMissing)
        ));
    }

    #[test]
    fn rejects_ascii_encoding() {
        let raw = header_bytes(&[
            "ply",
            "format ascii 1.0",
            "element vertex 1",
            "property float x",
            "end_header",
        ]);
        match parse_header(&raw, &ParseOptions::default()) {
            Err(SplatError::UnsupportedEncoding(e)) => assert_eq!(e, "ascii"),
            other => panic!("unexpected result: {:?}", other.map(|h| h.stride)),
        }
    }

    #[test]
    fn zero_vertices_fails() {
        let raw = header_bytes(&[
            "ply",
            "format binary_little_endian 1.0",
            "element vertex 0",
            "property float x",
            "end_header",
        ]);
        assert!(matches!(
            parse_header(&raw, &ParseOptions::default()),
            Err(SplatError::NoVertices)
        ));
    }

    #[test]
    fn unknown_type_policy() {
        let raw = header_bytes(&[
            "ply",
            "format binary_little_endian 1.0",
            "element vertex 1",
            "property float x",
            "property quux label",
            "property float y",
            "end_header",
        ]);
        assert!(matches!(
            parse_header(&raw, &ParseOptions::default()),
            Err(SplatError::UnknownPropertyType(ref t)) if t == "quux"
        ));

        let lenient = ParseOptions {
            unknown_types: UnknownTypePolicy::AssumeFourBytes,
            ..ParseOptions::default()
        };
        let header = parse_header(&raw, &lenient).unwrap();
        assert_eq!(header.stride, 12);
        assert_eq!(header.property("label").unwrap().ty, PropertyType::Unknown4Byte);
        assert_eq!(header.property("y").unwrap().byte_offset, 8);
    }

    #[test]
    fn accepts_crlf_line_endings() {
        let raw = b"ply\r\nformat binary_little_endian 1.0\r\nelement vertex 2\r\nproperty float x\r\nend_header\r\n";
        let header = parse_header(raw, &ParseOptions::default()).unwrap();
        assert_eq!(header.point_count, 2);
        assert_eq!(header.stride, 4);
        assert_eq!(header.payload_offset, raw.len());
    }

    #[test]
    fn skips_fixed_size_elements_before_vertices() {
        let raw = header_bytes(&[
            "ply",
            "format binary_little_endian 1.0",
            "element camera 2",
            "property float fov",
            "property ushort id",
            "element vertex 1",
            "property float x",
            "element face 5",
            "property list uchar int vertex_indices",
            "end_header",
        ]);
        let header = parse_header(&raw, &ParseOptions::default()).unwrap();
        assert_eq!(header.payload_offset, raw.len() + 2 * 6);
        assert_eq!(header.property_names(), vec!["x".to_string()]);
    }

    #[test]
    fn rejects_missing_magic() {
        let raw = header_bytes(&["format binary_little_endian 1.0", "element vertex 1", "end_header"]);
        assert!(matches!(
            parse_header(&raw, &ParseOptions::default()),
            Err(SplatError::MalformedHeader(_))
        ));
    }
}
