use crate::error::{DedupError, ItemError, Result};
use chrono::{DateTime, Utc};
use exif::{In, Reader, Tag, Value};
use image::{ImageDecoder, ImageReader};
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;

/// Capture details read from EXIF, when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExifData {
    pub taken_at: Option<DateTime<Utc>>,
    pub camera: Option<String>,
    pub lens: Option<String>,
    pub iso: Option<u32>,
    pub aperture: Option<f32>,
    pub shutter_speed: Option<String>,
    pub orientation: Option<u32>,
}

impl ExifData {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub identifier: String,
    /// Last path component of the identifier, when it looks like a path.
    pub file_name: Option<String>,
    pub size_bytes: u64,
    pub format: String,
    /// Decoder color layout, e.g. `Rgb8` or `La16`.
    pub color_type: String,
    pub width: u32,
    pub height: u32,
    pub exif: Option<ExifData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataReport {
    pub total: usize,
    pub results: Vec<ImageMetadata>,
    pub errors: Vec<ItemError>,
}

/// Reads format, dimensions and EXIF fields without decoding pixels.
pub struct MetadataService;

impl MetadataService {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, identifier: &str, bytes: &[u8]) -> Result<ImageMetadata> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| DedupError::Decode(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| DedupError::Decode("unrecognized image data".to_string()))?;
        let decoder = reader.into_decoder()?;
        let (width, height) = decoder.dimensions();

        Ok(ImageMetadata {
            identifier: identifier.to_string(),
            file_name: Path::new(identifier)
                .file_name()
                .map(|name| name.to_string_lossy().to_string()),
            size_bytes: bytes.len() as u64,
            format: format!("{:?}", format).to_uppercase(),
            color_type: format!("{:?}", decoder.color_type()),
            width,
            height,
            exif: self.extract_exif(bytes),
        })
    }

    /// Missing or unparsable EXIF is not an error; it yields `None`.
    pub fn extract_exif(&self, bytes: &[u8]) -> Option<ExifData> {
        let exif = Reader::new()
            .read_from_container(&mut Cursor::new(bytes))
            .ok()?;

        let field = |tag: Tag| exif.get_field(tag, In::PRIMARY).map(|f| &f.value);
        let mut data = ExifData::default();

        data.taken_at = field(Tag::DateTimeOriginal)
            .or_else(|| field(Tag::DateTime))
            .and_then(field_to_string)
            .and_then(|s| parse_exif_datetime(&s));

        let camera: Vec<String> = [Tag::Make, Tag::Model]
            .into_iter()
            .filter_map(|tag| field(tag).and_then(field_to_string))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !camera.is_empty() {
            data.camera = Some(camera.join(" "));
        }

        data.lens = field(Tag::LensModel)
            .or_else(|| field(Tag::LensMake))
            .and_then(field_to_string);
        data.iso = field(Tag::PhotographicSensitivity)
            .or_else(|| field(Tag::ISOSpeed))
            .and_then(field_to_u32);
        data.aperture = field(Tag::FNumber).and_then(field_to_f32);
        data.shutter_speed = field(Tag::ExposureTime)
            .map(|v| v.display_as(Tag::ExposureTime).to_string());
        data.orientation = field(Tag::Orientation).and_then(field_to_u32);

        if data.is_empty() { None } else { Some(data) }
    }
}

impl Default for MetadataService {
    fn default() -> Self {
        Self::new()
    }
}

fn field_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(vec) => vec
            .first()
            .map(|ascii| String::from_utf8_lossy(ascii).trim_end_matches('\0').to_string()),
        Value::Undefined(data, _) => {
            Some(String::from_utf8_lossy(data).trim_end_matches('\0').to_string())
        }
        _ => None,
    }
}

fn field_to_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Short(vec) => vec.first().map(|&v| v as u32),
        Value::Long(vec) => vec.first().copied(),
        Value::Ascii(_) => field_to_string(value)?.trim().parse().ok(),
        _ => None,
    }
}

fn field_to_f32(value: &Value) -> Option<f32> {
    match value {
        Value::Rational(vec) => vec
            .first()
            .filter(|r| r.denom != 0)
            .map(|r| r.num as f32 / r.denom as f32),
        Value::SRational(vec) => vec
            .first()
            .filter(|r| r.denom != 0)
            .map(|r| r.num as f32 / r.denom as f32),
        _ => None,
    }
}

/// EXIF datetimes look like "YYYY:MM:DD HH:MM:SS" and carry no zone; read them as UTC.
fn parse_exif_datetime(datetime_str: &str) -> Option<DateTime<Utc>> {
    match chrono::NaiveDateTime::parse_from_str(datetime_str.trim(), "%Y:%m:%d %H:%M:%S") {
        Ok(dt) => Some(dt.and_utc()),
        Err(_) => {
            log::warn!("Failed to parse EXIF datetime: {}", datetime_str);
            None
        }
    }
}
