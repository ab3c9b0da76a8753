use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use thiserror::Error;

/// Upper bound on source pixels, checked against the header before decoding.
pub const MAX_PIXELS: u64 = 200_000_000;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("unrecognized image format: {0}")]
    UnknownFormat(String),

    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("image resolution exceeds maximum ({width}x{height})")]
    ResolutionTooLarge { width: u32, height: u32 },

    #[error("image encode failed: {0}")]
    Encode(String),

    #[error("transcode task failed: {0}")]
    Task(String),
}

/// EXIF Orientation tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Orientation {
    Normal = 1,
    FlipHorizontal = 2,
    Rotate180 = 3,
    FlipVertical = 4,
    Transpose = 5,
    Rotate90 = 6,
    Transverse = 7,
    Rotate270 = 8,
}

impl Orientation {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Normal),
            2 => Some(Self::FlipHorizontal),
            3 => Some(Self::Rotate180),
            4 => Some(Self::FlipVertical),
            5 => Some(Self::Transpose),
            6 => Some(Self::Rotate90),
            7 => Some(Self::Transverse),
            8 => Some(Self::Rotate270),
            _ => None,
        }
    }
}

pub fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Normal => img,
        Orientation::FlipHorizontal => img.fliph(),
        Orientation::Rotate180 => img.rotate180(),
        Orientation::FlipVertical => img.flipv(),
        Orientation::Transpose => img.rotate90().fliph(),
        Orientation::Rotate90 => img.rotate90(),
        Orientation::Transverse => img.rotate270().fliph(),
        Orientation::Rotate270 => img.rotate270(),
    }
}

/// Reads the primary-image Orientation tag. Missing or unreadable EXIF
/// yields `None`.
pub fn read_orientation(data: &[u8]) -> Option<Orientation> {
    let mut cursor = Cursor::new(data);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;

    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let value = field.value.get_uint(0)?;

    Orientation::from_u16(u16::try_from(value).ok()?)
}

/// Rotates/flips an image so it displays upright without its EXIF
/// orientation tag.
///
/// The input is always fully decoded so corrupt data fails here. Images that
/// are already upright come back byte-for-byte unchanged; anything else is
/// re-encoded in its source format, which drops the EXIF block.
pub fn auto_orient(input: &[u8], jpeg_quality: u8) -> Result<Vec<u8>, TranscodeError> {
    let (img, format) = decode_with_format(input)?;

    let orientation = read_orientation(input).unwrap_or(Orientation::Normal);
    if orientation == Orientation::Normal {
        return Ok(input.to_vec());
    }

    let oriented = apply_orientation(img, orientation);
    encode_as(&oriented, format, jpeg_quality)
}

fn decode_with_format(input: &[u8]) -> Result<(DynamicImage, ImageFormat), TranscodeError> {
    let reader = ImageReader::new(Cursor::new(input))
        .with_guessed_format()
        .map_err(|e| TranscodeError::UnknownFormat(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| TranscodeError::UnknownFormat("no matching signature".to_string()))?;

    let (width, height) = ImageReader::with_format(Cursor::new(input), format)
        .into_dimensions()
        .map_err(|e| TranscodeError::Decode(e.to_string()))?;
    validate_source_dimensions(width, height)?;

    let img = reader
        .decode()
        .map_err(|e| TranscodeError::Decode(e.to_string()))?;

    Ok((img, format))
}

fn validate_source_dimensions(width: u32, height: u32) -> Result<(), TranscodeError> {
    let total_pixels = width as u64 * height as u64;
    if total_pixels > MAX_PIXELS {
        return Err(TranscodeError::ResolutionTooLarge { width, height });
    }
    Ok(())
}

fn encode_as(
    img: &DynamicImage,
    format: ImageFormat,
    jpeg_quality: u8,
) -> Result<Vec<u8>, TranscodeError> {
    let mut buf = Cursor::new(Vec::new());

    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality);
            img.to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|e| TranscodeError::Encode(format!("JPEG: {e}")))?;
        }
        other => {
            img.write_to(&mut buf, other)
                .map_err(|e| TranscodeError::Encode(format!("{other:?}: {e}")))?;
        }
    }

    Ok(buf.into_inner())
}
