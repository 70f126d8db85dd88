//! PNG encode/decode for rendered frames.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::ImageEncoder as _;

use crate::scene::DocumentImage;

/// Errors produced by the image codec.
#[derive(Debug)]
pub enum CodecError {
    /// Pixel buffer length does not match `width * height * channels`.
    SizeMismatch { expected: usize, actual: usize },
    /// Channel count other than 1 to 4.
    UnsupportedChannels(u32),
    /// The encoder rejected the image.
    Encode(String),
    /// The decoder rejected the bytes.
    Decode(String),
    /// Failed to write the output file.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SizeMismatch { expected, actual } => {
                write!(f, "pixel buffer holds {actual} bytes, expected {expected}")
            }
            Self::UnsupportedChannels(n) => write!(f, "unsupported channel count: {n}"),
            Self::Encode(msg) => write!(f, "PNG encode failed: {msg}"),
            Self::Decode(msg) => write!(f, "PNG decode failed: {msg}"),
            Self::Io { path, source } => write!(f, "failed to write {}: {source}", path.display()),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn color_type(channels: u32) -> Result<image::ExtendedColorType, CodecError> {
    match channels {
        1 => Ok(image::ExtendedColorType::L8),
        2 => Ok(image::ExtendedColorType::La8),
        3 => Ok(image::ExtendedColorType::Rgb8),
        4 => Ok(image::ExtendedColorType::Rgba8),
        n => Err(CodecError::UnsupportedChannels(n)),
    }
}

/// Encode tightly packed 8-bit pixels as PNG.
pub fn encode_png(
    width: u32,
    height: u32,
    channels: u32,
    pixels: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let color = color_type(channels)?;
    let expected = width as usize * height as usize * channels as usize;
    if pixels.len() != expected {
        return Err(CodecError::SizeMismatch {
            expected,
            actual: pixels.len(),
        });
    }

    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(pixels, width, height, color)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(out)
}

/// Encode pixels as PNG and write them to `path`, creating parent
/// directories as needed.
pub fn write_png(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    channels: u32,
    pixels: &[u8],
) -> Result<(), CodecError> {
    let path = path.as_ref();
    let bytes = encode_png(width, height, channels, pixels)?;
    let io_err = |source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, bytes).map_err(io_err)?;
    log::debug!("Wrote {}x{} PNG to {}", width, height, path.display());
    Ok(())
}

/// Decode PNG bytes, keeping the stored channel count for 8-bit images.
pub fn decode_png(bytes: &[u8]) -> Result<DocumentImage, CodecError> {
    let img = image::ImageReader::with_format(Cursor::new(bytes), image::ImageFormat::Png)
        .decode()
        .map_err(|e| CodecError::Decode(e.to_string()))?;

    let (width, height) = (img.width(), img.height());
    let (components, pixels) = match img.color() {
        image::ColorType::L8
        | image::ColorType::La8
        | image::ColorType::Rgb8
        | image::ColorType::Rgba8 => (u32::from(img.color().channel_count()), img.into_bytes()),
        _ => (4, img.to_rgba8().into_raw()),
    };

    Ok(DocumentImage {
        name: None,
        width,
        height,
        components,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_rgba() {
        let pixels: Vec<u8> = (0..6 * 4 * 4).map(|i| (i * 7 % 256) as u8).collect();
        let png = encode_png(6, 4, 4, &pixels).unwrap();
        let decoded = decode_png(&png).unwrap();
        assert_eq!((decoded.width, decoded.height, decoded.components), (6, 4, 4));
        assert_eq!(decoded.pixels, pixels);
    }

    #[test]
    fn test_encode_rejects_short_buffer() {
        let err = encode_png(2, 2, 4, &[0; 15]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::SizeMismatch {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn test_encode_rejects_channel_count() {
        assert!(matches!(
            encode_png(1, 1, 5, &[0; 5]),
            Err(CodecError::UnsupportedChannels(5))
        ));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode_png(b"not a png"), Err(CodecError::Decode(_))));
    }
}
