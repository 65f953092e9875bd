use std::io::Cursor;

use grabber_core::ExportFormat;
use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, GenericImageView, ImageResult, RgbaImage};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("{format} encode failed: {message}")]
    Encode { format: String, message: String },
    #[error("{0} conversion failed.")]
    EmptyOutput(String),
}

/// Re-encodes a fetched payload. `quality_percent` only matters for lossy targets.
pub trait ImageConverter: Send + Sync {
    fn convert(
        &self,
        payload: &[u8],
        format: ExportFormat,
        quality_percent: u8,
    ) -> Result<Vec<u8>, ConversionError>;
}

/// Decodes with the `image` crate and re-encodes to the requested format.
///
/// WebP output is lossless, so `quality_percent` only affects JPEG; it is
/// ignored for PNG, WebP and BMP.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterConverter;

impl ImageConverter for RasterConverter {
    fn convert(
        &self,
        payload: &[u8],
        format: ExportFormat,
        quality_percent: u8,
    ) -> Result<Vec<u8>, ConversionError> {
        let encode: EncodeFn = match format {
            ExportFormat::Original => return Ok(payload.to_vec()),
            ExportFormat::Jpeg => encode_jpeg,
            ExportFormat::Png => encode_png,
            ExportFormat::Webp => encode_webp,
            ExportFormat::Bmp => encode_bmp,
        };

        let decoded = image::load_from_memory(payload)
            .map_err(|err| ConversionError::Decode(err.to_string()))?;
        let surface = redraw(&decoded);
        drop(decoded);

        let mut out = Cursor::new(Vec::new());
        encode(&surface, &mut out, quality_percent.clamp(1, 100)).map_err(|err| {
            ConversionError::Encode {
                format: format_label(format),
                message: err.to_string(),
            }
        })?;

        let bytes = out.into_inner();
        if bytes.is_empty() {
            return Err(ConversionError::EmptyOutput(format_label(format)));
        }
        Ok(bytes)
    }
}

type EncodeFn = fn(&RgbaImage, &mut Cursor<Vec<u8>>, u8) -> ImageResult<()>;

fn encode_jpeg(surface: &RgbaImage, out: &mut Cursor<Vec<u8>>, quality: u8) -> ImageResult<()> {
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgba8(surface.clone()).to_rgb8();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(out, quality))
}

fn encode_png(surface: &RgbaImage, out: &mut Cursor<Vec<u8>>, _quality: u8) -> ImageResult<()> {
    surface.write_with_encoder(PngEncoder::new(out))
}

fn encode_webp(surface: &RgbaImage, out: &mut Cursor<Vec<u8>>, _quality: u8) -> ImageResult<()> {
    surface.write_with_encoder(WebPEncoder::new_lossless(out))
}

fn encode_bmp(surface: &RgbaImage, out: &mut Cursor<Vec<u8>>, _quality: u8) -> ImageResult<()> {
    surface.write_with_encoder(BmpEncoder::new(out))
}

/// Copies the decoded pixels unscaled onto a fresh RGBA surface of equal size.
fn redraw(decoded: &DynamicImage) -> RgbaImage {
    let (width, height) = decoded.dimensions();
    let mut surface = RgbaImage::new(width, height);
    image::imageops::replace(&mut surface, &decoded.to_rgba8(), 0, 0);
    surface
}

fn format_label(format: ExportFormat) -> String {
    format!("{format:?}").to_ascii_uppercase()
}
