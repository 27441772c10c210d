//! Shrinking inline (data url) media before it is written to the local store.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use church_core::ContentRecord;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::MediaLimits;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("inline media is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image could not be processed: {0}")]
    Image(#[from] image::ImageError),
}

/// A `data:<mime>;base64,<payload>` value split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUrl<'a> {
    pub mime: &'a str,
    pub payload: &'a str,
}

impl<'a> DataUrl<'a> {
    pub fn parse(value: &'a str) -> Option<Self> {
        let rest = value.strip_prefix("data:")?;
        let (meta, payload) = rest.split_once(',')?;
        let mime = meta.strip_suffix(";base64")?;
        Some(Self { mime, payload })
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// Compress every oversized inline image in `record` in place. Returns how
/// many fields were rewritten. Audio and video are only reported.
pub fn shrink_inline_media(record: &mut ContentRecord, limits: &MediaLimits) -> usize {
    let mut rewritten = 0;
    for (field, value) in record.fields.iter_mut() {
        let Value::String(text) = value else { continue };
        if text.len() <= limits.inline_threshold_bytes {
            continue;
        }
        let Some(data_url) = DataUrl::parse(text) else { continue };

        if !data_url.is_image() {
            warn!(
                record = %record.id,
                field = %field,
                mime = data_url.mime,
                bytes = text.len(),
                "large inline media stored uncompressed"
            );
            continue;
        }

        match compress_image(data_url.payload, limits) {
            Ok(compressed) if compressed.len() < text.len() => {
                debug!(
                    record = %record.id,
                    field = %field,
                    before = text.len(),
                    after = compressed.len(),
                    "compressed inline image"
                );
                *text = compressed;
                rewritten += 1;
            }
            Ok(_) => {}
            Err(err) => warn!(record = %record.id, field = %field, error = %err, "inline image left as is"),
        }
    }
    rewritten
}

/// Downsample to the bounding box, then lower JPEG quality step by step
/// until the output fits `target_bytes` or the floor is reached.
pub fn compress_image(payload: &str, limits: &MediaLimits) -> Result<String, MediaError> {
    let bytes = STANDARD.decode(payload.trim())?;
    let mut img = image::load_from_memory(&bytes)?;

    let max = limits.max_dimension.max(1);
    if img.width() > max || img.height() > max {
        img = img.resize(max, max, FilterType::Triangle);
    }
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let step = limits.quality_step.max(1);
    let floor = limits.min_quality.clamp(1, 100);
    let mut quality = limits.start_quality.clamp(floor, 100);
    let mut best = encode_jpeg(&rgb, quality)?;
    while best.len() > limits.target_bytes && quality > floor {
        quality = quality.saturating_sub(step).max(floor);
        let candidate = encode_jpeg(&rgb, quality)?;
        if candidate.len() < best.len() {
            best = candidate;
        }
    }

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(best)))
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, MediaError> {
    let mut out = Cursor::new(Vec::new());
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
    Ok(out.into_inner())
}
