//! Recognition invoker
//!
//! Drives one image through decode → alpha flattening → JPEG re-encode →
//! base64 → recognition call → response validation → field normalization.
//!
//! Every stage returns `Result<_, RecognitionFailure>`; [`RecognitionInvoker::recognize`]
//! folds any failure into a failed [`ExpenseRecord`], so it always returns a record.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

use crate::models::{ExpenseRecord, RecognitionFailure, RecognitionResponse};
use crate::services::field_normalizer;
use crate::services::vision_client::Recognizer;

/// Background colour alpha channels are flattened onto
const FLATTEN_BACKGROUND: [u8; 3] = [255, 255, 255];

/// Per-image recognition pipeline
#[derive(Clone)]
pub struct RecognitionInvoker {
    recognizer: Arc<dyn Recognizer>,
}

impl RecognitionInvoker {
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self { recognizer }
    }

    /// Recognize one image; never fails, failures become failed records
    pub async fn recognize(&self, image_bytes: &[u8], file_name: &str) -> ExpenseRecord {
        match self.try_recognize(image_bytes).await {
            Ok(response) => {
                let record = field_normalizer::normalize(response, file_name);
                if record.is_success() {
                    tracing::info!(
                        file_name = %file_name,
                        amount = %record.amount,
                        currency = %record.currency,
                        "Receipt recognized"
                    );
                }
                record
            }
            Err(failure) => {
                tracing::warn!(
                    file_name = %file_name,
                    error_code = failure.error_code(),
                    error = %failure,
                    "Receipt recognition failed"
                );
                ExpenseRecord::failed(file_name, failure.to_string())
            }
        }
    }

    async fn try_recognize(
        &self,
        image_bytes: &[u8],
    ) -> Result<RecognitionResponse, RecognitionFailure> {
        let owned = image_bytes.to_vec();
        let jpeg = tokio::task::spawn_blocking(move || prepare_image(&owned))
            .await
            .map_err(|e| RecognitionFailure::Decode(e.to_string()))??;

        let encoded = STANDARD.encode(&jpeg);

        let raw = self
            .recognizer
            .recognize(&encoded)
            .await
            .map_err(|e| RecognitionFailure::Invocation(e.to_string()))?;

        RecognitionResponse::parse(&raw)
    }
}

/// Decode any supported image and re-encode it as an opaque JPEG
pub fn prepare_image(image_bytes: &[u8]) -> Result<Vec<u8>, RecognitionFailure> {
    let decoded =
        image::load_from_memory(image_bytes).map_err(|e| RecognitionFailure::Decode(e.to_string()))?;

    let rgb = if decoded.color().has_alpha() {
        flatten_alpha(&decoded)
    } else {
        decoded.to_rgb8()
    };

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|e| RecognitionFailure::Decode(e.to_string()))?;

    Ok(buffer.into_inner())
}

/// Composite every pixel over [`FLATTEN_BACKGROUND`]
fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = u16::from(a);
        let blend = |channel: u8, background: u8| -> u8 {
            ((u16::from(channel) * alpha + u16::from(background) * (255 - alpha)) / 255) as u8
        };
        flattened.put_pixel(
            x,
            y,
            Rgb([
                blend(r, FLATTEN_BACKGROUND[0]),
                blend(g, FLATTEN_BACKGROUND[1]),
                blend(b, FLATTEN_BACKGROUND[2]),
            ]),
        );
    }

    flattened
}
