use crate::blob_store::ObjectStore;
use crate::config::ImageConfig;
use crate::error::CatalogError;
use image::{DynamicImage, ImageOutputFormat};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Encoded output of the normalization step.
struct EncodedImage {
    bytes: Vec<u8>,
    extension: &'static str,
    content_type: &'static str,
}

/// Normalizes uploaded images into bounded-size web thumbnails and writes
/// them to object storage under a collision-free random key.
///
/// Transparent images are encoded as PNG to keep the alpha channel; opaque
/// images as JPEG at a fixed thumbnail quality. Neither output dimension
/// exceeds the configured bound, and images are never upscaled.
pub struct ImageIngestor {
    object_store: Arc<dyn ObjectStore>,
    config: ImageConfig,
}

impl ImageIngestor {
    pub fn new(object_store: Arc<dyn ObjectStore>, config: ImageConfig) -> Self {
        Self {
            object_store,
            config,
        }
    }

    /// Ingest raw uploaded bytes and return the storage key of the encoded
    /// image. On any failure nothing is written and no key escapes.
    #[instrument(skip(self, raw_bytes), fields(filename = %original_filename, size_bytes = raw_bytes.len()))]
    pub async fn ingest(
        &self,
        raw_bytes: &[u8],
        original_filename: &str,
    ) -> Result<String, CatalogError> {
        let img = image::load_from_memory(raw_bytes)
            .map_err(|e| CatalogError::MalformedImage(e.to_string()))?;

        let img = downscale(img, self.config.max_dimension);
        let encoded = encode(&img, self.config.jpeg_quality)?;

        // Random 128-bit token, independent of the original filename, so
        // unrelated uploads sharing a name cannot collide. Generated once,
        // before the write attempt.
        let key = format!("products/{}.{}", Uuid::new_v4().simple(), encoded.extension);

        self.object_store
            .put(&key, encoded.bytes, encoded.content_type)
            .await?;

        debug!(
            key = %key,
            width = img.width(),
            height = img.height(),
            content_type = encoded.content_type,
            "Image ingested"
        );

        metrics::counter!("catalog.images.ingested").increment(1);

        Ok(key)
    }
}

/// Scale down so neither dimension exceeds `max_dimension`, preserving
/// aspect ratio. Images already within the bound pass through untouched.
fn downscale(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    if img.width() <= max_dimension && img.height() <= max_dimension {
        img
    } else {
        img.thumbnail(max_dimension, max_dimension)
    }
}

/// Encode as PNG when an alpha channel is present, JPEG otherwise.
fn encode(img: &DynamicImage, jpeg_quality: u8) -> Result<EncodedImage, CatalogError> {
    let mut buf = Cursor::new(Vec::new());

    if img.color().has_alpha() {
        img.write_to(&mut buf, ImageOutputFormat::Png)
            .map_err(|e| CatalogError::MalformedImage(e.to_string()))?;

        Ok(EncodedImage {
            bytes: buf.into_inner(),
            extension: "png",
            content_type: "image/png",
        })
    } else {
        // JPEG encoding rejects alpha-carrying buffers, so flatten to RGB
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        rgb.write_to(&mut buf, ImageOutputFormat::Jpeg(jpeg_quality))
            .map_err(|e| CatalogError::MalformedImage(e.to_string()))?;

        Ok(EncodedImage {
            bytes: buf.into_inner(),
            extension: "jpg",
            content_type: "image/jpeg",
        })
    }
}
