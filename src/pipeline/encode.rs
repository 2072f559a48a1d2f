//! Image encoding: a file on disk → base64 payload for a vision API.
//!
//! Formats every major vision API accepts (PNG, JPEG, GIF, WebP) are sent
//! byte-for-byte. BMP and TIFF are decoded and re-encoded as PNG first;
//! SVG is passed through as `image/svg+xml`.

use crate::error::CaptionError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// An image ready to be embedded in a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    /// Standard base64, no line breaks.
    pub base64: String,
}

impl EncodedImage {
    /// `data:<mime>;base64,<payload>`.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    /// The same payload as an `edgequake_llm` attachment.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.base64.clone(), self.mime_type.clone()).with_detail("high")
    }
}

/// Read and encode the image at `path`.
pub async fn encode_image_file(path: &Path) -> Result<EncodedImage, CaptionError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| CaptionError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let encoded = match ext.as_str() {
        "png" => passthrough(&bytes, "image/png"),
        "jpg" | "jpeg" => passthrough(&bytes, "image/jpeg"),
        "gif" => passthrough(&bytes, "image/gif"),
        "webp" => passthrough(&bytes, "image/webp"),
        "svg" => passthrough(&bytes, "image/svg+xml"),
        _ => {
            // Decoding is CPU-bound; keep it off the async workers.
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || reencode_png(&bytes, &owned))
                .await
                .map_err(|e| CaptionError::Encode {
                    path: path.to_path_buf(),
                    detail: format!("encoder task failed: {e}"),
                })??
        }
    };
    debug!(
        "Encoded {} as {} ({} bytes base64)",
        path.display(),
        encoded.mime_type,
        encoded.base64.len()
    );
    Ok(encoded)
}

fn passthrough(bytes: &[u8], mime: &str) -> EncodedImage {
    EncodedImage {
        mime_type: mime.to_string(),
        base64: STANDARD.encode(bytes),
    }
}

/// Decode any format the `image` crate knows and re-encode it as PNG.
fn reencode_png(bytes: &[u8], path: &Path) -> Result<EncodedImage, CaptionError> {
    let encode_err = |detail: String| CaptionError::Encode {
        path: path.to_path_buf(),
        detail,
    };
    let img = image::load_from_memory(bytes).map_err(|e| encode_err(e.to_string()))?;
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| encode_err(e.to_string()))?;
    Ok(EncodedImage {
        mime_type: "image/png".to_string(),
        base64: STANDARD.encode(&buf),
    })
}
