//! Image-source resolution shared by the backend normalizers.
//!
//! An image source string is interpreted in priority order: data-URI,
//! absolute http(s) URL, existing local file path, then raw base64
//! payload. Each backend wraps the resolved form in its own wire shape.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Fallback MIME type when neither the caller nor the file extension
/// says otherwise.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

// ---------------------------------------------------------------------------
// ResolvedImage
// ---------------------------------------------------------------------------

/// A backend-ready image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedImage {
    /// An absolute http(s) URL, referenced remotely without download.
    Remote { url: String },
    /// Base64 payload plus MIME type, embedded inline.
    Inline { data: String, mime_type: String },
}

impl ResolvedImage {
    /// Chat-completion form: remote URLs pass through, inline payloads
    /// become a data-URI.
    pub fn to_url(&self) -> String {
        match self {
            ResolvedImage::Remote { url } => url.clone(),
            ResolvedImage::Inline { data, mime_type } => {
                format!("data:{mime_type};base64,{data}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve an image source string into a backend-ready payload.
///
/// Returns `None` only for a local file that exists but cannot be read;
/// that image is dropped from the request rather than failing the whole
/// exchange.
pub fn resolve_image(source: &str, mime_type: Option<&str>) -> Option<ResolvedImage> {
    if let Some(rest) = source.strip_prefix("data:") {
        // Split "image/png;base64,AAAA" back into MIME and payload.
        if let Some((mime, data)) = rest.split_once(";base64,") {
            let mime = if mime.is_empty() {
                mime_type.unwrap_or(DEFAULT_IMAGE_MIME)
            } else {
                mime
            };
            return Some(ResolvedImage::Inline {
                data: data.to_string(),
                mime_type: mime.to_string(),
            });
        }
        // Not a base64 data-URI; hand it to the backend untouched.
        return Some(ResolvedImage::Remote {
            url: source.to_string(),
        });
    }

    if source.starts_with("http://") || source.starts_with("https://") {
        return Some(ResolvedImage::Remote {
            url: source.to_string(),
        });
    }

    let path = Path::new(source);
    if path.exists() {
        return match std::fs::read(path) {
            Ok(bytes) => Some(ResolvedImage::Inline {
                data: BASE64.encode(bytes),
                mime_type: mime_type
                    .map(str::to_string)
                    .unwrap_or_else(|| mime_for_path(path).to_string()),
            }),
            Err(error) => {
                tracing::warn!(source, %error, "dropping unreadable image");
                None
            }
        };
    }

    // Last resort: treat the string as a raw base64 payload.
    Some(ResolvedImage::Inline {
        data: source.to_string(),
        mime_type: mime_type.unwrap_or(DEFAULT_IMAGE_MIME).to_string(),
    })
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "jpg" | "jpeg" => "image/jpeg",
        _ => DEFAULT_IMAGE_MIME,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
