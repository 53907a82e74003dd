//! Submission payload decoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::ValidationError;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Image formats the recognition service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(JPEG_MAGIC) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(PNG_MAGIC) {
            Some(Self::Png)
        } else {
            None
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// A decoded, validated selfie.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl ImagePayload {
    /// Decode a base64 image, with or without a `data:<mime>;base64,` prefix.
    pub fn decode(raw: &str) -> Result<Self, ValidationError> {
        let encoded = strip_data_uri(raw.trim());
        let encoded: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        if encoded.is_empty() {
            return Err(ValidationError::Missing);
        }

        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ValidationError::Missing);
        }

        let format = ImageFormat::sniff(&bytes).ok_or(ValidationError::UnsupportedFormat)?;
        Ok(Self { bytes, format })
    }

    /// Re-encode for transport to the recognition service.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

fn strip_data_uri(raw: &str) -> &str {
    if raw.starts_with("data:") {
        match raw.split_once(',') {
            Some((_, data)) => data,
            None => "",
        }
    } else {
        raw
    }
}
