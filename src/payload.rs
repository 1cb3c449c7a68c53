use base64::Engine;
use std::{fmt, str::FromStr};
use thiserror::Error;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed data url: {0}")]
    Malformed(String),
    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// An encoded image carried as `data:<mime>;base64,<body>`.
///
/// This is the only image representation that crosses pipeline boundaries,
/// so the MIME type always travels with the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImagePayload {
    mime: String,
    data: String,
}

impl ImagePayload {
    pub fn new(mime: impl Into<String>, data: impl Into<String>) -> Self {
        Self { mime: mime.into(), data: data.into() }
    }

    pub fn from_bytes(mime: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(mime, BASE64.encode(bytes))
    }

    /// Wraps raw bytes, guessing the MIME type from the magic bytes.
    pub fn sniffed(bytes: &[u8]) -> Self {
        Self::from_bytes(sniff_mime(bytes), bytes)
    }

    /// Accepts a full data URL, or a bare base64 body which is assumed to be JPEG.
    pub fn parse(s: &str) -> Result<Self, PayloadError> {
        let s = s.trim();
        let Some(rest) = s.strip_prefix("data:") else {
            if s.is_empty() {
                return Err(PayloadError::Malformed("empty payload".into()));
            }
            return Ok(Self::new("image/jpeg", s));
        };
        let (header, body) = rest
            .split_once(',')
            .ok_or_else(|| PayloadError::Malformed("missing ',' separator".into()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| PayloadError::Malformed(format!("unsupported encoding in '{header}'")))?;
        if mime.is_empty() || body.is_empty() {
            return Err(PayloadError::Malformed("empty mime type or body".into()));
        }
        Ok(Self::new(mime, body))
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// The base64 body without the data-url header.
    pub fn base64(&self) -> &str {
        &self.data
    }

    pub fn decode(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(BASE64.decode(self.data.as_bytes())?)
    }

    /// Short form for logs: mime, first characters and total length.
    pub fn preview(&self) -> String {
        let head: String = self.data.chars().take(32).collect();
        format!("{} {}...[{} chars]", self.mime, head, self.data.len())
    }
}

impl fmt::Display for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime, self.data)
    }
}

impl FromStr for ImagePayload {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        _ => "image/jpeg",
    }
}

pub fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_data_url() {
        let payload = ImagePayload::parse("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(payload.mime(), "image/png");
        assert_eq!(payload.base64(), "iVBORw0KGgo=");
        assert_eq!(payload.to_string(), "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn bare_base64_is_treated_as_jpeg() {
        let payload: ImagePayload = "/9j/4AAQSkZJRg==".parse().unwrap();
        assert_eq!(payload.mime(), "image/jpeg");
    }

    #[test]
    fn rejects_non_base64_data_urls() {
        assert!(ImagePayload::parse("data:image/svg+xml;utf8,<svg/>").is_err());
        assert!(ImagePayload::parse("data:image/png;base64").is_err());
        assert!(ImagePayload::parse("").is_err());
    }

    #[test]
    fn sniffs_png_magic() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(sniff_mime(&png), "image/png");
        assert_eq!(ImagePayload::sniffed(&png).mime(), "image/png");
        assert_eq!(sniff_mime(b"not an image"), "image/jpeg");
    }
}
