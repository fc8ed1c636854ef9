//! Binary/image/text classification and text charset detection.

use std::collections::HashSet;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chardetng::EncodingDetector;

/// Default image extensions (lowercase, with leading dot), used when a run
/// doesn't override `RunOptions::image_extensions`.
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".webp", ".svg", ".ico", ".tiff", ".tif", ".heic",
    ".avif",
];

pub fn default_image_extensions() -> HashSet<String> {
    DEFAULT_IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

/// How a file's content should be carried in a [`crate::types::FileInfo`] payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Binary,
    Image,
}

/// Classify a file by extension (image) and content sniff (binary vs. text).
/// `sample` should be a read-ahead prefix of the file (the whole file for small files).
/// `image_extensions` entries carry a leading dot, e.g. `".png"`.
pub fn classify(path: &Path, sample: &[u8], image_extensions: &HashSet<String>) -> ContentKind {
    if is_image_extension(path, image_extensions) {
        return ContentKind::Image;
    }
    if is_binary_content(sample) {
        ContentKind::Binary
    } else {
        ContentKind::Text
    }
}

fn is_image_extension(path: &Path, image_extensions: &HashSet<String>) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| image_extensions.contains(&format!(".{}", e.to_ascii_lowercase())))
        .unwrap_or(false)
}

/// A NUL byte anywhere in the sample, or a high proportion of non-printable bytes,
/// marks content as binary.
fn is_binary_content(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    let non_text = sample
        .iter()
        .filter(|&&b| b < 0x09 || (b > 0x0d && b < 0x20))
        .count();
    (non_text as f64 / sample.len() as f64) > 0.30
}

/// Detect the encoding of `bytes` and decode to UTF-8, falling back to a lossy
/// UTF-8 replace-decode when detection yields no clean result.
///
/// Valid UTF-8 (which includes plain ASCII) is reported as `"utf-8"` directly,
/// without consulting chardetng: a confidence-based detector can mistake short
/// ASCII samples for a single-byte codepage even though they decode losslessly
/// as UTF-8.
pub fn decode_text(bytes: &[u8]) -> (String, String) {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return ("utf-8".to_string(), s.to_string());
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, had_errors) = encoding.decode(bytes);
    if had_errors && encoding != encoding_rs::UTF_8 {
        let (utf8_decoded, _, _) = encoding_rs::UTF_8.decode(bytes);
        return ("utf-8".to_string(), utf8_decoded.into_owned());
    }
    (encoding.name().to_lowercase(), decoded.into_owned())
}

/// Base64-encode binary/image content for the payload.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn png_extension_is_image() {
        assert_eq!(
            classify(&PathBuf::from("pic.PNG"), b"whatever", &default_image_extensions()),
            ContentKind::Image
        );
    }

    #[test]
    fn nul_byte_is_binary() {
        assert_eq!(
            classify(&PathBuf::from("data.bin"), b"hello\0world", &default_image_extensions()),
            ContentKind::Binary
        );
    }

    #[test]
    fn plain_text_is_text() {
        assert_eq!(
            classify(
                &PathBuf::from("notes.txt"),
                b"just some words here",
                &default_image_extensions()
            ),
            ContentKind::Text
        );
    }

    #[test]
    fn empty_sample_is_text() {
        assert_eq!(
            classify(&PathBuf::from("empty.txt"), b"", &default_image_extensions()),
            ContentKind::Text
        );
    }

    #[test]
    fn decode_utf8_round_trips() {
        let (encoding, decoded) = decode_text("héllo wörld".as_bytes());
        assert_eq!(encoding, "utf-8");
        assert_eq!(decoded, "héllo wörld");
    }

    #[test]
    fn ascii_content_reports_utf8_not_a_single_byte_codepage() {
        let (encoding, decoded) = decode_text(b"hello");
        assert_eq!(encoding, "utf-8");
        assert_eq!(decoded, "hello");
    }

    #[test]
    fn base64_round_trip() {
        let encoded = encode_base64(b"\x00\x01\x02binary");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(decoded, b"\x00\x01\x02binary");
    }
}
