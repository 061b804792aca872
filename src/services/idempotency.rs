use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::services::client::ImageSource;

/// Hex characters of the input digest kept in a key.
const DIGEST_CHARS: usize = 12;

/// Build an idempotency key for `source` at instant `at`.
///
/// Format: `<stem>-<digest>-<unix seconds>`. The digest covers the full path,
/// URL, or raw bytes, so two inputs sharing a file stem still get distinct
/// keys within the same second.
pub fn generate(source: &ImageSource, at: DateTime<Utc>) -> String {
    let (stem, digest) = match source {
        ImageSource::File(path) => (
            file_stem(path),
            short_digest(path.to_string_lossy().as_bytes()),
        ),
        ImageSource::Bytes { data, filename, .. } => {
            (file_stem(Path::new(filename)), short_digest(data))
        }
        ImageSource::Url(url) => ("url".to_string(), short_digest(url.as_bytes())),
    };
    format!("{}-{}-{}", stem, digest, at.timestamp())
}

fn file_stem(path: &Path) -> String {
    let stem: String = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();

    if stem.is_empty() {
        "image".to_string()
    } else {
        stem
    }
}

fn short_digest(data: &[u8]) -> String {
    let mut encoded = hex::encode(Sha256::digest(data));
    encoded.truncate(DIGEST_CHARS);
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_same_stem_different_dirs_differ() {
        let a = generate(&ImageSource::File(PathBuf::from("march/invoice1.jpg")), instant());
        let b = generate(&ImageSource::File(PathBuf::from("april/invoice1.jpg")), instant());
        assert_ne!(a, b);
        assert!(a.starts_with("invoice1-"));
        assert!(a.ends_with(&format!("-{}", instant().timestamp())));
    }

    #[test]
    fn test_same_input_same_instant_reuses_key() {
        let source = ImageSource::File(PathBuf::from("receipts/lunch.png"));
        assert_eq!(generate(&source, instant()), generate(&source, instant()));
    }

    #[test]
    fn test_url_and_bytes_keys() {
        let url = generate(&ImageSource::Url("https://example.com/a.jpg".to_string()), instant());
        assert!(url.starts_with("url-"));

        let bytes = ImageSource::Bytes {
            data: vec![1, 2, 3],
            filename: "scan 01.jpg".to_string(),
            mime: None,
        };
        let other = ImageSource::Bytes {
            data: vec![3, 2, 1],
            filename: "scan 01.jpg".to_string(),
            mime: None,
        };
        let key = generate(&bytes, instant());
        assert!(key.starts_with("scan_01-"));
        assert_ne!(key, generate(&other, instant()));
    }
}
