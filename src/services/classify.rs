//! Classification of catalog rejections and processing failures into the
//! canonical codes used as quarantine key prefixes.

/// Catalog uniqueness-constraint rejection (content already ingested).
pub const DUPLICATE_IMAGE: &str = "DUPLICATE_IMAGE";

/// Catalog returned more than one validation error.
pub const MULTIPLE_ERRORS: &str = "MULTIPLE_ERRORS";

/// Image bytes could not be decoded.
pub const CORRUPTED_IMAGE_FILE: &str = "CORRUPTED_IMAGE_FILE";

/// Fallback when a failure carries no message at all.
pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

/// Classify the validation errors returned by a createImage call.
///
/// The first message decides: the configured duplicate marker wins, then a
/// multi-error response collapses to [`MULTIPLE_ERRORS`], otherwise the raw
/// message is sanitized into a key-safe code.
pub fn classify_validation(errors: &[String], duplicate_marker: &str) -> String {
    let first = match errors.first() {
        Some(first) => first,
        None => return UNKNOWN_ERROR.to_string(),
    };

    if contains_ignore_case(first, duplicate_marker) {
        DUPLICATE_IMAGE.to_string()
    } else if errors.len() > 1 {
        MULTIPLE_ERRORS.to_string()
    } else {
        sanitize(first)
    }
}

/// Normalize an unexpected processing failure into a quarantine code.
pub fn normalize_failure(message: &str) -> String {
    if message.trim().is_empty() {
        UNKNOWN_ERROR.to_string()
    } else if contains_ignore_case(message, "corrupt") {
        CORRUPTED_IMAGE_FILE.to_string()
    } else {
        sanitize(message)
    }
}

/// Dead-letter key: `<code>/<imageId-or-UNKNOWN>/<original-base-name>`.
pub fn quarantine_key(code: &str, image_id: Option<&str>, file_name: &str) -> String {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    format!("{}/{}/{}", code, image_id.unwrap_or("UNKNOWN"), base)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    !needle.is_empty()
        && haystack
            .to_ascii_lowercase()
            .contains(&needle.to_ascii_lowercase())
}

/// Error messages become key prefixes; strip anything that would splinter
/// the key space or blow past reasonable key lengths.
fn sanitize(message: &str) -> String {
    let mut out: String = message
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    out.truncate(128);
    if out.is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_marker_wins() {
        let errors = vec![
            "E11000 duplicate key error collection: images".to_string(),
            "secondary".to_string(),
        ];
        assert_eq!(classify_validation(&errors, "duplicate key"), DUPLICATE_IMAGE);
    }

    #[test]
    fn multiple_errors_without_duplicate() {
        let errors = vec!["bad field".to_string(), "missing field".to_string()];
        assert_eq!(classify_validation(&errors, "duplicate key"), MULTIPLE_ERRORS);
    }

    #[test]
    fn single_error_sanitized() {
        let errors = vec!["timestamp out of range".to_string()];
        assert_eq!(
            classify_validation(&errors, "duplicate key"),
            "timestamp_out_of_range"
        );
    }

    #[test]
    fn empty_errors_are_unknown() {
        assert_eq!(classify_validation(&[], "duplicate key"), UNKNOWN_ERROR);
    }

    #[test]
    fn corrupt_substring_normalizes() {
        assert_eq!(
            normalize_failure("image file is Corrupted near offset 42"),
            CORRUPTED_IMAGE_FILE
        );
        assert_eq!(normalize_failure(""), UNKNOWN_ERROR);
        assert_eq!(normalize_failure("socket reset"), "socket_reset");
    }

    #[test]
    fn quarantine_key_layout() {
        assert_eq!(
            quarantine_key(DUPLICATE_IMAGE, Some("img-1"), "cam04/IMG_0042.jpg"),
            "DUPLICATE_IMAGE/img-1/IMG_0042.jpg"
        );
        assert_eq!(
            quarantine_key(CORRUPTED_IMAGE_FILE, None, "IMG_0042.jpg"),
            "CORRUPTED_IMAGE_FILE/UNKNOWN/IMG_0042.jpg"
        );
    }
}
