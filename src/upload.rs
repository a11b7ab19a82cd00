//! Upload handling: accept patterns, MIME sniffing and per-field validation

use schemars::JsonSchema;
use serde::Serialize;
use std::collections::BTreeMap;

pub const PDF_MIME: &str = "application/pdf";
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

/// A file handed to a tool, with its sniffed MIME type
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Upload {
    /// Create an upload. Content sniffing wins over the declared MIME type.
    pub fn new(file_name: impl Into<String>, declared_mime: Option<&str>, data: Vec<u8>) -> Self {
        let mime_type = detect_mime(&data)
            .map(str::to_string)
            .or_else(|| declared_mime.map(|m| m.trim().to_ascii_lowercase()))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| OCTET_STREAM_MIME.to_string());

        Self {
            file_name: file_name.into(),
            mime_type,
            data,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == PDF_MIME
    }
}

/// Sniff a MIME type from magic bytes
pub fn detect_mime(data: &[u8]) -> Option<&'static str> {
    if data.len() >= 4 && &data[0..4] == b"%PDF" {
        return Some(PDF_MIME);
    }
    image::guess_format(data).ok().map(|f| f.to_mime_type())
}

/// HTML-style accept list: `*`, `application/pdf`, `image/*`, or a comma list of those
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptPattern {
    entries: Vec<String>,
}

impl AcceptPattern {
    pub fn parse(accept: &str) -> Self {
        let entries = accept
            .split(',')
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect::<Vec<_>>();
        if entries.is_empty() {
            return Self::any();
        }
        Self { entries }
    }

    pub fn any() -> Self {
        Self {
            entries: vec!["*".to_string()],
        }
    }

    pub fn pdf() -> Self {
        Self::parse(PDF_MIME)
    }

    pub fn images() -> Self {
        Self::parse("image/*")
    }

    pub fn matches(&self, mime: &str) -> bool {
        let mime = mime.trim().to_ascii_lowercase();
        // Ignore parameters such as `;charset=...`
        let mime = mime.split(';').next().unwrap_or_default();

        self.entries.iter().any(|entry| match entry.as_str() {
            "*" | "*/*" => true,
            e => match e.strip_suffix("/*") {
                Some(top) => mime
                    .split_once('/')
                    .is_some_and(|(mime_top, _)| mime_top == top),
                None => e == mime,
            },
        })
    }

    /// The message shown when a file does not match this pattern
    fn mismatch_message(&self, mime: &str) -> String {
        match self.entries.as_slice() {
            [only] if only == PDF_MIME => "Only PDF files are allowed.".to_string(),
            [only] if only == "image/*" => "Only image files are allowed.".to_string(),
            _ => format!("File type {} is not allowed.", mime),
        }
    }
}

/// Validation messages grouped by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.0.get(field)
    }

    /// First message for a field, the one a client would display
    pub fn first(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(|m| m.first()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `Ok(())` when nothing was recorded, otherwise a validation error
    pub fn into_result(self) -> crate::Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(crate::Error::Validation { errors: self })
        }
    }
}

/// Check presence, type and size of one upload, recording problems under `field`.
/// Returns true when the file passed every check.
pub fn validate_file(
    errors: &mut FieldErrors,
    field: &str,
    upload: &Upload,
    accept: &AcceptPattern,
    max_bytes: usize,
) -> bool {
    if upload.data.is_empty() {
        errors.add(field, "A file is required.");
        return false;
    }

    let mut ok = true;
    if !accept.matches(&upload.mime_type) {
        errors.add(field, accept.mismatch_message(&upload.mime_type));
        ok = false;
    }
    if upload.size() > max_bytes {
        errors.add(
            field,
            format!("File exceeds the maximum size of {} bytes.", max_bytes),
        );
        ok = false;
    }
    ok
}

/// Keep only uploads matching the accept pattern, in their original order
pub fn filter_accepted(uploads: Vec<Upload>, accept: &AcceptPattern) -> Vec<Upload> {
    uploads
        .into_iter()
        .filter(|u| {
            let keep = accept.matches(&u.mime_type);
            if !keep {
                tracing::debug!(
                    file = %u.file_name,
                    mime = %u.mime_type,
                    "dropping unaccepted file"
                );
            }
            keep
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[rstest]
    #[case("*", "application/zip", true)]
    #[case("application/pdf", "application/pdf", true)]
    #[case("application/pdf", "image/png", false)]
    #[case("image/*", "image/jpeg", true)]
    #[case("image/*", "application/pdf", false)]
    #[case("image/png, application/pdf", "application/pdf", true)]
    #[case("IMAGE/*", "image/webp", true)]
    #[case("text/plain", "text/plain;charset=utf-8", true)]
    fn test_accept_matches(#[case] accept: &str, #[case] mime: &str, #[case] expected: bool) {
        assert_eq!(AcceptPattern::parse(accept).matches(mime), expected);
    }

    #[test]
    fn test_empty_accept_is_any() {
        assert_eq!(AcceptPattern::parse("  "), AcceptPattern::any());
    }

    #[test]
    fn test_detect_mime() {
        assert_eq!(detect_mime(b"%PDF-1.7\n"), Some(PDF_MIME));
        assert_eq!(detect_mime(PNG_MAGIC), Some("image/png"));
        assert_eq!(detect_mime(b"hello"), None);
    }

    #[test]
    fn test_sniffed_mime_wins() {
        let upload = Upload::new("scan.pdf", Some(PDF_MIME), PNG_MAGIC.to_vec());
        assert_eq!(upload.mime_type, "image/png");

        let upload = Upload::new("notes.txt", Some(" Text/Plain "), b"hello".to_vec());
        assert_eq!(upload.mime_type, "text/plain");

        let upload = Upload::new("blob", None, b"hello".to_vec());
        assert_eq!(upload.mime_type, OCTET_STREAM_MIME);
    }

    #[test]
    fn test_validate_missing_file() {
        let mut errors = FieldErrors::new();
        let upload = Upload::new("empty.pdf", Some(PDF_MIME), Vec::new());
        assert!(!validate_file(&mut errors, "file", &upload, &AcceptPattern::pdf(), 100));
        assert_eq!(errors.first("file"), Some("A file is required."));
    }

    #[test]
    fn test_validate_wrong_type_and_size() {
        let mut errors = FieldErrors::new();
        let upload = Upload::new("photo.png", None, PNG_MAGIC.to_vec());
        assert!(!validate_file(&mut errors, "file", &upload, &AcceptPattern::pdf(), 4));
        assert_eq!(
            errors.get("file").unwrap(),
            &vec![
                "Only PDF files are allowed.".to_string(),
                "File exceeds the maximum size of 4 bytes.".to_string(),
            ]
        );

        let mut errors = FieldErrors::new();
        let upload = Upload::new("doc.pdf", None, b"%PDF-1.4".to_vec());
        assert!(!validate_file(&mut errors, "image", &upload, &AcceptPattern::images(), 100));
        assert_eq!(errors.first("image"), Some("Only image files are allowed."));
    }

    #[test]
    fn test_filter_accepted_preserves_order() {
        let uploads = vec![
            Upload::new("a.pdf", None, b"%PDF-1.4 a".to_vec()),
            Upload::new("b.png", None, PNG_MAGIC.to_vec()),
            Upload::new("c.pdf", None, b"%PDF-1.4 c".to_vec()),
        ];
        let kept = filter_accepted(uploads, &AcceptPattern::pdf());
        let names: Vec<_> = kept.iter().map(|u| u.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "c.pdf"]);
    }

    #[test]
    fn test_field_errors_into_result() {
        assert!(FieldErrors::new().into_result().is_ok());

        let mut errors = FieldErrors::new();
        errors.add("password", "A password is required.");
        let err = errors.into_result().unwrap_err();
        assert_eq!(
            err.field_errors().and_then(|e| e.first("password")),
            Some("A password is required.")
        );
    }
}
