//! Error types for the PDF toolkit

use crate::upload::FieldErrors;
use thiserror::Error;

/// Result type alias for the PDF toolkit
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown when the AI reply carries no usable form schema
pub const NO_FORM_MESSAGE: &str =
    "Could not generate a form from the image. Please try another one.";

/// Everything a tool call can fail with
#[derive(Error, Debug)]
pub enum Error {
    /// Local source path does not exist
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Uploads or tool parameters failed validation
    #[error("Invalid input: {errors:?}")]
    Validation { errors: FieldErrors },

    /// Bytes that qpdf or PDFium refused to open as a document
    #[error("Not a readable PDF: {reason}")]
    InvalidPdf { reason: String },

    /// Encrypted input and no password supplied
    #[error("Document is encrypted and needs a password")]
    PasswordRequired,

    #[error("Password does not unlock the document")]
    IncorrectPassword,

    /// Page selection that does not parse
    #[error("Unparseable page selection: {range}")]
    InvalidPageRange { range: String },

    #[error("Page {page} does not exist (document has {total})")]
    PageOutOfBounds { page: u32, total: u32 },

    /// Cache entry evicted or never stored
    #[error("No cached output under key {key}")]
    CacheKeyNotFound { key: String },

    #[error("Could not load file source: {reason}")]
    SourceResolution { reason: String },

    /// Malformed data URI
    #[error("Invalid data URI: {reason}")]
    InvalidDataUri { reason: String },

    #[error("Bad base64 payload: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("Download failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Rendering or conversion through PDFium
    #[error("PDFium failure: {reason}")]
    Pdfium { reason: String },

    /// Image decoding or encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON failure: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Structural edits through qpdf
    #[error("qpdf failure: {reason}")]
    Qpdf { reason: String },

    /// Form schema could not be interpreted
    #[error("Invalid form schema: {reason}")]
    FormSchema { reason: String },

    /// Form template rendering failed
    #[error("Template error: {reason}")]
    Template { reason: String },

    /// The AI model produced no usable form
    #[error("Form generation failed: {reason}")]
    FormGeneration { reason: String, empty_schema: bool },

    /// No AI model is configured
    #[error("Form generator unavailable: {reason}")]
    GeneratorUnavailable { reason: String },

    /// Path falls outside the configured directories
    #[error("Path outside allowed directories: {path}")]
    PathAccessDenied { path: String },

    /// URL host resolves to a loopback, private or reserved address
    #[error("Refusing private address for {url}")]
    SsrfBlocked { url: String },

    #[error("Remote file is {size} bytes, limit is {max_size}")]
    DownloadTooLarge { size: u64, max_size: u64 },
}

impl Error {
    /// Build a validation error carrying a single field message.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        Error::Validation { errors }
    }

    /// Per-field messages for validation failures.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Error::Validation { errors } => Some(errors),
            _ => None,
        }
    }

    /// Message shown to the person using the tool.
    ///
    /// Paths and library output stay in the logs; callers trace the full
    /// error before sending this back.
    pub fn client_message(&self) -> String {
        match self {
            Error::FileNotFound { .. } => "The file could not be found.".to_string(),
            Error::Validation { .. } => "Invalid input.".to_string(),
            Error::InvalidPdf { .. } => "The file is not a valid PDF.".to_string(),
            Error::PasswordRequired => "This PDF is protected. Enter its password.".to_string(),
            Error::IncorrectPassword => "Incorrect password.".to_string(),
            Error::InvalidPageRange { range } => {
                format!("\"{}\" is not a valid page selection.", range)
            }
            Error::PageOutOfBounds { page, total } => {
                format!("Page {} does not exist. The document has {} pages.", page, total)
            }
            Error::CacheKeyNotFound { .. } => {
                "That result has expired. Please run the tool again.".to_string()
            }
            Error::SourceResolution { .. } => "The file could not be loaded.".to_string(),
            Error::InvalidDataUri { .. } => {
                "The uploaded data is not a valid data URI.".to_string()
            }
            Error::Base64Decode(_) => "The uploaded data is not valid base64.".to_string(),
            Error::HttpRequest(_) => "The file could not be downloaded.".to_string(),
            Error::Io(_) => "The file could not be read or written.".to_string(),
            Error::Pdfium { .. } | Error::Qpdf { .. } => {
                "The PDF could not be processed.".to_string()
            }
            Error::Image(_) => "The image could not be processed.".to_string(),
            Error::Serialization(_) => {
                "An unexpected error occurred. Please try again.".to_string()
            }
            Error::FormSchema { .. } => {
                "Could not parse the form schema provided by the AI.".to_string()
            }
            Error::Template { .. } => "The form could not be displayed.".to_string(),
            Error::FormGeneration {
                empty_schema: true, ..
            } => NO_FORM_MESSAGE.to_string(),
            Error::FormGeneration { .. } => {
                "An unexpected error occurred. Please try again.".to_string()
            }
            Error::GeneratorUnavailable { .. } => {
                "AI form generation is not available.".to_string()
            }
            Error::PathAccessDenied { .. } => "That location is not accessible.".to_string(),
            Error::SsrfBlocked { .. } => "That URL is not allowed.".to_string(),
            Error::DownloadTooLarge { max_size, .. } => {
                format!("The remote file is larger than {} bytes.", max_size)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_client_message() {
        let err = Error::invalid_field("file", "A file is required.");
        assert_eq!(err.client_message(), "Invalid input.");
        let errors = err.field_errors().unwrap();
        assert_eq!(errors.get("file"), Some(&vec!["A file is required.".to_string()]));
    }

    #[test]
    fn test_generation_messages() {
        let empty = Error::FormGeneration {
            reason: "blank formSchema".to_string(),
            empty_schema: true,
        };
        assert_eq!(empty.client_message(), NO_FORM_MESSAGE);

        let failed = Error::FormGeneration {
            reason: "status 500".to_string(),
            empty_schema: false,
        };
        assert_eq!(
            failed.client_message(),
            "An unexpected error occurred. Please try again."
        );
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = Error::FileNotFound {
            path: "/secret/location.pdf".to_string(),
        };
        assert!(!err.client_message().contains("/secret"));
        assert!(err.field_errors().is_none());
    }
}
