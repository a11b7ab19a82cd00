//! Page-level PDF editing on top of qpdf (vendored FFI)
//!
//! Merge, page extraction, AES-256 encryption, decryption and
//! re-serialization with compression all happen in memory.

use crate::error::{Error, Result};
use qpdf::{EncryptionParams, EncryptionParamsR6, ObjectStreamMode, PrintPermission, QPdf};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Print permission granted by an encrypted PDF
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PrintLevel {
    #[default]
    Full,
    Low,
    None,
}

/// Object stream handling when rewriting a PDF
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStreams {
    /// Pack objects into object streams (smallest output)
    #[default]
    Generate,
    Preserve,
    Disable,
}

/// Passwords and permissions for [`PdfEditor::encrypt`]
#[derive(Debug, Clone)]
pub struct Protection {
    pub user_password: String,
    /// Defaults to the user password
    pub owner_password: Option<String>,
    pub print: PrintLevel,
    pub allow_copy: bool,
    pub allow_modify: bool,
}

impl Protection {
    pub fn new(user_password: impl Into<String>) -> Self {
        Self {
            user_password: user_password.into(),
            owner_password: None,
            print: PrintLevel::Full,
            allow_copy: true,
            allow_modify: true,
        }
    }

    fn to_params(&self) -> EncryptionParams {
        let allow_print = match self.print {
            PrintLevel::Full => PrintPermission::Full,
            PrintLevel::Low => PrintPermission::Low,
            PrintLevel::None => PrintPermission::None,
        };

        EncryptionParams::R6(EncryptionParamsR6 {
            user_password: self.user_password.clone(),
            owner_password: self
                .owner_password
                .clone()
                .unwrap_or_else(|| self.user_password.clone()),
            allow_accessibility: true,
            allow_extract: self.allow_copy,
            allow_assemble: self.allow_modify,
            allow_annotate_and_form: self.allow_modify,
            allow_form_filling: self.allow_modify,
            allow_modify_other: self.allow_modify,
            allow_print,
            encrypt_metadata: true,
        })
    }
}

/// Stateless qpdf operations over in-memory PDFs
pub struct PdfEditor;

fn open(data: &[u8], password: Option<&str>) -> Result<QPdf> {
    match password {
        Some(pwd) => QPdf::read_from_memory_encrypted(data, pwd),
        None => QPdf::read_from_memory(data),
    }
    .map_err(map_qpdf_error)
}

fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    match e.error_code() {
        qpdf::QPdfErrorCode::InvalidPassword => Error::IncorrectPassword,
        _ => Error::Qpdf {
            reason: e.to_string(),
        },
    }
}

impl PdfEditor {
    /// Number of pages in a PDF
    pub fn page_count(data: &[u8], password: Option<&str>) -> Result<u32> {
        open(data, password)?
            .get_num_pages()
            .map_err(map_qpdf_error)
    }

    /// Concatenate the pages of every input, in order
    pub fn merge(inputs: &[&[u8]]) -> Result<Vec<u8>> {
        if inputs.is_empty() {
            return Err(Error::Qpdf {
                reason: "No input PDFs provided".to_string(),
            });
        }

        let merged = QPdf::empty();
        for (i, data) in inputs.iter().enumerate() {
            let source = QPdf::read_from_memory(data).map_err(|e| Error::Qpdf {
                reason: format!("Failed to read input PDF {}: {}", i + 1, e),
            })?;
            let pages = source.get_pages().map_err(|e| Error::Qpdf {
                reason: format!("Failed to get pages from input PDF {}: {}", i + 1, e),
            })?;
            for page in &pages {
                let copied = merged.copy_from_foreign(page);
                merged.add_page(&copied, false).map_err(map_qpdf_error)?;
            }
            tracing::debug!(input = i + 1, pages = pages.len(), "appended input");
        }

        merged.writer().write_to_memory().map_err(map_qpdf_error)
    }

    /// Build a new PDF from the given 1-indexed pages (order and repeats kept)
    pub fn extract_pages(data: &[u8], pages: &[u32], password: Option<&str>) -> Result<Vec<u8>> {
        let source = open(data, password)?;
        let total = source.get_num_pages().map_err(map_qpdf_error)?;

        let output = QPdf::empty();
        for &page_num in pages {
            let page = page_num
                .checked_sub(1)
                .and_then(|idx| source.get_page(idx))
                .ok_or(Error::PageOutOfBounds {
                    page: page_num,
                    total,
                })?;
            let copied = output.copy_from_foreign(&page);
            output.add_page(&copied, false).map_err(map_qpdf_error)?;
        }

        let mut writer = output.writer();
        writer.preserve_encryption(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }

    /// Encrypt with AES-256 (R6)
    pub fn encrypt(
        data: &[u8],
        protection: &Protection,
        source_password: Option<&str>,
    ) -> Result<Vec<u8>> {
        let pdf = open(data, source_password)?;
        let mut writer = pdf.writer();
        writer
            .preserve_encryption(false)
            .encryption_params(protection.to_params());
        writer.write_to_memory().map_err(map_qpdf_error)
    }

    /// Remove encryption
    pub fn decrypt(data: &[u8], password: &str) -> Result<Vec<u8>> {
        let pdf = open(data, Some(password))?;
        let mut writer = pdf.writer();
        writer.preserve_encryption(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }

    /// Rewrite with compressed streams, normalized content and unreferenced objects dropped
    pub fn compress(
        data: &[u8],
        password: Option<&str>,
        object_streams: ObjectStreams,
    ) -> Result<Vec<u8>> {
        let pdf = open(data, password)?;
        let mode = match object_streams {
            ObjectStreams::Generate => ObjectStreamMode::Generate,
            ObjectStreams::Preserve => ObjectStreamMode::Preserve,
            ObjectStreams::Disable => ObjectStreamMode::Disable,
        };

        let mut writer = pdf.writer();
        writer
            .object_stream_mode(mode)
            .compress_streams(true)
            .normalize_content(true)
            .preserve_unreferenced_objects(false)
            .preserve_encryption(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }
}
