//! MCP Server implementation using rmcp

use crate::config::ServerConfig;
use crate::error::Error;
use crate::form::{FormRenderer, FormSchema, FormValues, FormView, SUBMITTED_MESSAGE};
use crate::generate::{FormGenerator, GeminiFormGenerator};
use crate::pdf::{
    images_to_pdf, parse_page_range, render_pages, ObjectStreams, PdfEditor, PrintLevel,
    Protection, RasterFormat,
};
use crate::source::{
    data_uri, resolve_base64, resolve_cache, resolve_data_uri, resolve_path, resolve_url,
    CachedFile, FileSource, OutputCache,
};
use crate::upload::{filter_accepted, validate_file, AcceptPattern, FieldErrors, Upload, PDF_MIME};
use anyhow::Result;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const SUCCESS: &str = "success";
const DEFAULT_RENDER_WIDTH: u16 = 1200;

const SOURCE_FORMAT: &str = "Source format: one of {\"path\": \"/absolute/path\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\", \"file_name\"?: \"...\"}, {\"data_uri\": \"data:<mime>;base64,...\"}, or {\"cache_key\": \"...\"}";

const TOOL_CATALOG: &str = "PDF Toolkit: a complete toolkit to manage PDF documents.

- Merge PDF (merge_pdfs): combine multiple PDF files into one single document.
- Split PDF (split_pdf): extract specific pages from a PDF into a new file.
- Compress PDF (compress_pdf): reduce the file size of your PDF documents.
- Secure PDF (secure_pdf, unprotect_pdf): add or remove password protection.
- PDF to Image (pdf_to_image): convert each page of a PDF into PNG or JPEG images.
- Image to PDF (image_to_pdf): convert JPG, PNG and other images into a single PDF.
- AI Fillable Form (generate_fillable_form, render_form, submit_form): turn a photo of a paper form into a fillable form.

Every file output is returned as a data URI (download_url) and cached under output_cache_key, which any tool accepts as {\"cache_key\": \"...\"}.";

// ============================================================================
// Shared result parts
// ============================================================================

/// Outcome fields carried by every result
#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct ToolOutcome {
    /// "success", or a message suitable for display
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Validation messages per input field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<FieldErrors>,
}

impl ToolOutcome {
    fn success() -> Self {
        Self::with_message(SUCCESS)
    }

    fn with_message(message: &str) -> Self {
        Self {
            message: message.to_string(),
            ..Self::default()
        }
    }

    fn failure(error: &Error) -> Self {
        let message = error.client_message();
        Self {
            error: Some(message.clone()),
            field_errors: error.field_errors().cloned(),
            message,
        }
    }
}

/// A produced file
#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct OutputFile {
    pub file_name: String,
    /// `data:` URI of the file content
    pub download_url: String,
    pub size: usize,
    /// Cache key for chaining with other tools (absent when the file is too large to cache)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cache_key: Option<String>,
    /// Path where the file was saved (if output_path was specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

fn to_response<T: Serialize>(result: &T) -> String {
    let response = serde_json::json!({ "results": [result] });
    serde_json::to_string_pretty(&response).unwrap_or_default()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Request/Response types for merge_pdfs
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MergePdfsParams {
    /// PDF files to merge, in order (at least two)
    pub files: Vec<FileSource>,
    /// Output file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct MergePdfsResult {
    #[serde(flatten)]
    pub outcome: ToolOutcome,
    pub source_count: u32,
    pub output_page_count: u32,
    #[serde(flatten)]
    pub output: Option<OutputFile>,
}

// ============================================================================
// Request/Response types for split_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SplitPdfParams {
    /// PDF to extract pages from
    pub file: FileSource,
    /// Pages to extract, e.g. "1-3, 5, 8-10"
    #[serde(default)]
    pub page_range: String,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
    /// Output file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct SplitPdfResult {
    #[serde(flatten)]
    pub outcome: ToolOutcome,
    pub source: String,
    pub output_page_count: u32,
    #[serde(flatten)]
    pub output: Option<OutputFile>,
}

// ============================================================================
// Request/Response types for compress_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompressPdfParams {
    /// PDF to compress
    pub file: FileSource,
    /// Object streams mode: "generate" (best compression), "preserve", or "disable"
    #[serde(default)]
    pub object_streams: ObjectStreams,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
    /// Output file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct CompressPdfResult {
    #[serde(flatten)]
    pub outcome: ToolOutcome,
    pub source: String,
    /// Original file size in bytes
    pub original_size: usize,
    /// Compressed file size in bytes
    pub compressed_size: usize,
    /// Compression ratio (compressed/original, lower is better)
    pub compression_ratio: f32,
    /// Bytes saved (negative when the output grew)
    pub bytes_saved: i64,
    #[serde(flatten)]
    pub output: Option<OutputFile>,
}

// ============================================================================
// Request/Response types for secure_pdf / unprotect_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SecurePdfParams {
    /// PDF to protect
    pub file: FileSource,
    /// Password required to open the PDF
    #[serde(default)]
    pub password: String,
    /// Password required to change permissions (defaults to password)
    #[serde(default)]
    pub owner_password: Option<String>,
    /// Print permission: "full", "low" (low resolution), or "none"
    #[serde(default)]
    pub allow_print: PrintLevel,
    /// Allow copying text and images (default: true)
    #[serde(default = "default_true")]
    pub allow_copy: bool,
    /// Allow modifying the document (default: true)
    #[serde(default = "default_true")]
    pub allow_modify: bool,
    /// Password of the input PDF, if it is already encrypted
    #[serde(default)]
    pub source_password: Option<String>,
    /// Output file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UnprotectPdfParams {
    /// Encrypted PDF
    pub file: FileSource,
    /// Password of the PDF
    #[serde(default)]
    pub password: String,
    /// Output file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct ProtectionResult {
    #[serde(flatten)]
    pub outcome: ToolOutcome,
    pub source: String,
    pub output_page_count: u32,
    #[serde(flatten)]
    pub output: Option<OutputFile>,
}

// ============================================================================
// Request/Response types for pdf_to_image
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PdfToImageParams {
    /// PDF to convert
    pub file: FileSource,
    /// Image format: "png" or "jpeg" (default: png)
    #[serde(default)]
    pub format: RasterFormat,
    /// Pages to convert, e.g. "1-3,5". Defaults to all pages.
    #[serde(default)]
    pub pages: Option<String>,
    /// Image width in pixels (default: 1200)
    #[serde(default)]
    pub width: Option<u16>,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PageImage {
    /// Page number (1-indexed)
    pub page: u32,
    pub file_name: String,
    /// `data:` URI of the image
    pub download_url: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cache_key: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct PdfToImageResult {
    #[serde(flatten)]
    pub outcome: ToolOutcome,
    pub source: String,
    pub images: Vec<PageImage>,
}

// ============================================================================
// Request/Response types for image_to_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImageToPdfParams {
    /// Images to convert, one page each, in order
    pub files: Vec<FileSource>,
    /// Drop files that are not images instead of rejecting the request
    #[serde(default)]
    pub skip_unsupported: bool,
    /// Output file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct ImageToPdfResult {
    #[serde(flatten)]
    pub outcome: ToolOutcome,
    pub image_count: u32,
    #[serde(flatten)]
    pub output: Option<OutputFile>,
}

// ============================================================================
// Request/Response types for the form tools
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateFormParams {
    /// Photo or scan of a paper form
    pub image: FileSource,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct GenerateFormResult {
    #[serde(flatten)]
    pub outcome: ToolOutcome,
    /// JSON Schema of the form, as a string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// The schema rendered as a form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<FormView>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RenderFormParams {
    /// Form schema as a JSON string
    pub schema: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubmitFormParams {
    /// Form schema as a JSON string
    pub schema: String,
    /// Submitted values keyed by field name
    #[serde(default)]
    pub values: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct SubmitFormResult {
    #[serde(flatten)]
    pub outcome: ToolOutcome,
    /// Validated values in field order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<FormValues>,
    /// Pretty-printed values, for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

// ============================================================================
// Server
// ============================================================================

/// PDF toolkit MCP server
#[derive(Clone)]
pub struct ToolkitServer {
    cache: Arc<OutputCache>,
    tool_router: ToolRouter<Self>,
    config: Arc<ServerConfig>,
    renderer: Arc<FormRenderer>,
    generator: Option<Arc<dyn FormGenerator>>,
}

#[tool_router]
impl ToolkitServer {
    pub fn new() -> crate::error::Result<Self> {
        Self::with_config(ServerConfig::default())
    }

    /// Create a server, using Gemini for form generation when an API key is configured
    pub fn with_config(config: ServerConfig) -> crate::error::Result<Self> {
        let generator: Option<Arc<dyn FormGenerator>> =
            match GeminiFormGenerator::new(&config.generator) {
                Ok(generator) => Some(Arc::new(generator)),
                Err(Error::GeneratorUnavailable { reason }) => {
                    tracing::info!(%reason, "AI form generation disabled");
                    None
                }
                Err(e) => return Err(e),
            };
        Self::with_generator(config, generator)
    }

    /// Create a server with an explicit form generator
    pub fn with_generator(
        config: ServerConfig,
        generator: Option<Arc<dyn FormGenerator>>,
    ) -> crate::error::Result<Self> {
        let cache = OutputCache::new(config.cache_max_entries, config.cache_max_bytes);
        Ok(Self {
            cache: Arc::new(cache),
            tool_router: Self::tool_router(),
            config: Arc::new(config),
            renderer: Arc::new(FormRenderer::new()?),
            generator,
        })
    }

    /// Merge multiple PDFs into one
    #[tool(
        description = "Merge PDF: combine multiple PDF files into one single document, in the order given. At least two files are required. Returns merged.pdf as a data URI and caches it (output_cache_key) for chaining.

Source format: each element of files must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, {\"data_uri\": \"data:application/pdf;base64,...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn merge_pdfs(&self, Parameters(params): Parameters<MergePdfsParams>) -> String {
        let result = self
            .process_merge_pdfs(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "merge_pdfs failed");
                MergePdfsResult {
                    outcome: ToolOutcome::failure(&e),
                    source_count: params.files.len() as u32,
                    ..Default::default()
                }
            });
        to_response(&result)
    }

    /// Extract pages into a new PDF
    #[tool(
        description = "Split PDF: extract specific pages from a PDF into a new file (split.pdf).

Page range syntax:
- \"1-5\" (range), \"1,3,5\" (specific pages), \"1-3, 5, 8-10\" (combined)
- Last page: \"z\"; N-th from the end: \"r2\"
- Reverse: \"z-1\" (all pages reversed), \"5-1\"
- Odd/even: \"1-z:odd\", \"1-z:even\"
- Repeats are kept: \"1,1\"

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, {\"data_uri\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn split_pdf(&self, Parameters(params): Parameters<SplitPdfParams>) -> String {
        let result = self
            .process_split_pdf(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "split_pdf failed");
                SplitPdfResult {
                    outcome: ToolOutcome::failure(&e),
                    source: params.file.display_name(),
                    ..Default::default()
                }
            });
        to_response(&result)
    }

    /// Reduce the size of a PDF
    #[tool(
        description = "Compress PDF: reduce the file size of a PDF by recompressing streams, packing objects into object streams and dropping unreferenced objects. Reports original and compressed sizes. Returns compressed.pdf.

object_streams: \"generate\" (default, smallest), \"preserve\", or \"disable\"."
    )]
    async fn compress_pdf(&self, Parameters(params): Parameters<CompressPdfParams>) -> String {
        let result = self
            .process_compress_pdf(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "compress_pdf failed");
                CompressPdfResult {
                    outcome: ToolOutcome::failure(&e),
                    source: params.file.display_name(),
                    ..Default::default()
                }
            });
        to_response(&result)
    }

    /// Add password protection to a PDF
    #[tool(
        description = "Secure PDF: add password protection to a PDF using 256-bit AES encryption. Returns secured.pdf.

- password: required to open the document
- owner_password: required to change permissions (defaults to password)
- allow_print: \"full\", \"low\" (low resolution), or \"none\"
- allow_copy / allow_modify: text extraction and editing permissions"
    )]
    async fn secure_pdf(&self, Parameters(params): Parameters<SecurePdfParams>) -> String {
        let result = self
            .process_secure_pdf(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "secure_pdf failed");
                ProtectionResult {
                    outcome: ToolOutcome::failure(&e),
                    source: params.file.display_name(),
                    ..Default::default()
                }
            });
        to_response(&result)
    }

    /// Remove password protection from a PDF
    #[tool(
        description = "Remove password protection from an encrypted PDF. Requires the correct password. Returns unlocked.pdf."
    )]
    async fn unprotect_pdf(&self, Parameters(params): Parameters<UnprotectPdfParams>) -> String {
        let result = self
            .process_unprotect_pdf(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "unprotect_pdf failed");
                ProtectionResult {
                    outcome: ToolOutcome::failure(&e),
                    source: params.file.display_name(),
                    ..Default::default()
                }
            });
        to_response(&result)
    }

    /// Rasterize PDF pages
    #[tool(
        description = "PDF to Image: convert each page of a PDF into a PNG or JPEG image. Returns one entry per page with file_name (page-<n>.png), download_url (data URI), width and height.

- format: \"png\" (default) or \"jpeg\"
- pages: page range such as \"1-3,5\" (default: all pages)
- width: image width in pixels (default: 1200)"
    )]
    async fn pdf_to_image(&self, Parameters(params): Parameters<PdfToImageParams>) -> String {
        let result = self
            .process_pdf_to_image(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "pdf_to_image failed");
                PdfToImageResult {
                    outcome: ToolOutcome::failure(&e),
                    source: params.file.display_name(),
                    ..Default::default()
                }
            });
        to_response(&result)
    }

    /// Build a PDF from images
    #[tool(
        description = "Image to PDF: convert JPG, PNG and other image files into a single PDF, one page per image in the order given. Returns converted.pdf.

Set skip_unsupported to drop non-image files instead of rejecting the request."
    )]
    async fn image_to_pdf(&self, Parameters(params): Parameters<ImageToPdfParams>) -> String {
        let result = self
            .process_image_to_pdf(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "image_to_pdf failed");
                ImageToPdfResult {
                    outcome: ToolOutcome::failure(&e),
                    ..Default::default()
                }
            });
        to_response(&result)
    }

    /// Generate a fillable form from an image of a paper form
    #[tool(
        description = "AI Fillable Form: upload a photo or scan of a paper form and get a digital, fillable version. Returns form_schema (JSON Schema as a string), instructions, and form, the rendered fields with an HTML fragment. Submit answers with submit_form."
    )]
    async fn generate_fillable_form(
        &self,
        Parameters(params): Parameters<GenerateFormParams>,
    ) -> String {
        let result = self
            .process_generate_form(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "generate_fillable_form failed");
                GenerateFormResult {
                    outcome: ToolOutcome::failure(&e),
                    ..Default::default()
                }
            });
        to_response(&result)
    }

    /// Render a form schema
    #[tool(
        description = "Render a form schema (JSON string) into form fields: checkbox for booleans, radio buttons for up to three choices, a select for more, and text or number inputs otherwise. Returns status \"ready\" with fields and html, or status \"error\" when the schema cannot be parsed."
    )]
    async fn render_form(&self, Parameters(params): Parameters<RenderFormParams>) -> String {
        to_response(&self.renderer.render(&params.schema))
    }

    /// Validate a form submission
    #[tool(
        description = "Validate values submitted for a form schema. Returns the captured values (unknown keys removed, numbers coerced) and a pretty-printed copy, or field_errors with one message per invalid field."
    )]
    async fn submit_form(&self, Parameters(params): Parameters<SubmitFormParams>) -> String {
        let result = self.process_submit_form(&params).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "submit_form failed");
            SubmitFormResult {
                outcome: ToolOutcome::failure(&e),
                ..Default::default()
            }
        });
        to_response(&result)
    }
}

/// Run blocking PDF work off the async runtime
async fn run_blocking<T, F>(work: F) -> crate::error::Result<T>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Pdfium {
            reason: format!("Task join error: {}", e),
        })?
}

/// Report a bad page range against the parameter it came from
fn page_range_field(field: &'static str) -> impl Fn(Error) -> Error {
    move |e| match e {
        Error::InvalidPageRange { .. } => Error::invalid_field(field, e.client_message()),
        other => other,
    }
}

impl ToolkitServer {
    async fn resolve_source(&self, source: &FileSource) -> crate::error::Result<Upload> {
        let resolved = match source {
            FileSource::Path { path } => {
                let path = self.validate_path_access(path)?;
                resolve_path(path)
            }
            FileSource::Base64 {
                base64,
                file_name,
                mime_type,
            } => resolve_base64(base64, file_name.as_deref(), mime_type.as_deref()),
            FileSource::DataUri {
                data_uri,
                file_name,
            } => resolve_data_uri(data_uri, file_name.as_deref()),
            FileSource::Url { url } => {
                resolve_url(
                    url,
                    self.config.allow_private_urls,
                    self.config.max_download_bytes,
                )
                .await
            }
            FileSource::CacheRef { cache_key } => resolve_cache(cache_key, &self.cache),
        }?;

        tracing::debug!(
            source = %resolved.source_name,
            mime = %resolved.upload.mime_type,
            size = resolved.upload.size(),
            "resolved source"
        );
        Ok(resolved.upload)
    }

    /// Resolve a single PDF source and validate it under `field`
    async fn resolve_pdf(
        &self,
        source: &FileSource,
        field: &str,
        errors: &mut FieldErrors,
    ) -> crate::error::Result<Upload> {
        let upload = self.resolve_source(source).await?;
        validate_file(
            errors,
            field,
            &upload,
            &AcceptPattern::pdf(),
            self.config.max_upload_bytes,
        );
        Ok(upload)
    }

    /// Validate that a path is within allowed directories.
    /// If no allowed_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<std::path::PathBuf> {
        if self.config.allowed_dirs.is_empty() {
            return Ok(std::path::PathBuf::from(path));
        }

        let canonical = std::fs::canonicalize(path).map_err(|_| Error::PathAccessDenied {
            path: path.to_string(),
        })?;

        self.within_allowed_dirs(canonical, path)
    }

    /// Validate that an output path is within allowed directories.
    /// Canonicalizes the parent directory since the output file may not exist yet.
    fn validate_output_path_access(&self, path: &str) -> crate::error::Result<std::path::PathBuf> {
        if self.config.allowed_dirs.is_empty() {
            return Ok(std::path::PathBuf::from(path));
        }

        let path_obj = Path::new(path);
        let parent = path_obj.parent().unwrap_or(Path::new("."));
        let canonical_parent =
            std::fs::canonicalize(parent).map_err(|_| Error::PathAccessDenied {
                path: path.to_string(),
            })?;
        let canonical_target =
            canonical_parent.join(path_obj.file_name().unwrap_or(std::ffi::OsStr::new("")));

        self.within_allowed_dirs(canonical_target, path)
    }

    fn within_allowed_dirs(
        &self,
        canonical: std::path::PathBuf,
        requested: &str,
    ) -> crate::error::Result<std::path::PathBuf> {
        for dir in &self.config.allowed_dirs {
            if let Ok(canonical_dir) = std::fs::canonicalize(dir) {
                if canonical.starts_with(&canonical_dir) {
                    return Ok(canonical);
                }
            }
        }

        Err(Error::PathAccessDenied {
            path: requested.to_string(),
        })
    }

    /// Write output data to a file path, with sandbox validation.
    fn write_output(
        &self,
        output_path: &Option<String>,
        data: &[u8],
    ) -> crate::error::Result<Option<String>> {
        if let Some(ref path_str) = output_path {
            let path = self.validate_output_path_access(path_str)?;

            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            std::fs::write(&path, data)?;
            Ok(Some(path_str.clone()))
        } else {
            Ok(None)
        }
    }

    /// Requested width, defaulted and clamped to the configured maximum
    fn render_width(&self, requested: Option<u16>) -> u16 {
        requested
            .unwrap_or(DEFAULT_RENDER_WIDTH)
            .clamp(1, self.config.max_render_width.max(1))
    }

    /// Encode, cache and optionally save a produced file
    fn store_output(
        &self,
        file_name: &str,
        mime_type: &str,
        data: Vec<u8>,
        output_path: &Option<String>,
    ) -> crate::error::Result<OutputFile> {
        let output_path = self.write_output(output_path, &data)?;
        let download_url = data_uri::encode(mime_type, &data);
        let size = data.len();
        let output_cache_key = self
            .cache
            .insert(CachedFile::new(file_name, mime_type, data));

        Ok(OutputFile {
            file_name: file_name.to_string(),
            download_url,
            size,
            output_cache_key,
            output_path,
        })
    }

    async fn process_merge_pdfs(
        &self,
        params: &MergePdfsParams,
    ) -> crate::error::Result<MergePdfsResult> {
        let mut errors = FieldErrors::new();
        if params.files.len() < 2 {
            errors.add("files", "Please upload at least two PDF files.");
        }

        let mut inputs = Vec::with_capacity(params.files.len());
        for source in &params.files {
            inputs.push(self.resolve_pdf(source, "files", &mut errors).await?.data);
        }
        errors.into_result()?;

        let (output_data, output_page_count) = run_blocking(move || {
            let refs: Vec<&[u8]> = inputs.iter().map(Vec::as_slice).collect();
            let output_data = PdfEditor::merge(&refs)?;
            let output_page_count = PdfEditor::page_count(&output_data, None)?;
            Ok((output_data, output_page_count))
        })
        .await?;

        let output = self.store_output("merged.pdf", PDF_MIME, output_data, &params.output_path)?;

        Ok(MergePdfsResult {
            outcome: ToolOutcome::success(),
            source_count: params.files.len() as u32,
            output_page_count,
            output: Some(output),
        })
    }

    async fn process_split_pdf(
        &self,
        params: &SplitPdfParams,
    ) -> crate::error::Result<SplitPdfResult> {
        let mut errors = FieldErrors::new();
        let upload = self.resolve_pdf(&params.file, "file", &mut errors).await?;
        if params.page_range.trim().is_empty() {
            errors.add("page_range", "Please enter the pages to extract.");
        }
        errors.into_result()?;

        let data = upload.data;
        let page_range = params.page_range.clone();
        let password = params.password.clone();

        let (output_data, output_page_count) = run_blocking(move || {
            let total = PdfEditor::page_count(&data, password.as_deref())?;
            let pages =
                parse_page_range(&page_range, total).map_err(page_range_field("page_range"))?;
            let output_data = PdfEditor::extract_pages(&data, &pages, password.as_deref())?;
            Ok((output_data, pages.len() as u32))
        })
        .await?;

        let output = self.store_output("split.pdf", PDF_MIME, output_data, &params.output_path)?;

        Ok(SplitPdfResult {
            outcome: ToolOutcome::success(),
            source: params.file.display_name(),
            output_page_count,
            output: Some(output),
        })
    }

    async fn process_compress_pdf(
        &self,
        params: &CompressPdfParams,
    ) -> crate::error::Result<CompressPdfResult> {
        let mut errors = FieldErrors::new();
        let upload = self.resolve_pdf(&params.file, "file", &mut errors).await?;
        errors.into_result()?;

        let original_size = upload.size();
        let data = upload.data;
        let password = params.password.clone();
        let object_streams = params.object_streams;

        let output_data = run_blocking(move || {
            PdfEditor::compress(&data, password.as_deref(), object_streams)
        })
        .await?;

        let compressed_size = output_data.len();
        let compression_ratio = if original_size > 0 {
            compressed_size as f32 / original_size as f32
        } else {
            1.0
        };
        let bytes_saved = original_size as i64 - compressed_size as i64;

        let output =
            self.store_output("compressed.pdf", PDF_MIME, output_data, &params.output_path)?;

        Ok(CompressPdfResult {
            outcome: ToolOutcome::success(),
            source: params.file.display_name(),
            original_size,
            compressed_size,
            compression_ratio,
            bytes_saved,
            output: Some(output),
        })
    }

    async fn process_secure_pdf(
        &self,
        params: &SecurePdfParams,
    ) -> crate::error::Result<ProtectionResult> {
        let mut errors = FieldErrors::new();
        let upload = self.resolve_pdf(&params.file, "file", &mut errors).await?;
        if params.password.trim().is_empty() {
            errors.add("password", "A password is required.");
        }
        errors.into_result()?;

        let data = upload.data;
        let protection = Protection {
            user_password: params.password.clone(),
            owner_password: params
                .owner_password
                .clone()
                .filter(|p| !p.trim().is_empty()),
            print: params.allow_print,
            allow_copy: params.allow_copy,
            allow_modify: params.allow_modify,
        };
        let source_password = params.source_password.clone();

        let (output_data, output_page_count) = run_blocking(move || {
            let output_data = PdfEditor::encrypt(&data, &protection, source_password.as_deref())?;
            let output_page_count =
                PdfEditor::page_count(&output_data, Some(protection.user_password.as_str()))?;
            Ok((output_data, output_page_count))
        })
        .await?;

        let output = self.store_output("secured.pdf", PDF_MIME, output_data, &params.output_path)?;

        Ok(ProtectionResult {
            outcome: ToolOutcome::success(),
            source: params.file.display_name(),
            output_page_count,
            output: Some(output),
        })
    }

    async fn process_unprotect_pdf(
        &self,
        params: &UnprotectPdfParams,
    ) -> crate::error::Result<ProtectionResult> {
        let mut errors = FieldErrors::new();
        let upload = self.resolve_pdf(&params.file, "file", &mut errors).await?;
        if params.password.trim().is_empty() {
            errors.add("password", "A password is required.");
        }
        errors.into_result()?;

        let data = upload.data;
        let password = params.password.clone();

        let (output_data, output_page_count) = run_blocking(move || {
            let output_data = PdfEditor::decrypt(&data, &password)?;
            let output_page_count = PdfEditor::page_count(&output_data, None)?;
            Ok((output_data, output_page_count))
        })
        .await?;

        let output = self.store_output("unlocked.pdf", PDF_MIME, output_data, &params.output_path)?;

        Ok(ProtectionResult {
            outcome: ToolOutcome::success(),
            source: params.file.display_name(),
            output_page_count,
            output: Some(output),
        })
    }

    async fn process_pdf_to_image(
        &self,
        params: &PdfToImageParams,
    ) -> crate::error::Result<PdfToImageResult> {
        let mut errors = FieldErrors::new();
        let upload = self.resolve_pdf(&params.file, "file", &mut errors).await?;
        errors.into_result()?;

        let data = upload.data;
        let password = params.password.clone();
        let pages_param = params.pages.clone().filter(|p| !p.trim().is_empty());
        let format = params.format;
        let width = self.render_width(params.width);

        let rendered = run_blocking(move || {
            let total = PdfEditor::page_count(&data, password.as_deref())?;
            let pages = match pages_param {
                Some(range) => {
                    parse_page_range(&range, total).map_err(page_range_field("pages"))?
                }
                None => (1..=total).collect(),
            };
            render_pages(&data, password.as_deref(), &pages, width, format)
        })
        .await?;

        let images = rendered
            .into_iter()
            .map(|page| {
                let file_name = format!("page-{}.{}", page.page, format.extension());
                let download_url = data_uri::encode(format.mime_type(), &page.data);
                let output_cache_key = self.cache.insert(CachedFile::new(
                    file_name.clone(),
                    format.mime_type(),
                    page.data,
                ));
                PageImage {
                    page: page.page,
                    file_name,
                    download_url,
                    width: page.width,
                    height: page.height,
                    output_cache_key,
                }
            })
            .collect();

        Ok(PdfToImageResult {
            outcome: ToolOutcome::success(),
            source: params.file.display_name(),
            images,
        })
    }

    async fn process_image_to_pdf(
        &self,
        params: &ImageToPdfParams,
    ) -> crate::error::Result<ImageToPdfResult> {
        let accept = AcceptPattern::images();
        let mut uploads = Vec::with_capacity(params.files.len());
        for source in &params.files {
            uploads.push(self.resolve_source(source).await?);
        }
        if params.skip_unsupported {
            uploads = filter_accepted(uploads, &accept);
        }

        let mut errors = FieldErrors::new();
        if uploads.is_empty() {
            errors.add("files", "Please upload at least one image.");
        }
        for upload in &uploads {
            validate_file(
                &mut errors,
                "files",
                upload,
                &accept,
                self.config.max_upload_bytes,
            );
        }
        errors.into_result()?;

        let image_count = uploads.len() as u32;
        let output_data = run_blocking(move || {
            let refs: Vec<&[u8]> = uploads.iter().map(|u| u.data.as_slice()).collect();
            images_to_pdf(&refs)
        })
        .await?;

        let output =
            self.store_output("converted.pdf", PDF_MIME, output_data, &params.output_path)?;

        Ok(ImageToPdfResult {
            outcome: ToolOutcome::success(),
            image_count,
            output: Some(output),
        })
    }

    async fn process_generate_form(
        &self,
        params: &GenerateFormParams,
    ) -> crate::error::Result<GenerateFormResult> {
        let upload = self.resolve_source(&params.image).await?;
        let mut errors = FieldErrors::new();
        if upload.data.is_empty() {
            errors.add("image", "An image is required.");
        } else {
            validate_file(
                &mut errors,
                "image",
                &upload,
                &AcceptPattern::images(),
                self.config.max_upload_bytes,
            );
        }
        errors.into_result()?;

        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| Error::GeneratorUnavailable {
                reason: "no form generator configured".to_string(),
            })?;

        let image_uri = data_uri::encode(&upload.mime_type, &upload.data);
        let generated = generator.generate(&image_uri).await?;
        let form = self.renderer.render(&generated.form_schema);

        Ok(GenerateFormResult {
            outcome: ToolOutcome::success(),
            form_schema: Some(generated.form_schema),
            instructions: Some(generated.instructions),
            form: Some(form),
        })
    }

    fn process_submit_form(
        &self,
        params: &SubmitFormParams,
    ) -> crate::error::Result<SubmitFormResult> {
        let schema = FormSchema::parse(&params.schema)?;
        let values = schema
            .validate(&params.values)
            .map_err(|errors| Error::Validation { errors })?;
        let display = serde_json::to_string_pretty(&values)?;

        Ok(SubmitFormResult {
            outcome: ToolOutcome::with_message(SUBMITTED_MESSAGE),
            values: Some(values),
            display: Some(display),
        })
    }
}

#[tool_handler]
impl ServerHandler for ToolkitServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!("{}\n\n{}", TOOL_CATALOG, SOURCE_FORMAT)),
        }
    }
}

/// Run the MCP server with default configuration
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::default()).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    let server = ToolkitServer::with_config(config)?;

    tracing::info!("PDF Toolkit MCP Server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
