//! PDF Toolkit MCP Server Library
//!
//! This crate provides MCP tools for everyday PDF work:
//! - `merge_pdfs`, `split_pdf`, `compress_pdf`: page-level editing
//! - `secure_pdf`, `unprotect_pdf`: AES-256 password protection
//! - `pdf_to_image`, `image_to_pdf`: conversion between PDFs and images
//! - `generate_fillable_form`, `render_form`, `submit_form`: AI-generated fillable forms

pub mod config;
pub mod error;
pub mod form;
pub mod generate;
pub mod pdf;
pub mod server;
pub mod source;
pub mod upload;

pub use config::{GeneratorConfig, ServerConfig};
pub use error::{Error, Result};
pub use server::{run_server, run_server_with_config, ToolkitServer};
