//! PDF processing layer
//!
//! qpdf handles page-level editing and encryption, PDFium handles
//! rasterizing pages and embedding images.

mod page_range;
mod qpdf;
mod render;

pub use self::qpdf::{ObjectStreams, PdfEditor, PrintLevel, Protection};
pub use page_range::parse_page_range;
pub use render::{
    images_to_pdf, page_size_for, render_pages, RasterFormat, RenderedPage, MAX_PAGE_SIDE_PT,
};
