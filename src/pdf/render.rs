//! PDFium-backed conversions: PDF pages to raster images and images to PDF pages

use crate::error::{Error, Result};
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Longest page side, in points, for pages built from images (A4 height)
pub const MAX_PAGE_SIDE_PT: f32 = 842.0;

/// Raster output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

impl RasterFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            RasterFormat::Png => ImageFormat::Png,
            RasterFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// One rasterized page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Page number (1-indexed)
    pub page: u32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Bind PDFium. A new instance per call, PDFium is not thread-safe.
fn create_pdfium() -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

fn map_pdfium_error(err: PdfiumError) -> Error {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            Error::PasswordRequired
        }
        _ => Error::Pdfium {
            reason: err.to_string(),
        },
    }
}

/// Encode an image, flattening alpha for formats without it
fn encode_image(image: &DynamicImage, format: RasterFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut bytes);
    match format {
        RasterFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut cursor, format.image_format())?,
        RasterFormat::Png => image.write_to(&mut cursor, format.image_format())?,
    }
    Ok(bytes)
}

/// Rasterize the given 1-indexed pages at `width` pixels wide
pub fn render_pages(
    data: &[u8],
    password: Option<&str>,
    pages: &[u32],
    width: u16,
    format: RasterFormat,
) -> Result<Vec<RenderedPage>> {
    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(data, password)
        .map_err(map_pdfium_error)?;

    let doc_pages = document.pages();
    let total = doc_pages.len() as u32;
    let config = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .render_form_data(true)
        .render_annotations(true);

    let mut rendered = Vec::with_capacity(pages.len());
    for &page_num in pages {
        if page_num < 1 || page_num > total {
            return Err(Error::PageOutOfBounds {
                page: page_num,
                total,
            });
        }

        let page = doc_pages
            .get((page_num - 1) as u16)
            .map_err(map_pdfium_error)?;
        let bitmap = page.render_with_config(&config).map_err(|e| Error::Pdfium {
            reason: format!("Failed to render page {}: {}", page_num, e),
        })?;

        let image = bitmap.as_image();
        rendered.push(RenderedPage {
            page: page_num,
            width: image.width(),
            height: image.height(),
            data: encode_image(&image, format)?,
        });
    }

    Ok(rendered)
}

/// Page size in points for an image: pixel size, scaled down to fit [`MAX_PAGE_SIDE_PT`]
pub fn page_size_for(width_px: u32, height_px: u32) -> (f32, f32) {
    let (w, h) = (width_px.max(1) as f32, height_px.max(1) as f32);
    let longest = w.max(h);
    if longest <= MAX_PAGE_SIDE_PT {
        (w, h)
    } else {
        let scale = MAX_PAGE_SIDE_PT / longest;
        (w * scale, h * scale)
    }
}

/// Build a PDF with one page per image, in order, each image filling its page
pub fn images_to_pdf(images: &[&[u8]]) -> Result<Vec<u8>> {
    if images.is_empty() {
        return Err(Error::Pdfium {
            reason: "No images provided".to_string(),
        });
    }

    let pdfium = create_pdfium()?;
    let mut document = pdfium.create_new_pdf().map_err(map_pdfium_error)?;

    for (i, bytes) in images.iter().enumerate() {
        let image = image::load_from_memory(bytes)?;
        let (width, height) = page_size_for(image.width(), image.height());
        let (width, height) = (PdfPoints::new(width), PdfPoints::new(height));

        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::from_points(width, height))
            .map_err(map_pdfium_error)?;
        page.objects_mut()
            .create_image_object(
                PdfPoints::ZERO,
                PdfPoints::ZERO,
                &image,
                Some(width),
                Some(height),
            )
            .map_err(|e| Error::Pdfium {
                reason: format!("Failed to embed image {}: {}", i + 1, e),
            })?;
    }

    document.save_to_bytes().map_err(map_pdfium_error)
}
