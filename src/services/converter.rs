//! Turns validated PDF bytes into the per-page tensors the classifier consumes.

use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage, RgbaImage};
use pdfium_render::prelude::{PdfRenderConfig, Pdfium, PdfiumError};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::ModelInput;

/// Converts raw document bytes into a [`ModelInput`]. Implementations are
/// synchronous and CPU-bound; callers run them on the blocking pool.
pub trait DocumentConverter: Send + Sync {
    fn to_model_input(&self, document: &[u8]) -> AppResult<ModelInput>;
}

/// Resize and per-channel normalization applied to every rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageTransform {
    pub image_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for PageTransform {
    fn default() -> Self {
        Self {
            image_size: 224,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }
}

impl PageTransform {
    pub fn with_image_size(image_size: u32) -> Self {
        Self {
            image_size,
            ..Self::default()
        }
    }

    /// Produces a `3 x size x size` tensor in CHW order.
    pub fn apply(&self, page: &RgbImage) -> AppResult<Tensor> {
        let size = self.image_size;
        let resized = imageops::resize(page, size, size, FilterType::Triangle);

        let side = size as usize;
        let plane = side * side;
        let mut data = vec![0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let offset = y as usize * side + x as usize;
            for channel in 0..3 {
                let value = pixel.0[channel] as f32 / 255.0;
                data[channel * plane + offset] = (value - self.mean[channel]) / self.std[channel];
            }
        }

        Tensor::from_vec(data, (3, side, side), &Device::Cpu)
            .map_err(|e| AppError::conversion(format!("Failed to build page tensor: {}", e)))
    }
}

/// Renders PDF pages with Pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumConverter {
    transform: PageTransform,
    library_path: Option<PathBuf>,
}

impl PdfiumConverter {
    pub fn new(transform: PageTransform) -> Self {
        Self {
            transform,
            library_path: None,
        }
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    fn load_pdfium(&self) -> Result<Pdfium, PdfiumError> {
        if let Some(path) = &self.library_path {
            return bind_from_path(path);
        }
        match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")) {
            Ok(bindings) => Ok(Pdfium::new(bindings)),
            Err(local_err) => match Pdfium::bind_to_system_library() {
                Ok(bindings) => Ok(Pdfium::new(bindings)),
                Err(_) => Err(local_err),
            },
        }
    }
}

fn bind_from_path(path: &Path) -> Result<Pdfium, PdfiumError> {
    let library = if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    };
    Pdfium::bind_to_library(library).map(Pdfium::new)
}

impl DocumentConverter for PdfiumConverter {
    fn to_model_input(&self, document: &[u8]) -> AppResult<ModelInput> {
        let pdfium = self
            .load_pdfium()
            .map_err(|e| AppError::conversion(format!("Failed to load Pdfium runtime: {}", e)))?;
        let pdf = pdfium
            .load_pdf_from_byte_slice(document, None)
            .map_err(|e| AppError::conversion(format!("Failed to load PDF document: {}", e)))?;

        let render_config = PdfRenderConfig::new();
        let mut pages = Vec::with_capacity(pdf.pages().len() as usize);

        for (page_index, page) in pdf.pages().iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                AppError::conversion(format!("Failed to render page {}: {}", page_index, e))
            })?;

            let width = bitmap.width() as u32;
            let height = bitmap.height() as u32;
            let rgba = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes()).ok_or_else(|| {
                AppError::conversion(format!("Page {} bitmap has unexpected size", page_index))
            })?;
            let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

            debug!(page_index, width, height, "Rendered page");
            pages.push(self.transform.apply(&rgb)?);
        }

        if pages.is_empty() {
            return Err(AppError::conversion("Document has no pages"));
        }

        info!(pages = pages.len(), "Converted document to model input");
        Ok(ModelInput::new(pages))
    }
}
