//! Document-to-image normalisation: PDF/image bytes → base64 JPEG under a
//! byte budget.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with internal state that must not run on Tokio
//! worker threads, and image decode/resize of a scanned page is CPU-heavy.
//! The whole blocking path runs on the dedicated blocking pool.
//!
//! ## Why JPEG, and why a quality ladder?
//!
//! Provider APIs bill and bound by payload size, and the transport boundary
//! rejects payloads over ~5 MB outright. The ladder re-encodes at
//! progressively smaller long edges and lower qualities until the estimated
//! decoded size fits the ~700 KB target; the last rung is accepted
//! regardless (the target is best-effort, the hard cap is enforced at the
//! transport boundary). The min-width floor protects dense glyph text —
//! a narrow CJK receipt scaled purely by its long edge becomes unreadable.

use crate::error::ExtractError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use pdfium_render::prelude::*;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Best-effort decoded-size target for the normalised image.
pub const TARGET_IMAGE_BYTES: usize = 700 * 1024;

/// Hard cap enforced at the transport boundary before any provider call.
pub const HARD_PAYLOAD_CAP: usize = 5 * 1024 * 1024;

/// Fixed rasterisation scale for the PDF path (page points × 2).
pub const PDF_RENDER_SCALE: f32 = 2.0;

/// Re-encode attempts: (long-edge cap, min-width floor, JPEG quality),
/// tried in order until the estimate fits [`TARGET_IMAGE_BYTES`].
const ENCODE_LADDER: [(u32, u32, u8); 5] = [
    (2200, 1500, 85),
    (1800, 1300, 78),
    (1600, 1200, 70),
    (1400, 1050, 62),
    (1200, 900, 55),
];

/// A normalised raster image ready for a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    /// Base64-encoded JPEG bytes.
    pub data: String,
    /// Always `"image/jpeg"` — the budget ladder re-encodes every input.
    pub media_type: &'static str,
}

impl RasterImage {
    /// Estimated decoded byte size (base64 length × 3⁄4).
    pub fn decoded_size_estimate(&self) -> usize {
        self.data.len() * 3 / 4
    }
}

// ── Format detection ─────────────────────────────────────────────────────

/// Recognised source document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Jpeg,
    Png,
    Webp,
    Gif,
}

/// Resolve the source format from the declared MIME type and/or filename.
///
/// The declared MIME type wins; a missing or generic one falls back to the
/// file extension. Anything unrecognised defaults to JPEG with
/// `guessed = true` — detection never rejects, a downstream decode failure
/// is the actual error signal.
pub fn detect_format(declared_mime: Option<&str>, filename: Option<&str>) -> (SourceFormat, bool) {
    if let Some(mime) = declared_mime.map(str::trim).filter(|m| !m.is_empty()) {
        match mime.to_ascii_lowercase().as_str() {
            "application/pdf" => return (SourceFormat::Pdf, false),
            "image/jpeg" | "image/jpg" => return (SourceFormat::Jpeg, false),
            "image/png" => return (SourceFormat::Png, false),
            "image/webp" => return (SourceFormat::Webp, false),
            "image/gif" => return (SourceFormat::Gif, false),
            // Generic container types carry no information; fall through
            // to the extension.
            "application/octet-stream" | "binary/octet-stream" => {}
            _ => {}
        }
    }

    if let Some(ext) = filename.and_then(|f| f.rsplit('.').next()) {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => return (SourceFormat::Pdf, false),
            "jpg" | "jpeg" => return (SourceFormat::Jpeg, false),
            "png" => return (SourceFormat::Png, false),
            "webp" => return (SourceFormat::Webp, false),
            "gif" => return (SourceFormat::Gif, false),
            _ => {}
        }
    }

    (SourceFormat::Jpeg, true)
}

// ── Entry point ──────────────────────────────────────────────────────────

/// Normalise an input document into a [`RasterImage`].
///
/// Runs the whole decode/render/re-encode path inside `spawn_blocking`.
///
/// # Errors
/// - [`ExtractError::UnsupportedFormat`] when a guessed format fails to decode
/// - [`ExtractError::RenderFailure`] when a declared format fails to decode
///   or the PDF page cannot be rasterised
/// - [`ExtractError::PdfEngine`] when pdfium cannot be bound at all
pub async fn rasterize(
    bytes: Vec<u8>,
    declared_mime: Option<&str>,
    filename: Option<&str>,
) -> Result<RasterImage, ExtractError> {
    let (format, guessed) = detect_format(declared_mime, filename);
    debug!(?format, guessed, size = bytes.len(), "rasterising document");

    tokio::task::spawn_blocking(move || rasterize_blocking(&bytes, format, guessed))
        .await
        .map_err(|e| ExtractError::Internal(format!("raster task panicked: {e}")))?
}

/// Blocking implementation of document normalisation.
fn rasterize_blocking(
    bytes: &[u8],
    format: SourceFormat,
    guessed: bool,
) -> Result<RasterImage, ExtractError> {
    let flattened = match format {
        SourceFormat::Pdf => render_pdf_first_page(bytes)?,
        _ => decode_image(bytes, guessed)?,
    };
    encode_under_budget(&flattened)
}

// ── PDF path ─────────────────────────────────────────────────────────────

/// Process-wide pdfium binding, initialised once on first use.
///
/// Concurrent first callers block on the same in-flight initialisation; a
/// binding failure is cached and re-reported rather than re-attempted.
fn engine() -> Result<&'static Pdfium, ExtractError> {
    static ENGINE: OnceLock<Result<Pdfium, String>> = OnceLock::new();
    ENGINE
        .get_or_init(|| {
            let bindings = match std::env::var("PDFIUM_LIB_PATH") {
                Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path).or_else(|_| {
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&path))
                }),
                _ => {
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                        .or_else(|_| Pdfium::bind_to_system_library())
                }
            };
            bindings.map(Pdfium::new).map_err(|e| format!("{e:?}"))
        })
        .as_ref()
        .map_err(|e| ExtractError::PdfEngine(e.clone()))
}

/// Render the first page of a PDF at the fixed 2.0× scale.
fn render_pdf_first_page(bytes: &[u8]) -> Result<RgbImage, ExtractError> {
    let pdfium = engine()?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ExtractError::RenderFailure {
            detail: format!("could not open PDF: {e:?}"),
        })?;

    let pages = document.pages();
    let page = pages.get(0).map_err(|e| ExtractError::RenderFailure {
        detail: format!("PDF has no readable first page: {e:?}"),
    })?;

    let render_config = PdfRenderConfig::new().scale_page_by_factor(PDF_RENDER_SCALE);
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ExtractError::RenderFailure {
            detail: format!("rasterisation failed: {e:?}"),
        })?;

    let image = bitmap.as_image();
    debug!(
        width = image.width(),
        height = image.height(),
        "rendered PDF first page"
    );

    Ok(flatten_onto_white(&image))
}

// ── Image path ───────────────────────────────────────────────────────────

/// Decode an image input at native dimensions.
///
/// Decoding sniffs the actual content — a mislabelled PNG in a `.jpg` file
/// still decodes. The declared format only routed us away from the PDF path.
fn decode_image(bytes: &[u8], guessed: bool) -> Result<RgbImage, ExtractError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| {
        if guessed {
            ExtractError::UnsupportedFormat {
                detail: format!("input is neither a recognised image nor a PDF: {e}"),
            }
        } else {
            ExtractError::RenderFailure {
                detail: format!("image decode failed: {e}"),
            }
        }
    })?;
    Ok(flatten_onto_white(&decoded))
}

/// Flatten transparency onto an opaque white canvas.
///
/// Transparent PNG/WebP regions otherwise decode to black, turning a
/// white-background invoice into dark noise the model cannot read.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let a = px[3] as u32;
        let blend = |c: u8| (((c as u32) * a + 255 * (255 - a)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}

// ── Smart resize + size budget ───────────────────────────────────────────

/// Compute target dimensions for one ladder rung. Downscale only.
///
/// Portrait: scale so the height meets the long-edge cap, but never let the
/// width drop below the min-width floor. Landscape: scale by the width cap
/// alone.
fn smart_resize_dims(width: u32, height: u32, long_edge: u32, min_width: u32) -> (u32, u32) {
    let (w, h) = (width as f64, height as f64);
    let portrait = height >= width;

    let scale = if portrait {
        if height <= long_edge {
            1.0
        } else {
            let by_cap = long_edge as f64 / h;
            if w * by_cap < min_width as f64 {
                (min_width as f64 / w).min(1.0)
            } else {
                by_cap
            }
        }
    } else if width <= long_edge {
        1.0
    } else {
        long_edge as f64 / w
    };

    if scale >= 1.0 {
        (width, height)
    } else {
        (
            ((w * scale).round() as u32).max(1),
            ((h * scale).round() as u32).max(1),
        )
    }
}

/// Encode the flattened image as JPEG, walking the quality ladder until the
/// decoded-size estimate fits the target. The last rung always wins.
fn encode_under_budget(img: &RgbImage) -> Result<RasterImage, ExtractError> {
    let (width, height) = (img.width(), img.height());
    let last = ENCODE_LADDER.len() - 1;

    for (i, &(long_edge, min_width, quality)) in ENCODE_LADDER.iter().enumerate() {
        let (tw, th) = smart_resize_dims(width, height, long_edge, min_width);
        let resized;
        let target: &RgbImage = if (tw, th) == (width, height) {
            img
        } else {
            resized = image::imageops::resize(img, tw, th, image::imageops::FilterType::CatmullRom);
            &resized
        };

        let jpeg = encode_jpeg(target, quality)?;
        debug!(
            rung = i,
            width = tw,
            height = th,
            quality,
            bytes = jpeg.len(),
            "encoded raster candidate"
        );

        if jpeg.len() <= TARGET_IMAGE_BYTES || i == last {
            if jpeg.len() > TARGET_IMAGE_BYTES {
                warn!(
                    bytes = jpeg.len(),
                    target = TARGET_IMAGE_BYTES,
                    "accepting final ladder rung over the size target"
                );
            }
            return Ok(RasterImage {
                data: STANDARD.encode(&jpeg),
                media_type: "image/jpeg",
            });
        }
    }

    unreachable!("ladder always accepts its last rung")
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, ExtractError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode_image(img)
        .map_err(|e| ExtractError::RenderFailure {
            detail: format!("JPEG encoding failed: {e}"),
        })?;
    Ok(buf)
}

// ── Tests ────────────────────────────────────────────────────────────────
