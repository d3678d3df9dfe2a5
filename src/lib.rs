//! # invoice-vision
//!
//! Extract structured invoice data from PDFs and images using multimodal
//! LLMs.
//!
//! ## Why this crate?
//!
//! Template- and OCR-based invoice extractors break the moment a vendor
//! changes their layout, and they never handled photographed receipts
//! well to begin with. This crate sidesteps layout entirely: it rasterises
//! the document into a single JPEG and lets a vision model read it as a
//! human would, returning a fixed-schema JSON record that downstream code
//! can rely on — every field always present, always a string.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / image bytes
//!  │
//!  ├─ 1. Raster    first page → JPEG under the payload budget
//!  │               (pdfium, CPU-bound, spawn_blocking)
//!  ├─ 2. Provider  one-shot call to Anthropic, falling over to Gemini
//!  ├─ 3. Parse     tolerant JSON recovery (fences, prose, truncation)
//!  └─ 4. Coerce    total mapping onto the fixed InvoiceRecord schema
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_vision::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Providers auto-detected from ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let bytes = std::fs::read("invoice.pdf")?;
//!     let result = extract(bytes, Some("application/pdf"), Some("invoice.pdf"), &config).await?;
//!     println!("{} — {} {}",
//!         result.record.invoice_no,
//!         result.record.amount,
//!         result.record.currency);
//!     eprintln!("provider: {}, {} ms total",
//!         result.provider_id, result.stats.total_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Provider Fallback
//!
//! When both credentials are configured, Anthropic is primary and Gemini
//! is the fallback; a lone Gemini key makes Gemini primary. Attempts are
//! strictly sequential and each provider is tried at most once per
//! document — the recovery story for a transient failure is "ask someone
//! else", not "ask again". Failed attempts are recorded and surfaced on
//! both the success path ([`Extraction::failed_attempts`]) and the
//! exhaustion error ([`ExtractError::AllProvidersFailed`]).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod prompts;
pub mod record;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{ExtractError, ProviderFailure};
pub use extract::{extract, extract_batch, Document, Extraction, ExtractionStats};
pub use pipeline::provider::{AnthropicClient, GeminiClient, ProviderClient, ProviderResult};
pub use pipeline::raster::RasterImage;
pub use record::{coerce, InvoiceRecord, LineItem};
