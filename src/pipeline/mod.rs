//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements exactly one transformation step. Keeping the
//! stages separate makes each independently testable and lets us swap an
//! implementation (e.g. a new provider backend) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! raster ──▶ provider ──▶ parse
//! (pdfium/   (Anthropic/   (tolerant JSON
//!  image)     Gemini)       recovery)
//! ```
//!
//! 1. [`raster`]   — normalise PDF or image bytes into one base64 JPEG;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 2. [`provider`] — one-shot multimodal API calls behind the
//!    [`provider::ProviderClient`] trait; the only stage with network I/O
//! 3. [`parse`]    — pull a JSON object out of whatever text the model
//!    returned, repairing fences and truncation

pub mod parse;
pub mod provider;
pub mod raster;
