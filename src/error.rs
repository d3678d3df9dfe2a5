//! Error types for the invoice-vision library.
//!
//! Two distinct shapes reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the pipeline cannot produce a record for
//!   this document (undecodable input, no provider configured, every
//!   provider failed, unparseable model output). Returned as
//!   `Err(ExtractError)` from the top-level `extract*` functions.
//!
//! * [`ProviderFailure`] — **Per-attempt**: one provider attempt failed.
//!   These are not surfaced directly; the orchestrator converts each into
//!   the next fallback attempt and only ever exposes them collected inside
//!   [`ExtractError::AllProvidersFailed`] (and on the success value's
//!   attempt list, so callers can see that a fallback happened).
//!
//! Parser errors carry a truncated excerpt of the raw model text so a caller
//! can show the unparsed output for manual recovery without re-running the
//! pipeline.

use std::fmt;
use thiserror::Error;

/// Maximum length of the raw-text excerpt attached to parser errors.
pub const RAW_EXCERPT_LEN: usize = 280;

/// All fatal errors returned by the invoice-vision library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Rasteriser errors ─────────────────────────────────────────────────
    /// The input bytes could not be decoded as any supported document type.
    ///
    /// Raised when format detection had to guess (no recognised MIME type or
    /// extension) and the guess failed to decode — the input was genuinely
    /// neither a recognised image nor a PDF.
    #[error("Unsupported document format: {detail}\nSupported inputs: PDF, JPEG, PNG, WebP, GIF.")]
    UnsupportedFormat { detail: String },

    /// Page rasterisation or image decoding failed on a recognised format.
    #[error("Failed to rasterise document: {detail}")]
    RenderFailure { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Place the pdfium shared library next to the executable.\n\
  • Install pdfium as a system library.\n"
    )]
    PdfEngine(String),

    /// The normalised image exceeds the transport boundary's hard cap.
    ///
    /// Checked before any provider is invoked, so callers never pay for a
    /// request that the backend would reject.
    #[error("Image payload is {size} bytes, exceeding the {limit}-byte transport limit")]
    PayloadTooLarge { size: usize, limit: usize },

    // ── Orchestrator errors ───────────────────────────────────────────────
    /// No provider credential is configured.
    ///
    /// Raised before rasterisation: there is no point normalising an image
    /// nobody can be asked about.
    #[error(
        "No AI provider is configured.\n\
Set ANTHROPIC_API_KEY or GEMINI_API_KEY, or supply credentials on the config."
    )]
    NoProviderConfigured,

    /// Every configured provider failed for this document.
    ///
    /// `attempts` holds one [`ProviderFailure`] per provider, in attempt
    /// order; the Display output lists each provider's reason so no failure
    /// is silently dropped.
    #[error("All providers failed: {}", format_attempts(attempts))]
    AllProvidersFailed { attempts: Vec<ProviderFailure> },

    // ── Parser errors ─────────────────────────────────────────────────────
    /// No JSON object could be extracted from the model output, even after
    /// truncation repair.
    #[error("No parseable JSON object in model response: {detail}\nRaw text (excerpt): {raw_excerpt}")]
    NoJsonFound { detail: String, raw_excerpt: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Build a parser error, truncating the raw text to a displayable excerpt.
    pub fn no_json(detail: impl Into<String>, raw_text: &str) -> Self {
        ExtractError::NoJsonFound {
            detail: detail.into(),
            raw_excerpt: excerpt(raw_text),
        }
    }
}

/// Truncate raw model text for inclusion in an error message.
///
/// Cuts on a char boundary so multi-byte (e.g. CJK) output never panics.
pub fn excerpt(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() <= RAW_EXCERPT_LEN {
        return trimmed.to_string();
    }
    let mut end = RAW_EXCERPT_LEN;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}

fn format_attempts(attempts: &[ProviderFailure]) -> String {
    if attempts.is_empty() {
        return "(no providers attempted)".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// One failed provider attempt.
///
/// Collected by the orchestrator across the fallback chain. Serialisable so
/// callers can persist or display attempt histories.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderFailure {
    /// Stable provider identifier, e.g. `"anthropic"` or `"gemini"`.
    pub provider_id: String,
    /// HTTP status of the failed response, if the failure was transport-level.
    pub http_status: Option<u16>,
    /// Human-readable reason.
    pub message: String,
}

impl ProviderFailure {
    pub fn new(provider_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            http_status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.http_status {
            Some(code) => write!(f, "{}: HTTP {} — {}", self.provider_id, code, self.message),
            None => write!(f, "{}: {}", self.provider_id, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_providers_failed_lists_every_attempt() {
        let e = ExtractError::AllProvidersFailed {
            attempts: vec![
                ProviderFailure::new("anthropic", "overloaded").with_status(529),
                ProviderFailure::new("gemini", "blocked by safety filter"),
            ],
        };
        let msg = e.to_string();
        assert!(msg.contains("anthropic"), "got: {msg}");
        assert!(msg.contains("HTTP 529"), "got: {msg}");
        assert!(msg.contains("gemini"), "got: {msg}");
        assert!(msg.contains("safety"), "got: {msg}");
    }

    #[test]
    fn provider_failure_display_without_status() {
        let f = ProviderFailure::new("gemini", "empty candidate list");
        assert_eq!(f.to_string(), "gemini: empty candidate list");
    }

    #[test]
    fn no_json_carries_excerpt() {
        let raw = "The invoice appears to show...";
        let e = ExtractError::no_json("no opening brace", raw);
        let msg = e.to_string();
        assert!(msg.contains("no opening brace"));
        assert!(msg.contains("invoice appears"));
    }

    #[test]
    fn excerpt_truncates_long_text() {
        let raw = "x".repeat(1000);
        let ex = excerpt(&raw);
        assert!(ex.len() <= RAW_EXCERPT_LEN + '…'.len_utf8());
        assert!(ex.ends_with('…'));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let raw = "請".repeat(200); // 3 bytes each; 280 is not a boundary
        let ex = excerpt(&raw);
        assert!(ex.ends_with('…'));
        // Must not have panicked, and must still be valid UTF-8 by construction.
        assert!(ex.chars().all(|c| c == '請' || c == '…'));
    }

    #[test]
    fn payload_too_large_display() {
        let e = ExtractError::PayloadTooLarge {
            size: 6_000_000,
            limit: 5_242_880,
        };
        assert!(e.to_string().contains("6000000"));
    }
}
