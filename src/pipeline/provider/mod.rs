//! Provider clients: one module per multimodal backend.
//!
//! Each backend hides its native request/response contract behind the
//! [`ProviderClient`] capability trait. The two implementations share no
//! code beyond the trait — the shapes genuinely differ (header auth vs
//! key header, content blocks vs parts, stop reasons vs finish reasons) and
//! a shared abstraction would be thinner than the differences.
//!
//! Clients send exactly one request and never retry; eligibility for a
//! second chance is the orchestrator's decision, and its only recovery is
//! failover to a *different* provider.

use crate::error::ProviderFailure;
use crate::pipeline::raster::RasterImage;
use async_trait::async_trait;

pub mod anthropic;
pub mod gemini;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;

/// Normalised success shape from one provider attempt.
///
/// Created by a client, handed straight to the response parser; not
/// retained anywhere.
#[derive(Debug, Clone)]
pub struct ProviderResult {
    /// Stable provider identifier, e.g. `"anthropic"`.
    pub provider_id: &'static str,
    /// The model's textual completion, all segments concatenated in order.
    pub raw_text: String,
}

/// Capability interface for a multimodal extraction backend.
///
/// Failure cases a client must convert into `Err(ProviderFailure)` rather
/// than recover from silently: non-2xx transport status, an error payload
/// embedded in a 200 body, an empty/blocked completion, and a non-content
/// stop reason. Truncation stops (`max_tokens`/`MAX_TOKENS`) are success —
/// partial text is what the parser's repair path exists for.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable identifier used in attempt records and result tags.
    fn id(&self) -> &'static str;

    /// Send one extraction request for the given image and prompt.
    async fn call(
        &self,
        image: &RasterImage,
        prompt: &str,
    ) -> Result<ProviderResult, ProviderFailure>;
}
