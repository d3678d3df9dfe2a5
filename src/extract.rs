//! Extraction orchestration: rasterise once, walk the provider chain,
//! parse, coerce.
//!
//! ## Why sequential fallback?
//!
//! Provider attempts within one document are strictly sequential — the
//! fallback fires only after the prior attempt failed, never speculatively
//! in parallel. Racing both providers would double-bill every document to
//! shave latency off the rare failure case. Across documents there is no
//! ordering constraint; [`extract_batch`] runs documents concurrently.
//!
//! A provider is never retried against itself: the transient-failure story
//! is "ask someone else", not "ask again", which keeps worst-case latency
//! at (number of providers × timeout) instead of unbounded backoff.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, ProviderFailure};
use crate::pipeline::provider::{AnthropicClient, GeminiClient, ProviderClient};
use crate::pipeline::raster;
use crate::pipeline::parse;
use crate::prompts::DEFAULT_EXTRACTION_PROMPT;
use crate::record::{self, InvoiceRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One input document for [`extract_batch`].
#[derive(Debug, Clone)]
pub struct Document {
    /// Raw file bytes (PDF or image).
    pub bytes: Vec<u8>,
    /// Declared MIME type, if the caller knows one.
    pub mime: Option<String>,
    /// Original filename, used for extension-based type inference.
    pub filename: Option<String>,
}

/// Stage timings for one document, in the spirit of per-run stats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub raster_ms: u64,
    pub provider_ms: u64,
    pub total_ms: u64,
}

/// The result of a successful extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// The coerced invoice record.
    pub record: InvoiceRecord,
    /// Which provider produced the accepted completion.
    pub provider_id: String,
    /// The raw model text the record was parsed from, kept for caller-side
    /// display and manual recovery.
    pub raw_text: String,
    /// Failed attempts that preceded the accepted one, in attempt order.
    pub failed_attempts: Vec<ProviderFailure>,
    pub stats: ExtractionStats,
}

/// Extract an invoice record from a raw document.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `bytes`    — raw file bytes (PDF or image)
/// * `mime`     — declared MIME type, if known
/// * `filename` — original filename for extension-based inference
/// * `config`   — pipeline configuration
///
/// # Errors
/// - [`ExtractError::NoProviderConfigured`] before any raster work when no
///   credential or provider override exists
/// - rasteriser errors for undecodable input (terminal — no fallback exists
///   for a bad source file)
/// - [`ExtractError::PayloadTooLarge`] when the normalised image exceeds
///   the transport hard cap
/// - [`ExtractError::AllProvidersFailed`] when every provider attempt
///   failed, with one recorded failure per provider
/// - [`ExtractError::NoJsonFound`] when the accepted completion cannot be
///   parsed even after repair (terminal; carries a raw-text excerpt)
pub async fn extract(
    bytes: Vec<u8>,
    mime: Option<&str>,
    filename: Option<&str>,
    config: &ExtractionConfig,
) -> Result<Extraction, ExtractError> {
    let total_start = Instant::now();

    // ── Step 1: resolve the provider chain ───────────────────────────────
    // Done first: there is no point rasterising a document nobody can be
    // asked about.
    let providers = resolve_providers(config)?;
    debug!(
        chain = ?providers.iter().map(|p| p.id()).collect::<Vec<_>>(),
        "resolved provider chain"
    );

    // ── Step 2: rasterise once, shared across all attempts ───────────────
    let raster_start = Instant::now();
    let image = raster::rasterize(bytes, mime, filename).await?;
    let raster_ms = raster_start.elapsed().as_millis() as u64;
    info!(
        size = image.decoded_size_estimate(),
        raster_ms, "document normalised"
    );

    // ── Step 3: transport hard cap, before any provider is billed ────────
    let size = image.decoded_size_estimate();
    if size > raster::HARD_PAYLOAD_CAP {
        return Err(ExtractError::PayloadTooLarge {
            size,
            limit: raster::HARD_PAYLOAD_CAP,
        });
    }

    // ── Step 4: sequential provider attempts ─────────────────────────────
    let prompt = config.prompt.as_deref().unwrap_or(DEFAULT_EXTRACTION_PROMPT);
    let provider_start = Instant::now();
    let mut attempts: Vec<ProviderFailure> = Vec::new();

    for provider in &providers {
        match provider.call(&image, prompt).await {
            Ok(result) => {
                let provider_ms = provider_start.elapsed().as_millis() as u64;
                info!(
                    provider = result.provider_id,
                    chars = result.raw_text.len(),
                    provider_ms,
                    "provider attempt succeeded"
                );

                // Parser/coercion failures are terminal for this document —
                // a second provider call would not make this text parse.
                let parsed = parse::extract_json(&result.raw_text)?;
                let record = record::coerce(&parsed);

                return Ok(Extraction {
                    record,
                    provider_id: result.provider_id.to_string(),
                    raw_text: result.raw_text,
                    failed_attempts: attempts,
                    stats: ExtractionStats {
                        raster_ms,
                        provider_ms,
                        total_ms: total_start.elapsed().as_millis() as u64,
                    },
                });
            }
            Err(failure) => {
                warn!(provider = %failure.provider_id, reason = %failure.message, "provider attempt failed");
                attempts.push(failure);
            }
        }
    }

    Err(ExtractError::AllProvidersFailed { attempts })
}

/// Extract several independent documents concurrently.
///
/// Each document runs its own full pipeline; there is no shared mutable
/// state between them. Results come back in input order even though
/// completion order is arbitrary.
pub async fn extract_batch(
    documents: Vec<Document>,
    config: &ExtractionConfig,
    concurrency: usize,
) -> Vec<Result<Extraction, ExtractError>> {
    use futures::stream::{self, StreamExt};

    let mut indexed: Vec<(usize, Result<Extraction, ExtractError>)> =
        stream::iter(documents.into_iter().enumerate().map(|(i, doc)| {
            let config = config.clone();
            async move {
                let result = extract(
                    doc.bytes,
                    doc.mime.as_deref(),
                    doc.filename.as_deref(),
                    &config,
                )
                .await;
                (i, result)
            }
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, r)| r).collect()
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Resolve the ordered provider chain, from most-specific to least-specific.
///
/// 1. **Pre-built chain** (`config.providers`) — the caller constructed the
///    providers entirely; used as-is. The test seam.
/// 2. **Explicit keys on the config** — Anthropic first when configured,
///    Gemini after it; Gemini alone is promoted to primary.
/// 3. **Environment** — `ANTHROPIC_API_KEY` / `GEMINI_API_KEY`, same
///    ordering rule.
fn resolve_providers(
    config: &ExtractionConfig,
) -> Result<Vec<Arc<dyn ProviderClient>>, ExtractError> {
    if let Some(ref providers) = config.providers {
        if providers.is_empty() {
            return Err(ExtractError::NoProviderConfigured);
        }
        return Ok(providers.clone());
    }

    let anthropic_key = config
        .anthropic_api_key
        .clone()
        .or_else(|| non_empty_env("ANTHROPIC_API_KEY"));
    let gemini_key = config
        .gemini_api_key
        .clone()
        .or_else(|| non_empty_env("GEMINI_API_KEY"));

    let mut chain: Vec<Arc<dyn ProviderClient>> = Vec::with_capacity(2);

    if let Some(key) = anthropic_key {
        let client = AnthropicClient::new(
            key,
            config.anthropic_model.clone(),
            config.max_tokens,
            config.temperature,
            config.api_timeout_secs,
        )
        .map_err(|f| ExtractError::Internal(f.to_string()))?;
        chain.push(Arc::new(client));
    }
    if let Some(key) = gemini_key {
        let client = GeminiClient::new(
            key,
            config.gemini_model.clone(),
            config.max_tokens,
            config.temperature,
            config.api_timeout_secs,
        )
        .map_err(|f| ExtractError::Internal(f.to_string()))?;
        chain.push(Arc::new(client));
    }

    if chain.is_empty() {
        return Err(ExtractError::NoProviderConfigured);
    }
    Ok(chain)
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_orders_anthropic_before_gemini() {
        let config = ExtractionConfig::builder()
            .anthropic_api_key("sk-ant-test")
            .gemini_api_key("AIza-test")
            .build()
            .unwrap();
        let chain = resolve_providers(&config).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id(), "anthropic");
        assert_eq!(chain[1].id(), "gemini");
    }

    #[test]
    fn resolve_promotes_lone_gemini_to_primary() {
        // Only meaningful when the environment doesn't inject an Anthropic key.
        if std::env::var_os("ANTHROPIC_API_KEY").is_some() {
            println!("SKIP — ANTHROPIC_API_KEY set in environment");
            return;
        }
        let config = ExtractionConfig::builder()
            .gemini_api_key("AIza-test")
            .build()
            .unwrap();
        let chain = resolve_providers(&config).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].id(), "gemini");
    }

    #[test]
    fn resolve_fails_fast_without_credentials() {
        if std::env::var_os("ANTHROPIC_API_KEY").is_some()
            || std::env::var_os("GEMINI_API_KEY").is_some()
        {
            println!("SKIP — provider key set in environment");
            return;
        }
        let config = ExtractionConfig::default();
        let result = resolve_providers(&config);
        assert!(matches!(result, Err(ExtractError::NoProviderConfigured)));
    }
}
