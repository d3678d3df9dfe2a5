//! Configuration types for invoice extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Keeping every knob in one struct
//! makes it trivial to share configs across tasks and to diff two runs to
//! understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A many-field constructor breaks on every new field. The builder lets
//! callers set only what they care about and rely on documented defaults.

use crate::error::ExtractError;
use crate::pipeline::provider::ProviderClient;
use std::fmt;
use std::sync::Arc;

/// Configuration for the extraction pipeline.
///
/// Built via [`ExtractionConfig::builder()`] or
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use invoice_vision::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .anthropic_api_key("sk-ant-...")
///     .gemini_api_key("AIza...")
///     .api_timeout_secs(90)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Anthropic API key. When set, Anthropic is the primary provider.
    ///
    /// Falls back to the `ANTHROPIC_API_KEY` environment variable when
    /// neither this field nor `providers` is set.
    pub anthropic_api_key: Option<String>,

    /// Gemini API key. When set, Gemini is the fallback provider — or the
    /// primary, if no Anthropic credential is configured.
    ///
    /// Falls back to the `GEMINI_API_KEY` environment variable.
    pub gemini_api_key: Option<String>,

    /// Anthropic model identifier. Default: `claude-sonnet-4-20250514`.
    pub anthropic_model: String,

    /// Gemini model identifier. Default: `gemini-2.0-flash`.
    pub gemini_model: String,

    /// Maximum tokens the model may generate. Default: 4096.
    ///
    /// Dense invoices with long line-item tables can exceed 2 000 output
    /// tokens. Setting this too low truncates the JSON mid-structure —
    /// recoverable by the parser's repair path, but with the tail line
    /// items lost.
    pub max_tokens: u32,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Near-zero keeps the model faithful to what is printed on the page,
    /// which is exactly what transcription wants.
    pub temperature: f32,

    /// Per-provider-call timeout in seconds. Default: 60.
    ///
    /// The core has no cancellation primitive; this transport deadline is
    /// the caller's only bound on an in-flight attempt.
    pub api_timeout_secs: u64,

    /// Custom extraction prompt. If None, uses
    /// [`crate::prompts::DEFAULT_EXTRACTION_PROMPT`].
    pub prompt: Option<String>,

    /// Pre-constructed provider chain, in priority order. Takes precedence
    /// over API keys and environment variables. Useful in tests or when the
    /// caller needs custom middleware around a provider.
    pub providers: Option<Vec<Arc<dyn ProviderClient>>>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            gemini_api_key: None,
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            gemini_model: "gemini-2.0-flash".to_string(),
            max_tokens: 4096,
            temperature: 0.1,
            api_timeout_secs: 60,
            prompt: None,
            providers: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("anthropic_api_key", &self.anthropic_api_key.as_ref().map(|_| "<redacted>"))
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .field("anthropic_model", &self.anthropic_model)
            .field("gemini_model", &self.gemini_model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("prompt", &self.prompt.as_ref().map(|p| p.len()))
            .field(
                "providers",
                &self.providers.as_ref().map(|p| p.len()),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn anthropic_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.anthropic_api_key = Some(key.into());
        self
    }

    pub fn gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.gemini_api_key = Some(key.into());
        self
    }

    pub fn anthropic_model(mut self, model: impl Into<String>) -> Self {
        self.config.anthropic_model = model.into();
        self
    }

    pub fn gemini_model(mut self, model: impl Into<String>) -> Self {
        self.config.gemini_model = model.into();
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    /// Supply a pre-built provider chain, in priority order.
    pub fn providers(mut self, providers: Vec<Arc<dyn ProviderClient>>) -> Self {
        self.config.providers = Some(providers);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.anthropic_model.is_empty() || c.gemini_model.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Model identifiers must not be empty".into(),
            ));
        }
        if let Some(ref providers) = c.providers {
            if providers.is_empty() {
                return Err(ExtractError::InvalidConfig(
                    "An explicit provider chain must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}
