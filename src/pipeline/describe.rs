//! Image captioning: the [`ImageDescriber`] seam and its implementations.
//!
//! [`ProviderDescriber`] wraps an `edgequake_llm` provider. An explicit API
//! key is turned into an OpenAI (or OpenAI-compatible) provider by
//! [`openai_provider`]; named providers come from the provider factory.
//!
//! ## Retry Strategy
//!
//! Vision endpoints return 429 / 503 under load. Calls are retried
//! with exponential backoff (`backoff_ms * 2^attempt`): with 500 ms base and
//! 2 retries the waits are 500 ms → 1 s. An empty answer is not retried.

use crate::config::SnapshotConfig;
use crate::error::CaptionError;
use crate::pipeline::encode::encode_image_file;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, OpenAIProvider, ProviderFactory};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Produces a textual description of an image file.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, image: &Path, prompt: &str, model: &str) -> Result<String, CaptionError>;
}

/// How often and how patiently a failing call is repeated.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 500,
        }
    }
}

/// Outcome of a single attempt.
enum AttemptError {
    /// Worth trying again (transport error, 5xx, 429).
    Transient(String),
    /// Trying again cannot help.
    Permanent(CaptionError),
}

async fn with_retries<F, Fut>(label: &str, policy: RetryPolicy, mut call: F) -> Result<String, CaptionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, AttemptError>>,
{
    let mut last_err = String::new();
    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = policy.backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, policy.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
        match call().await {
            Ok(text) if text.trim().is_empty() => return Err(CaptionError::EmptyResponse),
            Ok(text) => return Ok(text.trim().to_string()),
            Err(AttemptError::Permanent(e)) => return Err(e),
            Err(AttemptError::Transient(msg)) => {
                warn!("{}: attempt {} failed: {}", label, attempt + 1, msg);
                last_err = msg;
            }
        }
    }
    Err(CaptionError::Api {
        retries: policy.max_retries,
        message: last_err,
    })
}

/// Authentication and authorisation failures cannot recover on retry.
fn classify_provider_error(message: String) -> AttemptError {
    let lower = message.to_ascii_lowercase();
    if ["401", "403", "unauthorized", "invalid api key", "invalid_api_key"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        AttemptError::Permanent(CaptionError::Api { retries: 0, message })
    } else {
        AttemptError::Transient(message)
    }
}

fn label_for(image: &Path) -> String {
    image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| image.display().to_string())
}

// ── edgequake-llm provider ──────────────────────────────────────────────────

/// Default OpenAI API root.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Build an OpenAI provider for an explicit key, bound to `model`.
///
/// Any other `base_url` is treated as an OpenAI-compatible server (Azure
/// proxy, vLLM, a local stub). The process environment is never consulted.
pub fn openai_provider(api_key: &str, base_url: &str, model: &str) -> Arc<dyn LLMProvider> {
    let base_url = base_url.trim_end_matches('/');
    let provider = if base_url == OPENAI_API_BASE {
        OpenAIProvider::new(api_key)
    } else {
        OpenAIProvider::compatible(api_key, base_url)
    };
    Arc::new(provider.with_model(model))
}

/// Captioning through an `edgequake_llm` provider.
///
/// The provider is bound to a model when it is created, so the `model`
/// argument of [`ImageDescriber::describe`] is only used for logging.
pub struct ProviderDescriber {
    provider: Arc<dyn LLMProvider>,
    max_tokens: usize,
    retry: RetryPolicy,
}

impl ProviderDescriber {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_tokens: 300,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl ImageDescriber for ProviderDescriber {
    async fn describe(&self, image: &Path, prompt: &str, model: &str) -> Result<String, CaptionError> {
        let encoded = encode_image_file(image).await?;
        let messages = vec![ChatMessage::user_with_images(
            prompt,
            vec![encoded.to_image_data()],
        )];
        let options = CompletionOptions {
            temperature: Some(0.2),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };
        let label = label_for(image);
        debug!("{}: requesting description ({})", label, model);
        let (provider, messages, options) = (&self.provider, &messages, &options);
        with_retries(&label, self.retry, || async move {
            provider
                .chat(messages, Some(options))
                .await
                .map(|r| r.content)
                .map_err(|e| classify_provider_error(e.to_string()))
        })
        .await
    }
}

/// Pick the describer a run should use, from most to least specific.
///
/// 1. An explicit [`SnapshotConfig::describer`].
/// 2. A pre-built `edgequake_llm` provider ([`SnapshotConfig::provider`]).
/// 3. A named provider ([`SnapshotConfig::provider_name`]) created for
///    [`SnapshotConfig::model`]; the provider factory looks up its own
///    credential.
/// 4. An OpenAI provider for [`SnapshotConfig::api_key`] at
///    [`SnapshotConfig::api_base_url`].
///
/// Returns [`CaptionError::NotConfigured`] when none of these is set.
pub fn resolve_describer(config: &SnapshotConfig) -> Result<Arc<dyn ImageDescriber>, CaptionError> {
    let retry = RetryPolicy {
        max_retries: config.caption_max_retries,
        backoff_ms: config.retry_backoff_ms,
    };

    if let Some(ref describer) = config.describer {
        return Ok(Arc::clone(describer));
    }

    if let Some(ref provider) = config.provider {
        info!("Captioning with pre-built provider");
        return Ok(Arc::new(
            ProviderDescriber::new(Arc::clone(provider))
                .with_max_tokens(config.caption_max_tokens)
                .with_retry(retry),
        ));
    }

    if let Some(ref name) = config.provider_name {
        let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            CaptionError::NotConfigured {
                hint: format!("provider '{name}': {e}"),
            }
        })?;
        info!("Captioning with provider '{}' ({})", name, config.model);
        return Ok(Arc::new(
            ProviderDescriber::new(provider)
                .with_max_tokens(config.caption_max_tokens)
                .with_retry(retry),
        ));
    }

    match config.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => {
            info!("Captioning with OpenAI-compatible API at {}", config.api_base_url);
            let provider = openai_provider(key, &config.api_base_url, &config.model);
            Ok(Arc::new(
                ProviderDescriber::new(provider)
                    .with_max_tokens(config.caption_max_tokens)
                    .with_retry(retry),
            ))
        }
        _ => Err(CaptionError::NotConfigured {
            hint: "set an API key, a provider name, or a describer".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let out = with_retries("t", fast(), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AttemptError::Transient("503".into()))
            } else {
                Ok("  a red square \n".to_string())
            }
        })
        .await
        .unwrap();
        assert_eq!(out, "a red square");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);
        let err = with_retries("t", fast(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(AttemptError::Transient("429".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CaptionError::Api { retries: 2, ref message } if message == "429"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_and_empty_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let err = with_retries("t", fast(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("   ".to_string())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CaptionError::EmptyResponse));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = with_retries("t", fast(), || async {
            Err::<String, _>(AttemptError::Permanent(CaptionError::Api {
                retries: 0,
                message: "HTTP 401".into(),
            }))
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn auth_failures_are_permanent() {
        assert!(matches!(
            classify_provider_error("API error: 401 Unauthorized".into()),
            AttemptError::Permanent(_)
        ));
        assert!(matches!(
            classify_provider_error("rate limited (429)".into()),
            AttemptError::Transient(_)
        ));
    }

    #[test]
    fn unconfigured_is_reported() {
        let config = SnapshotConfig::default();
        let err = resolve_describer(&config).err().unwrap();
        assert!(matches!(err, CaptionError::NotConfigured { .. }));
    }

    #[test]
    fn api_key_selects_openai_client() {
        let config = SnapshotConfig::builder()
            .api_key("sk-test")
            .api_base_url("http://127.0.0.1:9/v1/")
            .build()
            .unwrap();
        assert!(resolve_describer(&config).is_ok());
    }

    #[test]
    fn default_base_and_compatible_base_both_build() {
        let openai = openai_provider("sk-test", "https://api.openai.com/v1/", "gpt-4.1-nano");
        let local = openai_provider("sk-test", "http://127.0.0.1:9/v1", "llava");
        assert!(!openai.name().is_empty());
        assert!(!local.name().is_empty());
    }
}
